use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

use memodeck::config::Settings;
use memodeck::controllers::users;
use memodeck::server::{self, AppState};
use memodeck::store::SharedStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Init logging
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap();
    fmt().with_env_filter(filter).init();

    let settings = Settings::from_env();
    let rust_log = std::env::var("RUST_LOG").unwrap_or_else(|_| "<unset>".to_string());
    info!(
        target: "memodeck",
        "memodeck starting: RUST_LOG='{}', http_port={}, token_ttl='{}'",
        rust_log, settings.http_port, settings.token_ttl
    );

    let store = SharedStore::new();
    // A fresh deployment always has an operator account that can log in.
    users::ensure_default_admin(&store, &settings.admin_email, &settings.admin_password)?;

    server::run(AppState { store, settings }).await
}
