//! Runtime settings, read from environment variables with defaults suitable
//! for local development.

#[derive(Debug, Clone)]
pub struct Settings {
    pub http_port: u16,
    /// HMAC key for signing bearer tokens. Override in any real deployment.
    pub jwt_signing_key: String,
    /// Token lifetime: raw seconds ("3600") or a suffixed span ("1 day").
    pub token_ttl: String,
    pub admin_email: String,
    pub admin_password: String,
}

impl Settings {
    pub fn from_env() -> Self {
        let http_port = std::env::var("MEMODECK_HTTP_PORT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(7878);
        Settings {
            http_port,
            jwt_signing_key: std::env::var("MEMODECK_JWT_KEY")
                .unwrap_or_else(|_| "memodeck-dev-key".to_string()),
            token_ttl: std::env::var("MEMODECK_TOKEN_TTL").unwrap_or_else(|_| "1 day".to_string()),
            admin_email: std::env::var("MEMODECK_ADMIN_EMAIL")
                .unwrap_or_else(|_| "admin@memodeck.local".to_string()),
            admin_password: std::env::var("MEMODECK_ADMIN_PASSWORD")
                .unwrap_or_else(|_| "memodeck".to_string()),
        }
    }
}
