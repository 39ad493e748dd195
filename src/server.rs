//!
//! memodeck HTTP server
//! --------------------
//! Axum-based JSON API over the shared store. Handlers stay thin: they run
//! the route group's auth guard, delegate to a controller or to the generic
//! store operations, and return `Result<_, AppError>` so the error taxonomy
//! is mapped to status codes in exactly one place (`AppError::IntoResponse`).
//!
//! Route groups:
//! - `/auth/login` — open.
//! - `/users`, `/cards`, `/collections` — admin bearer token.
//! - `/me`, `/scores` — regular bearer token.

use std::collections::HashSet;
use std::net::SocketAddr;

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;

use crate::auth;
use crate::config::Settings;
use crate::controllers::{cards, collections, scores, users};
use crate::error::{AppError, AppResult};
use crate::models::PublicUser;
use crate::store::SharedStore;

/// Shared server state injected into all handlers.
#[derive(Clone)]
pub struct AppState {
    pub store: SharedStore,
    pub settings: Settings,
}

/// Mount all routes onto a router with the given state.
pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/", get(|| async { "memodeck ok" }))
        .route("/auth/login", post(login))
        .route("/users", get(users_list).post(users_create))
        .route("/users/{id}", get(users_get).put(users_update).delete(users_delete))
        .route("/me", get(me))
        .route("/cards", get(cards_list).post(cards_create))
        .route("/cards/{id}", get(cards_get).put(cards_update).delete(cards_delete))
        .route("/collections", get(collections_list).post(collections_create))
        .route(
            "/collections/{id}",
            get(collections_get).put(collections_update).delete(collections_delete),
        )
        .route("/collections/{id}/cards", get(collection_cards))
        .route(
            "/collections/{id}/cards/{card_id}",
            post(collection_add_card).delete(collection_remove_card),
        )
        .route("/scores/{card_id}", get(score_get))
        .route("/scores/results", post(score_results))
        .with_state(state)
}

/// Serve the API on an already-bound listener. Kept separate from [`run`]
/// so tests can bind an ephemeral port first.
pub async fn serve(listener: tokio::net::TcpListener, state: AppState) -> anyhow::Result<()> {
    axum::serve(listener, app(state)).await?;
    Ok(())
}

/// Bind and serve on the configured port.
pub async fn run(state: AppState) -> anyhow::Result<()> {
    let addr: SocketAddr = format!("0.0.0.0:{}", state.settings.http_port).parse()?;
    info!("Starting server on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    serve(listener, state).await
}

#[derive(Debug, Deserialize)]
struct LoginPayload {
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    password: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ListQuery {
    #[serde(default)]
    skip: Option<i64>,
    #[serde(default)]
    limit: Option<i64>,
}

fn bad_credentials() -> AppError {
    AppError::auth("bad_credentials", "Unauthorized")
}

async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginPayload>,
) -> AppResult<Json<Value>> {
    let (Some(email), Some(password)) = (payload.email, payload.password) else {
        return Err(bad_credentials());
    };
    let user = users::find_by_email(&state.store, &email).ok_or_else(bad_credentials)?;
    let phc = user.password.as_deref().ok_or_else(bad_credentials)?;
    if !users::verify_password(&password, phc) {
        return Err(bad_credentials());
    }
    let token = auth::generate_access_token(
        &state.settings.jwt_signing_key,
        &user.id.to_string(),
        Some(&state.settings.token_ttl),
    )?;
    Ok(Json(json!({"auth": true, "uid": user.id, "token": token})))
}

// ---- users (admin) ----

async fn users_list(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(q): Query<ListQuery>,
) -> AppResult<Json<Vec<PublicUser>>> {
    auth::authenticate_admin(&state.store, &state.settings.jwt_signing_key, &headers)?;
    let list = state.store.users.list(q.skip, q.limit)?;
    Ok(Json(list.iter().map(PublicUser::from).collect()))
}

async fn users_create(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<Value>,
) -> AppResult<(StatusCode, Json<PublicUser>)> {
    auth::authenticate_admin(&state.store, &state.settings.jwt_signing_key, &headers)?;
    let created = users::create(&state.store, &payload)?;
    Ok((StatusCode::CREATED, Json((&created).into())))
}

async fn users_get(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> AppResult<Json<PublicUser>> {
    auth::authenticate_admin(&state.store, &state.settings.jwt_signing_key, &headers)?;
    let user = state
        .store
        .users
        .find_by_id(&id)?
        .ok_or_else(|| AppError::not_found("user_not_found", "user not found"))?;
    Ok(Json((&user).into()))
}

async fn users_update(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(patch): Json<Value>,
) -> AppResult<Json<PublicUser>> {
    auth::authenticate_admin(&state.store, &state.settings.jwt_signing_key, &headers)?;
    let updated = state.store.users.update(&id, &patch)?;
    Ok(Json((&updated).into()))
}

async fn users_delete(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> AppResult<Json<PublicUser>> {
    auth::authenticate_admin(&state.store, &state.settings.jwt_signing_key, &headers)?;
    let deleted = state
        .store
        .users
        .delete(&id)?
        .ok_or_else(|| AppError::not_found("user_not_found", "user not found"))?;
    Ok(Json((&deleted).into()))
}

// ---- me (regular) ----

async fn me(State(state): State<AppState>, headers: HeaderMap) -> AppResult<Json<PublicUser>> {
    let user = auth::authenticate_regular(&state.store, &state.settings.jwt_signing_key, &headers)?;
    Ok(Json((&user).into()))
}

// ---- cards (admin) ----

async fn cards_list(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(q): Query<ListQuery>,
) -> AppResult<impl IntoResponse> {
    auth::authenticate_admin(&state.store, &state.settings.jwt_signing_key, &headers)?;
    Ok(Json(state.store.cards.list(q.skip, q.limit)?))
}

async fn cards_create(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<Value>,
) -> AppResult<impl IntoResponse> {
    auth::authenticate_admin(&state.store, &state.settings.jwt_signing_key, &headers)?;
    let created = cards::create(&state.store, &payload)?;
    Ok((StatusCode::CREATED, Json(created)))
}

async fn cards_get(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> AppResult<impl IntoResponse> {
    auth::authenticate_admin(&state.store, &state.settings.jwt_signing_key, &headers)?;
    let card = state
        .store
        .cards
        .find_by_id(&id)?
        .ok_or_else(|| AppError::not_found("card_not_found", "card not found"))?;
    Ok(Json(card))
}

async fn cards_update(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(patch): Json<Value>,
) -> AppResult<impl IntoResponse> {
    auth::authenticate_admin(&state.store, &state.settings.jwt_signing_key, &headers)?;
    Ok(Json(state.store.cards.update(&id, &patch)?))
}

async fn cards_delete(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> AppResult<impl IntoResponse> {
    auth::authenticate_admin(&state.store, &state.settings.jwt_signing_key, &headers)?;
    let deleted = state
        .store
        .cards
        .delete(&id)?
        .ok_or_else(|| AppError::not_found("card_not_found", "card not found"))?;
    Ok(Json(deleted))
}

// ---- collections (admin) ----

async fn collections_list(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(q): Query<ListQuery>,
) -> AppResult<impl IntoResponse> {
    auth::authenticate_admin(&state.store, &state.settings.jwt_signing_key, &headers)?;
    Ok(Json(state.store.collections.list(q.skip, q.limit)?))
}

async fn collections_create(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<Value>,
) -> AppResult<impl IntoResponse> {
    auth::authenticate_admin(&state.store, &state.settings.jwt_signing_key, &headers)?;
    let created = collections::create(&state.store, &payload)?;
    Ok((StatusCode::CREATED, Json(created)))
}

async fn collections_get(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> AppResult<impl IntoResponse> {
    auth::authenticate_admin(&state.store, &state.settings.jwt_signing_key, &headers)?;
    let coll = state
        .store
        .collections
        .find_by_id(&id)?
        .ok_or_else(|| AppError::not_found("collection_not_found", "collection not found"))?;
    Ok(Json(coll))
}

async fn collections_update(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(patch): Json<Value>,
) -> AppResult<impl IntoResponse> {
    auth::authenticate_admin(&state.store, &state.settings.jwt_signing_key, &headers)?;
    Ok(Json(state.store.collections.update(&id, &patch)?))
}

async fn collections_delete(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> AppResult<impl IntoResponse> {
    auth::authenticate_admin(&state.store, &state.settings.jwt_signing_key, &headers)?;
    let deleted = state
        .store
        .collections
        .delete(&id)?
        .ok_or_else(|| AppError::not_found("collection_not_found", "collection not found"))?;
    Ok(Json(deleted))
}

fn require_collection(state: &AppState, id: &str) -> AppResult<crate::models::Collection> {
    state
        .store
        .collections
        .find_by_id(id)?
        .ok_or_else(|| AppError::not_found("collection_not_found", "collection not found"))
}

async fn collection_cards(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> AppResult<impl IntoResponse> {
    auth::authenticate_admin(&state.store, &state.settings.jwt_signing_key, &headers)?;
    let coll = require_collection(&state, &id)?;
    Ok(Json(collections::get_cards_in_collection(&state.store, coll.id)?))
}

async fn collection_add_card(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((id, card_id)): Path<(String, String)>,
) -> AppResult<Json<bool>> {
    auth::authenticate_admin(&state.store, &state.settings.jwt_signing_key, &headers)?;
    let coll = require_collection(&state, &id)?;
    Ok(Json(cards::add_to_collection(&state.store, &card_id, coll.id)?))
}

async fn collection_remove_card(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((id, card_id)): Path<(String, String)>,
) -> AppResult<Json<bool>> {
    auth::authenticate_admin(&state.store, &state.settings.jwt_signing_key, &headers)?;
    let coll = require_collection(&state, &id)?;
    Ok(Json(cards::remove_from_collection(&state.store, &card_id, coll.id)?))
}

// ---- scores (regular) ----

async fn score_get(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(card_id): Path<String>,
) -> AppResult<impl IntoResponse> {
    let user = auth::authenticate_regular(&state.store, &state.settings.jwt_signing_key, &headers)?;
    let found = scores::get_populated(&state.store, &card_id, user.id)?
        .ok_or_else(|| AppError::not_found("score_not_found", "no score for this card"))?;
    Ok(Json(found))
}

/// Accept "ISO-ish" timestamps: RFC 3339 first, then a bare date.
fn parse_result_date(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(d) = raw.parse::<NaiveDate>() {
        return Some(DateTime::from_naive_utc_and_offset(d.and_hms_opt(0, 0, 0)?, Utc));
    }
    None
}

/// Body: ordered array of `{cardId, hit, date}`. The whole batch is
/// validated before any write; the response carries one score per distinct
/// card touched, order unspecified.
async fn score_results(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> AppResult<Json<Vec<crate::models::Score>>> {
    let user = auth::authenticate_regular(&state.store, &state.settings.jwt_signing_key, &headers)?;

    let entries = body
        .as_array()
        .ok_or_else(|| AppError::invalid_arg("bad_results", "expected an array"))?;

    let mut validated: Vec<(String, bool, DateTime<Utc>)> = Vec::with_capacity(entries.len());
    for entry in entries {
        let card_id = entry
            .get("cardId")
            .and_then(Value::as_str)
            .ok_or_else(|| AppError::invalid_arg("bad_card_id", "cardId must be a string"))?;
        crate::store::parse_id(card_id)?;
        let hit = entry
            .get("hit")
            .and_then(Value::as_bool)
            .ok_or_else(|| AppError::invalid_arg("bad_hit", "hit must be a boolean"))?;
        let raw_date = entry
            .get("date")
            .and_then(Value::as_str)
            .ok_or_else(|| AppError::invalid_arg("bad_date", "date must be a timestamp string"))?;
        let date = parse_result_date(raw_date)
            .ok_or_else(|| AppError::invalid_arg("bad_date", "unparsable date"))?;
        validated.push((card_id.to_string(), hit, date));
    }

    let mut touched: Vec<String> = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();
    for (card_id, hit, date) in &validated {
        if *hit {
            scores::add_hit(&state.store, card_id, user.id, *date)?;
        } else {
            scores::add_miss(&state.store, card_id, user.id, *date)?;
        }
        if seen.insert(card_id.clone()) {
            touched.push(card_id.clone());
        }
    }

    let mut out = Vec::with_capacity(touched.len());
    for card_id in &touched {
        if let Some(score) = scores::get(&state.store, card_id, user.id)? {
            out.push(score);
        }
    }
    Ok(Json(out))
}
