//! Bearer-token authentication: JWT issuance and the per-route-group guards.
//!
//! Tokens are HS256 JWTs whose payload carries the user id as its only
//! application claim. Verification comes in two strategies selected by the
//! route group: `authenticate_regular` accepts any valid token that resolves
//! to an existing user; `authenticate_admin` additionally requires the
//! resolved account to hold the admin level. A valid token for a non-admin
//! account fails with the same unauthenticated outcome as an unknown user,
//! so responses do not reveal which accounts exist or which are admins.

use axum::http::HeaderMap;
use chrono::Utc;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};
use crate::models::User;
use crate::store::SharedStore;

/// Default token lifetime when the caller does not supply one.
pub const DEFAULT_EXPIRY: &str = "1 day";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// The authenticated user's id.
    pub uid: String,
    pub iat: i64,
    pub exp: i64,
}

#[derive(Debug, thiserror::Error)]
#[error("unparsable duration: {0}")]
pub struct DurationParseError(String);

/// Parse an expiry spec into seconds. Accepts a raw seconds count ("3600")
/// or a units-suffixed span ("10h", "2 days", "30m", "1w").
pub fn parse_expires_in(spec: &str) -> Result<i64, DurationParseError> {
    let s = spec.trim();
    if s.is_empty() {
        return Err(DurationParseError(spec.to_string()));
    }
    if let Ok(n) = s.parse::<i64>() {
        if n < 0 {
            return Err(DurationParseError(spec.to_string()));
        }
        return Ok(n);
    }
    let split = s.find(|c: char| !c.is_ascii_digit()).unwrap_or(s.len());
    let (num, unit) = s.split_at(split);
    let n: i64 = num.trim().parse().map_err(|_| DurationParseError(spec.to_string()))?;
    if n < 0 {
        return Err(DurationParseError(spec.to_string()));
    }
    let per = match unit.trim().to_ascii_lowercase().as_str() {
        "s" | "sec" | "secs" | "second" | "seconds" => 1,
        "m" | "min" | "mins" | "minute" | "minutes" => 60,
        "h" | "hr" | "hrs" | "hour" | "hours" => 3600,
        "d" | "day" | "days" => 86_400,
        "w" | "week" | "weeks" => 604_800,
        _ => return Err(DurationParseError(spec.to_string())),
    };
    Ok(n * per)
}

/// Issue a signed, time-limited bearer token encoding the given user id as
/// its sole application claim. `expires_in` defaults to one day.
pub fn generate_access_token(
    signing_key: &str,
    user_id: &str,
    expires_in: Option<&str>,
) -> AppResult<String> {
    if user_id.is_empty() {
        return Err(AppError::invalid_arg("missing_user_id", "user id is required"));
    }
    let secs = parse_expires_in(expires_in.unwrap_or(DEFAULT_EXPIRY))
        .map_err(|e| AppError::invalid_arg("bad_expiry", &e.to_string() as &str))?;
    let now = Utc::now().timestamp();
    let claims = Claims { uid: user_id.to_string(), iat: now, exp: now + secs };
    encode(&Header::default(), &claims, &EncodingKey::from_secret(signing_key.as_bytes()))
        .map_err(|e| AppError::internal("token_encode", &e.to_string() as &str))
}

/// Verify signature and expiry, returning the decoded claims.
pub fn decode_token(signing_key: &str, token: &str) -> AppResult<Claims> {
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(signing_key.as_bytes()),
        &Validation::default(),
    )
    .map(|data| data.claims)
    .map_err(|_| AppError::auth("invalid_token", "invalid or expired token"))
}

fn bearer_from_headers(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get("authorization").or_else(|| headers.get("Authorization"))?;
    let s = value.to_str().ok()?;
    let (scheme, token) = s.split_once(' ')?;
    if scheme.eq_ignore_ascii_case("bearer") {
        Some(token.trim())
    } else {
        None
    }
}

/// Regular strategy: any valid, unexpired token whose uid resolves to an
/// existing user. Signature/expiry failure (`invalid_token`) is kept apart
/// from resolution failure (`unknown_user`) in the error value; both map
/// to 401.
pub fn authenticate_regular(
    store: &SharedStore,
    signing_key: &str,
    headers: &HeaderMap,
) -> AppResult<User> {
    let token = bearer_from_headers(headers)
        .ok_or_else(|| AppError::auth("missing_token", "bearer token required"))?;
    let claims = decode_token(signing_key, token)?;
    let uid = uuid::Uuid::parse_str(&claims.uid)
        .map_err(|_| AppError::auth("unknown_user", "unauthorized"))?;
    store
        .users
        .get(uid)
        .ok_or_else(|| AppError::auth("unknown_user", "unauthorized"))
}

/// Admin strategy: as regular, plus the account must hold the admin level.
/// A non-admin account gets the same `unknown_user` outcome.
pub fn authenticate_admin(
    store: &SharedStore,
    signing_key: &str,
    headers: &HeaderMap,
) -> AppResult<User> {
    let user = authenticate_regular(store, signing_key, headers)?;
    if !user.is_admin() {
        return Err(AppError::auth("unknown_user", "unauthorized"));
    }
    Ok(user)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expiry_accepts_raw_seconds_and_suffixed_spans() {
        assert_eq!(parse_expires_in("3600").unwrap(), 3600);
        assert_eq!(parse_expires_in("10h").unwrap(), 36_000);
        assert_eq!(parse_expires_in("2 days").unwrap(), 172_800);
        assert_eq!(parse_expires_in("30m").unwrap(), 1800);
        assert_eq!(parse_expires_in("1w").unwrap(), 604_800);
        assert_eq!(parse_expires_in("1 day").unwrap(), 86_400);
        assert_eq!(parse_expires_in("45 secs").unwrap(), 45);
    }

    #[test]
    fn expiry_rejects_garbage() {
        assert!(parse_expires_in("").is_err());
        assert!(parse_expires_in("soon").is_err());
        assert!(parse_expires_in("10 fortnights").is_err());
        assert!(parse_expires_in("-5").is_err());
    }

    #[test]
    fn token_round_trip() {
        let uid = uuid::Uuid::new_v4().to_string();
        let token = generate_access_token("k3y", &uid, None).unwrap();
        let claims = decode_token("k3y", &token).unwrap();
        assert_eq!(claims.uid, uid);
        assert!(claims.exp - claims.iat == 86_400);
    }

    #[test]
    fn empty_user_id_is_rejected() {
        let err = generate_access_token("k3y", "", None).unwrap_err();
        assert!(matches!(err, crate::error::AppError::InvalidArgument { .. }));
    }

    #[test]
    fn wrong_key_and_expired_tokens_fail_verification() {
        let uid = uuid::Uuid::new_v4().to_string();
        let token = generate_access_token("k3y", &uid, Some("1h")).unwrap();
        assert!(decode_token("other", &token).is_err());

        // exp far enough in the past to defeat the default leeway
        let now = Utc::now().timestamp();
        let stale = Claims { uid, iat: now - 7200, exp: now - 3600 };
        let stale_token = encode(
            &Header::default(),
            &stale,
            &EncodingKey::from_secret(b"k3y"),
        )
        .unwrap();
        assert!(decode_token("k3y", &stale_token).is_err());
    }

    #[test]
    fn bearer_header_parsing() {
        let mut headers = HeaderMap::new();
        headers.insert("authorization", "Bearer abc.def.ghi".parse().unwrap());
        assert_eq!(bearer_from_headers(&headers), Some("abc.def.ghi"));

        let mut basic = HeaderMap::new();
        basic.insert("authorization", "Basic dXNlcg==".parse().unwrap());
        assert_eq!(bearer_from_headers(&basic), None);
        assert_eq!(bearer_from_headers(&HeaderMap::new()), None);
    }
}
