//! Identity operations: account creation with password hashing, credential
//! verification, and the explicit admin promotion path.
//!
//! Hashing is an explicit step inside `create`, invoked before persistence;
//! there is no implicit save hook. The argon2 PHC string is stored in the
//! `password` field and never leaves the store unredacted.

use argon2::{Argon2, PasswordHasher, PasswordVerifier};
use chrono::Utc;
use password_hash::{PasswordHash, SaltString};
use serde_json::Value;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::{Level, NewUser, User};
use crate::store::{parse_id, SharedStore};

pub fn hash_password(password: &str) -> AppResult<String> {
    let mut salt_bytes = [0u8; 16];
    getrandom::getrandom(&mut salt_bytes)
        .map_err(|e| AppError::internal("salt", &e.to_string() as &str))?;
    let salt = SaltString::encode_b64(&salt_bytes)
        .map_err(|e| AppError::internal("salt", &e.to_string() as &str))?;
    let argon2 = Argon2::default();
    let phc = argon2
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| AppError::internal("hash", &e.to_string() as &str))?
        .to_string();
    Ok(phc)
}

pub fn verify_password(password: &str, phc: &str) -> bool {
    if let Ok(parsed) = PasswordHash::new(phc) {
        Argon2::default().verify_password(password.as_bytes(), &parsed).is_ok()
    } else {
        false
    }
}

/// Create a user from a JSON payload. Required: `email` (unique). The
/// password, when present, is hashed before the record is persisted. Any
/// `level` in the payload is ignored; accounts start without one.
pub fn create(store: &SharedStore, payload: &Value) -> AppResult<User> {
    let input: NewUser = serde_json::from_value(payload.clone())
        .map_err(|e| AppError::validation("bad_user", &e.to_string() as &str))?;
    let hashed = match input.password.as_deref() {
        Some(pw) => Some(hash_password(pw)?),
        None => None,
    };
    let now = Utc::now();
    let user = User {
        id: Uuid::new_v4(),
        email: input.email,
        password: hashed,
        name: input.name,
        level: None,
        created_at: now,
        updated_at: now,
    };
    store.users.create_unique(user, |u| u.email.clone(), "duplicate_email")
}

pub fn find_by_email(store: &SharedStore, email: &str) -> Option<User> {
    store.users.find_one(|u| u.email == email)
}

/// The promotion operation: the only path that sets the admin level.
pub fn set_admin(store: &SharedStore, id: &str) -> AppResult<User> {
    let id = parse_id(id)?;
    store
        .users
        .modify(id, |u| {
            u.level = Some(Level::Admin);
            u.updated_at = Utc::now();
        })
        .ok_or_else(|| AppError::not_found("user_not_found", "user not found"))
}

/// Seed the operator account on startup when it is absent, and make sure it
/// holds the admin level, so a fresh deployment can always log in.
pub fn ensure_default_admin(store: &SharedStore, email: &str, password: &str) -> AppResult<()> {
    let user = match find_by_email(store, email) {
        Some(u) => u,
        None => {
            let payload = serde_json::json!({ "email": email, "password": password, "name": "admin" });
            let created = create(store, &payload)?;
            tracing::info!(email = email, "seeded default admin account");
            created
        }
    };
    if !user.is_admin() {
        set_admin(store, &user.id.to_string())?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn create_hashes_password_and_ignores_level() {
        let store = SharedStore::new();
        let user = create(
            &store,
            &json!({"email": "a@b.c", "password": "hunter2", "name": "Ana", "level": "admin"}),
        )
        .unwrap();
        assert_eq!(user.email, "a@b.c");
        assert_eq!(user.level, None);
        let phc = user.password.as_deref().unwrap();
        assert_ne!(phc, "hunter2");
        assert!(verify_password("hunter2", phc));
        assert!(!verify_password("wrong", phc));
    }

    #[test]
    fn create_requires_email() {
        let store = SharedStore::new();
        let err = create(&store, &json!({"name": "nobody"})).unwrap_err();
        assert!(matches!(err, AppError::Validation { .. }));
    }

    #[test]
    fn duplicate_email_conflicts() {
        let store = SharedStore::new();
        create(&store, &json!({"email": "a@b.c"})).unwrap();
        let err = create(&store, &json!({"email": "a@b.c", "name": "again"})).unwrap_err();
        assert!(matches!(err, AppError::Conflict { .. }));
    }

    #[test]
    fn promotion_is_visible_through_find_by_id() {
        let store = SharedStore::new();
        let user = create(&store, &json!({"email": "a@b.c"})).unwrap();
        assert!(!user.is_admin());
        set_admin(&store, &user.id.to_string()).unwrap();
        let found = store.users.find_by_id(&user.id.to_string()).unwrap().unwrap();
        assert_eq!(found.level, Some(Level::Admin));
    }

    #[test]
    fn generic_update_cannot_change_email_password_or_level() {
        let store = SharedStore::new();
        let user = create(&store, &json!({"email": "a@b.c", "password": "pw"})).unwrap();
        let updated = store
            .users
            .update(
                &user.id.to_string(),
                &json!({"email": "evil@x.y", "password": "pwned", "level": "admin", "name": "Eve"}),
            )
            .unwrap();
        assert_eq!(updated.email, "a@b.c");
        assert_eq!(updated.password, user.password);
        assert_eq!(updated.level, None);
        assert_eq!(updated.name.as_deref(), Some("Eve"));
    }

    #[test]
    fn default_admin_seed_is_idempotent() {
        let store = SharedStore::new();
        ensure_default_admin(&store, "root@x.y", "pw").unwrap();
        ensure_default_admin(&store, "root@x.y", "pw").unwrap();
        let admin = find_by_email(&store, "root@x.y").unwrap();
        assert!(admin.is_admin());
        assert_eq!(store.users.count(), 1);
    }
}
