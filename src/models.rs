//! Record types persisted by the store, their creation payloads, and the
//! redacted views used on the HTTP surface.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::store::Record;

/// Access level gating route groups. Absent on a fresh account; set only via
/// the explicit promotion operation, never through create or generic update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Regular,
    Admin,
}

/// A user account. `password` holds the argon2 PHC hash and is write-only on
/// the API: responses always go through [`PublicUser`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub level: Option<Level>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn is_admin(&self) -> bool {
        self.level == Some(Level::Admin)
    }
}

impl Record for User {
    // Credentials and privilege level never flow through the generic update path.
    const NON_UPDATABLE: &'static [&'static str] = &["email", "password", "level"];
    fn id(&self) -> Uuid { self.id }
    fn touch(&mut self, at: DateTime<Utc>) { self.updated_at = at; }
}

/// Creation payload for a user. `level` is deliberately absent: a payload
/// carrying one is ignored, so accounts cannot be born privileged.
#[derive(Debug, Clone, Deserialize)]
pub struct NewUser {
    pub email: String,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}

/// User as serialized in responses: everything but the password hash.
#[derive(Debug, Clone, Serialize)]
pub struct PublicUser {
    pub id: Uuid,
    pub email: String,
    pub name: Option<String>,
    pub level: Option<Level>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&User> for PublicUser {
    fn from(u: &User) -> Self {
        PublicUser {
            id: u.id,
            email: u.email.clone(),
            name: u.name.clone(),
            level: u.level,
            created_at: u.created_at,
            updated_at: u.updated_at,
        }
    }
}

/// A flashcard. `collections` is a set of collection ids (no duplicates);
/// it is mutated only through the membership operations in the card
/// controller, never through the generic update path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Card {
    pub id: Uuid,
    pub kind: String,
    pub name: String,
    #[serde(default)]
    pub image: Vec<Value>,
    #[serde(default)]
    pub data: Value,
    #[serde(default)]
    pub collections: Vec<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Record for Card {
    const NON_UPDATABLE: &'static [&'static str] = &["collections"];
    fn id(&self) -> Uuid { self.id }
    fn touch(&mut self, at: DateTime<Utc>) { self.updated_at = at; }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewCard {
    pub kind: String,
    pub name: String,
    #[serde(default)]
    pub image: Vec<Value>,
    #[serde(default)]
    pub data: Value,
}

/// A named group of cards. Membership lives on the cards themselves.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Collection {
    pub id: Uuid,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Record for Collection {
    const NON_UPDATABLE: &'static [&'static str] = &[];
    fn id(&self) -> Uuid { self.id }
    fn touch(&mut self, at: DateTime<Utc>) { self.updated_at = at; }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewCollection {
    pub name: String,
}

/// Recall score for one (card, user) pair; at most one exists per pair.
/// `points` stays within [1, 10]; `last_test` is caller-supplied so result
/// batches can be backfilled with historical dates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Score {
    pub id: Uuid,
    pub card: Uuid,
    pub user: Uuid,
    pub points: i32,
    pub last_test: DateTime<Utc>,
}

impl Record for Score {
    const NON_UPDATABLE: &'static [&'static str] = &["card", "user"];
    fn id(&self) -> Uuid { self.id }
    fn touch(&mut self, _at: DateTime<Utc>) {}
}

/// Score projection with the card and user embedded as full records.
#[derive(Debug, Clone, Serialize)]
pub struct PopulatedScore {
    pub id: Uuid,
    pub card: Card,
    pub user: PublicUser,
    pub points: i32,
    pub last_test: DateTime<Utc>,
}
