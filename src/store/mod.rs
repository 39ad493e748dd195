//!
//! memodeck store module
//! ---------------------
//! In-process document store shared by all controllers. One `Resource<T>`
//! holds every record of a single type behind a `parking_lot::RwLock`; the
//! `SharedStore` newtype bundles the four resources and is cloned into the
//! HTTP state. All resource state lives here so controllers stay stateless
//! and tests can run against independent store instances.
//!
//! Key responsibilities:
//! - Uniform CRUD operations for any record type (the CRUD factory).
//! - Field-level write protection on the generic update path: a permanent
//!   block-list (`id`, creation/update markers) plus each record type's own
//!   non-updatable set, filtered in exactly one place.
//! - Uniqueness-guarded insertion (e.g. user email) under the write lock.
//! - Lock-scoped upsert used by the score accumulator, so read-modify-write
//!   on a (card, user) pair is atomic within the process.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::{Card, Collection, Score, User};

/// Fields the generic update path never modifies, for any record type.
const BLOCKED_FIELDS: &[&str] = &["id", "created_at", "updated_at"];

/// Per-record-type descriptor consumed by the CRUD factory.
pub trait Record: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    /// Resource-specific fields excluded from the generic update path,
    /// on top of [`BLOCKED_FIELDS`].
    const NON_UPDATABLE: &'static [&'static str];

    fn id(&self) -> Uuid;

    /// Refresh the modification marker; no-op for records without one.
    fn touch(&mut self, at: DateTime<Utc>);
}

/// Parse a caller-supplied identifier. A malformed id is an
/// `InvalidArgument`, distinct from a well-formed id that matches nothing.
pub fn parse_id(id: &str) -> AppResult<Uuid> {
    Uuid::parse_str(id).map_err(|_| AppError::invalid_arg("bad_id", &format!("invalid id: {id}") as &str))
}

/// An identifier supplied either as a raw string or as the store's native
/// id type. Normalization happens before any comparison, so membership
/// checks always use value equality on the parsed id.
#[derive(Debug, Clone, Copy)]
pub enum IdArg<'a> {
    Raw(&'a str),
    Native(Uuid),
}

impl<'a> From<&'a str> for IdArg<'a> {
    fn from(s: &'a str) -> Self {
        IdArg::Raw(s)
    }
}

impl From<Uuid> for IdArg<'static> {
    fn from(id: Uuid) -> Self {
        IdArg::Native(id)
    }
}

impl IdArg<'_> {
    pub fn normalize(self) -> AppResult<Uuid> {
        match self {
            IdArg::Raw(s) => parse_id(s),
            IdArg::Native(id) => Ok(id),
        }
    }
}

struct Docs<T> {
    by_id: HashMap<Uuid, T>,
    /// Insertion order; `list` returns records in creation order.
    order: Vec<Uuid>,
}

impl<T> Default for Docs<T> {
    fn default() -> Self {
        Docs { by_id: HashMap::new(), order: Vec::new() }
    }
}

/// All records of one type, with the uniform CRUD operations.
pub struct Resource<T: Record> {
    docs: RwLock<Docs<T>>,
}

impl<T: Record> Default for Resource<T> {
    fn default() -> Self {
        Resource { docs: RwLock::new(Docs::default()) }
    }
}

impl<T: Record> Resource<T> {
    /// Return records in creation order, skipping `skip` and returning at
    /// most `limit`. Both absent means the full set; negatives are rejected.
    pub fn list(&self, skip: Option<i64>, limit: Option<i64>) -> AppResult<Vec<T>> {
        if skip.is_some_and(|v| v < 0) {
            return Err(AppError::invalid_arg("bad_skip", "skip must not be negative"));
        }
        if limit.is_some_and(|v| v < 0) {
            return Err(AppError::invalid_arg("bad_limit", "limit must not be negative"));
        }
        let docs = self.docs.read();
        let iter = docs.order.iter().filter_map(|id| docs.by_id.get(id));
        let iter = iter.skip(skip.unwrap_or(0) as usize);
        let out: Vec<T> = match limit {
            Some(n) => iter.take(n as usize).cloned().collect(),
            None => iter.cloned().collect(),
        };
        Ok(out)
    }

    /// Fetch a record by id. `Ok(None)` for a well-formed id that matches
    /// nothing; `InvalidArgument` when the id itself is malformed.
    pub fn find_by_id(&self, id: &str) -> AppResult<Option<T>> {
        let id = parse_id(id)?;
        Ok(self.docs.read().by_id.get(&id).cloned())
    }

    pub fn get(&self, id: Uuid) -> Option<T> {
        self.docs.read().by_id.get(&id).cloned()
    }

    /// Persist a new record and return it as stored.
    pub fn create(&self, record: T) -> T {
        let mut docs = self.docs.write();
        let id = record.id();
        docs.by_id.insert(id, record.clone());
        docs.order.push(id);
        record
    }

    /// Persist a new record unless another record shares the same key.
    /// The check and the insert happen under one write lock.
    pub fn create_unique<K: PartialEq>(
        &self,
        record: T,
        key: impl Fn(&T) -> K,
        conflict_code: &str,
    ) -> AppResult<T> {
        let mut docs = self.docs.write();
        let k = key(&record);
        if docs.by_id.values().any(|existing| key(existing) == k) {
            return Err(AppError::conflict(conflict_code, "already exists"));
        }
        let id = record.id();
        docs.by_id.insert(id, record.clone());
        docs.order.push(id);
        Ok(record)
    }

    /// Apply a partial update. Every key present in `patch` is written onto
    /// the stored record except the permanent block-list and the record
    /// type's non-updatable set; keys the record does not have are silently
    /// ignored. A value that does not fit the field's type is a validation
    /// error and nothing is persisted.
    pub fn update(&self, id: &str, patch: &Value) -> AppResult<T> {
        let id = parse_id(id)?;
        let patch = patch
            .as_object()
            .ok_or_else(|| AppError::invalid_arg("bad_patch", "update body must be an object"))?;

        let mut docs = self.docs.write();
        let found = docs
            .by_id
            .get(&id)
            .ok_or_else(|| AppError::not_found("not_found", &format!("id {id} not found") as &str))?;

        let mut map = match serde_json::to_value(found) {
            Ok(Value::Object(m)) => m,
            _ => return Err(AppError::internal("encode", "record did not serialize to an object")),
        };
        for (key, value) in patch {
            if BLOCKED_FIELDS.contains(&key.as_str()) || T::NON_UPDATABLE.contains(&key.as_str()) {
                continue;
            }
            if map.contains_key(key) {
                map.insert(key.clone(), value.clone());
            }
        }

        let mut updated: T = serde_json::from_value(Value::Object(map))
            .map_err(|e| AppError::validation("bad_field_type", &e.to_string() as &str))?;
        updated.touch(Utc::now());
        docs.by_id.insert(id, updated.clone());
        Ok(updated)
    }

    /// Remove a record. Returns the deleted record, or `None` when nothing
    /// matched; deleting an absent id is not an error.
    pub fn delete(&self, id: &str) -> AppResult<Option<T>> {
        let id = parse_id(id)?;
        let mut docs = self.docs.write();
        let removed = docs.by_id.remove(&id);
        if removed.is_some() {
            docs.order.retain(|x| *x != id);
        }
        Ok(removed)
    }

    /// Remove every record of this type. Fixture/admin utility; not
    /// transactional.
    pub fn delete_all(&self) {
        let mut docs = self.docs.write();
        docs.by_id.clear();
        docs.order.clear();
    }

    /// All records matching a predicate, in creation order.
    pub fn find(&self, pred: impl Fn(&T) -> bool) -> Vec<T> {
        let docs = self.docs.read();
        docs.order
            .iter()
            .filter_map(|id| docs.by_id.get(id))
            .filter(|t| pred(t))
            .cloned()
            .collect()
    }

    pub fn find_one(&self, pred: impl Fn(&T) -> bool) -> Option<T> {
        let docs = self.docs.read();
        docs.order
            .iter()
            .filter_map(|id| docs.by_id.get(id))
            .find(|t| pred(t))
            .cloned()
    }

    /// Mutate a record in place under the write lock. Returns the updated
    /// record, or `None` when the id matches nothing. Used by operations
    /// that must bypass the generic field filter (promotion, membership).
    pub fn modify(&self, id: Uuid, apply: impl FnOnce(&mut T)) -> Option<T> {
        let mut docs = self.docs.write();
        let doc = docs.by_id.get_mut(&id)?;
        apply(doc);
        Some(doc.clone())
    }

    /// Find-or-create a record and mutate it under one write lock. The
    /// score accumulator uses this so concurrent updates for the same
    /// (card, user) pair cannot lose increments within the process.
    pub fn upsert_with(
        &self,
        find: impl Fn(&T) -> bool,
        init: impl FnOnce() -> T,
        apply: impl FnOnce(&mut T),
    ) -> T {
        let mut docs = self.docs.write();
        let id = docs
            .order
            .iter()
            .filter_map(|id| docs.by_id.get(id))
            .find(|t| find(t))
            .map(|t| t.id());
        let id = match id {
            Some(id) => id,
            None => {
                let fresh = init();
                let id = fresh.id();
                docs.by_id.insert(id, fresh);
                docs.order.push(id);
                id
            }
        };
        let doc = docs.by_id.get_mut(&id).expect("doc inserted above");
        apply(doc);
        doc.clone()
    }

    pub fn count(&self) -> usize {
        self.docs.read().by_id.len()
    }
}

/// Owner of all resource state. Controllers receive a `&SharedStore` per
/// request and hold nothing between calls.
#[derive(Default)]
pub struct Store {
    pub users: Resource<User>,
    pub cards: Resource<Card>,
    pub collections: Resource<Collection>,
    pub scores: Resource<Score>,
}

#[derive(Clone)]
pub struct SharedStore(pub Arc<Store>);

impl SharedStore {
    pub fn new() -> Self {
        SharedStore(Arc::new(Store::default()))
    }
}

impl Default for SharedStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::ops::Deref for SharedStore {
    type Target = Store;
    fn deref(&self) -> &Store {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn collection(name: &str) -> Collection {
        let now = Utc::now();
        Collection { id: Uuid::new_v4(), name: name.to_string(), created_at: now, updated_at: now }
    }

    fn card(kind: &str, name: &str) -> Card {
        let now = Utc::now();
        Card {
            id: Uuid::new_v4(),
            kind: kind.to_string(),
            name: name.to_string(),
            image: Vec::new(),
            data: Value::Null,
            collections: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn create_then_find_returns_equal_fields() {
        let res: Resource<Card> = Resource::default();
        let created = res.create(card("word", "hola"));
        let found = res.find_by_id(&created.id.to_string()).unwrap().unwrap();
        assert_eq!(found.kind, "word");
        assert_eq!(found.name, "hola");
        assert_eq!(found.id, created.id);
    }

    #[test]
    fn find_by_id_distinguishes_malformed_from_absent() {
        let res: Resource<Collection> = Resource::default();
        assert!(matches!(res.find_by_id("not-a-uuid"), Err(AppError::InvalidArgument { .. })));
        assert!(res.find_by_id(&Uuid::new_v4().to_string()).unwrap().is_none());
    }

    #[test]
    fn list_pagination_and_order() {
        let res: Resource<Collection> = Resource::default();
        for i in 0..5 {
            res.create(collection(&format!("c{i}")));
        }
        let all = res.list(None, None).unwrap();
        assert_eq!(all.len(), 5);
        assert_eq!(all[0].name, "c0");

        let page = res.list(Some(1), Some(2)).unwrap();
        assert_eq!(page.len(), 2);
        assert_eq!(page[0].name, "c1");
        assert_eq!(page[1].name, "c2");

        // skip beyond the end is an empty page, not an error
        assert!(res.list(Some(50), None).unwrap().is_empty());
    }

    #[test]
    fn list_rejects_negative_arguments() {
        let res: Resource<Collection> = Resource::default();
        assert!(matches!(res.list(Some(-1), None), Err(AppError::InvalidArgument { .. })));
        assert!(matches!(res.list(None, Some(-3)), Err(AppError::InvalidArgument { .. })));
    }

    #[test]
    fn update_applies_known_keys_and_ignores_unknown() {
        let res: Resource<Card> = Resource::default();
        let c = res.create(card("word", "hola"));
        let updated = res
            .update(&c.id.to_string(), &json!({"name": "adios", "no_such_field": 42}))
            .unwrap();
        assert_eq!(updated.name, "adios");
        assert_eq!(updated.kind, "word");
    }

    #[test]
    fn update_never_touches_blocked_or_non_updatable_fields() {
        let res: Resource<Card> = Resource::default();
        let c = res.create(card("word", "hola"));
        let other = Uuid::new_v4();
        let updated = res
            .update(
                &c.id.to_string(),
                &json!({
                    "id": other,
                    "created_at": "1999-01-01T00:00:00Z",
                    "collections": [other],
                    "name": "renamed"
                }),
            )
            .unwrap();
        assert_eq!(updated.id, c.id);
        assert_eq!(updated.created_at, c.created_at);
        assert!(updated.collections.is_empty());
        assert_eq!(updated.name, "renamed");
    }

    #[test]
    fn update_errors() {
        let res: Resource<Card> = Resource::default();
        let c = res.create(card("word", "hola"));
        assert!(matches!(res.update("zzz", &json!({})), Err(AppError::InvalidArgument { .. })));
        assert!(matches!(
            res.update(&c.id.to_string(), &json!([1, 2])),
            Err(AppError::InvalidArgument { .. })
        ));
        assert!(matches!(
            res.update(&Uuid::new_v4().to_string(), &json!({})),
            Err(AppError::NotFound { .. })
        ));
        // type mismatch on an applied key
        assert!(matches!(
            res.update(&c.id.to_string(), &json!({"name": 42})),
            Err(AppError::Validation { .. })
        ));
        // nothing was persisted by the failed update
        assert_eq!(res.find_by_id(&c.id.to_string()).unwrap().unwrap().name, "hola");
    }

    #[test]
    fn delete_is_idempotent() {
        let res: Resource<Collection> = Resource::default();
        let c = res.create(collection("verbs"));
        let first = res.delete(&c.id.to_string()).unwrap();
        assert_eq!(first.unwrap().id, c.id);
        let second = res.delete(&c.id.to_string()).unwrap();
        assert!(second.is_none());
    }

    #[test]
    fn delete_all_clears_everything() {
        let res: Resource<Collection> = Resource::default();
        res.create(collection("a"));
        res.create(collection("b"));
        res.delete_all();
        assert_eq!(res.count(), 0);
        assert!(res.list(None, None).unwrap().is_empty());
    }

    #[test]
    fn create_unique_conflicts_on_duplicate_key() {
        let res: Resource<Collection> = Resource::default();
        res.create_unique(collection("nouns"), |c| c.name.clone(), "duplicate_name").unwrap();
        let err = res
            .create_unique(collection("nouns"), |c| c.name.clone(), "duplicate_name")
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict { .. }));
        assert_eq!(res.count(), 1);
    }

    #[test]
    fn upsert_with_creates_then_mutates_in_place() {
        let res: Resource<Collection> = Resource::default();
        let made = res.upsert_with(|c| c.name == "x", || collection("x"), |c| c.name.push('!'));
        assert_eq!(made.name, "x!");
        assert_eq!(res.count(), 1);
        let again = res.upsert_with(|c| c.name == "x!", || collection("x"), |c| c.name.push('!'));
        assert_eq!(again.name, "x!!");
        assert_eq!(res.count(), 1);
    }
}
