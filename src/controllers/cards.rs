//! Card operations: creation plus collection membership. Membership is a
//! set: adding an existing member or removing a non-member reports `false`
//! and performs no write.

use chrono::Utc;
use serde_json::Value;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::{Card, NewCard};
use crate::store::{parse_id, IdArg, SharedStore};

/// Create a card from a JSON payload. Required: `kind` and `name`; `image`
/// and `data` are free-form and default to empty. Unrecognized fields are
/// ignored; membership starts empty and is only changed through the
/// membership operations below.
pub fn create(store: &SharedStore, payload: &Value) -> AppResult<Card> {
    let input: NewCard = serde_json::from_value(payload.clone())
        .map_err(|e| AppError::validation("bad_card", &e.to_string() as &str))?;
    let now = Utc::now();
    let card = Card {
        id: Uuid::new_v4(),
        kind: input.kind,
        name: input.name,
        image: input.image,
        data: input.data,
        collections: Vec::new(),
        created_at: now,
        updated_at: now,
    };
    Ok(store.cards.create(card))
}

/// Add the card to a collection. Returns `true` when membership changed,
/// `false` when the card was already a member (no write). The collection id
/// may arrive as a raw string or as a native id; it is normalized before
/// the value-equality membership check.
pub fn add_to_collection<'a>(
    store: &SharedStore,
    card_id: &str,
    collection_id: impl Into<IdArg<'a>>,
) -> AppResult<bool> {
    let cid = collection_id.into().normalize()?;
    let card_id = parse_id(card_id)?;
    let mut added = false;
    store
        .cards
        .modify(card_id, |card| {
            if !card.collections.contains(&cid) {
                card.collections.push(cid);
                card.updated_at = Utc::now();
                added = true;
            }
        })
        .ok_or_else(|| AppError::not_found("card_not_found", "card not found"))?;
    Ok(added)
}

/// Remove the card from a collection. Returns `true` when membership
/// changed, `false` when the card was not a member (no write).
pub fn remove_from_collection<'a>(
    store: &SharedStore,
    card_id: &str,
    collection_id: impl Into<IdArg<'a>>,
) -> AppResult<bool> {
    let cid = collection_id.into().normalize()?;
    let card_id = parse_id(card_id)?;
    let mut removed = false;
    store
        .cards
        .modify(card_id, |card| {
            if let Some(pos) = card.collections.iter().position(|x| *x == cid) {
                card.collections.remove(pos);
                card.updated_at = Utc::now();
                removed = true;
            }
        })
        .ok_or_else(|| AppError::not_found("card_not_found", "card not found"))?;
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn seeded() -> (SharedStore, Card) {
        let store = SharedStore::new();
        let card = create(&store, &json!({"kind": "word", "name": "hola"})).unwrap();
        (store, card)
    }

    #[test]
    fn create_requires_kind_and_name() {
        let store = SharedStore::new();
        assert!(matches!(
            create(&store, &json!({"kind": "word"})),
            Err(AppError::Validation { .. })
        ));
        assert!(matches!(
            create(&store, &json!({"name": "hola"})),
            Err(AppError::Validation { .. })
        ));
    }

    #[test]
    fn membership_add_is_idempotent() {
        let (store, card) = seeded();
        let coll = Uuid::new_v4();
        assert!(add_to_collection(&store, &card.id.to_string(), coll).unwrap());
        assert!(!add_to_collection(&store, &card.id.to_string(), coll).unwrap());
        let stored = store.cards.get(card.id).unwrap();
        assert_eq!(stored.collections, vec![coll]);
    }

    #[test]
    fn membership_remove_reports_non_member() {
        let (store, card) = seeded();
        let coll = Uuid::new_v4();
        assert!(!remove_from_collection(&store, &card.id.to_string(), coll).unwrap());
        add_to_collection(&store, &card.id.to_string(), coll).unwrap();
        assert!(remove_from_collection(&store, &card.id.to_string(), coll).unwrap());
        assert!(store.cards.get(card.id).unwrap().collections.is_empty());
    }

    #[test]
    fn raw_string_and_native_ids_are_the_same_member() {
        let (store, card) = seeded();
        let coll = Uuid::new_v4();
        let raw = coll.to_string();
        assert!(add_to_collection(&store, &card.id.to_string(), raw.as_str()).unwrap());
        // a freshly constructed id of the same value is a match
        assert!(!add_to_collection(&store, &card.id.to_string(), coll).unwrap());
        assert!(remove_from_collection(&store, &card.id.to_string(), raw.as_str()).unwrap());
    }

    #[test]
    fn membership_on_missing_card_is_not_found() {
        let store = SharedStore::new();
        let err = add_to_collection(&store, &Uuid::new_v4().to_string(), Uuid::new_v4()).unwrap_err();
        assert!(matches!(err, AppError::NotFound { .. }));
        let err = add_to_collection(&store, "junk", Uuid::new_v4()).unwrap_err();
        assert!(matches!(err, AppError::InvalidArgument { .. }));
    }
}
