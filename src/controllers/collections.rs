//! Collection operations. A collection holds no card list of its own;
//! membership is queried by scanning cards whose collection set contains
//! the collection id.

use chrono::Utc;
use serde_json::Value;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::{Card, Collection, NewCollection};
use crate::store::{IdArg, SharedStore};

pub fn create(store: &SharedStore, payload: &Value) -> AppResult<Collection> {
    let input: NewCollection = serde_json::from_value(payload.clone())
        .map_err(|e| AppError::validation("bad_collection", &e.to_string() as &str))?;
    let now = Utc::now();
    let collection = Collection {
        id: Uuid::new_v4(),
        name: input.name,
        created_at: now,
        updated_at: now,
    };
    Ok(store.collections.create(collection))
}

/// Every card whose collection set contains the given id. Unpaginated.
pub fn get_cards_in_collection<'a>(
    store: &SharedStore,
    collection_id: impl Into<IdArg<'a>>,
) -> AppResult<Vec<Card>> {
    let cid = collection_id.into().normalize()?;
    Ok(store.cards.find(|card| card.collections.contains(&cid)))
}
