//! Score accumulator: one bounded integer per (card, user) pair.
//!
//! Points model recall confidence and stay within [1, MAX_SCORE]: they must
//! never be non-positive (scheduling divides and indexes by score) and the
//! cap bounds review-interval growth. A pair's score is created lazily on
//! the first recorded result; the first result yields 1 whether it was a
//! hit or a miss. The fetch-or-create, clamp and save run inside one store
//! write lock, so concurrent results for the same pair cannot lose updates
//! within this process.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::AppResult;
use crate::models::{PopulatedScore, Score};
use crate::store::{parse_id, SharedStore};

const MAX_SCORE: i32 = 10;

/// Current score for the pair, or `None` when no result was ever recorded.
pub fn get(store: &SharedStore, card_id: &str, user_id: Uuid) -> AppResult<Option<Score>> {
    let cid = parse_id(card_id)?;
    Ok(store.scores.find_one(|s| s.card == cid && s.user == user_id))
}

/// As [`get`], with the card and user embedded as full records (password
/// redacted). A projection option, not a correctness concern: the score
/// only exists while its card and user resolve.
pub fn get_populated(
    store: &SharedStore,
    card_id: &str,
    user_id: Uuid,
) -> AppResult<Option<PopulatedScore>> {
    let Some(score) = get(store, card_id, user_id)? else {
        return Ok(None);
    };
    let Some(card) = store.cards.get(score.card) else {
        return Ok(None);
    };
    let Some(user) = store.users.get(score.user) else {
        return Ok(None);
    };
    Ok(Some(PopulatedScore {
        id: score.id,
        card,
        user: (&user).into(),
        points: score.points,
        last_test: score.last_test,
    }))
}

/// Record a hit: `points = clamp(prev + 1, 1, MAX_SCORE)`; a first-ever hit
/// yields 1. `date` is caller-supplied so batches can backfill history.
pub fn add_hit(
    store: &SharedStore,
    card_id: &str,
    user_id: Uuid,
    date: DateTime<Utc>,
) -> AppResult<Score> {
    add_result(store, card_id, user_id, date, true)
}

/// Record a miss: `points = clamp(prev - 1, 1, MAX_SCORE)`; misses never
/// drop a score below 1, and a first-ever miss still yields 1.
pub fn add_miss(
    store: &SharedStore,
    card_id: &str,
    user_id: Uuid,
    date: DateTime<Utc>,
) -> AppResult<Score> {
    add_result(store, card_id, user_id, date, false)
}

fn add_result(
    store: &SharedStore,
    card_id: &str,
    user_id: Uuid,
    date: DateTime<Utc>,
    hit: bool,
) -> AppResult<Score> {
    let cid = parse_id(card_id)?;
    let score = store.scores.upsert_with(
        |s| s.card == cid && s.user == user_id,
        || Score {
            id: Uuid::new_v4(),
            card: cid,
            user: user_id,
            // implicit prior value for a brand-new pair
            points: 0,
            last_test: date,
        },
        |s| {
            let delta = if hit { 1 } else { -1 };
            s.points = (s.points + delta).clamp(1, MAX_SCORE);
            s.last_test = date;
        },
    );
    Ok(score)
}

pub fn delete_all(store: &SharedStore) {
    store.scores.delete_all();
}
