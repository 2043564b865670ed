use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sled::transaction::ConflictableTransactionError;
use sled::Transactional;

use crate::store::keys;
use crate::store::operations::srs_states::SrsState;
use crate::store::operations::words::unwrap_tx_error;
use crate::store::{Store, StoreError};

/// Append-only review event. Never mutated after the fact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Review {
    pub id: u64,
    pub card_id: u64,
    pub ts: DateTime<Utc>,
    pub grade: u8,
    pub elapsed_ms: Option<i64>,
    pub prev_interval: i64,
    pub new_interval: i64,
}

impl Store {
    /// The grading write: new SRS tuple, due-index entry and the review row
    /// commit in one transaction. Observers never see one without the other.
    pub fn put_srs_state_with_review(
        &self,
        state: &SrsState,
        grade: u8,
        elapsed_ms: Option<i64>,
        prev_interval: i64,
        ts: DateTime<Utc>,
    ) -> Result<Review, StoreError> {
        let review = Review {
            id: self.allocate_id("reviews")?,
            card_id: state.card_id,
            ts,
            grade,
            elapsed_ms,
            prev_interval,
            new_interval: state.interval_days,
        };

        let state_key = keys::id_key(state.card_id);
        let state_bytes = Self::serialize(state)?;
        let new_due_key = keys::srs_due_key(state.due.timestamp_millis(), state.card_id);
        let review_key = keys::review_key(ts.timestamp_millis(), review.id);
        let review_bytes = Self::serialize(&review)?;

        self.with_retry(|| {
            (&self.srs_states, &self.srs_due, &self.reviews)
                .transaction(|(tx_states, tx_due, tx_reviews)| {
                    if let Some(old_raw) = tx_states.get(state_key.as_bytes())? {
                        let old: SrsState =
                            serde_json::from_slice(&old_raw).map_err(|error| {
                                ConflictableTransactionError::Abort(StoreError::Serialization(
                                    error,
                                ))
                            })?;
                        let old_due_key =
                            keys::srs_due_key(old.due.timestamp_millis(), old.card_id);
                        tx_due.remove(old_due_key.as_bytes())?;
                    }
                    tx_states.insert(state_key.as_bytes(), state_bytes.as_slice())?;
                    tx_due.insert(new_due_key.as_bytes(), &[] as &[u8])?;
                    tx_reviews.insert(review_key.as_bytes(), review_bytes.as_slice())?;
                    Ok(())
                })
                .map_err(unwrap_tx_error)
        })?;

        Ok(review)
    }

    /// Reviews with `start <= ts < end`, chronological.
    pub fn reviews_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Review>, StoreError> {
        let lo = keys::review_bound(start.timestamp_millis());
        let hi = keys::review_bound(end.timestamp_millis());
        let mut reviews = Vec::new();
        for item in self
            .reviews
            .range(lo.as_bytes().to_vec()..hi.as_bytes().to_vec())
        {
            let (_, raw) = item?;
            reviews.push(Self::deserialize::<Review>(&raw)?);
        }
        Ok(reviews)
    }

    pub fn count_reviews_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        let lo = keys::review_bound(start.timestamp_millis());
        let hi = keys::review_bound(end.timestamp_millis());
        let mut count = 0u64;
        for item in self
            .reviews
            .range(lo.as_bytes().to_vec()..hi.as_bytes().to_vec())
        {
            let _ = item?;
            count += 1;
        }
        Ok(count)
    }

    // Cascade path only; review history is otherwise append-only.
    pub(crate) fn delete_reviews_for_card(&self, card_id: u64) -> Result<(), StoreError> {
        let mut doomed = Vec::new();
        for item in self.reviews.iter() {
            let (key, raw) = item?;
            let review: Review = Self::deserialize(&raw)?;
            if review.card_id == card_id {
                doomed.push(key);
            }
        }
        for key in doomed {
            self.reviews.remove(key)?;
        }
        Ok(())
    }
}
