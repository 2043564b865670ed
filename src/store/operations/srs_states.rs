use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sled::transaction::ConflictableTransactionError;
use sled::Transactional;

use crate::store::keys;
use crate::store::operations::words::unwrap_tx_error;
use crate::store::{Store, StoreError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SrsAlgorithm {
    Sm2,
    Fsrs,
}

/// The scheduling tuple for one card. Exactly one row per card; created
/// lazily the first time a card is handed out as "new".
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SrsState {
    pub card_id: u64,
    pub algo: SrsAlgorithm,
    pub due: DateTime<Utc>,
    pub interval_days: i64,
    pub ease: f64,
    pub reps: u32,
    pub lapses: u32,
    pub last_grade: Option<u8>,
    pub first_seen_at: DateTime<Utc>,
    pub last_reviewed_at: Option<DateTime<Utc>>,
}

impl SrsState {
    pub fn new_card(card_id: u64, now: DateTime<Utc>) -> Self {
        Self {
            card_id,
            algo: SrsAlgorithm::Sm2,
            due: now,
            interval_days: 0,
            ease: 2.5,
            reps: 0,
            lapses: 0,
            last_grade: None,
            first_seen_at: now,
            last_reviewed_at: None,
        }
    }

    /// 基于遗忘曲线的近似保持率，仅用于展示。
    pub fn retention_rate(&self) -> f64 {
        let decay = 1.0 / self.ease.max(1.0);
        (-decay * self.interval_days as f64).exp().clamp(0.0, 1.0)
    }
}

impl Store {
    pub fn get_srs_state(&self, card_id: u64) -> Result<Option<SrsState>, StoreError> {
        match self.srs_states.get(keys::id_key(card_id).as_bytes())? {
            Some(raw) => Ok(Some(Self::deserialize(&raw)?)),
            None => Ok(None),
        }
    }

    /// Write the tuple and keep the due-date index in step, atomically.
    pub fn put_srs_state(&self, state: &SrsState) -> Result<(), StoreError> {
        let state_key = keys::id_key(state.card_id);
        let state_bytes = Self::serialize(state)?;
        let new_due_key = keys::srs_due_key(state.due.timestamp_millis(), state.card_id);

        (&self.srs_states, &self.srs_due)
            .transaction(|(tx_states, tx_due)| {
                if let Some(old_raw) = tx_states.get(state_key.as_bytes())? {
                    let old: SrsState = serde_json::from_slice(&old_raw).map_err(|error| {
                        ConflictableTransactionError::Abort(StoreError::Serialization(error))
                    })?;
                    let old_due_key =
                        keys::srs_due_key(old.due.timestamp_millis(), old.card_id);
                    tx_due.remove(old_due_key.as_bytes())?;
                }
                tx_states.insert(state_key.as_bytes(), state_bytes.as_slice())?;
                tx_due.insert(new_due_key.as_bytes(), &[] as &[u8])?;
                Ok(())
            })
            .map_err(unwrap_tx_error)?;
        Ok(())
    }

    /// Card ids whose `due` is at or before `until`, ascending by due time.
    pub fn due_card_ids_until(
        &self,
        until: DateTime<Utc>,
    ) -> Result<Vec<u64>, StoreError> {
        let bound = keys::srs_due_bound(until.timestamp_millis() + 1);
        let mut ids = Vec::new();
        for item in self.srs_due.range(..bound.as_bytes().to_vec()) {
            let (key, _) = item?;
            if let Some(card_id) = parse_due_key_card(&key) {
                ids.push(card_id);
            }
        }
        Ok(ids)
    }

    pub fn count_due_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        let lo = keys::srs_due_bound(start.timestamp_millis());
        let hi = keys::srs_due_bound(end.timestamp_millis());
        let mut count = 0u64;
        for item in self
            .srs_due
            .range(lo.as_bytes().to_vec()..hi.as_bytes().to_vec())
        {
            let _ = item?;
            count += 1;
        }
        Ok(count)
    }

    pub(crate) fn delete_srs_state(&self, card_id: u64) -> Result<(), StoreError> {
        if let Some(state) = self.get_srs_state(card_id)? {
            let due_key = keys::srs_due_key(state.due.timestamp_millis(), card_id);
            self.srs_due.remove(due_key.as_bytes())?;
            self.srs_states.remove(keys::id_key(card_id).as_bytes())?;
        }
        Ok(())
    }
}

fn parse_due_key_card(key: &[u8]) -> Option<u64> {
    let text = std::str::from_utf8(key).ok()?;
    let (_, card) = text.split_once(':')?;
    card.parse().ok()
}
