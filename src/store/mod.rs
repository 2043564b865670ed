pub mod index;
pub mod keys;
pub mod migrate;
pub mod operations;
pub mod trees;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use serde::de::DeserializeOwned;
use serde::Serialize;
use sled::Db;
use thiserror::Error;

/// Single owner of every persisted entity and of the full-text index.
/// All other components hold ids and go through the methods on this type.
#[derive(Debug)]
pub struct Store {
    db: Db,
    pub meta: sled::Tree,
    pub counters: sled::Tree,
    pub wordbooks: sled::Tree,
    pub words: sled::Tree,
    pub cards: sled::Tree,
    pub srs_states: sled::Tree,
    pub reviews: sled::Tree,
    pub imports: sled::Tree,
    pub settings: sled::Tree,
    // Secondary index trees
    pub words_by_book: sled::Tree,
    pub cards_by_word: sled::Tree,
    pub srs_due: sled::Tree,
    // Full-text index trees (written only by store::index)
    pub fts_postings: sled::Tree,
    pub fts_docs: sled::Tree,
    pub fts_lemmas: sled::Tree,
    // 每词库一把写锁；激活切换用单独的锁保证同一时刻至多一个激活词库
    book_locks: Mutex<HashMap<u64, Arc<Mutex<()>>>>,
    activation_lock: Mutex<()>,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sled error: {0}")]
    Sled(#[from] sled::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("not found: entity={entity}, key={key}")]
    NotFound { entity: String, key: String },
    #[error("conflict: entity={entity}, key={key}")]
    Conflict { entity: String, key: String },
    #[error("precondition failed: {0}")]
    Precondition(String),
    #[error("validation error: {0}")]
    Validation(String),
    #[error("migration error at version {version}: {message}")]
    Migration { version: u32, message: String },
}

impl Store {
    pub fn open(path: &str) -> Result<Self, StoreError> {
        let db = sled::open(path)?;
        let meta = db.open_tree(trees::META)?;
        let counters = db.open_tree(trees::COUNTERS)?;
        let wordbooks = db.open_tree(trees::WORDBOOKS)?;
        let words = db.open_tree(trees::WORDS)?;
        let cards = db.open_tree(trees::CARDS)?;
        let srs_states = db.open_tree(trees::SRS_STATES)?;
        let reviews = db.open_tree(trees::REVIEWS)?;
        let imports = db.open_tree(trees::IMPORTS)?;
        let settings = db.open_tree(trees::SETTINGS)?;
        let words_by_book = db.open_tree(trees::WORDS_BY_BOOK)?;
        let cards_by_word = db.open_tree(trees::CARDS_BY_WORD)?;
        let srs_due = db.open_tree(trees::SRS_DUE)?;
        let fts_postings = db.open_tree(trees::FTS_POSTINGS)?;
        let fts_docs = db.open_tree(trees::FTS_DOCS)?;
        let fts_lemmas = db.open_tree(trees::FTS_LEMMAS)?;

        Ok(Self {
            db,
            meta,
            counters,
            wordbooks,
            words,
            cards,
            srs_states,
            reviews,
            imports,
            settings,
            words_by_book,
            cards_by_word,
            srs_due,
            fts_postings,
            fts_docs,
            fts_lemmas,
            book_locks: Mutex::new(HashMap::new()),
            activation_lock: Mutex::new(()),
        })
    }

    pub fn run_migrations(&self) -> Result<(), StoreError> {
        migrate::run(self)
    }

    pub fn flush(&self) -> Result<(), StoreError> {
        self.db.flush()?;
        Ok(())
    }

    /// Monotonic id allocator, one sequence per entity, starting at 1.
    pub(crate) fn allocate_id(&self, entity: &str) -> Result<u64, StoreError> {
        let key = keys::counter_key(entity);
        let raw = self.counters.update_and_fetch(key.as_bytes(), |old| {
            let next = match old {
                Some(bytes) => {
                    let arr: [u8; 8] = bytes.try_into().unwrap_or([0; 8]);
                    u64::from_be_bytes(arr) + 1
                }
                None => 1,
            };
            Some(next.to_be_bytes().to_vec())
        })?;
        let arr: [u8; 8] = raw
            .as_deref()
            .and_then(|b| b.try_into().ok())
            .ok_or_else(|| StoreError::Validation(format!("counter {entity} corrupted")))?;
        Ok(u64::from_be_bytes(arr))
    }

    /// 同一词库的写操作串行化；不同词库互不阻塞。
    pub(crate) fn book_write_lock(&self, wordbook_id: u64) -> Arc<Mutex<()>> {
        let mut locks = self.book_locks.lock().expect("book lock table poisoned");
        locks
            .entry(wordbook_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    pub(crate) fn activation_guard(&self) -> std::sync::MutexGuard<'_, ()> {
        self.activation_lock
            .lock()
            .expect("activation lock poisoned")
    }

    /// Retry a storage closure once on a sled-level failure. Business errors
    /// (NotFound/Conflict/…) are returned unchanged on the first attempt.
    pub(crate) fn with_retry<T>(
        &self,
        mut op: impl FnMut() -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        match op() {
            Err(StoreError::Sled(first)) => {
                tracing::warn!(error = %first, "storage operation failed, retrying once");
                op()
            }
            other => other,
        }
    }

    pub(crate) fn serialize<T: Serialize>(value: &T) -> Result<Vec<u8>, StoreError> {
        Ok(serde_json::to_vec(value)?)
    }

    pub(crate) fn deserialize<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, StoreError> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;

    #[test]
    fn ids_start_at_one_and_are_monotonic() {
        let dir = tempdir().unwrap();
        let store = Store::open(dir.path().join("db").to_str().unwrap()).unwrap();

        assert_eq!(store.allocate_id("words").unwrap(), 1);
        assert_eq!(store.allocate_id("words").unwrap(), 2);
        // 独立实体使用独立序列
        assert_eq!(store.allocate_id("cards").unwrap(), 1);
    }

    #[test]
    fn book_locks_are_shared_per_book() {
        let dir = tempdir().unwrap();
        let store = Store::open(dir.path().join("db2").to_str().unwrap()).unwrap();

        let a = store.book_write_lock(1);
        let b = store.book_write_lock(1);
        assert!(Arc::ptr_eq(&a, &b));
        let c = store.book_write_lock(2);
        assert!(!Arc::ptr_eq(&a, &c));
    }

    #[test]
    fn with_retry_passes_through_business_errors() {
        let dir = tempdir().unwrap();
        let store = Store::open(dir.path().join("db3").to_str().unwrap()).unwrap();

        let mut calls = 0;
        let result: Result<(), StoreError> = store.with_retry(|| {
            calls += 1;
            Err(StoreError::Validation("bad".into()))
        });
        assert!(matches!(result, Err(StoreError::Validation(_))));
        assert_eq!(calls, 1);
    }
}
