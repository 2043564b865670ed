use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sled::transaction::ConflictableTransactionError;
use sled::Transactional;

use crate::store::keys;
use crate::store::{Store, StoreError};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Word {
    pub id: u64,
    pub wordbook_id: u64,
    /// NFC-normalized dictionary form.
    pub lemma: String,
    pub pos: Option<String>,
    pub gender: Option<String>,
    pub ipa: Option<String>,
    /// Denormalized preferred gloss, used by the full-text index.
    pub meaning_text: Option<String>,
    /// language tag → gloss
    pub translations: BTreeMap<String, String>,
    pub lesson: Option<String>,
    pub cefr: Option<String>,
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Word {
    /// 兼容旧字段：meaning_zh 是 translations 的派生视图。
    pub fn meaning_zh(&self) -> Option<&str> {
        self.translations
            .get("zh-cn")
            .or_else(|| self.translations.get("zh"))
            .map(String::as_str)
            .or(self.meaning_text.as_deref())
    }
}

/// Canonical insert payload; built by the importer or the admin create op.
#[derive(Debug, Clone, Default)]
pub struct NewWord {
    pub lemma: String,
    pub pos: Option<String>,
    pub gender: Option<String>,
    pub ipa: Option<String>,
    pub meaning_text: Option<String>,
    pub translations: BTreeMap<String, String>,
    pub lesson: Option<String>,
    pub cefr: Option<String>,
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted(u64),
    Skipped(u64),
}

#[derive(Debug, Default)]
pub struct BulkOutcome {
    /// `(source row, word id)` for every inserted word.
    pub inserted: Vec<(usize, u64)>,
    pub skipped: u64,
    pub failed: Vec<(usize, String)>,
}

#[derive(Debug, Clone, Default)]
pub struct WordQuery {
    pub lesson: Option<String>,
    pub cefr: Option<String>,
    pub pos: Option<String>,
    pub page: u64,
    pub per_page: u64,
}

#[derive(Debug, Serialize, Default)]
pub struct WordStats {
    pub total_words: u64,
    pub by_lesson: BTreeMap<String, u64>,
    pub by_cefr: BTreeMap<String, u64>,
    pub by_pos: BTreeMap<String, u64>,
}

/// Natural ordering fragment: digit runs compare numerically, so
/// L2 sorts before L10.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum NatPart {
    Num(u64),
    Text(String),
}

/// Sort key for lesson labels; absent lessons sort last.
pub fn natural_key(value: Option<&str>) -> (u8, Vec<NatPart>) {
    let Some(raw) = value else {
        return (1, Vec::new());
    };
    let mut parts = Vec::new();
    let mut digits = String::new();
    let mut text = String::new();
    for ch in raw.chars() {
        if ch.is_ascii_digit() {
            if !text.is_empty() {
                parts.push(NatPart::Text(std::mem::take(&mut text).to_lowercase()));
            }
            digits.push(ch);
        } else {
            if !digits.is_empty() {
                let n = std::mem::take(&mut digits).parse::<u64>().unwrap_or(u64::MAX);
                parts.push(NatPart::Num(n));
            }
            text.push(ch);
        }
    }
    if !digits.is_empty() {
        parts.push(NatPart::Num(digits.parse::<u64>().unwrap_or(u64::MAX)));
    }
    if !text.is_empty() {
        parts.push(NatPart::Text(text.to_lowercase()));
    }
    (0, parts)
}

impl Store {
    /// Insert a word into a wordbook, skipping when `(wordbook, lemma, pos)`
    /// already exists. The duplicate is the "skipped" signal, not an error.
    /// The full-text index is updated before this returns.
    pub fn upsert_word(
        &self,
        wordbook_id: u64,
        new: &NewWord,
    ) -> Result<UpsertOutcome, StoreError> {
        if new.lemma.trim().is_empty() {
            return Err(StoreError::Validation("lemma must not be empty".into()));
        }
        if self.get_wordbook(wordbook_id)?.is_none() {
            return Err(StoreError::NotFound {
                entity: "wordbook".into(),
                key: wordbook_id.to_string(),
            });
        }

        let lock = self.book_write_lock(wordbook_id);
        let _guard = lock.lock().expect("wordbook write lock poisoned");

        let unique_key = keys::word_unique_key(wordbook_id, &new.lemma, new.pos.as_deref());
        if let Some(raw) = self.words_by_book.get(unique_key.as_bytes())? {
            let existing = parse_id(&raw)?;
            return Ok(UpsertOutcome::Skipped(existing));
        }

        let id = self.allocate_id("words")?;
        let now = Utc::now();
        let word = Word {
            id,
            wordbook_id,
            lemma: new.lemma.clone(),
            pos: new.pos.clone(),
            gender: new.gender.clone(),
            ipa: new.ipa.clone(),
            meaning_text: new.meaning_text.clone(),
            translations: new.translations.clone(),
            lesson: new.lesson.clone(),
            cefr: new.cefr.clone(),
            tags: new.tags.clone(),
            created_at: now,
            updated_at: now,
        };
        let word_key = keys::id_key(id);
        let word_bytes = Self::serialize(&word)?;

        (&self.words, &self.words_by_book)
            .transaction(|(tx_words, tx_index)| {
                // 持有词库写锁时不应命中；事务内复查是索引一致性的最后防线
                if tx_index.get(unique_key.as_bytes())?.is_some() {
                    return Err(ConflictableTransactionError::Abort(StoreError::Conflict {
                        entity: "word".into(),
                        key: unique_key.clone(),
                    }));
                }
                tx_words.insert(word_key.as_bytes(), word_bytes.as_slice())?;
                tx_index.insert(unique_key.as_bytes(), word_key.as_bytes())?;
                Ok(())
            })
            .map_err(unwrap_tx_error)?;

        self.index_word(&word)?;
        Ok(UpsertOutcome::Inserted(id))
    }

    /// One batch, one pass: successful rows commit even when siblings fail.
    pub fn bulk_upsert_words(
        &self,
        wordbook_id: u64,
        batch: &[(usize, NewWord)],
    ) -> Result<BulkOutcome, StoreError> {
        self.with_retry(|| {
            if self.get_wordbook(wordbook_id)?.is_none() {
                return Err(StoreError::NotFound {
                    entity: "wordbook".into(),
                    key: wordbook_id.to_string(),
                });
            }
            Ok(())
        })?;

        let mut outcome = BulkOutcome::default();
        for (row, new) in batch {
            match self.with_retry(|| self.upsert_word(wordbook_id, new)) {
                Ok(UpsertOutcome::Inserted(id)) => outcome.inserted.push((*row, id)),
                Ok(UpsertOutcome::Skipped(_)) => outcome.skipped += 1,
                Err(StoreError::Validation(msg)) => outcome.failed.push((*row, msg)),
                Err(e) => {
                    outcome.failed.push((*row, e.to_string()));
                }
            }
        }

        if !outcome.inserted.is_empty() {
            self.recount_wordbook_words(wordbook_id)?;
        }
        Ok(outcome)
    }

    pub fn get_word(&self, word_id: u64) -> Result<Option<Word>, StoreError> {
        match self.words.get(keys::id_key(word_id).as_bytes())? {
            Some(raw) => Ok(Some(Self::deserialize(&raw)?)),
            None => Ok(None),
        }
    }

    pub fn word_ids_in_book(&self, wordbook_id: u64) -> Result<Vec<u64>, StoreError> {
        let prefix = keys::word_book_prefix(wordbook_id);
        let mut ids = Vec::new();
        for item in self.words_by_book.scan_prefix(prefix.as_bytes()) {
            let (_, raw) = item?;
            ids.push(parse_id(&raw)?);
        }
        Ok(ids)
    }

    pub fn words_in_book(&self, wordbook_id: u64) -> Result<Vec<Word>, StoreError> {
        let mut words = Vec::new();
        for id in self.word_ids_in_book(wordbook_id)? {
            if let Some(word) = self.get_word(id)? {
                words.push(word);
            }
        }
        Ok(words)
    }

    /// Filtered, paged listing ordered by `(lesson natural, lemma)`.
    pub fn query_words(
        &self,
        wordbook_id: u64,
        query: &WordQuery,
    ) -> Result<(Vec<Word>, u64), StoreError> {
        let mut matching: Vec<Word> = self
            .words_in_book(wordbook_id)?
            .into_iter()
            .filter(|w| word_matches_filters(w, query))
            .collect();

        matching.sort_by(|a, b| {
            natural_key(a.lesson.as_deref())
                .cmp(&natural_key(b.lesson.as_deref()))
                .then_with(|| a.lemma.cmp(&b.lemma))
        });

        let total = matching.len() as u64;
        let per_page = query.per_page.max(1);
        let offset = (query.page.max(1) - 1) * per_page;
        let page = matching
            .into_iter()
            .skip(offset as usize)
            .take(per_page as usize)
            .collect();
        Ok((page, total))
    }

    /// Idempotently add a tag to a word. Returns true when newly added.
    pub fn add_word_tag(&self, word_id: u64, tag: &str) -> Result<bool, StoreError> {
        let mut word = self.get_word(word_id)?.ok_or_else(|| StoreError::NotFound {
            entity: "word".into(),
            key: word_id.to_string(),
        })?;
        if word.tags.iter().any(|t| t == tag) {
            return Ok(false);
        }
        word.tags.push(tag.to_string());
        word.updated_at = Utc::now();
        self.words
            .insert(keys::id_key(word_id).as_bytes(), Self::serialize(&word)?)?;
        Ok(true)
    }

    /// Delete one word and everything hanging off it: uniqueness index entry,
    /// full-text postings, cards, SRS states and reviews.
    pub fn delete_word(&self, word_id: u64) -> Result<(), StoreError> {
        let Some(word) = self.get_word(word_id)? else {
            return Ok(());
        };

        let unique_key =
            keys::word_unique_key(word.wordbook_id, &word.lemma, word.pos.as_deref());
        self.words_by_book.remove(unique_key.as_bytes())?;
        self.words.remove(keys::id_key(word_id).as_bytes())?;
        self.deindex_word(word_id)?;
        self.delete_cards_for_word(word_id)?;
        Ok(())
    }

    pub fn word_stats(&self, wordbook_id: u64) -> Result<WordStats, StoreError> {
        let mut stats = WordStats::default();
        for word in self.words_in_book(wordbook_id)? {
            stats.total_words += 1;
            if let Some(lesson) = &word.lesson {
                *stats.by_lesson.entry(lesson.clone()).or_default() += 1;
            }
            if let Some(cefr) = &word.cefr {
                *stats.by_cefr.entry(cefr.clone()).or_default() += 1;
            }
            if let Some(pos) = &word.pos {
                *stats.by_pos.entry(pos.clone()).or_default() += 1;
            }
        }
        Ok(stats)
    }
}

fn word_matches_filters(word: &Word, query: &WordQuery) -> bool {
    if let Some(lesson) = &query.lesson {
        if word.lesson.as_deref() != Some(lesson.as_str()) {
            return false;
        }
    }
    if let Some(cefr) = &query.cefr {
        if !word
            .cefr
            .as_deref()
            .is_some_and(|c| c.eq_ignore_ascii_case(cefr))
        {
            return false;
        }
    }
    if let Some(pos) = &query.pos {
        if !word
            .pos
            .as_deref()
            .is_some_and(|p| p.eq_ignore_ascii_case(pos))
        {
            return false;
        }
    }
    true
}

pub(crate) fn parse_id(raw: &[u8]) -> Result<u64, StoreError> {
    std::str::from_utf8(raw)
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .ok_or_else(|| StoreError::Validation("corrupted id reference".into()))
}

pub(crate) fn unwrap_tx_error(
    error: sled::transaction::TransactionError<StoreError>,
) -> StoreError {
    match error {
        sled::transaction::TransactionError::Abort(store_error) => store_error,
        sled::transaction::TransactionError::Storage(storage_error) => {
            StoreError::Sled(storage_error)
        }
    }
}
