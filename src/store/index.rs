//! Inverted index over `(lemma, meaning_text, translations.values)`.
//!
//! The index lives in three sled trees owned by the Store and is updated
//! inside the same methods that write words; no other component writes it.
//! `rebuild_search_index` exists as a maintenance operation, not as the way
//! the index becomes correct.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use crate::search::tokenizer::{fold_lemma, tokenize};
use crate::store::keys;
use crate::store::operations::words::Word;
use crate::store::{Store, StoreError};

const FTS_STATS_KEY: &str = "fts:stats";

/// Per-field term frequency for one `(token, word)` pair.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct FieldTf {
    /// occurrences in the lemma
    pub lemma: u32,
    /// occurrences in glosses (meaning_text + translations)
    pub gloss: u32,
}

/// What was indexed for one word; needed to undo it on delete/update.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct FtsDoc {
    tokens: Vec<String>,
    len: u32,
    folded_lemma: String,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct FtsStats {
    pub docs: u64,
    pub total_len: u64,
}

impl FtsStats {
    pub fn avg_len(&self) -> f64 {
        if self.docs == 0 {
            return 1.0;
        }
        (self.total_len as f64 / self.docs as f64).max(1.0)
    }
}

impl Store {
    pub(crate) fn index_word(&self, word: &Word) -> Result<(), StoreError> {
        // 重建前先清掉旧条目，保证 update 语义
        self.deindex_word(word.id)?;

        let mut tfs: BTreeMap<String, FieldTf> = BTreeMap::new();
        let mut len = 0u32;

        for token in tokenize(&word.lemma) {
            tfs.entry(token).or_default().lemma += 1;
            len += 1;
        }
        for gloss in gloss_sources(word) {
            for token in tokenize(gloss) {
                tfs.entry(token).or_default().gloss += 1;
                len += 1;
            }
        }

        let folded = fold_lemma(&word.lemma);
        let doc = FtsDoc {
            tokens: tfs.keys().cloned().collect(),
            len,
            folded_lemma: folded.clone(),
        };

        for (token, tf) in &tfs {
            self.fts_postings.insert(
                keys::posting_key(token, word.id).as_bytes(),
                Self::serialize(tf)?,
            )?;
        }
        self.fts_docs
            .insert(keys::id_key(word.id).as_bytes(), Self::serialize(&doc)?)?;
        if !folded.is_empty() {
            self.fts_lemmas.insert(
                keys::lemma_index_key(&folded, word.id).as_bytes(),
                word.lemma.as_bytes(),
            )?;
        }

        self.update_fts_stats(|stats| {
            stats.docs += 1;
            stats.total_len += len as u64;
        })?;
        Ok(())
    }

    pub(crate) fn deindex_word(&self, word_id: u64) -> Result<(), StoreError> {
        let Some(raw) = self.fts_docs.get(keys::id_key(word_id).as_bytes())? else {
            return Ok(());
        };
        let doc: FtsDoc = Self::deserialize(&raw)?;

        for token in &doc.tokens {
            self.fts_postings
                .remove(keys::posting_key(token, word_id).as_bytes())?;
        }
        if !doc.folded_lemma.is_empty() {
            self.fts_lemmas
                .remove(keys::lemma_index_key(&doc.folded_lemma, word_id).as_bytes())?;
        }
        self.fts_docs.remove(keys::id_key(word_id).as_bytes())?;

        self.update_fts_stats(|stats| {
            stats.docs = stats.docs.saturating_sub(1);
            stats.total_len = stats.total_len.saturating_sub(doc.len as u64);
        })?;
        Ok(())
    }

    pub fn fts_stats(&self) -> Result<FtsStats, StoreError> {
        match self.meta.get(FTS_STATS_KEY.as_bytes())? {
            Some(raw) => Ok(Self::deserialize(&raw)?),
            None => Ok(FtsStats::default()),
        }
    }

    fn update_fts_stats(&self, mutate: impl FnOnce(&mut FtsStats)) -> Result<(), StoreError> {
        let mut stats = self.fts_stats()?;
        mutate(&mut stats);
        self.meta
            .insert(FTS_STATS_KEY.as_bytes(), Self::serialize(&stats)?)?;
        Ok(())
    }

    pub fn fts_doc_len(&self, word_id: u64) -> Result<Option<u32>, StoreError> {
        match self.fts_docs.get(keys::id_key(word_id).as_bytes())? {
            Some(raw) => {
                let doc: FtsDoc = Self::deserialize(&raw)?;
                Ok(Some(doc.len))
            }
            None => Ok(None),
        }
    }

    /// Postings for one exact token.
    pub fn postings_exact(&self, token: &str) -> Result<Vec<(u64, FieldTf)>, StoreError> {
        let prefix = keys::posting_prefix(token);
        let mut postings = Vec::new();
        for item in self.fts_postings.scan_prefix(prefix.as_bytes()) {
            let (key, raw) = item?;
            if let Some(word_id) = posting_word_id(&key) {
                postings.push((word_id, Self::deserialize(&raw)?));
            }
        }
        Ok(postings)
    }

    /// Aggregated postings for every token starting with `prefix`
    /// (the trailing-`*` operator).
    pub fn postings_prefix(
        &self,
        prefix: &str,
    ) -> Result<HashMap<u64, FieldTf>, StoreError> {
        let mut merged: HashMap<u64, FieldTf> = HashMap::new();
        for item in self.fts_postings.scan_prefix(prefix.as_bytes()) {
            let (key, raw) = item?;
            if let Some(word_id) = posting_word_id(&key) {
                let tf: FieldTf = Self::deserialize(&raw)?;
                let entry = merged.entry(word_id).or_default();
                entry.lemma += tf.lemma;
                entry.gloss += tf.gloss;
            }
        }
        Ok(merged)
    }

    /// `(raw lemma, word_id)` pairs whose folded lemma starts with the folded
    /// prefix, in folded lexicographic order.
    pub fn scan_lemma_prefix(
        &self,
        folded_prefix: &str,
        cap: usize,
    ) -> Result<Vec<(String, u64)>, StoreError> {
        let mut hits = Vec::new();
        for item in self.fts_lemmas.scan_prefix(folded_prefix.as_bytes()) {
            let (key, raw) = item?;
            let Some(word_id) = posting_word_id(&key) else {
                continue;
            };
            let lemma = String::from_utf8_lossy(&raw).to_string();
            hits.push((lemma, word_id));
            if hits.len() >= cap {
                break;
            }
        }
        Ok(hits)
    }

    /// Maintenance only: drop and re-derive the whole index from the words
    /// tree. Returns the number of indexed words.
    pub fn rebuild_search_index(&self) -> Result<u64, StoreError> {
        self.fts_postings.clear()?;
        self.fts_docs.clear()?;
        self.fts_lemmas.clear()?;
        self.meta.remove(FTS_STATS_KEY.as_bytes())?;

        let mut indexed = 0u64;
        for item in self.words.iter() {
            let (_, raw) = item?;
            let word: Word = Self::deserialize(&raw)?;
            self.index_word(&word)?;
            indexed += 1;
        }
        tracing::info!(indexed, "search index rebuilt");
        Ok(indexed)
    }
}

fn gloss_sources(word: &Word) -> Vec<&str> {
    let mut sources: Vec<&str> = word.translations.values().map(String::as_str).collect();
    if let Some(meaning) = word.meaning_text.as_deref() {
        if !sources.contains(&meaning) {
            sources.push(meaning);
        }
    }
    sources
}

// Posting / lemma-index keys end in ":{word_id:012}".
fn posting_word_id(key: &[u8]) -> Option<u64> {
    let text = std::str::from_utf8(key).ok()?;
    let (_, id) = text.rsplit_once(':')?;
    id.parse().ok()
}
