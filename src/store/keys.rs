//! Composite key formats. Ids are zero-padded decimal so lexicographic
//! order equals numeric order under prefix scans.

pub fn id_key(id: u64) -> String {
    format!("{:012}", id)
}

pub fn counter_key(entity: &str) -> String {
    format!("next:{entity}")
}

// Word uniqueness index: one entry per (wordbook, lemma, pos|∅).
pub fn word_unique_key(wordbook_id: u64, lemma: &str, pos: Option<&str>) -> String {
    format!(
        "{:012}:{}:{}",
        wordbook_id,
        lemma,
        pos.unwrap_or("").to_lowercase()
    )
}

pub fn word_book_prefix(wordbook_id: u64) -> String {
    format!("{:012}:", wordbook_id)
}

// Card idempotency index: one entry per (word, template).
pub fn card_unique_key(word_id: u64, template: &str) -> String {
    format!("{:012}:{}", word_id, template)
}

pub fn card_word_prefix(word_id: u64) -> String {
    format!("{:012}:", word_id)
}

pub fn srs_due_key(due_ms: i64, card_id: u64) -> String {
    format!("{:020}:{:012}", due_ms.max(0) as u64, card_id)
}

pub fn srs_due_bound(due_ms: i64) -> String {
    format!("{:020}:", due_ms.max(0) as u64)
}

// Reviews are keyed by time so range scans give chronological order.
pub fn review_key(ts_ms: i64, review_id: u64) -> String {
    format!("{:020}:{:012}", ts_ms.max(0) as u64, review_id)
}

pub fn review_bound(ts_ms: i64) -> String {
    format!("{:020}:", ts_ms.max(0) as u64)
}

pub fn posting_key(token: &str, word_id: u64) -> String {
    format!("{token}:{:012}", word_id)
}

pub fn posting_prefix(token: &str) -> String {
    format!("{token}:")
}

pub fn lemma_index_key(folded: &str, word_id: u64) -> String {
    format!("{folded}:{:012}", word_id)
}
