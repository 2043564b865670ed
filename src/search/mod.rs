//! Query side of the full-text index: a small query language (`*` suffix for
//! prefix match, quoted phrases over lemmas, implicit AND), bm25 ranking with
//! per-field weights, and the prefix-suggest shortcut.
//!
//! This module only reads; the index is maintained by the Store (see
//! `store::index`).

pub mod tokenizer;

use std::collections::{HashMap, HashSet};

use crate::constants::{DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE};
use crate::store::index::FieldTf;
use crate::store::operations::words::{Word, WordQuery};
use crate::store::{Store, StoreError};

use tokenizer::{fold_lemma, tokenize};

const BM25_K1: f64 = 1.2;
const BM25_B: f64 = 0.75;
const WEIGHT_LEMMA: f64 = 3.0;
const WEIGHT_GLOSS: f64 = 1.0;

#[derive(Debug, Clone, Default)]
pub struct SearchFilter {
    pub q: Option<String>,
    pub lesson: Option<String>,
    pub cefr: Option<String>,
    pub pos: Option<String>,
    pub page: u64,
    pub per_page: u64,
}

impl SearchFilter {
    /// Malformed paging clamps instead of erroring.
    pub fn clamped(mut self) -> Self {
        self.page = self.page.max(1);
        self.per_page = if self.per_page == 0 {
            DEFAULT_PAGE_SIZE
        } else {
            self.per_page.min(MAX_PAGE_SIZE)
        };
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryTerm {
    pub token: String,
    pub prefix: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedQuery {
    /// Folded phrase, matched contiguously against the folded lemma only.
    pub phrase: Option<String>,
    pub terms: Vec<QueryTerm>,
}

impl ParsedQuery {
    pub fn is_empty(&self) -> bool {
        self.phrase.is_none() && self.terms.is_empty()
    }
}

/// Parse the `q` operand. Unknown syntax degrades to plain term matching.
pub fn parse_query(q: &str) -> ParsedQuery {
    let trimmed = q.trim();
    if trimmed.is_empty() {
        return ParsedQuery::default();
    }

    if trimmed.len() >= 2 {
        if let Some(inner) = trimmed
            .strip_prefix('"')
            .and_then(|s| s.strip_suffix('"'))
        {
            let folded = fold_lemma(inner);
            if !folded.is_empty() {
                return ParsedQuery {
                    phrase: Some(folded),
                    terms: tokenize(inner)
                        .into_iter()
                        .map(|token| QueryTerm {
                            token,
                            prefix: false,
                        })
                        .collect(),
                };
            }
        }
    }

    let mut terms = Vec::new();
    for piece in trimmed.split_whitespace() {
        let wants_prefix = piece.len() > 1 && piece.ends_with('*');
        let stripped = piece.trim_end_matches('*');
        let tokens = tokenize(stripped);
        let last = tokens.len().saturating_sub(1);
        for (i, token) in tokens.into_iter().enumerate() {
            terms.push(QueryTerm {
                token,
                prefix: wants_prefix && i == last,
            });
        }
    }
    ParsedQuery {
        phrase: None,
        terms,
    }
}

/// Ranked, filtered, paged search over one wordbook.
pub fn search(
    store: &Store,
    wordbook_id: u64,
    filter: &SearchFilter,
) -> Result<(Vec<Word>, u64), StoreError> {
    let query = filter
        .q
        .as_deref()
        .map(parse_query)
        .unwrap_or_default();

    if query.is_empty() {
        // 无查询词：按 (lesson, lemma) 排序的普通列表
        return store.query_words(
            wordbook_id,
            &WordQuery {
                lesson: filter.lesson.clone(),
                cefr: filter.cefr.clone(),
                pos: filter.pos.clone(),
                page: filter.page,
                per_page: filter.per_page,
            },
        );
    }

    let stats = store.fts_stats()?;
    let avg_len = stats.avg_len();
    let doc_count = stats.docs.max(1) as f64;

    // Per term: postings and the AND candidate set.
    let mut scores: HashMap<u64, f64> = HashMap::new();
    let mut candidates: Option<HashSet<u64>> = None;

    for term in &query.terms {
        let postings: HashMap<u64, FieldTf> = if term.prefix {
            store.postings_prefix(&term.token)?
        } else {
            store.postings_exact(&term.token)?.into_iter().collect()
        };

        let term_docs: HashSet<u64> = postings.keys().copied().collect();
        candidates = Some(match candidates {
            None => term_docs,
            Some(existing) => existing.intersection(&term_docs).copied().collect(),
        });

        let df = postings.len() as f64;
        let idf = (1.0 + (doc_count - df + 0.5) / (df + 0.5)).ln();

        for (word_id, tf) in postings {
            let weighted_tf =
                WEIGHT_LEMMA * tf.lemma as f64 + WEIGHT_GLOSS * tf.gloss as f64;
            let doc_len = store.fts_doc_len(word_id)?.unwrap_or(1).max(1) as f64;
            let norm = BM25_K1 * (1.0 - BM25_B + BM25_B * doc_len / avg_len);
            let contribution = idf * (weighted_tf * (BM25_K1 + 1.0)) / (weighted_tf + norm);
            *scores.entry(word_id).or_default() += contribution;
        }
    }

    let candidate_ids: Vec<u64> = match candidates {
        Some(set) => set.into_iter().collect(),
        // 纯短语查询且无可用词项：在 lemma 索引上全量过滤
        None => store
            .scan_lemma_prefix("", usize::MAX)?
            .into_iter()
            .map(|(_, id)| id)
            .collect(),
    };

    let mut hits: Vec<(f64, Word)> = Vec::new();
    for word_id in candidate_ids {
        let Some(word) = store.get_word(word_id)? else {
            continue;
        };
        if word.wordbook_id != wordbook_id {
            continue;
        }
        if !matches_facets(&word, filter) {
            continue;
        }
        if let Some(phrase) = &query.phrase {
            if !fold_lemma(&word.lemma).contains(phrase.as_str()) {
                continue;
            }
        }
        let score = scores.get(&word_id).copied().unwrap_or(0.0);
        hits.push((score, word));
    }

    hits.sort_by(|(sa, wa), (sb, wb)| {
        sb.partial_cmp(sa)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| wa.lemma.cmp(&wb.lemma))
    });

    let total = hits.len() as u64;
    let per_page = filter.per_page.max(1);
    let offset = ((filter.page.max(1) - 1) * per_page) as usize;
    let page = hits
        .into_iter()
        .skip(offset)
        .take(per_page as usize)
        .map(|(_, word)| word)
        .collect();
    Ok((page, total))
}

/// Up to `limit` distinct lemmas starting with `q` (case-folded,
/// diacritic-insensitive). Raw-prefix matches sort first, then shorter,
/// then lexicographic.
pub fn suggest(
    store: &Store,
    wordbook_id: u64,
    q: &str,
    limit: usize,
) -> Result<Vec<String>, StoreError> {
    let folded = fold_lemma(q);
    if folded.is_empty() || limit == 0 {
        return Ok(Vec::new());
    }

    let raw_query = q.trim().to_lowercase();
    let mut seen = HashSet::new();
    let mut lemmas = Vec::new();
    for (lemma, word_id) in store.scan_lemma_prefix(&folded, usize::MAX)? {
        let Some(word) = store.get_word(word_id)? else {
            continue;
        };
        if word.wordbook_id != wordbook_id {
            continue;
        }
        if seen.insert(lemma.clone()) {
            lemmas.push(lemma);
        }
    }

    lemmas.sort_by(|a, b| {
        let a_raw = !a.to_lowercase().starts_with(&raw_query);
        let b_raw = !b.to_lowercase().starts_with(&raw_query);
        a_raw
            .cmp(&b_raw)
            .then_with(|| a.chars().count().cmp(&b.chars().count()))
            .then_with(|| a.cmp(b))
    });
    lemmas.truncate(limit);
    Ok(lemmas)
}

fn matches_facets(word: &Word, filter: &SearchFilter) -> bool {
    if let Some(lesson) = &filter.lesson {
        if word.lesson.as_deref() != Some(lesson.as_str()) {
            return false;
        }
    }
    if let Some(cefr) = &filter.cefr {
        if !word
            .cefr
            .as_deref()
            .is_some_and(|c| c.eq_ignore_ascii_case(cefr))
        {
            return false;
        }
    }
    if let Some(pos) = &filter.pos {
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
