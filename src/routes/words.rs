use axum::extract::{Path, Query, State};
use axum::routing::get;
use axum::Router;
use serde::{Deserialize, Serialize};

use crate::constants::{DEFAULT_PAGE_SIZE, DEFAULT_SUGGEST_LIMIT, MAX_SUGGEST_LIMIT};
use crate::response::{ok, AppError};
use crate::search::{self, SearchFilter};
use crate::state::AppState;
use crate::store::operations::wordbooks::Wordbook;
use crate::store::operations::words::Word;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/words", get(list_words))
        .route("/words/search", get(search_words))
        .route("/words/suggest", get(suggest_words))
        .route("/words/:id", get(get_word))
        .route("/stats", get(word_stats))
}

/// 对外的 Word 视图：补上派生的 meaning_zh 便于单语客户端使用。
#[derive(Debug, Serialize)]
struct WordView {
    id: u64,
    wordbook_id: u64,
    lemma: String,
    pos: Option<String>,
    gender: Option<String>,
    ipa: Option<String>,
    meaning_zh: Option<String>,
    meaning_text: Option<String>,
    translations: std::collections::BTreeMap<String, String>,
    lesson: Option<String>,
    cefr: Option<String>,
    tags: Vec<String>,
    created_at: chrono::DateTime<chrono::Utc>,
    updated_at: chrono::DateTime<chrono::Utc>,
}

impl From<&Word> for WordView {
    fn from(w: &Word) -> Self {
        Self {
            id: w.id,
            wordbook_id: w.wordbook_id,
            lemma: w.lemma.clone(),
            pos: w.pos.clone(),
            gender: w.gender.clone(),
            ipa: w.ipa.clone(),
            meaning_zh: w.meaning_zh().map(str::to_string),
            meaning_text: w.meaning_text.clone(),
            translations: w.translations.clone(),
            lesson: w.lesson.clone(),
            cefr: w.cefr.clone(),
            tags: w.tags.clone(),
            created_at: w.created_at,
            updated_at: w.updated_at,
        }
    }
}

#[derive(Debug, Deserialize)]
struct SearchQuery {
    q: Option<String>,
    lesson: Option<String>,
    cefr: Option<String>,
    pos: Option<String>,
    page: Option<u64>,
    per_page: Option<u64>,
}

impl SearchQuery {
    fn into_filter(self) -> SearchFilter {
        SearchFilter {
            q: self.q.filter(|q| !q.trim().is_empty()),
            lesson: self.lesson,
            cefr: self.cefr,
            pos: self.pos,
            page: self.page.unwrap_or(1),
            per_page: self.per_page.unwrap_or(DEFAULT_PAGE_SIZE),
        }
        .clamped()
    }
}

#[derive(Debug, Serialize)]
struct SearchResponse {
    words: Vec<WordView>,
    total: u64,
    page: u64,
    per_page: u64,
}

async fn search_words(
    Query(query): Query<SearchQuery>,
    State(state): State<AppState>,
) -> Result<impl axum::response::IntoResponse, AppError> {
    let filter = query.into_filter();
    let Some(book) = state.store().active_wordbook()? else {
        return Ok(ok(SearchResponse {
            words: Vec::new(),
            total: 0,
            page: filter.page,
            per_page: filter.per_page,
        }));
    };

    let (words, total) = search::search(state.store(), book.id, &filter)?;
    Ok(ok(SearchResponse {
        words: words.iter().map(WordView::from).collect(),
        total,
        page: filter.page,
        per_page: filter.per_page,
    }))
}

// 与 /words/search 相同的形状，但从不做全文排序
async fn list_words(
    Query(query): Query<SearchQuery>,
    State(state): State<AppState>,
) -> Result<impl axum::response::IntoResponse, AppError> {
    let mut filter = query.into_filter();
    filter.q = None;
    let Some(book) = state.store().active_wordbook()? else {
        return Ok(ok(SearchResponse {
            words: Vec::new(),
            total: 0,
            page: filter.page,
            per_page: filter.per_page,
        }));
    };

    let (words, total) = search::search(state.store(), book.id, &filter)?;
    Ok(ok(SearchResponse {
        words: words.iter().map(WordView::from).collect(),
        total,
        page: filter.page,
        per_page: filter.per_page,
    }))
}

#[derive(Debug, Deserialize)]
struct SuggestQuery {
    q: Option<String>,
    limit: Option<usize>,
}

async fn suggest_words(
    Query(query): Query<SuggestQuery>,
    State(state): State<AppState>,
) -> Result<impl axum::response::IntoResponse, AppError> {
    let q = query.q.unwrap_or_default();
    let limit = query
        .limit
        .unwrap_or(DEFAULT_SUGGEST_LIMIT)
        .min(MAX_SUGGEST_LIMIT);

    let Some(book) = state.store().active_wordbook()? else {
        return Ok(ok(Vec::<String>::new()));
    };
    let lemmas = search::suggest(state.store(), book.id, &q, limit)?;
    Ok(ok(lemmas))
}

async fn get_word(
    Path(id): Path<u64>,
    State(state): State<AppState>,
) -> Result<impl axum::response::IntoResponse, AppError> {
    let active: Option<Wordbook> = state.store().active_wordbook()?;
    let word = state
        .store()
        .get_word(id)?
        .filter(|w| active.as_ref().is_some_and(|b| b.id == w.wordbook_id))
        .ok_or_else(|| AppError::not_found("word not found in the active wordbook"))?;
    Ok(ok(WordView::from(&word)))
}

async fn word_stats(
    State(state): State<AppState>,
) -> Result<impl axum::response::IntoResponse, AppError> {
    let Some(book) = state.store().active_wordbook()? else {
        return Err(AppError::precondition_failed("no active wordbook"));
    };
    let stats = state.store().word_stats(book.id)?;
    Ok(ok(serde_json::json!({
        "wordbook_name": book.name,
        "total_words": stats.total_words,
        "by_lesson": stats.by_lesson,
        "by_cefr": stats.by_cefr,
        "by_pos": stats.by_pos,
    })))
}
