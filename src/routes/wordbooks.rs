use axum::extract::{Path, Query, State};
use axum::routing::{get, post};
use axum::Router;
use chrono::Utc;
use serde::Deserialize;

use crate::extractors::JsonBody;
use crate::response::{created, ok, AppError};
use crate::state::AppState;
use crate::store::operations::wordbooks::{Wordbook, WordbookPatch};
use crate::store::operations::words::{natural_key, Word};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_wordbooks).post(create_wordbook))
        .route("/active", get(get_active_wordbook))
        .route(
            "/:id",
            get(get_wordbook).put(update_wordbook).delete(delete_wordbook),
        )
        .route("/:id/activate", post(activate_wordbook))
        .route("/:id/stats", get(wordbook_stats))
        .route("/:id/export", get(export_wordbook).post(export_wordbook))
}

#[derive(Debug, Deserialize)]
struct CreateWordbookRequest {
    name: String,
    language: Option<String>,
    description: Option<String>,
    author: Option<String>,
    version: Option<String>,
}

async fn create_wordbook(
    State(state): State<AppState>,
    JsonBody(req): JsonBody<CreateWordbookRequest>,
) -> Result<impl axum::response::IntoResponse, AppError> {
    if req.name.trim().is_empty() {
        return Err(AppError::bad_input("name is required"));
    }
    let book = state.store().create_wordbook(
        req.name.trim(),
        req.language.as_deref().unwrap_or("fr"),
        req.description,
        req.author,
        req.version,
    )?;
    Ok(created(book))
}

async fn list_wordbooks(
    State(state): State<AppState>,
) -> Result<impl axum::response::IntoResponse, AppError> {
    let books: Vec<Wordbook> = state.store().list_wordbooks()?;
    Ok(ok(books))
}

async fn get_active_wordbook(
    State(state): State<AppState>,
) -> Result<impl axum::response::IntoResponse, AppError> {
    let book = state
        .store()
        .active_wordbook()?
        .ok_or_else(|| AppError::not_found("no active wordbook"))?;
    Ok(ok(book))
}

async fn get_wordbook(
    Path(id): Path<u64>,
    State(state): State<AppState>,
) -> Result<impl axum::response::IntoResponse, AppError> {
    let book = state
        .store()
        .get_wordbook(id)?
        .ok_or_else(|| AppError::not_found("wordbook not found"))?;
    Ok(ok(book))
}

async fn update_wordbook(
    Path(id): Path<u64>,
    State(state): State<AppState>,
    JsonBody(patch): JsonBody<WordbookPatch>,
) -> Result<impl axum::response::IntoResponse, AppError> {
    let book = state.store().update_wordbook(id, &patch)?;
    Ok(ok(book))
}

async fn activate_wordbook(
    Path(id): Path<u64>,
    State(state): State<AppState>,
) -> Result<impl axum::response::IntoResponse, AppError> {
    let book = state.store().activate_wordbook(id)?;
    Ok(ok(serde_json::json!({
        "message": format!("wordbook '{}' is now active", book.name),
        "wordbook": book,
    })))
}

async fn delete_wordbook(
    Path(id): Path<u64>,
    State(state): State<AppState>,
) -> Result<impl axum::response::IntoResponse, AppError> {
    state.store().delete_wordbook(id)?;
    Ok(ok(serde_json::json!({
        "message": format!("wordbook {id} deleted"),
    })))
}

async fn wordbook_stats(
    Path(id): Path<u64>,
    State(state): State<AppState>,
) -> Result<impl axum::response::IntoResponse, AppError> {
    let book = state
        .store()
        .get_wordbook(id)?
        .ok_or_else(|| AppError::not_found("wordbook not found"))?;
    let stats = state.store().word_stats(id)?;
    Ok(ok(serde_json::json!({
        "wordbook": book,
        "total_words": stats.total_words,
        "by_cefr": stats.by_cefr,
        "by_pos": stats.by_pos,
        "by_lesson": stats.by_lesson,
    })))
}

#[derive(Debug, Deserialize)]
struct ExportQuery {
    format: Option<String>,
}

/// 导出词库。CSV 表头与批量导入的字段映射一致，导出结果可直接回灌。
async fn export_wordbook(
    Path(id): Path<u64>,
    Query(query): Query<ExportQuery>,
    State(state): State<AppState>,
) -> Result<impl axum::response::IntoResponse, AppError> {
    let book = state
        .store()
        .get_wordbook(id)?
        .ok_or_else(|| AppError::not_found("wordbook not found"))?;

    let mut words = state.store().words_in_book(id)?;
    words.sort_by(|a, b| {
        natural_key(a.lesson.as_deref())
            .cmp(&natural_key(b.lesson.as_deref()))
            .then_with(|| a.lemma.cmp(&b.lemma))
    });

    let format = query.format.as_deref().unwrap_or("csv");
    let content = match format {
        "csv" => render_csv_export(&words),
        "json" => render_json_export(&book, &words)?,
        _ => {
            return Err(AppError::bad_input("supported formats: csv, json"));
        }
    };

    Ok(ok(serde_json::json!({
        "format": format,
        "filename": format!("{}.{format}", book.name),
        "content": content,
        "count": words.len(),
    })))
}

const EXPORT_CSV_HEADER: &str = "lemma,pos,gender,ipa,meaning_zh,lesson,cefr,tags";

fn render_csv_export(words: &[Word]) -> String {
    let mut out = String::from(EXPORT_CSV_HEADER);
    out.push('\n');
    for word in words {
        let row = [
            word.lemma.clone(),
            word.pos.clone().unwrap_or_default(),
            word.gender.clone().unwrap_or_default(),
            word.ipa.clone().unwrap_or_default(),
            word.meaning_zh().unwrap_or_default().to_string(),
            word.lesson.clone().unwrap_or_default(),
            word.cefr.clone().unwrap_or_default(),
            word.tags.join(";"),
        ];
        let line: Vec<String> = row.iter().map(|field| csv_field(field)).collect();
        out.push_str(&line.join(","));
        out.push('\n');
    }
    out
}

fn render_json_export(book: &Wordbook, words: &[Word]) -> Result<String, AppError> {
    let payload = serde_json::json!({
        "wordbook": {
            "name": book.name,
            "description": book.description,
            "language": book.language,
            "author": book.author,
            "version": book.version,
            "exported_at": Utc::now().to_rfc3339(),
        },
        "words": words
            .iter()
            .map(|word| serde_json::json!({
                "lemma": word.lemma,
                "pos": word.pos,
                "gender": word.gender,
                "ipa": word.ipa,
                "meaning_zh": word.meaning_zh(),
                "translations": word.translations,
                "lesson": word.lesson,
                "cefr": word.cefr,
                "tags": word.tags,
            }))
            .collect::<Vec<_>>(),
    });
    serde_json::to_string_pretty(&payload)
        .map_err(|e| AppError::internal(&format!("export serialization failed: {e}")))
}

// 引号规则与解析侧 split_delimited 对应：含分隔符/引号/换行的字段加引号，内部引号翻倍
fn csv_field(field: &str) -> String {
    if field.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}
