use axum::extract::{Multipart, Path, Query, State};
use axum::routing::get;
use axum::Router;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::parser::ImportFormat;
use crate::response::{accepted, ok, AppError};
use crate::state::AppState;
use crate::store::operations::imports::{ImportJob, ImportStatus};
use crate::workers::StartError;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/words/bulk", axum::routing::post(upload_words_bulk))
        .route("/imports", get(list_imports))
        .route("/imports/:id", get(import_progress).delete(delete_import))
}

#[derive(Debug, Serialize)]
struct ImportJobView {
    import_id: u64,
    wordbook_id: Option<u64>,
    filename: String,
    status: ImportStatus,
    total: u64,
    succeeded: u64,
    failed: u64,
    skipped: u64,
    progress_percent: f64,
    message: Option<String>,
    started_at: DateTime<Utc>,
    finished_at: Option<DateTime<Utc>>,
}

impl From<&ImportJob> for ImportJobView {
    fn from(job: &ImportJob) -> Self {
        Self {
            import_id: job.id,
            wordbook_id: job.wordbook_id,
            filename: job.filename.clone(),
            status: job.status,
            total: job.total,
            succeeded: job.succeeded,
            failed: job.failed,
            skipped: job.skipped,
            progress_percent: job.progress_percent(),
            message: job.message.clone(),
            started_at: job.started_at,
            finished_at: job.finished_at,
        }
    }
}

/// multipart 字段：`file`（必填）、`wordbook_id`、`format`。
/// 响应 202：导入在后台执行，客户端凭 import_id 轮询。
async fn upload_words_bulk(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<impl axum::response::IntoResponse, AppError> {
    let mut file: Option<(String, Vec<u8>)> = None;
    let mut wordbook_id: Option<u64> = None;
    let mut format = ImportFormat::Auto;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::bad_input(&format!("invalid multipart body: {e}")))?
    {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("file") => {
                let filename = field
                    .file_name()
                    .map(str::to_string)
                    .unwrap_or_else(|| "upload".to_string());
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| AppError::bad_input(&format!("failed to read upload: {e}")))?;
                file = Some((filename, bytes.to_vec()));
            }
            Some("wordbook_id") => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| AppError::bad_input(&format!("invalid wordbook_id: {e}")))?;
                let trimmed = text.trim().to_string();
                if !trimmed.is_empty() {
                    wordbook_id = Some(trimmed.parse().map_err(|_| {
                        AppError::bad_input("wordbook_id must be a positive integer")
                    })?);
                }
            }
            Some("format") => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| AppError::bad_input(&format!("invalid format field: {e}")))?;
                format = ImportFormat::from_name(&text).ok_or_else(|| {
                    AppError::bad_input("format must be one of csv, tsv, json, auto")
                })?;
            }
            _ => {}
        }
    }

    let Some((filename, bytes)) = file else {
        return Err(AppError::bad_input("multipart field 'file' is required"));
    };

    let job = state
        .importer()
        .start(&filename, bytes, format, wordbook_id)
        .map_err(|error| match error {
            StartError::AlreadyRunning { import_id } => {
                AppError::conflict("an import for this wordbook is already running")
                    .with_details(serde_json::json!({ "import_id": import_id }))
            }
            StartError::Store(store_error) => store_error.into(),
        })?;

    Ok(accepted(serde_json::json!({
        "import_id": job.id,
        "status": job.status,
        "message": match job.status {
            ImportStatus::Failed => job
                .message
                .clone()
                .unwrap_or_else(|| "import failed".to_string()),
            _ => format!("file '{}' accepted, import running in background", job.filename),
        },
    })))
}

async fn import_progress(
    Path(id): Path<u64>,
    State(state): State<AppState>,
) -> Result<impl axum::response::IntoResponse, AppError> {
    let job = state
        .store()
        .get_import_job(id)?
        .ok_or_else(|| AppError::not_found("import job not found"))?;
    Ok(ok(ImportJobView::from(&job)))
}

#[derive(Debug, Deserialize)]
struct ListImportsQuery {
    limit: Option<usize>,
}

async fn list_imports(
    Query(query): Query<ListImportsQuery>,
    State(state): State<AppState>,
) -> Result<impl axum::response::IntoResponse, AppError> {
    let limit = query.limit.unwrap_or(20).clamp(1, 100);
    let jobs = state.store().list_import_jobs(limit)?;
    let views: Vec<ImportJobView> = jobs.iter().map(ImportJobView::from).collect();
    Ok(ok(views))
}

async fn delete_import(
    Path(id): Path<u64>,
    State(state): State<AppState>,
) -> Result<impl axum::response::IntoResponse, AppError> {
    state.store().delete_import_job(id)?;
    Ok(ok(serde_json::json!({
        "message": format!("import record {id} deleted"),
    })))
}
