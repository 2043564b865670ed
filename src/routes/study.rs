use axum::extract::{Query, State};
use axum::routing::{get, post};
use axum::Router;
use chrono::Utc;
use serde::Deserialize;

use crate::constants::{DEFAULT_NEW_LIMIT, DEFAULT_QUEUE_LIMIT};
use crate::extractors::JsonBody;
use crate::response::{ok, AppError};
use crate::scheduler::{self, QueueOptions};
use crate::srs::{self, Grade};
use crate::state::AppState;
use crate::stats;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/study/next", get(study_next))
        .route("/review", post(submit_review))
        .route("/study/stats", get(study_stats))
        .route("/study/progress", get(study_progress))
        .route("/study/due-forecast", get(due_forecast))
}

#[derive(Debug, Deserialize)]
struct StudyNextQuery {
    limit: Option<usize>,
    new_limit: Option<usize>,
    include_rolling: Option<bool>,
    wordbook_id: Option<u64>,
}

async fn study_next(
    Query(query): Query<StudyNextQuery>,
    State(state): State<AppState>,
) -> Result<impl axum::response::IntoResponse, AppError> {
    let options = QueueOptions {
        limit: query.limit.unwrap_or(DEFAULT_QUEUE_LIMIT),
        new_limit: query.new_limit.unwrap_or(DEFAULT_NEW_LIMIT),
        include_rolling: query.include_rolling.unwrap_or(true),
        wordbook_id: query.wordbook_id,
        now: Utc::now(),
    };

    let (cards, stats, queue_info) = scheduler::next_queue(state.store(), &options, false)?;
    Ok(ok(serde_json::json!({
        "cards": cards,
        "stats": stats,
        "session_id": uuid::Uuid::new_v4().to_string(),
        "queue_info": queue_info,
    })))
}

#[derive(Debug, Deserialize)]
struct ReviewRequest {
    card_id: u64,
    grade: i64,
    elapsed_ms: Option<i64>,
}

async fn submit_review(
    State(state): State<AppState>,
    JsonBody(req): JsonBody<ReviewRequest>,
) -> Result<impl axum::response::IntoResponse, AppError> {
    let grade = u8::try_from(req.grade)
        .ok()
        .and_then(Grade::from_u8)
        .ok_or_else(|| {
            AppError::bad_input("grade must be 0 (again), 1 (hard), 2 (good) or 3 (easy)")
        })?;

    let outcome = srs::apply(
        state.store(),
        req.card_id,
        grade,
        req.elapsed_ms,
        Utc::now(),
    )?;

    Ok(ok(serde_json::json!({
        "success": true,
        "message": "review recorded",
        "result": outcome,
    })))
}

async fn study_stats(
    State(state): State<AppState>,
) -> Result<impl axum::response::IntoResponse, AppError> {
    let summary = stats::today(state.store(), Utc::now())?;
    Ok(ok(summary))
}

#[derive(Debug, Deserialize)]
struct WindowQuery {
    days: Option<i64>,
}

async fn study_progress(
    Query(query): Query<WindowQuery>,
    State(state): State<AppState>,
) -> Result<impl axum::response::IntoResponse, AppError> {
    let report = stats::progress(state.store(), query.days.unwrap_or(7), Utc::now())?;
    Ok(ok(report))
}

async fn due_forecast(
    Query(query): Query<WindowQuery>,
    State(state): State<AppState>,
) -> Result<impl axum::response::IntoResponse, AppError> {
    let forecast = stats::due_forecast(state.store(), query.days.unwrap_or(7), Utc::now())?;
    Ok(ok(forecast))
}
