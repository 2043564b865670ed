use axum::extract::State;
use axum::routing::get;
use axum::Router;

use crate::extractors::JsonBody;
use crate::response::{ok, AppError};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/settings", get(get_settings).put(put_settings))
}

async fn get_settings(
    State(state): State<AppState>,
) -> Result<impl axum::response::IntoResponse, AppError> {
    Ok(ok(state.store().get_settings()?))
}

async fn put_settings(
    State(state): State<AppState>,
    JsonBody(value): JsonBody<serde_json::Value>,
) -> Result<impl axum::response::IntoResponse, AppError> {
    if !value.is_object() {
        return Err(AppError::bad_input("settings must be a JSON object"));
    }
    Ok(ok(state.store().put_settings(&value)?))
}
