pub mod health;
pub mod imports;
pub mod settings;
pub mod study;
pub mod wordbooks;
pub mod words;

use std::time::Duration;

use axum::extract::DefaultBodyLimit;
use axum::Router;
use tower_http::timeout::TimeoutLayer;

use crate::middleware::request_id;
use crate::state::AppState;

/// Maximum request body size: 10 MiB (bulk uploads are held in memory).
const MAX_BODY_SIZE: usize = 10 * 1024 * 1024;

/// Soft deadline for request handling. Imports are unaffected: the upload
/// handler only enqueues the job.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

pub fn build_router(state: AppState) -> Router {
    let api_routes = Router::new()
        .nest("/wordbooks", wordbooks::router())
        .merge(words::router())
        .merge(imports::router())
        .merge(study::router())
        .merge(settings::router())
        .layer(TimeoutLayer::new(REQUEST_TIMEOUT))
        .layer(DefaultBodyLimit::max(MAX_BODY_SIZE));

    Router::new()
        .nest("/api/v1", api_routes)
        .nest("/health", health::router())
        .layer(axum::middleware::from_fn(request_id::request_id_middleware))
        .with_state(state)
}
