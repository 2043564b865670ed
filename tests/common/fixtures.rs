use axum::http::Method;
use axum::Router;
use serde_json::Value;

use super::http::{multipart_upload, request, response_json};

/// Create a wordbook over the API and return its id.
pub async fn create_wordbook(app: &Router, name: &str) -> u64 {
    let resp = request(
        app,
        Method::POST,
        "/api/v1/wordbooks",
        Some(serde_json::json!({ "name": name, "language": "fr" })),
    )
    .await;
    let (status, _, body) = response_json(resp).await;
    assert_eq!(status, axum::http::StatusCode::CREATED, "create: {body}");
    body["id"].as_u64().expect("wordbook id")
}

pub async fn activate_wordbook(app: &Router, id: u64) {
    let resp = request(
        app,
        Method::POST,
        &format!("/api/v1/wordbooks/{id}/activate"),
        None,
    )
    .await;
    let (status, _, body) = response_json(resp).await;
    assert!(status.is_success(), "activate: {body}");
}

pub async fn create_active_wordbook(app: &Router, name: &str) -> u64 {
    let id = create_wordbook(app, name).await;
    activate_wordbook(app, id).await;
    id
}

/// Upload a file and poll `/imports/{id}` until the job reaches a terminal
/// state. Returns the final job body.
pub async fn import_and_wait(app: &Router, filename: &str, content: &[u8]) -> Value {
    let resp = multipart_upload(app, "/api/v1/words/bulk", filename, content, &[]).await;
    let (status, _, body) = response_json(resp).await;
    assert_eq!(status, axum::http::StatusCode::ACCEPTED, "upload: {body}");
    let import_id = body["import_id"].as_u64().expect("import id");

    // 后台任务通常一瞬间完成；轮询上限防 flake
    for _ in 0..200 {
        let resp = request(
            app,
            Method::GET,
            &format!("/api/v1/imports/{import_id}"),
            None,
        )
        .await;
        let (_, _, job) = response_json(resp).await;
        match job["status"].as_str() {
            Some("completed") | Some("failed") => return job,
            _ => tokio::time::sleep(std::time::Duration::from_millis(10)).await,
        }
    }
    panic!("import {import_id} did not finish in time");
}

/// Submit one review grade for a card.
pub async fn review(app: &Router, card_id: u64, grade: i64) -> Value {
    let resp = request(
        app,
        Method::POST,
        "/api/v1/review",
        Some(serde_json::json!({ "card_id": card_id, "grade": grade })),
    )
    .await;
    let (status, _, body) = response_json(resp).await;
    assert!(status.is_success(), "review: {body}");
    body
}
