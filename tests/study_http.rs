mod common;

use axum::http::{Method, StatusCode};

use common::app::spawn_test_app;
use common::fixtures::{create_active_wordbook, import_and_wait, review};
use common::http::{assert_json_error, request, response_json};

const SEED: &str = "lemma,meaning_zh,lesson\nun,一,L1\ndeux,二,L1\ntrois,三,L2\n";

async fn seeded_app() -> common::app::TestApp {
    let app = spawn_test_app().await;
    create_active_wordbook(&app.app, "NF1").await;
    import_and_wait(&app.app, "seed.csv", SEED.as_bytes()).await;
    app
}

async fn study_next(app: &axum::Router, query: &str) -> serde_json::Value {
    let (status, _, body) = response_json(
        request(
            app,
            Method::GET,
            &format!("/api/v1/study/next{query}"),
            None,
        )
        .await,
    )
    .await;
    assert_eq!(status, StatusCode::OK, "study/next: {body}");
    body
}

#[tokio::test]
async fn it_serves_new_cards_in_lesson_order() {
    let app = seeded_app().await;

    let body = study_next(&app.app, "").await;
    let cards = body["cards"].as_array().unwrap();
    assert_eq!(cards.len(), 3);
    assert!(cards.iter().all(|c| c["card_type"] == "new"));
    let lemmas: Vec<&str> = cards.iter().map(|c| c["lemma"].as_str().unwrap()).collect();
    assert_eq!(lemmas, vec!["un", "deux", "trois"]);

    assert!(body["session_id"].is_string());
    assert_eq!(body["queue_info"]["total_returned"], 3);
    assert_eq!(body["stats"]["study_queue_size"], 3);
    assert_eq!(body["stats"]["wordbook_name"], "NF1");
}

#[tokio::test]
async fn it_respects_new_limit() {
    let app = seeded_app().await;

    let body = study_next(&app.app, "?new_limit=1").await;
    assert_eq!(body["cards"].as_array().unwrap().len(), 1);
    assert_eq!(body["stats"]["new_cards"], 3);
    assert_eq!(body["stats"]["study_queue_size"], 1);
}

#[tokio::test]
async fn it_grades_a_card_and_moves_it_out_of_the_queue() {
    let app = seeded_app().await;

    let body = study_next(&app.app, "").await;
    let card_id = body["cards"][0]["card_id"].as_u64().unwrap();

    let graded = review(&app.app, card_id, 2).await;
    assert_eq!(graded["success"], true);
    assert_eq!(graded["result"]["new_interval"], 1);
    assert_eq!(graded["result"]["total_reps"], 1);
    assert_eq!(graded["result"]["new_ease"], 2.5);

    // 评分后当天不再出现（interval ≥ 1 天）
    let body = study_next(&app.app, "").await;
    let ids: Vec<u64> = body["cards"]
        .as_array()
        .unwrap()
        .iter()
        .map(|c| c["card_id"].as_u64().unwrap())
        .collect();
    assert!(!ids.contains(&card_id));
    assert_eq!(body["stats"]["reviewed_today"], 1);
}

#[tokio::test]
async fn it_rejects_out_of_range_grades() {
    let app = seeded_app().await;
    let body = study_next(&app.app, "").await;
    let card_id = body["cards"][0]["card_id"].as_u64().unwrap();

    for grade in [-1i64, 4, 42] {
        let resp = request(
            &app.app,
            Method::POST,
            "/api/v1/review",
            Some(serde_json::json!({ "card_id": card_id, "grade": grade })),
        )
        .await;
        let (status, _, body) = response_json(resp).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_json_error(&body, "bad_input");
    }
}

#[tokio::test]
async fn it_rejects_reviews_for_unknown_cards() {
    let app = seeded_app().await;

    let resp = request(
        &app.app,
        Method::POST,
        "/api/v1/review",
        Some(serde_json::json!({ "card_id": 9999, "grade": 2 })),
    )
    .await;
    let (status, _, body) = response_json(resp).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_json_error(&body, "precondition_failed");
}

#[tokio::test]
async fn it_reports_today_stats_matching_the_queue() {
    let app = seeded_app().await;

    let (status, _, body) = response_json(
        request(&app.app, Method::GET, "/api/v1/study/stats", None).await,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["today"]["total_cards"], 3);
    assert_eq!(body["today"]["new_cards"], 3);
    assert_eq!(body["today"]["due_today"], 0);
    assert_eq!(body["recommendations"]["suggested_daily_new"], 3);
    assert!(body["recommendations"]["estimated_time_minutes"].is_number());
}

#[tokio::test]
async fn it_buckets_progress_per_day() {
    let app = seeded_app().await;

    let queue = study_next(&app.app, "").await;
    for card in queue["cards"].as_array().unwrap() {
        review(&app.app, card["card_id"].as_u64().unwrap(), 3).await;
    }

    let (status, _, body) = response_json(
        request(
            &app.app,
            Method::GET,
            "/api/v1/study/progress?days=7",
            None,
        )
        .await,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["period"]["days"], 7);
    assert_eq!(body["daily_data"].as_array().unwrap().len(), 7);
    assert_eq!(body["summary"]["total_reviews"], 3);
    assert_eq!(body["summary"]["active_days"], 1);

    let today = body["daily_data"].as_array().unwrap().last().unwrap().clone();
    assert_eq!(today["reviews"], 3);
    assert_eq!(today["average_grade"], 3.0);
}

#[tokio::test]
async fn it_forecasts_due_cards_per_day() {
    let app = seeded_app().await;

    // 取队列会为全部新卡建立状态（due=now）；其中一张评 easy → due+2 天
    let queue = study_next(&app.app, "").await;
    let card_id = queue["cards"][0]["card_id"].as_u64().unwrap();
    review(&app.app, card_id, 3).await;

    let (status, _, body) = response_json(
        request(
            &app.app,
            Method::GET,
            "/api/v1/study/due-forecast?days=7",
            None,
        )
        .await,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["forecast_period"], "7 days");
    let days = body["forecast"].as_array().unwrap();
    assert_eq!(days.len(), 7);
    assert_eq!(body["total_due"], 3);
    assert_eq!(days[0]["due_cards"], 2);
    assert_eq!(days[2]["due_cards"], 1);
}

#[tokio::test]
async fn it_returns_an_empty_queue_without_an_active_book() {
    let app = spawn_test_app().await;

    let body = study_next(&app.app, "").await;
    assert_eq!(body["cards"], serde_json::json!([]));
    assert_eq!(body["stats"]["study_queue_size"], 0);
}

#[tokio::test]
async fn it_round_trips_settings() {
    let app = spawn_test_app().await;

    let (_, _, defaults) = response_json(
        request(&app.app, Method::GET, "/api/v1/settings", None).await,
    )
    .await;
    assert_eq!(defaults, serde_json::json!({}));

    let payload = serde_json::json!({ "daily_goal": 25, "theme": "dark" });
    let (status, _, saved) = response_json(
        request(
            &app.app,
            Method::PUT,
            "/api/v1/settings",
            Some(payload.clone()),
        )
        .await,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(saved, payload);

    let (_, _, loaded) = response_json(
        request(&app.app, Method::GET, "/api/v1/settings", None).await,
    )
    .await;
    assert_eq!(loaded, payload);
}
