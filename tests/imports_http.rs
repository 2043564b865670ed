mod common;

use axum::http::{Method, StatusCode};

use common::app::spawn_test_app;
use common::fixtures::{create_active_wordbook, import_and_wait};
use common::http::{assert_json_error, multipart_upload, request, response_json};

const TWO_ROWS: &str = "lemma,meaning_zh\nchemise,衬衫\nbonjour,你好\n";

#[tokio::test]
async fn it_imports_a_csv_and_reports_progress() {
    let app = spawn_test_app().await;
    create_active_wordbook(&app.app, "NF1").await;

    let job = import_and_wait(&app.app, "words.csv", TWO_ROWS.as_bytes()).await;
    assert_eq!(job["status"], "completed");
    assert_eq!(job["total"], 2);
    assert_eq!(job["succeeded"], 2);
    assert_eq!(job["failed"], 0);
    assert_eq!(job["skipped"], 0);
    assert_eq!(job["progress_percent"], 100.0);
    assert!(job["finished_at"].is_string());
}

#[tokio::test]
async fn it_skips_everything_on_duplicate_import() {
    let app = spawn_test_app().await;
    create_active_wordbook(&app.app, "NF1").await;

    import_and_wait(&app.app, "words.csv", TWO_ROWS.as_bytes()).await;
    let second = import_and_wait(&app.app, "words.csv", TWO_ROWS.as_bytes()).await;

    assert_eq!(second["total"], 2);
    assert_eq!(second["succeeded"], 0);
    assert_eq!(second["skipped"], 2);
    assert_eq!(second["failed"], 0);

    // 词数不变
    let (_, _, stats) =
        response_json(request(&app.app, Method::GET, "/api/v1/stats", None).await).await;
    assert_eq!(stats["total_words"], 2);
}

#[tokio::test]
async fn it_fails_the_job_without_an_active_wordbook() {
    let app = spawn_test_app().await;

    let resp =
        multipart_upload(&app.app, "/api/v1/words/bulk", "w.csv", TWO_ROWS.as_bytes(), &[]).await;
    let (status, _, body) = response_json(resp).await;
    // 合同：调用方已拿到 import_id，错误记录在任务里
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["status"], "failed");
    assert_eq!(body["message"], "no active wordbook");
}

#[tokio::test]
async fn it_targets_an_explicit_wordbook_field() {
    let app = spawn_test_app().await;
    let _active = create_active_wordbook(&app.app, "ACTIVE").await;
    let other = common::fixtures::create_wordbook(&app.app, "OTHER").await;

    let resp = multipart_upload(
        &app.app,
        "/api/v1/words/bulk",
        "w.csv",
        TWO_ROWS.as_bytes(),
        &[("wordbook_id", &other.to_string())],
    )
    .await;
    let (status, _, body) = response_json(resp).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    let import_id = body["import_id"].as_u64().unwrap();

    // 等待后台完成
    for _ in 0..200 {
        let (_, _, job) = response_json(
            request(
                &app.app,
                Method::GET,
                &format!("/api/v1/imports/{import_id}"),
                None,
            )
            .await,
        )
        .await;
        if job["status"] == "completed" {
            assert_eq!(job["wordbook_id"].as_u64(), Some(other));
            return;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    panic!("import did not finish");
}

#[tokio::test]
async fn it_counts_bad_rows_without_aborting() {
    let app = spawn_test_app().await;
    create_active_wordbook(&app.app, "NF1").await;

    let csv = "lemma,meaning_zh\nchemise,衬衫\n,孤儿行\nbonjour,你好\n";
    let job = import_and_wait(&app.app, "words.csv", csv.as_bytes()).await;

    assert_eq!(job["status"], "completed");
    assert_eq!(job["succeeded"], 2);
    assert_eq!(job["failed"], 1);
    assert!(job["message"].as_str().unwrap().contains("lemma"));
}

#[tokio::test]
async fn it_completes_empty_files_with_zero_total() {
    let app = spawn_test_app().await;
    create_active_wordbook(&app.app, "NF1").await;

    let job = import_and_wait(&app.app, "empty.csv", b"").await;
    assert_eq!(job["status"], "completed");
    assert_eq!(job["total"], 0);
    assert_eq!(job["progress_percent"], 100.0);
}

#[tokio::test]
async fn it_imports_json_arrays() {
    let app = spawn_test_app().await;
    create_active_wordbook(&app.app, "NF1").await;

    let json = r#"[{"lemma": "un", "meaning_zh": "一"}, {"lemma": "deux", "meaning_zh": "二"}]"#;
    let job = import_and_wait(&app.app, "words.json", json.as_bytes()).await;
    assert_eq!(job["succeeded"], 2);

    let (_, _, found) = response_json(
        request(
            &app.app,
            Method::GET,
            "/api/v1/words/search?q=deux",
            None,
        )
        .await,
    )
    .await;
    assert_eq!(found["total"], 1);
}

#[tokio::test]
async fn it_requires_the_file_field() {
    let app = spawn_test_app().await;
    create_active_wordbook(&app.app, "NF1").await;

    let boundary = "wordflow-test-boundary";
    let body = format!(
        "--{boundary}\r\nContent-Disposition: form-data; name=\"other\"\r\n\r\nx\r\n--{boundary}--\r\n"
    );
    let req = axum::http::Request::builder()
        .method(Method::POST)
        .uri("/api/v1/words/bulk")
        .header(
            "content-type",
            format!("multipart/form-data; boundary={boundary}"),
        )
        .body(axum::body::Body::from(body))
        .unwrap();
    let resp = tower::util::ServiceExt::oneshot(app.app.clone(), req)
        .await
        .unwrap();
    let (status, _, body) = response_json(resp).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_json_error(&body, "bad_input");
}

#[tokio::test]
async fn it_lists_recent_imports_most_recent_first() {
    let app = spawn_test_app().await;
    create_active_wordbook(&app.app, "NF1").await;

    import_and_wait(&app.app, "first.csv", b"lemma\nun\n").await;
    import_and_wait(&app.app, "second.csv", b"lemma\ndeux\n").await;

    let (status, _, body) =
        response_json(request(&app.app, Method::GET, "/api/v1/imports", None).await).await;
    assert_eq!(status, StatusCode::OK);
    let jobs = body.as_array().unwrap();
    assert_eq!(jobs[0]["filename"], "second.csv");
    assert_eq!(jobs[1]["filename"], "first.csv");
}

#[tokio::test]
async fn it_deletes_terminal_import_records() {
    let app = spawn_test_app().await;
    create_active_wordbook(&app.app, "NF1").await;

    let job = import_and_wait(&app.app, "words.csv", b"lemma\nun\n").await;
    let id = job["import_id"].as_u64().unwrap();

    let (status, _, _) = response_json(
        request(
            &app.app,
            Method::DELETE,
            &format!("/api/v1/imports/{id}"),
            None,
        )
        .await,
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _, _) = response_json(
        request(
            &app.app,
            Method::GET,
            &format!("/api/v1/imports/{id}"),
            None,
        )
        .await,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
