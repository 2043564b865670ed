use axum::body::{to_bytes, Body};
use axum::http::{HeaderMap, Method, Request, StatusCode};
use axum::response::Response;
use axum::Router;
use serde_json::Value;
use tower::util::ServiceExt;

/// Fire one in-process request against the router. The service carries no
/// authentication, so a method + path + optional JSON body covers every
/// endpoint.
pub async fn request(
    app: &Router,
    method: Method,
    path: &str,
    body: Option<Value>,
) -> Response {
    let builder = Request::builder().method(method).uri(path);
    let req = match body {
        Some(payload) => builder
            .header("content-type", "application/json")
            .body(Body::from(payload.to_string())),
        None => builder.body(Body::empty()),
    }
    .expect("build request");

    app.clone().oneshot(req).await.expect("router response")
}

/// 构造 multipart/form-data 上传请求（file + 可选字段）。
pub async fn multipart_upload(
    app: &Router,
    path: &str,
    filename: &str,
    content: &[u8],
    extra_fields: &[(&str, &str)],
) -> Response {
    let boundary = "wordflow-test-boundary";
    let mut body = Vec::new();

    body.extend_from_slice(format!("--{boundary}\r\n").as_bytes());
    body.extend_from_slice(
        format!(
            "Content-Disposition: form-data; name=\"file\"; filename=\"{filename}\"\r\n\
             Content-Type: application/octet-stream\r\n\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(content);
    body.extend_from_slice(b"\r\n");

    for (name, value) in extra_fields {
        body.extend_from_slice(format!("--{boundary}\r\n").as_bytes());
        body.extend_from_slice(
            format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n")
                .as_bytes(),
        );
    }
    body.extend_from_slice(format!("--{boundary}--\r\n").as_bytes());

    let req = Request::builder()
        .method(Method::POST)
        .uri(path)
        .header(
            "content-type",
            format!("multipart/form-data; boundary={boundary}"),
        )
        .body(Body::from(body))
        .expect("multipart request");

    app.clone().oneshot(req).await.expect("router response")
}

/// Split a response into `(status, headers, parsed JSON body)`. Empty bodies
/// come back as `{}` so callers can assert uniformly.
pub async fn response_json(resp: Response) -> (StatusCode, HeaderMap, Value) {
    let (parts, body) = resp.into_parts();
    let bytes = to_bytes(body, usize::MAX)
        .await
        .expect("read response body");

    if bytes.is_empty() {
        return (parts.status, parts.headers, serde_json::json!({}));
    }
    let json = serde_json::from_slice::<Value>(&bytes).expect("response is not valid JSON");
    (parts.status, parts.headers, json)
}

pub fn assert_json_error(body: &Value, kind: &str) {
    assert_eq!(body["error"]["kind"], kind);
    assert!(body["error"].get("message").is_some());
}
