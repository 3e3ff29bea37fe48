mod helpers;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

use helpers::{test_context, test_vault, FakeBackend};
use vaultmate::server::router;

async fn send(app: axum::Router, request: Request<Body>) -> (StatusCode, Vec<u8>) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    (status, bytes.to_vec())
}

async fn get_json(app: axum::Router, uri: &str) -> (StatusCode, Value) {
    let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
    let (status, body) = send(app, request).await;
    (status, serde_json::from_slice(&body).unwrap())
}

fn chat_request(body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/chat/message")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[tokio::test]
async fn chat_message_uses_backend() {
    let dir = test_vault();
    let backend = FakeBackend::replying("Hello from the model");
    let app = router(test_context(dir.path(), backend.clone()));

    let (status, body) = send(
        app,
        chat_request(json!({"messages": [{"role": "user", "content": "hi"}]})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let body: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(body["response"], "Hello from the model");
    assert_eq!(backend.call_count(), 1);
}

#[tokio::test]
async fn slash_command_skips_backend() {
    let dir = test_vault();
    let backend = FakeBackend::replying("unused");
    let app = router(test_context(dir.path(), backend.clone()));

    let (status, body) = send(
        app,
        chat_request(json!({"messages": [{"role": "user", "content": "/search milk"}]})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let body: Value = serde_json::from_slice(&body).unwrap();
    let text = body["response"].as_str().unwrap();
    assert!(text.starts_with("🔍 Search Results: 2 matches found"));
    assert!(text.contains("Inbox.md"));
    assert_eq!(backend.call_count(), 0);
}

#[tokio::test]
async fn slash_command_from_assistant_goes_to_backend() {
    let dir = test_vault();
    let backend = FakeBackend::replying("ok");
    let app = router(test_context(dir.path(), backend.clone()));

    send(
        app,
        chat_request(json!({"messages": [{"role": "assistant", "content": "/help"}]})),
    )
    .await;
    assert_eq!(backend.call_count(), 1);
}

#[tokio::test]
async fn unknown_command_is_reported() {
    let dir = test_vault();
    let app = router(test_context(dir.path(), FakeBackend::replying("unused")));

    let (_, body) = send(
        app,
        chat_request(json!({"messages": [{"role": "user", "content": "/frobnicate now"}]})),
    )
    .await;
    let body: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(body["response"], "✗ Unknown command: /frobnicate");
}

#[tokio::test]
async fn streamed_reply_is_plain_text() {
    let dir = test_vault();
    let app = router(test_context(dir.path(), FakeBackend::replying("chunked reply")));

    let request = chat_request(json!({
        "messages": [{"role": "user", "content": "hi"}],
        "stream": true
    }));
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response.headers()[header::CONTENT_TYPE].to_str().unwrap().to_string();
    assert!(content_type.starts_with("text/plain"));
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(String::from_utf8(bytes.to_vec()).unwrap(), "chunked reply");
}

#[tokio::test]
async fn backend_failure_becomes_error_text() {
    let dir = test_vault();
    let app = router(test_context(dir.path(), FakeBackend::failing("connection refused")));

    let (status, body) = send(
        app,
        chat_request(json!({"messages": [{"role": "user", "content": "hi"}]})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let body: Value = serde_json::from_slice(&body).unwrap();
    let text = body["response"].as_str().unwrap();
    assert!(text.starts_with("Error: "));
    assert!(text.contains("temporarily unavailable"));
}

#[tokio::test]
async fn chat_health_reflects_backend() {
    let dir = test_vault();
    let (status, body) = get_json(
        router(test_context(dir.path(), FakeBackend::replying("x"))),
        "/chat/health",
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["backend"], "fake");

    let (status, body) = get_json(
        router(test_context(dir.path(), FakeBackend::failing("down"))),
        "/chat/health",
    )
    .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["detail"], "LLM service unavailable");
}

#[tokio::test]
async fn vault_routes_return_documented_shapes() {
    let dir = test_vault();
    let ctx = test_context(dir.path(), FakeBackend::replying("x"));

    let (status, body) = get_json(router(ctx.clone()), "/vault/files").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], 3);
    assert_eq!(body["files"].as_array().unwrap().len(), 3);

    let (status, body) = get_json(router(ctx.clone()), "/vault/file?path=Inbox.md").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["path"], "Inbox.md");
    assert!(body["content"].as_str().unwrap().contains("buy milk"));

    let (status, body) = get_json(router(ctx.clone()), "/vault/recent?limit=1").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], 1);

    let (_, body) = get_json(router(ctx), "/vault/recent").await;
    assert_eq!(body["count"], 3);
}

#[tokio::test]
async fn vault_file_errors_map_status() {
    let dir = test_vault();
    let ctx = test_context(dir.path(), FakeBackend::replying("x"));

    let (status, body) = get_json(router(ctx.clone()), "/vault/file?path=Nope.md").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["detail"].is_string());

    let (status, _) = get_json(router(ctx), "/vault/file?path=../../etc/hosts").await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn malformed_requests_return_detail() {
    let dir = test_vault();
    let ctx = test_context(dir.path(), FakeBackend::replying("x"));

    let (status, body) = get_json(router(ctx.clone()), "/vault/file").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["detail"].as_str().unwrap().contains("path"));

    let (status, body) = get_json(router(ctx.clone()), "/vault/recent?limit=many").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["detail"].is_string());

    let (status, body) = send(
        router(ctx.clone()),
        chat_request(json!({"messages": "not a list"})),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    let body: Value = serde_json::from_slice(&body).unwrap();
    assert!(body["detail"].is_string());

    let request = Request::builder()
        .method("POST")
        .uri("/chat/message")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let (status, body) = send(router(ctx), request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let body: Value = serde_json::from_slice(&body).unwrap();
    assert!(body["detail"].is_string());
}

#[tokio::test]
async fn root_and_health_are_informational() {
    let dir = test_vault();
    let ctx = test_context(dir.path(), FakeBackend::replying("x"));

    let (status, body) = get_json(router(ctx.clone()), "/").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");

    let (status, body) = get_json(router(ctx), "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
}
