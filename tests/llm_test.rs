use std::time::Duration;

use futures_util::StreamExt;
use httpmock::prelude::*;
use serde_json::json;

use vaultmate::config::LlmConfig;
use vaultmate::llm::anthropic::AnthropicClient;
use vaultmate::llm::ollama::OllamaClient;
use vaultmate::llm::{ChatMessage, LlmBackend, LlmError};

fn anthropic(server: &MockServer, max_rpm: usize) -> AnthropicClient {
    AnthropicClient::new(
        "test-key",
        &server.base_url(),
        "claude-3-haiku-20240307",
        "You are helpful.",
        max_rpm,
        Duration::from_secs(5),
    )
    .unwrap()
}

fn ollama_config(server: &MockServer) -> LlmConfig {
    LlmConfig {
        ollama_url: server.base_url(),
        ollama_model: "test-model".to_string(),
        worker_threads: 2,
        request_timeout_secs: 5,
        ..LlmConfig::default()
    }
}

#[tokio::test]
async fn anthropic_sends_headers_and_joins_text_blocks() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(POST)
            .path("/v1/messages")
            .header("x-api-key", "test-key")
            .header("anthropic-version", "2023-06-01")
            .body_includes("\"system\":\"You are helpful.\"")
            .body_includes("\"model\":\"claude-3-haiku-20240307\"");
        then.status(200).json_body(json!({
            "content": [
                {"type": "text", "text": "Hello, "},
                {"type": "text", "text": "world"}
            ]
        }));
    });

    let client = anthropic(&server, 10);
    let reply = client.generate(&[ChatMessage::user("hi")]).await.unwrap();
    assert_eq!(reply, "Hello, world");
    mock.assert();
}

#[tokio::test]
async fn anthropic_translates_error_statuses() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(POST).path("/v1/messages").body_includes("limited");
        then.status(429).header("retry-after", "7").body("slow down");
    });
    server.mock(|when, then| {
        when.method(POST).path("/v1/messages").body_includes("badkey");
        then.status(401).body("nope");
    });
    server.mock(|when, then| {
        when.method(POST).path("/v1/messages").body_includes("overloaded");
        then.status(529).body("overloaded");
    });

    let client = anthropic(&server, 10);
    let err = client.generate(&[ChatMessage::user("limited")]).await.unwrap_err();
    assert!(matches!(err, LlmError::RateLimited { retry_after_secs: 7 }));

    let err = client.generate(&[ChatMessage::user("badkey")]).await.unwrap_err();
    assert!(matches!(err, LlmError::Unauthorized));
    assert_eq!(
        err.user_message(),
        "Invalid API key. Please check your configuration."
    );

    let err = client
        .generate(&[ChatMessage::user("overloaded")])
        .await
        .unwrap_err();
    assert!(matches!(err, LlmError::Unavailable(_)));
}

#[tokio::test]
async fn anthropic_local_rate_limit_blocks_before_request() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(POST).path("/v1/messages");
        then.status(200)
            .json_body(json!({"content": [{"type": "text", "text": "ok"}]}));
    });

    let client = anthropic(&server, 1);
    client.generate(&[ChatMessage::user("one")]).await.unwrap();
    let err = client.generate(&[ChatMessage::user("two")]).await.unwrap_err();
    assert!(matches!(err, LlmError::RateLimited { .. }));
    assert_eq!(mock.hits(), 1);
    assert_eq!(client.rate_limit_status().remaining, 0);
}

#[tokio::test]
async fn anthropic_summary_is_none_on_failure() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(POST).path("/v1/messages");
        then.status(500).body("boom");
    });

    let client = anthropic(&server, 10);
    let summary = client
        .generate_summary(&[ChatMessage::user("a"), ChatMessage::assistant("b")])
        .await;
    assert!(summary.is_none());
    assert!(client
        .extract_key_insights(&[ChatMessage::user("a")])
        .await
        .is_empty());
}

#[tokio::test]
async fn ollama_generate_reads_message_content() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(POST)
            .path("/api/chat")
            .body_includes("\"model\":\"test-model\"")
            .body_includes("\"stream\":false");
        then.status(200).json_body(json!({
            "message": {"role": "assistant", "content": "local reply"},
            "done": true
        }));
    });

    let client = OllamaClient::new(&ollama_config(&server));
    let reply = client.generate(&[ChatMessage::user("hi")]).await.unwrap();
    assert_eq!(reply, "local reply");
    mock.assert();
}

#[tokio::test]
async fn ollama_stream_forwards_chunks() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(POST)
            .path("/api/chat")
            .body_includes("\"stream\":true");
        then.status(200).body(
            "{\"message\":{\"content\":\"Hel\"},\"done\":false}\n\
             {\"message\":{\"content\":\"lo\"},\"done\":false}\n\
             {\"message\":{\"content\":\"\"},\"done\":true}\n",
        );
    });

    let client = OllamaClient::new(&ollama_config(&server));
    let mut stream = client
        .generate_stream(&[ChatMessage::user("hi")])
        .await
        .unwrap();
    let mut text = String::new();
    while let Some(chunk) = stream.next().await {
        text.push_str(&chunk.unwrap());
    }
    assert_eq!(text, "Hello");
}

#[tokio::test]
async fn ollama_health_checks_tags() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/api/tags");
        then.status(200).json_body(json!({"models": []}));
    });
    let client = OllamaClient::new(&ollama_config(&server));
    assert!(client.check_health().await);

    let down = OllamaClient::new(&LlmConfig {
        ollama_url: "http://127.0.0.1:9".to_string(),
        ..LlmConfig::default()
    });
    assert!(!down.check_health().await);
}

#[tokio::test]
async fn anthropic_pattern_analysis_parses_json_reply() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(POST).path("/v1/messages").body_includes("Conversation:");
        then.status(200).json_body(json!({
            "content": [{
                "type": "text",
                "text": "{\"mood\": \"focused\", \"topics\": [\"garden\"]}"
            }]
        }));
    });

    let client = anthropic(&server, 10);
    let analysis = client
        .analyze_patterns(&[ChatMessage::user("planning the garden")])
        .await
        .unwrap();
    assert_eq!(analysis.mood, "focused");
    assert_eq!(analysis.energy, "medium");
    assert_eq!(analysis.topics, vec!["garden".to_string()]);
}
