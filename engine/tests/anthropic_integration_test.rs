//! Integration tests for the Anthropic provider against a mock HTTP server.
//!
//! These tests exercise the Messages API wire format: request headers,
//! one-shot completions, SSE streaming and status-code mapping.

use futures::StreamExt;
use ongoal_engine::llm::anthropic::AnthropicProvider;
use ongoal_engine::llm::{LLMError, LLMProvider, Message};
use ongoal_engine::secrets::SecretString;
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn provider(server: &MockServer) -> AnthropicProvider {
    AnthropicProvider::new(
        format!("{}/v1", server.uri()),
        "claude-test",
        "2023-06-01",
        Some(SecretString::new("sk-test")),
    )
}

fn sse(events: &[(&str, serde_json::Value)]) -> String {
    events
        .iter()
        .map(|(name, data)| format!("event: {}\ndata: {}\n\n", name, data))
        .collect()
}

async fn collect(provider: &AnthropicProvider, messages: &[Message]) -> Vec<Result<String, LLMError>> {
    provider
        .generate_stream(messages, 256)
        .await
        .unwrap()
        .collect()
        .await
}

#[tokio::test]
async fn test_completion_sends_headers_and_joins_text() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .and(header("x-api-key", "sk-test"))
        .and(header("anthropic-version", "2023-06-01"))
        .and(body_partial_json(json!({ "model": "claude-test", "max_tokens": 100 })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "msg_test",
            "type": "message",
            "role": "assistant",
            "content": [
                { "type": "text", "text": "  {\"clauses\": " },
                { "type": "text", "text": "[]}\n" }
            ],
            "stop_reason": "end_turn"
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let reply = provider(&mock_server).generate("Infer goals", 100).await.unwrap();
    assert_eq!(reply, "{\"clauses\": []}");
}

#[tokio::test]
async fn test_stream_yields_text_deltas_until_message_stop() {
    let mock_server = MockServer::start().await;

    let body = sse(&[
        ("message_start", json!({"type": "message_start", "message": {"id": "msg_1"}})),
        (
            "content_block_start",
            json!({"type": "content_block_start", "index": 0, "content_block": {"type": "text", "text": ""}}),
        ),
        ("ping", json!({"type": "ping"})),
        (
            "content_block_delta",
            json!({"type": "content_block_delta", "index": 0, "delta": {"type": "text_delta", "text": "2+2 "}}),
        ),
        (
            "content_block_delta",
            json!({"type": "content_block_delta", "index": 0, "delta": {"type": "text_delta", "text": "is 4."}}),
        ),
        ("content_block_stop", json!({"type": "content_block_stop", "index": 0})),
        ("message_stop", json!({"type": "message_stop"})),
        // Anything after message_stop is ignored
        (
            "content_block_delta",
            json!({"type": "content_block_delta", "index": 0, "delta": {"type": "text_delta", "text": "late"}}),
        ),
    ]);

    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .and(body_partial_json(json!({ "stream": true, "system": "Be brief." })))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
        .mount(&mock_server)
        .await;

    let items = collect(
        &provider(&mock_server),
        &[Message::system("Be brief."), Message::user("What's 2+2?")],
    )
    .await;

    let texts: Vec<String> = items.into_iter().map(|r| r.unwrap()).collect();
    assert_eq!(texts, vec!["2+2 ", "is 4."]);
}

#[tokio::test]
async fn test_stream_error_event_ends_stream_with_error() {
    let mock_server = MockServer::start().await;

    let body = sse(&[
        (
            "content_block_delta",
            json!({"type": "content_block_delta", "index": 0, "delta": {"type": "text_delta", "text": "Par"}}),
        ),
        (
            "error",
            json!({"type": "error", "error": {"type": "overloaded_error", "message": "Overloaded"}}),
        ),
    ]);

    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
        .mount(&mock_server)
        .await;

    let items = collect(&provider(&mock_server), &[Message::user("Hi")]).await;

    assert_eq!(items.len(), 2);
    assert_eq!(items[0].as_ref().unwrap(), "Par");
    assert!(matches!(&items[1], Err(LLMError::ProviderUnavailable(m)) if m == "Overloaded"));
}

#[tokio::test]
async fn test_status_codes_are_mapped() {
    let cases = [
        (401, "auth"),
        (429, "rate"),
        (503, "unavailable"),
        (400, "invalid"),
    ];

    for (status, expected) in cases {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .respond_with(ResponseTemplate::new(status).set_body_string("nope"))
            .mount(&mock_server)
            .await;

        let err = provider(&mock_server).generate("hi", 10).await.unwrap_err();
        let matched = match expected {
            "auth" => matches!(err, LLMError::AuthenticationFailed(_)),
            "rate" => matches!(err, LLMError::RateLimitExceeded),
            "unavailable" => matches!(err, LLMError::ProviderUnavailable(_)),
            _ => matches!(err, LLMError::InvalidRequest(_)),
        };
        assert!(matched, "status {} mapped to {:?}", status, err);
    }
}

#[tokio::test]
async fn test_stream_open_failure_is_an_error() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .respond_with(ResponseTemplate::new(401).set_body_string("invalid x-api-key"))
        .mount(&mock_server)
        .await;

    let result = provider(&mock_server)
        .generate_stream(&[Message::user("Hi")], 10)
        .await;
    assert!(matches!(result, Err(LLMError::AuthenticationFailed(_))));
}

#[tokio::test]
async fn test_missing_key_makes_no_request() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&mock_server)
        .await;

    let provider = AnthropicProvider::new(
        format!("{}/v1", mock_server.uri()),
        "claude-test",
        "2023-06-01",
        None,
    );
    assert!(!provider.is_available());
    assert!(matches!(
        provider.generate("hi", 10).await,
        Err(LLMError::ProviderUnavailable(_))
    ));
}
