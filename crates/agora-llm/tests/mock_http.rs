//! Mock HTTP server tests for `OpenAiCompatProvider::complete()`.
//!
//! Uses [`wiremock`] to stand up a local HTTP server that emulates
//! OpenAI-compatible chat completion responses, exercising the full
//! request/response path without a real API.
//!
//! Coverage:
//! - Successful completion with text response
//! - Successful completion with tool calls
//! - 401 authentication failure
//! - 429 rate limiting with Retry-After extraction
//! - 404 model not found
//! - 400 context-length overflow
//! - 500 internal server error
//! - Empty choices array
//! - Custom headers forwarded correctly

use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use agora_llm::error::ProviderError;
use agora_llm::openai_compat::OpenAiCompatProvider;
use agora_llm::provider::Provider;
use agora_llm::types::{ChatMessage, ChatRequest};
use agora_types::ServiceConfig;

fn mock_service(server_url: &str) -> ServiceConfig {
    ServiceConfig::new("mock", server_url, "test-model")
}

fn test_request() -> ChatRequest {
    ChatRequest::new("test-model", vec![ChatMessage::user("Hello")])
}

// ── Successful completion ──────────────────────────────────────────────

#[tokio::test]
async fn complete_success_text_response() {
    let server = MockServer::start().await;

    let body = serde_json::json!({
        "id": "chatcmpl-test-001",
        "object": "chat.completion",
        "model": "test-model",
        "choices": [{
            "index": 0,
            "message": {"role": "assistant", "content": "Hello! How can I help?"},
            "finish_reason": "stop"
        }],
        "usage": {"prompt_tokens": 10, "completion_tokens": 8, "total_tokens": 18}
    });

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(header("Authorization", "Bearer sk-mock-key"))
        .and(header("Content-Type", "application/json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(&body))
        .expect(1)
        .mount(&server)
        .await;

    let provider =
        OpenAiCompatProvider::with_api_key(mock_service(&server.uri()), "sk-mock-key".into());
    let response = provider.complete(&test_request()).await.unwrap();

    assert_eq!(response.id, "chatcmpl-test-001");
    assert_eq!(response.choices.len(), 1);
    assert_eq!(
        response.choices[0].message.content.as_text(),
        "Hello! How can I help?"
    );
    assert_eq!(response.choices[0].finish_reason.as_deref(), Some("stop"));
    assert_eq!(response.usage.unwrap().total_tokens, 18);
}

#[tokio::test]
async fn complete_success_with_tool_calls() {
    let server = MockServer::start().await;

    let body = serde_json::json!({
        "id": "chatcmpl-tool-001",
        "object": "chat.completion",
        "model": "test-model",
        "choices": [{
            "index": 0,
            "message": {
                "role": "assistant",
                "content": "",
                "tool_calls": [{
                    "id": "call_abc123",
                    "type": "function",
                    "function": {
                        "name": "send_message",
                        "arguments": "{\"to\":\"root\",\"payload\":{\"text\":\"hi\"}}"
                    }
                }]
            },
            "finish_reason": "tool_calls"
        }]
    });

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(&body))
        .mount(&server)
        .await;

    let provider =
        OpenAiCompatProvider::with_api_key(mock_service(&server.uri()), "sk-mock-key".into());
    let response = provider.complete(&test_request()).await.unwrap();

    let calls = response.choices[0].message.tool_calls.as_ref().unwrap();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].id, "call_abc123");
    assert_eq!(calls[0].function.name, "send_message");
    assert_eq!(
        response.choices[0].finish_reason.as_deref(),
        Some("tool_calls")
    );
}

// ── Error mapping ──────────────────────────────────────────────────────

#[tokio::test]
async fn auth_failure_maps_to_auth_failed() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(401).set_body_json(serde_json::json!({
            "error": {"message": "Invalid API key"}
        })))
        .mount(&server)
        .await;

    let provider =
        OpenAiCompatProvider::with_api_key(mock_service(&server.uri()), "sk-bad".into());
    let err = provider.complete(&test_request()).await.unwrap_err();
    match err {
        ProviderError::AuthFailed(msg) => assert_eq!(msg, "Invalid API key"),
        other => panic!("expected AuthFailed, got: {other}"),
    }
}

#[tokio::test]
async fn rate_limit_maps_to_rate_limited_with_retry_after() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(
            ResponseTemplate::new(429)
                .insert_header("retry-after", "7")
                .set_body_string("slow down"),
        )
        .mount(&server)
        .await;

    let provider =
        OpenAiCompatProvider::with_api_key(mock_service(&server.uri()), "sk-mock".into());
    let err = provider.complete(&test_request()).await.unwrap_err();
    match err {
        ProviderError::RateLimited { retry_after_ms } => assert_eq!(retry_after_ms, 7000),
        other => panic!("expected RateLimited, got: {other}"),
    }
}

#[tokio::test]
async fn model_not_found_maps_to_model_not_found() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(404).set_body_string("no such model"))
        .mount(&server)
        .await;

    let provider =
        OpenAiCompatProvider::with_api_key(mock_service(&server.uri()), "sk-mock".into());
    let err = provider.complete(&test_request()).await.unwrap_err();
    match err {
        ProviderError::ModelNotFound(msg) => {
            assert!(msg.contains("test-model"));
            assert!(msg.contains("no such model"));
        }
        other => panic!("expected ModelNotFound, got: {other}"),
    }
}

#[tokio::test]
async fn context_overflow_maps_to_context_length_exceeded() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
            "error": {
                "message": "This model's maximum context length is 8192 tokens",
                "code": "context_length_exceeded"
            }
        })))
        .mount(&server)
        .await;

    let provider =
        OpenAiCompatProvider::with_api_key(mock_service(&server.uri()), "sk-mock".into());
    let err = provider.complete(&test_request()).await.unwrap_err();
    assert!(matches!(err, ProviderError::ContextLengthExceeded(_)));
    assert_eq!(err.code(), "context_limit_exceeded");
}

#[tokio::test]
async fn server_error_maps_to_request_failed() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .mount(&server)
        .await;

    let provider =
        OpenAiCompatProvider::with_api_key(mock_service(&server.uri()), "sk-mock".into());
    let err = provider.complete(&test_request()).await.unwrap_err();
    match err {
        ProviderError::RequestFailed(msg) => {
            assert!(msg.starts_with("HTTP 500"));
            assert!(msg.contains("boom"));
        }
        other => panic!("expected RequestFailed, got: {other}"),
    }
}

#[tokio::test]
async fn empty_choices_is_invalid_response() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "id": "chatcmpl-empty", "model": "test-model", "choices": []
        })))
        .mount(&server)
        .await;

    let provider =
        OpenAiCompatProvider::with_api_key(mock_service(&server.uri()), "sk-mock".into());
    let err = provider.complete(&test_request()).await.unwrap_err();
    assert!(matches!(err, ProviderError::InvalidResponse(_)));
}

#[tokio::test]
async fn custom_headers_forwarded() {
    let server = MockServer::start().await;

    let body = serde_json::json!({
        "id": "chatcmpl-h",
        "model": "test-model",
        "choices": [{
            "index": 0,
            "message": {"role": "assistant", "content": "ok"},
            "finish_reason": "stop"
        }]
    });

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(header("x-org-id", "agora-test"))
        .respond_with(ResponseTemplate::new(200).set_body_json(&body))
        .expect(1)
        .mount(&server)
        .await;

    let mut service = mock_service(&server.uri());
    service
        .headers
        .insert("x-org-id".into(), "agora-test".into());
    let provider = OpenAiCompatProvider::with_api_key(service, "sk-mock".into());
    provider.complete(&test_request()).await.unwrap();
}
