//! End-to-end chat flows against mocked providers

use futures_util::StreamExt;
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use unigate::core::types::{
    ChatMessage, ErrorKind, GatewayError, RoutePreferences, UnifiedChatRequest, UnifiedStreamChunk,
};

use crate::common::{
    mock_connection, openai_completion_body, openai_sse_body, test_orchestrator, test_user,
};

fn chat_request(user_id: uuid::Uuid, provider: &str, model: &str) -> UnifiedChatRequest {
    let mut request = UnifiedChatRequest::new(vec![ChatMessage::user("hi")]);
    request.user_id = user_id;
    request.preferences = RoutePreferences {
        connection_id: None,
        provider: Some(provider.to_string()),
        model: Some(model.to_string()),
        capabilities: Vec::new(),
    };
    request
}

// ==================== Unary ====================

#[tokio::test]
async fn test_unary_chat_round_trip() {
    let upstream = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(openai_completion_body("gpt-3.5-turbo", "Hello there!")),
        )
        .expect(1)
        .mount(&upstream)
        .await;

    let gateway = test_orchestrator().await;
    let user = test_user();
    mock_connection(
        gateway.connections(),
        user,
        "openai",
        &upstream.uri(),
        &["gpt-3.5-turbo"],
    )
    .await;

    let response = gateway
        .chat(
            chat_request(user, "openai", "gpt-3.5-turbo"),
            CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(response.role, unigate::core::types::MessageRole::Assistant);
    assert_eq!(response.content, "Hello there!");
    assert_eq!(response.metadata.provider, "openai");
    assert!(response.usage.total_tokens > 0);
    assert_eq!(
        response.usage.total_tokens,
        response.usage.prompt_tokens + response.usage.completion_tokens
    );
    assert!(response.usage.estimated_cost > 0.0);
}

#[tokio::test]
async fn test_unknown_provider_type_rides_compat_wire() {
    let upstream = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(openai_completion_body("mystery-7b", "ok")),
        )
        .mount(&upstream)
        .await;

    let gateway = test_orchestrator().await;
    let user = test_user();
    mock_connection(
        gateway.connections(),
        user,
        "mystery",
        &upstream.uri(),
        &["mystery-7b"],
    )
    .await;

    let response = gateway
        .chat(
            chat_request(user, "mystery", "mystery-7b"),
            CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(response.content, "ok");
    // Never priced off the openai table
    assert_eq!(response.usage.estimated_cost, 0.0);
}

#[tokio::test]
async fn test_no_connection_resolves_to_invalid() {
    let gateway = test_orchestrator().await;
    let user = test_user();

    let err = gateway
        .chat(
            chat_request(user, "openai", "gpt-4"),
            CancellationToken::new(),
        )
        .await
        .unwrap_err();

    match err {
        GatewayError::Upstream(unified) => assert_eq!(unified.kind, ErrorKind::Invalid),
        other => panic!("expected invalid, got {other:?}"),
    }
}

// ==================== Streaming ====================

#[tokio::test]
async fn test_stream_delivers_content_then_single_done() {
    let upstream = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_raw(openai_sse_body("gpt-3.5-turbo", &["Hel", "lo"]), "text/event-stream"),
        )
        .mount(&upstream)
        .await;

    let gateway = test_orchestrator().await;
    let user = test_user();
    mock_connection(
        gateway.connections(),
        user,
        "openai",
        &upstream.uri(),
        &["gpt-3.5-turbo"],
    )
    .await;

    let mut stream = gateway
        .chat_stream(
            chat_request(user, "openai", "gpt-3.5-turbo"),
            CancellationToken::new(),
        )
        .await
        .unwrap();

    let mut chunks = Vec::new();
    while let Some(chunk) = stream.next().await {
        chunks.push(chunk);
    }

    let contents: Vec<&str> = chunks
        .iter()
        .filter_map(|c| match c {
            UnifiedStreamChunk::Content { content } => Some(content.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(contents.join(""), "Hello");

    let dones = chunks
        .iter()
        .filter(|c| matches!(c, UnifiedStreamChunk::Done { .. }))
        .count();
    assert_eq!(dones, 1);
    assert!(matches!(chunks.last().unwrap(), UnifiedStreamChunk::Done { .. }));
    assert!(!chunks.iter().any(|c| matches!(c, UnifiedStreamChunk::Error { .. })));
}

#[tokio::test]
async fn test_stream_persists_assistant_turn_in_order() {
    let upstream = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_raw(openai_sse_body("gpt-3.5-turbo", &["str", "eamed"]), "text/event-stream"),
        )
        .mount(&upstream)
        .await;

    let gateway = test_orchestrator().await;
    let user = test_user();
    mock_connection(
        gateway.connections(),
        user,
        "openai",
        &upstream.uri(),
        &["gpt-3.5-turbo"],
    )
    .await;
    let session = gateway
        .sessions()
        .create_session(user, "streamed", None, None)
        .await
        .unwrap();

    let mut request = chat_request(user, "openai", "gpt-3.5-turbo");
    request.session_id = Some(session.id);

    let mut stream = gateway
        .chat_stream(request, CancellationToken::new())
        .await
        .unwrap();
    while stream.next().await.is_some() {}

    // The assistant write happens after the stream closes; give it a beat
    let messages = wait_for_messages(&gateway, session.id, 2).await;
    assert_eq!(messages[0].role, "user");
    assert_eq!(messages[0].content, "hi");
    assert_eq!(messages[1].role, "assistant");
    assert_eq!(messages[1].content, "streamed");
    assert!(messages[1].metadata.get("truncated").is_none());
    assert!(messages[0].created_at <= messages[1].created_at);
}

#[tokio::test]
async fn test_abandoned_stream_persists_truncated_partial() {
    // Forty single-character deltas and a consumer that walks away after
    // two: the bounded channel fills, the send fails, and the partial is
    // stored flagged
    let deltas: Vec<String> = (0..40).map(|_| "a".to_string()).collect();
    let delta_refs: Vec<&str> = deltas.iter().map(String::as_str).collect();

    let upstream = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_raw(openai_sse_body("gpt-3.5-turbo", &delta_refs), "text/event-stream"),
        )
        .mount(&upstream)
        .await;

    let gateway = test_orchestrator().await;
    let user = test_user();
    mock_connection(
        gateway.connections(),
        user,
        "openai",
        &upstream.uri(),
        &["gpt-3.5-turbo"],
    )
    .await;
    let session = gateway
        .sessions()
        .create_session(user, "abandoned", None, None)
        .await
        .unwrap();

    let mut request = chat_request(user, "openai", "gpt-3.5-turbo");
    request.session_id = Some(session.id);

    let mut stream = gateway
        .chat_stream(request, CancellationToken::new())
        .await
        .unwrap();
    // Read a couple of chunks, then hang up
    let _ = stream.next().await;
    let _ = stream.next().await;
    drop(stream);

    let messages = wait_for_messages(&gateway, session.id, 2).await;
    let assistant = &messages[1];
    assert_eq!(assistant.role, "assistant");
    assert!(!assistant.content.is_empty());
    assert!(assistant.content.len() < 40);
    assert!(assistant.content.chars().all(|c| c == 'a'));
    assert_eq!(assistant.metadata["truncated"], json!(true));
}

#[tokio::test]
async fn test_cancellation_before_response_is_distinct() {
    let upstream = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(openai_completion_body("gpt-3.5-turbo", "late"))
                .set_delay(std::time::Duration::from_secs(5)),
        )
        .mount(&upstream)
        .await;

    let gateway = test_orchestrator().await;
    let user = test_user();
    mock_connection(
        gateway.connections(),
        user,
        "openai",
        &upstream.uri(),
        &["gpt-3.5-turbo"],
    )
    .await;

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        trigger.cancel();
    });

    let err = gateway
        .chat(chat_request(user, "openai", "gpt-3.5-turbo"), cancel)
        .await
        .unwrap_err();
    assert!(matches!(err, GatewayError::Cancelled));
}

// ==================== Anthropic wire ====================

#[tokio::test]
async fn test_anthropic_system_lift_on_the_wire() {
    let upstream = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "msg_test",
            "type": "message",
            "role": "assistant",
            "model": "claude-3-haiku-20240307",
            "content": [{ "type": "text", "text": "hello from claude" }],
            "stop_reason": "end_turn",
            "usage": { "input_tokens": 10, "output_tokens": 5 }
        })))
        .expect(1)
        .mount(&upstream)
        .await;

    let gateway = test_orchestrator().await;
    let user = test_user();
    mock_connection(
        gateway.connections(),
        user,
        "anthropic",
        &upstream.uri(),
        &["claude-3-haiku-20240307"],
    )
    .await;

    let mut request = chat_request(user, "anthropic", "claude-3-haiku-20240307");
    request.messages = vec![ChatMessage::system("S"), ChatMessage::user("U")];

    let response = gateway
        .chat(request, CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(response.content, "hello from claude");

    // Inspect what actually crossed the wire
    let requests = upstream.received_requests().await.unwrap();
    let body: Value = serde_json::from_slice(&requests[0].body).unwrap();
    assert_eq!(body["system"], "S");
    assert_eq!(body["messages"].as_array().unwrap().len(), 1);
    assert_eq!(body["messages"][0]["role"], "user");
    assert_eq!(body["messages"][0]["content"][0]["type"], "text");
    assert_eq!(body["messages"][0]["content"][0]["text"], "U");
    assert_eq!(body["max_tokens"], 4096);

    let headers = &requests[0].headers;
    assert_eq!(headers.get("x-api-key").unwrap().to_str().unwrap(), "sk-test");
    assert_eq!(
        headers.get("anthropic-version").unwrap().to_str().unwrap(),
        "2023-06-01"
    );
}

#[tokio::test]
async fn test_anthropic_rate_limit_classified_with_fallback() {
    let upstream = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .respond_with(ResponseTemplate::new(429).set_body_json(json!({
            "type": "error",
            "error": { "type": "rate_limit_error", "message": "rate limit exceeded" }
        })))
        // The orchestrator retries rate limits once before giving up
        .expect(2)
        .mount(&upstream)
        .await;

    let gateway = test_orchestrator().await;
    let user = test_user();
    mock_connection(
        gateway.connections(),
        user,
        "anthropic",
        &upstream.uri(),
        &["claude-3-haiku-20240307"],
    )
    .await;

    let err = gateway
        .chat(
            chat_request(user, "anthropic", "claude-3-haiku-20240307"),
            CancellationToken::new(),
        )
        .await
        .unwrap_err();

    let unified = match err {
        GatewayError::Upstream(unified) => unified,
        other => panic!("expected upstream error, got {other:?}"),
    };
    assert_eq!(unified.kind, ErrorKind::RateLimit);
    assert!(unified.retry);
    let fallback = unified.fallback.expect("fallback suggestion");
    assert_eq!(fallback.provider, "openai");
    assert_eq!(fallback.model, "gpt-3.5-turbo");
}

#[tokio::test]
async fn test_rate_limited_anthropic_falls_back_to_openai() {
    let anthropic = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .respond_with(ResponseTemplate::new(429).set_body_json(json!({
            "type": "error",
            "error": { "type": "rate_limit_error", "message": "rate limit exceeded" }
        })))
        .mount(&anthropic)
        .await;

    let openai = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(openai_completion_body("gpt-3.5-turbo", "fallback answer")),
        )
        .expect(1)
        .mount(&openai)
        .await;

    let gateway = test_orchestrator().await;
    let user = test_user();
    mock_connection(
        gateway.connections(),
        user,
        "anthropic",
        &anthropic.uri(),
        &["claude-3-haiku-20240307"],
    )
    .await;
    mock_connection(
        gateway.connections(),
        user,
        "openai",
        &openai.uri(),
        &["gpt-3.5-turbo"],
    )
    .await;

    let response = gateway
        .chat(
            chat_request(user, "anthropic", "claude-3-haiku-20240307"),
            CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(response.content, "fallback answer");
    assert_eq!(response.metadata.provider, "openai");
    assert!(response.metadata.fallback_used);
    assert!(response.metadata.retries >= 1);
}

// ==================== Helpers ====================

async fn wait_for_messages(
    gateway: &unigate::core::orchestrator::Orchestrator,
    session_id: uuid::Uuid,
    expected: usize,
) -> Vec<unigate::storage::Message> {
    for _ in 0..40 {
        let messages = gateway.sessions().list_messages(session_id).await.unwrap();
        if messages.len() >= expected {
            return messages;
        }
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    }
    panic!("session never reached {expected} messages");
}
