//! OpenAI-compatible facade
//!
//! `POST /chat/completions` accepts the chat-completions schema, rides the
//! same orchestration core, and reshapes responses and stream chunks back
//! into OpenAI's format. Provider choice is inferred from the model name;
//! anything unrecognized falls through to the user's default connection.

use actix_web::http::header::{CACHE_CONTROL, CONTENT_TYPE};
use actix_web::{HttpRequest, HttpResponse, Result as ActixResult, web};
use futures_util::StreamExt;
use serde::Deserialize;
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::{authenticated_user, gateway_error_response};
use crate::core::types::{
    ChatMessage, FinishReason, GatewayError, MessageRole, RoutePreferences, UnifiedChatRequest,
    UnifiedStreamChunk,
};
use crate::server::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ChatCompletionRequest {
    pub model: String,
    pub messages: Vec<FacadeMessage>,
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default)]
    pub max_tokens: Option<u32>,
    #[serde(default)]
    pub stream: Option<bool>,
    #[serde(default)]
    pub user: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct FacadeMessage {
    pub role: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub tool_call_id: Option<String>,
}

fn parse_role(role: &str) -> MessageRole {
    match role {
        "system" => MessageRole::System,
        "assistant" => MessageRole::Assistant,
        "tool" => MessageRole::Tool,
        "function" => MessageRole::Function,
        _ => MessageRole::User,
    }
}

/// Provider family inferred from a model name
fn infer_provider(model: &str) -> Option<String> {
    if model.starts_with("claude") {
        Some("anthropic".to_string())
    } else if model.starts_with("gpt-") || model.starts_with("o1") {
        Some("openai".to_string())
    } else {
        None
    }
}

fn finish_reason_str(reason: Option<FinishReason>) -> &'static str {
    match reason {
        Some(FinishReason::Length) => "length",
        Some(FinishReason::ToolCalls) => "tool_calls",
        Some(FinishReason::FunctionCall) => "function_call",
        Some(FinishReason::ContentFilter) => "content_filter",
        _ => "stop",
    }
}

fn to_unified(facade: ChatCompletionRequest, user_id: Uuid) -> UnifiedChatRequest {
    let messages = facade
        .messages
        .into_iter()
        .map(|m| ChatMessage {
            role: parse_role(&m.role),
            content: m.content,
            name: m.name,
            tool_call_id: m.tool_call_id,
            tool_calls: None,
        })
        .collect();

    let mut request = UnifiedChatRequest::new(messages);
    request.temperature = facade.temperature;
    request.max_tokens = facade.max_tokens;
    request.preferences = RoutePreferences {
        connection_id: None,
        provider: infer_provider(&facade.model),
        model: Some(facade.model),
        capabilities: Vec::new(),
    };
    request.user_id = user_id;
    request
}

pub async fn chat_completions(
    state: web::Data<AppState>,
    req: HttpRequest,
    body: web::Json<ChatCompletionRequest>,
) -> ActixResult<HttpResponse> {
    let user_id = authenticated_user(&req)?;
    let facade = body.into_inner();
    let streaming = facade.stream.unwrap_or(false);
    let request = to_unified(facade, user_id);

    if streaming {
        return stream_completions(state, request).await;
    }

    match state.orchestrator.chat(request, CancellationToken::new()).await {
        Ok(response) => {
            let body = json!({
                "id": format!("chatcmpl-{}", response.id),
                "object": "chat.completion",
                "created": chrono::Utc::now().timestamp(),
                "model": response.metadata.model,
                "choices": [{
                    "index": 0,
                    "message": {
                        "role": "assistant",
                        "content": response.content,
                        "tool_calls": response.tools,
                    },
                    "finish_reason": finish_reason_str(response.finish_reason),
                }],
                "usage": {
                    "prompt_tokens": response.usage.prompt_tokens,
                    "completion_tokens": response.usage.completion_tokens,
                    "total_tokens": response.usage.total_tokens,
                },
            });
            Ok(HttpResponse::Ok().json(body))
        }
        Err(error) => Ok(gateway_error_response(&error)),
    }
}

async fn stream_completions(
    state: web::Data<AppState>,
    request: UnifiedChatRequest,
) -> ActixResult<HttpResponse> {
    let model = request
        .preferences
        .model
        .clone()
        .unwrap_or_default();

    let mut chunks = match state
        .orchestrator
        .chat_stream(request, CancellationToken::new())
        .await
    {
        Ok(chunks) => chunks,
        Err(error) => return Ok(gateway_error_response(&error)),
    };

    let stream_id = format!("chatcmpl-{}", Uuid::new_v4());
    let created = chrono::Utc::now().timestamp();

    let sse = async_stream::stream! {
        while let Some(chunk) = chunks.next().await {
            let terminal = chunk.is_terminal();
            if let Some(payload) = facade_chunk(&stream_id, created, &model, chunk) {
                yield Ok::<_, GatewayError>(web::Bytes::from(format!("data: {payload}\n\n")));
            }
            if terminal {
                break;
            }
        }
        yield Ok(web::Bytes::from("data: [DONE]\n\n"));
    };

    Ok(HttpResponse::Ok()
        .insert_header((CONTENT_TYPE, "text/event-stream"))
        .insert_header((CACHE_CONTROL, "no-cache"))
        .streaming(sse))
}

/// One tagged chunk → one OpenAI-format stream chunk
fn facade_chunk(id: &str, created: i64, model: &str, chunk: UnifiedStreamChunk) -> Option<String> {
    let (delta, finish_reason): (Value, Value) = match chunk {
        UnifiedStreamChunk::Meta { role, .. } => (
            json!({ "role": role.map(|r| r.as_str()).unwrap_or("assistant") }),
            Value::Null,
        ),
        UnifiedStreamChunk::Content { content } => (json!({ "content": content }), Value::Null),
        UnifiedStreamChunk::ToolUse { tool_call } => (
            json!({
                "tool_calls": [{
                    "index": tool_call.index,
                    "id": tool_call.id,
                    "type": "function",
                    "function": { "name": tool_call.name, "arguments": tool_call.arguments },
                }]
            }),
            Value::Null,
        ),
        UnifiedStreamChunk::FunctionCall { function_call } => (
            json!({ "function_call": function_call }),
            Value::Null,
        ),
        UnifiedStreamChunk::Done { finish_reason, .. } => (
            json!({}),
            json!(finish_reason_str(Some(finish_reason))),
        ),
        UnifiedStreamChunk::Error { error } => {
            return Some(json!({ "error": error }).to_string());
        }
    };

    Some(
        json!({
            "id": id,
            "object": "chat.completion.chunk",
            "created": created,
            "model": model,
            "choices": [{ "index": 0, "delta": delta, "finish_reason": finish_reason }],
        })
        .to_string(),
    )
}
