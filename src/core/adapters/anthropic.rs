//! Anthropic adapter
//!
//! Claude's messages API differs from the chat-completions wire in three
//! structural ways: system prompts are a top-level field, message content is
//! a list of typed blocks, and streaming is a family of named SSE events.
//! This adapter owns all three translations plus Claude-specific error
//! fallback hints.

use serde_json::{Value, json};

use super::{Adapter, ResponseContext, classify};
use crate::core::pricing;
use crate::core::types::{
    ChatMessage, ErrorKind, FinishReason, FunctionCall, ImageAttachment, MessageRole,
    RawStreamEvent, ResponseFormat, ResponseMetadata, ToolCall, ToolCallDelta, ToolChoice,
    ToolChoiceMode, UnifiedChatRequest, UnifiedChatResponse, UnifiedError, UnifiedStreamChunk,
    Usage,
};

/// Claude responses default to this output budget when the caller sets none
const DEFAULT_MAX_TOKENS: u32 = 4096;

/// Adapter for api.anthropic.com
#[derive(Debug, Clone, Default)]
pub struct AnthropicAdapter;

impl AnthropicAdapter {
    pub fn new() -> Self {
        Self
    }

    fn map_stop_reason(reason: &str) -> FinishReason {
        match reason {
            "end_turn" => FinishReason::Stop,
            "max_tokens" => FinishReason::Length,
            "tool_use" => FinishReason::ToolCalls,
            _ => FinishReason::Stop,
        }
    }

    fn image_block(image: &ImageAttachment) -> Option<Value> {
        if let Some(b64) = &image.base64 {
            Some(json!({
                "type": "image",
                "source": { "type": "base64", "media_type": image.media_type, "data": b64 }
            }))
        } else {
            image.url.as_ref().map(|url| {
                json!({ "type": "image", "source": { "type": "url", "url": url } })
            })
        }
    }

    /// One unified message → Claude wire message with content blocks
    fn wire_message(message: &ChatMessage, images: Option<&[ImageAttachment]>) -> Value {
        match message.role {
            // Tool results come back as user messages carrying a tool_result block
            MessageRole::Tool | MessageRole::Function => json!({
                "role": "user",
                "content": [{
                    "type": "tool_result",
                    "tool_use_id": message.tool_call_id.clone().unwrap_or_default(),
                    "content": message.content,
                }]
            }),
            MessageRole::Assistant => {
                let mut blocks = Vec::new();
                if !message.content.is_empty() {
                    blocks.push(json!({ "type": "text", "text": message.content }));
                }
                for call in message.tool_calls.iter().flatten() {
                    let input: Value = serde_json::from_str(&call.function.arguments)
                        .unwrap_or_else(|_| json!({}));
                    blocks.push(json!({
                        "type": "tool_use",
                        "id": call.id,
                        "name": call.function.name,
                        "input": input,
                    }));
                }
                if blocks.is_empty() {
                    blocks.push(json!({ "type": "text", "text": "" }));
                }
                json!({ "role": "assistant", "content": blocks })
            }
            _ => {
                let mut blocks = vec![json!({ "type": "text", "text": message.content })];
                for image in images.unwrap_or_default() {
                    if let Some(block) = Self::image_block(image) {
                        blocks.push(block);
                    }
                }
                json!({ "role": "user", "content": blocks })
            }
        }
    }
}

impl Adapter for AnthropicAdapter {
    fn provider_type(&self) -> &'static str {
        "anthropic"
    }

    fn normalize_request(
        &self,
        request: &UnifiedChatRequest,
        model: &str,
    ) -> Result<Value, UnifiedError> {
        // System messages lift out into the top-level system string
        let mut system_parts: Vec<&str> = request
            .messages
            .iter()
            .filter(|m| m.role == MessageRole::System)
            .map(|m| m.content.as_str())
            .collect();
        if request.response_format == Some(ResponseFormat::Json) {
            system_parts.push("Respond with valid JSON only.");
        }

        let last_user = request
            .messages
            .iter()
            .rposition(|m| m.role == MessageRole::User);

        let messages: Vec<Value> = request
            .messages
            .iter()
            .enumerate()
            .filter(|(_, m)| m.role != MessageRole::System)
            .map(|(i, m)| {
                let images = (Some(i) == last_user)
                    .then_some(request.images.as_deref())
                    .flatten();
                Self::wire_message(m, images)
            })
            .collect();

        let mut body = json!({
            "model": model,
            "messages": messages,
            "max_tokens": request.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
        });

        if !system_parts.is_empty() {
            body["system"] = json!(system_parts.join("\n\n"));
        }
        if let Some(t) = request.temperature {
            body["temperature"] = json!(t);
        }
        if let Some(tools) = &request.tools {
            let tools: Vec<Value> = tools
                .iter()
                .map(|t| {
                    json!({
                        "name": t.function.name,
                        "description": t.function.description.clone().unwrap_or_default(),
                        "input_schema": t.function.parameters.clone()
                            .unwrap_or_else(|| json!({ "type": "object" })),
                    })
                })
                .collect();
            body["tools"] = json!(tools);
            match &request.tool_choice {
                Some(ToolChoice::Named { name }) => {
                    body["tool_choice"] = json!({ "type": "tool", "name": name });
                }
                Some(ToolChoice::Mode(ToolChoiceMode::None)) => {
                    // Claude has no "none": withdrawing the tools is the same statement
                    if let Some(obj) = body.as_object_mut() {
                        obj.remove("tools");
                    }
                }
                Some(ToolChoice::Mode(ToolChoiceMode::Auto)) | None => {}
            }
        }

        Ok(body)
    }

    fn normalize_response(
        &self,
        raw: Value,
        cx: &ResponseContext,
    ) -> Result<UnifiedChatResponse, UnifiedError> {
        let blocks = raw
            .get("content")
            .and_then(Value::as_array)
            .ok_or_else(|| UnifiedError::provider("response has no content blocks"))?;

        let mut content = String::new();
        let mut tools: Vec<ToolCall> = Vec::new();
        for block in blocks {
            match block.get("type").and_then(Value::as_str) {
                Some("text") => {
                    content.push_str(block.get("text").and_then(Value::as_str).unwrap_or(""));
                }
                Some("tool_use") => {
                    tools.push(ToolCall {
                        id: block
                            .get("id")
                            .and_then(Value::as_str)
                            .unwrap_or_default()
                            .to_string(),
                        tool_type: "function".to_string(),
                        function: FunctionCall {
                            name: block
                                .get("name")
                                .and_then(Value::as_str)
                                .unwrap_or_default()
                                .to_string(),
                            arguments: block
                                .get("input")
                                .map(Value::to_string)
                                .unwrap_or_else(|| "{}".to_string()),
                        },
                    });
                }
                _ => {}
            }
        }

        let tokens = |field: &str| {
            raw.pointer(&format!("/usage/{field}"))
                .and_then(Value::as_u64)
                .unwrap_or(0) as u32
        };
        let mut usage = Usage::new(tokens("input_tokens"), tokens("output_tokens"));
        let model = raw
            .get("model")
            .and_then(Value::as_str)
            .unwrap_or(cx.model.as_str());
        usage.estimated_cost = pricing::estimate_cost(&usage, "anthropic", model);

        Ok(UnifiedChatResponse {
            id: raw
                .get("id")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            content,
            role: MessageRole::Assistant,
            usage,
            metadata: ResponseMetadata {
                provider: cx.provider.clone(),
                model: model.to_string(),
                connection_id: cx.connection_id,
                latency_ms: cx.latency_ms,
                retries: cx.retries,
                fallback_used: cx.fallback_used,
                truncated: false,
            },
            functions: None,
            tools: (!tools.is_empty()).then_some(tools),
            finish_reason: raw
                .get("stop_reason")
                .and_then(Value::as_str)
                .map(Self::map_stop_reason),
        })
    }

    fn normalize_stream_chunk(&self, event: &RawStreamEvent) -> Option<UnifiedStreamChunk> {
        let data = &event.data;
        let event_type = event
            .event
            .as_deref()
            .or_else(|| data.get("type").and_then(Value::as_str))?;

        match event_type {
            "message_start" => Some(UnifiedStreamChunk::Meta {
                role: Some(MessageRole::Assistant),
                model: data
                    .pointer("/message/model")
                    .and_then(Value::as_str)
                    .map(str::to_string),
            }),
            "content_block_start" => {
                let block = data.get("content_block")?;
                if block.get("type").and_then(Value::as_str) == Some("tool_use") {
                    Some(UnifiedStreamChunk::ToolUse {
                        tool_call: ToolCallDelta {
                            index: data.get("index").and_then(Value::as_u64).unwrap_or(0) as u32,
                            id: block.get("id").and_then(Value::as_str).map(str::to_string),
                            name: block.get("name").and_then(Value::as_str).map(str::to_string),
                            arguments: None,
                        },
                    })
                } else {
                    None
                }
            }
            "content_block_delta" => {
                let delta = data.get("delta")?;
                match delta.get("type").and_then(Value::as_str) {
                    Some("text_delta") => Some(UnifiedStreamChunk::content(
                        delta.get("text").and_then(Value::as_str).unwrap_or(""),
                    )),
                    Some("input_json_delta") => Some(UnifiedStreamChunk::ToolUse {
                        tool_call: ToolCallDelta {
                            index: data.get("index").and_then(Value::as_u64).unwrap_or(0) as u32,
                            id: None,
                            name: None,
                            arguments: delta
                                .get("partial_json")
                                .and_then(Value::as_str)
                                .map(str::to_string),
                        },
                    }),
                    _ => None,
                }
            }
            "message_delta" => {
                let reason = data
                    .pointer("/delta/stop_reason")
                    .and_then(Value::as_str)
                    .filter(|r| !r.is_empty())?;
                let usage = data.pointer("/usage/output_tokens").and_then(Value::as_u64).map(
                    |output| Usage::new(0, output as u32),
                );
                Some(UnifiedStreamChunk::Done {
                    finish_reason: Self::map_stop_reason(reason),
                    usage,
                })
            }
            "error" => {
                let body = data.to_string();
                Some(UnifiedStreamChunk::Error {
                    error: self.normalize_error(None, &body),
                })
            }
            // message_stop follows the terminal message_delta; ping is a heartbeat
            _ => None,
        }
    }

    fn normalize_error(&self, status: Option<u16>, body: &str) -> UnifiedError {
        let mut error = classify::classify(status, body);
        // Claude throttling has a well-trodden escape hatch
        if error.kind == ErrorKind::RateLimit {
            error = error.with_fallback("openai", "gpt-3.5-turbo", "anthropic rate limited");
        }
        error
    }
}
