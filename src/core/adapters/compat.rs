//! OpenAI-compatible adapter
//!
//! The chat-completions wire shape shared by OpenAI itself and the
//! compatible local servers (Ollama, LM Studio, vLLM, ...). The dedicated
//! OpenAI adapter embeds this one and layers pricing on top; unknown
//! provider types resolve here via the registry fallback.

use serde_json::{Value, json};

use super::{Adapter, ResponseContext, classify};
use crate::core::pricing;
use crate::core::types::{
    ChatMessage, FinishReason, FunctionCallDelta, ImageAttachment, MessageRole, RawStreamEvent,
    ResponseFormat, ResponseMetadata, ToolCallDelta, ToolChoice, ToolChoiceMode,
    UnifiedChatRequest, UnifiedChatResponse, UnifiedError, UnifiedStreamChunk, Usage,
};

/// Adapter for the OpenAI-compatible family
#[derive(Debug, Clone)]
pub struct OpenAiCompatAdapter {
    provider_type: &'static str,
    /// Key into the pricing table; compat servers are absent and cost zero
    pricing_provider: &'static str,
}

impl Default for OpenAiCompatAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl OpenAiCompatAdapter {
    pub fn new() -> Self {
        Self {
            provider_type: "openai-compatible",
            pricing_provider: "openai-compatible",
        }
    }

    /// Variant used by the OpenAI adapter: same wire, real pricing
    pub(super) fn branded(provider_type: &'static str, pricing_provider: &'static str) -> Self {
        Self {
            provider_type,
            pricing_provider,
        }
    }

    /// Data URL for an image attachment (`data:<mime>;base64,<b64>` when inline)
    fn image_url(image: &ImageAttachment) -> Option<String> {
        if let Some(b64) = &image.base64 {
            Some(format!("data:{};base64,{}", image.media_type, b64))
        } else {
            image.url.clone()
        }
    }

    /// One unified message → OpenAI wire message
    fn wire_message(message: &ChatMessage, images: Option<&[ImageAttachment]>) -> Value {
        let mut out = json!({ "role": message.role.as_str() });

        match images {
            Some(images) if !images.is_empty() => {
                let mut parts = vec![json!({ "type": "text", "text": message.content })];
                for image in images {
                    if let Some(url) = Self::image_url(image) {
                        parts.push(json!({ "type": "image_url", "image_url": { "url": url } }));
                    }
                }
                out["content"] = Value::Array(parts);
            }
            _ => out["content"] = Value::String(message.content.clone()),
        }

        if let Some(name) = &message.name {
            out["name"] = json!(name);
        }
        if let Some(id) = &message.tool_call_id {
            out["tool_call_id"] = json!(id);
        }
        if let Some(calls) = &message.tool_calls {
            out["tool_calls"] = json!(calls);
        }
        out
    }

    fn wire_tool_choice(choice: &ToolChoice) -> Value {
        match choice {
            ToolChoice::Mode(ToolChoiceMode::Auto) => json!("auto"),
            ToolChoice::Mode(ToolChoiceMode::None) => json!("none"),
            ToolChoice::Named { name } => {
                json!({ "type": "function", "function": { "name": name } })
            }
        }
    }

    fn parse_usage(raw: &Value) -> Usage {
        let tokens = |field: &str| {
            raw.get("usage")
                .and_then(|u| u.get(field))
                .and_then(Value::as_u64)
                .unwrap_or(0) as u32
        };
        Usage::new(tokens("prompt_tokens"), tokens("completion_tokens"))
    }
}

impl Adapter for OpenAiCompatAdapter {
    fn provider_type(&self) -> &'static str {
        self.provider_type
    }

    fn normalize_request(
        &self,
        request: &UnifiedChatRequest,
        model: &str,
    ) -> Result<Value, UnifiedError> {
        // Vision images ride on the final user message
        let last_user = request
            .messages
            .iter()
            .rposition(|m| m.role == MessageRole::User);

        let messages: Vec<Value> = request
            .messages
            .iter()
            .enumerate()
            .map(|(i, m)| {
                let images = (Some(i) == last_user)
                    .then_some(request.images.as_deref())
                    .flatten();
                Self::wire_message(m, images)
            })
            .collect();

        let mut body = json!({ "model": model, "messages": messages });

        if let Some(t) = request.temperature {
            body["temperature"] = json!(t);
        }
        if let Some(max) = request.max_tokens {
            body["max_tokens"] = json!(max);
        }
        if let Some(format) = request.response_format {
            let kind = match format {
                ResponseFormat::Json => "json_object",
                _ => "text",
            };
            body["response_format"] = json!({ "type": kind });
        }
        if let Some(tools) = &request.tools {
            body["tools"] = json!(tools);
        }
        if let Some(choice) = &request.tool_choice {
            body["tool_choice"] = Self::wire_tool_choice(choice);
        }
        if let Some(functions) = &request.functions {
            body["functions"] = json!(functions);
        }

        Ok(body)
    }

    fn normalize_response(
        &self,
        raw: Value,
        cx: &ResponseContext,
    ) -> Result<UnifiedChatResponse, UnifiedError> {
        let choice = raw
            .get("choices")
            .and_then(Value::as_array)
            .and_then(|c| c.first())
            .ok_or_else(|| UnifiedError::provider("response has no choices"))?;
        let message = choice
            .get("message")
            .ok_or_else(|| UnifiedError::provider("choice has no message"))?;

        let mut usage = Self::parse_usage(&raw);
        let model = raw
            .get("model")
            .and_then(Value::as_str)
            .unwrap_or(cx.model.as_str());
        usage.estimated_cost = pricing::estimate_cost(&usage, self.pricing_provider, model);

        let tools = message
            .get("tool_calls")
            .cloned()
            .and_then(|v| serde_json::from_value(v).ok());

        Ok(UnifiedChatResponse {
            id: raw
                .get("id")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            content: message
                .get("content")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
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
            tools,
            finish_reason: choice
                .get("finish_reason")
                .and_then(Value::as_str)
                .and_then(FinishReason::parse),
        })
    }

    fn normalize_stream_chunk(&self, event: &RawStreamEvent) -> Option<UnifiedStreamChunk> {
        let data = &event.data;

        // Classification precedence: error, done, tool, function, content, meta
        if let Some(error) = data.get("error").filter(|e| !e.is_null()) {
            let body = json!({ "error": error }).to_string();
            return Some(UnifiedStreamChunk::Error {
                error: self.normalize_error(None, &body),
            });
        }

        let choice = data.get("choices").and_then(Value::as_array)?.first()?;

        if let Some(reason) = choice
            .get("finish_reason")
            .and_then(Value::as_str)
            .filter(|r| !r.is_empty())
        {
            let mut usage = None;
            if data.get("usage").is_some_and(|u| !u.is_null()) {
                let mut parsed = Self::parse_usage(data);
                parsed.estimated_cost = pricing::estimate_cost(
                    &parsed,
                    self.pricing_provider,
                    data.get("model").and_then(Value::as_str).unwrap_or(""),
                );
                usage = Some(parsed);
            }
            return Some(UnifiedStreamChunk::Done {
                finish_reason: FinishReason::parse(reason).unwrap_or(FinishReason::Stop),
                usage,
            });
        }

        let delta = choice.get("delta")?;

        if let Some(calls) = delta.get("tool_calls").and_then(Value::as_array) {
            let call = calls.first()?;
            return Some(UnifiedStreamChunk::ToolUse {
                tool_call: ToolCallDelta {
                    index: call.get("index").and_then(Value::as_u64).unwrap_or(0) as u32,
                    id: call.get("id").and_then(Value::as_str).map(str::to_string),
                    name: call
                        .pointer("/function/name")
                        .and_then(Value::as_str)
                        .map(str::to_string),
                    arguments: call
                        .pointer("/function/arguments")
                        .and_then(Value::as_str)
                        .map(str::to_string),
                },
            });
        }

        if let Some(call) = delta.get("function_call") {
            return Some(UnifiedStreamChunk::FunctionCall {
                function_call: FunctionCallDelta {
                    name: call.get("name").and_then(Value::as_str).map(str::to_string),
                    arguments: call
                        .get("arguments")
                        .and_then(Value::as_str)
                        .map(str::to_string),
                },
            });
        }

        if let Some(content) = delta.get("content").and_then(Value::as_str) {
            return Some(UnifiedStreamChunk::content(content));
        }

        let role = delta
            .get("role")
            .and_then(Value::as_str)
            .and_then(|r| serde_json::from_value(Value::String(r.to_string())).ok());
        let model = data
            .get("model")
            .and_then(Value::as_str)
            .map(str::to_string);
        if role.is_some() || model.is_some() {
            return Some(UnifiedStreamChunk::Meta { role, model });
        }

        None
    }

    fn normalize_error(&self, status: Option<u16>, body: &str) -> UnifiedError {
        classify::classify(status, body)
    }
}
