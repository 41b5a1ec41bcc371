//! Streaming chunk types
//!
//! `UnifiedStreamChunk` is the tagged envelope relayed to clients; one
//! payload per tag. `RawStreamEvent` is what drivers emit before adapter
//! normalization: the provider's own event name and JSON body.

use serde::{Deserialize, Serialize};

use super::error::UnifiedError;
use super::message::MessageRole;
use super::response::{FinishReason, Usage};

/// Incremental tool-call fragment
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallDelta {
    pub index: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// JSON argument fragment, concatenated by the consumer
    #[serde(skip_serializing_if = "Option::is_none")]
    pub arguments: Option<String>,
}

/// Incremental legacy function-call fragment
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionCallDelta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub arguments: Option<String>,
}

/// One element of the stream relayed to the client
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum UnifiedStreamChunk {
    /// Role/model metadata, usually the first chunk
    Meta {
        #[serde(skip_serializing_if = "Option::is_none")]
        role: Option<MessageRole>,
        #[serde(skip_serializing_if = "Option::is_none")]
        model: Option<String>,
    },
    /// Text delta
    Content { content: String },
    /// Legacy function-call delta
    FunctionCall { function_call: FunctionCallDelta },
    /// Tool-call delta
    ToolUse { tool_call: ToolCallDelta },
    /// Terminal success marker; at most one per stream
    Done {
        finish_reason: FinishReason,
        #[serde(skip_serializing_if = "Option::is_none")]
        usage: Option<Usage>,
    },
    /// Terminal failure marker; at most one per stream, never after Done
    Error { error: UnifiedError },
}

impl UnifiedStreamChunk {
    pub fn content(text: impl Into<String>) -> Self {
        Self::Content {
            content: text.into(),
        }
    }

    pub fn done(finish_reason: FinishReason) -> Self {
        Self::Done {
            finish_reason,
            usage: None,
        }
    }

    /// Whether this chunk ends the stream
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done { .. } | Self::Error { .. })
    }
}

/// A provider event before normalization
#[derive(Debug, Clone)]
pub struct RawStreamEvent {
    /// SSE event name when the provider uses named events (Anthropic)
    pub event: Option<String>,
    /// Parsed JSON body of the event
    pub data: serde_json::Value,
}

impl RawStreamEvent {
    pub fn new(data: serde_json::Value) -> Self {
        Self { event: None, data }
    }

    pub fn named(event: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            event: Some(event.into()),
            data,
        }
    }
}
