//! Unified chat request

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::message::{ChatMessage, MessageRole, Tool};

/// Desired shape of the model's reply
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ResponseFormat {
    #[default]
    Text,
    Json,
    Markdown,
    Code,
}

/// Tool selection strategy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ToolChoice {
    /// "auto" or "none"
    Mode(ToolChoiceMode),
    /// Force a specific tool by name
    Named { name: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolChoiceMode {
    Auto,
    None,
}

/// Image supplied with a vision-capable request
///
/// Either `url` or `base64` is set; `media_type` qualifies the base64 form.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageAttachment {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base64: Option<String>,
    #[serde(default = "default_media_type")]
    pub media_type: String,
}

fn default_media_type() -> String {
    "image/png".to_string()
}

/// Caller routing preferences
///
/// Resolution order: explicit connection, then the user's default for the
/// named provider, then the user's global default.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RoutePreferences {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connection_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub capabilities: Vec<String>,
}

/// Hard routing requirements
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RouteRequirements {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_latency_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_quality: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_cost: Option<f64>,
    #[serde(default)]
    pub require_tools: bool,
}

/// The provider-agnostic chat request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnifiedChatRequest {
    pub messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_format: Option<ResponseFormat>,
    /// Legacy function definitions, kept verbatim for providers that accept them
    #[serde(skip_serializing_if = "Option::is_none")]
    pub functions: Option<Vec<serde_json::Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<Tool>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<ToolChoice>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub images: Option<Vec<ImageAttachment>>,
    #[serde(default)]
    pub preferences: RoutePreferences,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub requirements: Option<RouteRequirements>,
    /// Conversation to persist into and assemble context from
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<Uuid>,
    /// Populated by the authentication collaborator, never by the caller body
    #[serde(default = "Uuid::nil")]
    pub user_id: Uuid,
}

impl UnifiedChatRequest {
    pub fn new(messages: Vec<ChatMessage>) -> Self {
        Self {
            messages,
            temperature: None,
            max_tokens: None,
            response_format: None,
            functions: None,
            tools: None,
            tool_choice: None,
            images: None,
            preferences: RoutePreferences::default(),
            requirements: None,
            session_id: None,
            user_id: Uuid::nil(),
        }
    }

    /// Last user-authored message, if any
    pub fn latest_user_message(&self) -> Option<&ChatMessage> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == MessageRole::User)
    }

    pub fn has_images(&self) -> bool {
        self.images.as_ref().is_some_and(|imgs| !imgs.is_empty())
    }
}
