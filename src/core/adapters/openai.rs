//! OpenAI adapter
//!
//! The OpenAI wire is the compat wire; this adapter embeds the compat
//! translator and contributes real pricing and its own provider identity.

use serde_json::Value;

use super::compat::OpenAiCompatAdapter;
use super::{Adapter, ResponseContext};
use crate::core::types::{
    RawStreamEvent, UnifiedChatRequest, UnifiedChatResponse, UnifiedError, UnifiedStreamChunk,
};

/// Adapter for api.openai.com
#[derive(Debug, Clone)]
pub struct OpenAiAdapter {
    inner: OpenAiCompatAdapter,
}

impl Default for OpenAiAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl OpenAiAdapter {
    pub fn new() -> Self {
        Self {
            inner: OpenAiCompatAdapter::branded("openai", "openai"),
        }
    }
}

impl Adapter for OpenAiAdapter {
    fn provider_type(&self) -> &'static str {
        "openai"
    }

    fn normalize_request(
        &self,
        request: &UnifiedChatRequest,
        model: &str,
    ) -> Result<Value, UnifiedError> {
        self.inner.normalize_request(request, model)
    }

    fn normalize_response(
        &self,
        raw: Value,
        cx: &ResponseContext,
    ) -> Result<UnifiedChatResponse, UnifiedError> {
        self.inner.normalize_response(raw, cx)
    }

    fn normalize_stream_chunk(&self, event: &RawStreamEvent) -> Option<UnifiedStreamChunk> {
        self.inner.normalize_stream_chunk(event)
    }

    fn normalize_error(&self, status: Option<u16>, body: &str) -> UnifiedError {
        self.inner.normalize_error(status, body)
    }
}
