//! Provider adapters
//!
//! An adapter is a stateless translator between the unified wire model and
//! one provider family's format. Four operations cover the whole contract:
//! request out, response back, one stream event at a time, and error
//! classification. Adapters never do I/O; drivers own the wire.

pub mod anthropic;
pub mod classify;
pub mod compat;
pub mod openai;
pub mod registry;

pub use anthropic::AnthropicAdapter;
pub use compat::OpenAiCompatAdapter;
pub use openai::OpenAiAdapter;
pub use registry::AdapterRegistry;

use uuid::Uuid;

use super::types::{
    RawStreamEvent, UnifiedChatRequest, UnifiedChatResponse, UnifiedError, UnifiedStreamChunk,
};

/// Facts about the in-flight call an adapter needs to fill response metadata
#[derive(Debug, Clone, Default)]
pub struct ResponseContext {
    /// Provider id of the resolved connection ("openai", "anthropic", ...)
    pub provider: String,
    /// Model actually requested
    pub model: String,
    pub connection_id: Option<Uuid>,
    pub latency_ms: u64,
    pub retries: u32,
    pub fallback_used: bool,
}

/// Bidirectional translation between the unified model and one provider family
pub trait Adapter: Send + Sync {
    /// Provider family this adapter speaks ("openai", "anthropic", "openai-compatible")
    fn provider_type(&self) -> &'static str;

    /// Unified request → provider-specific JSON body
    fn normalize_request(
        &self,
        request: &UnifiedChatRequest,
        model: &str,
    ) -> Result<serde_json::Value, UnifiedError>;

    /// Provider JSON body → unified response
    fn normalize_response(
        &self,
        raw: serde_json::Value,
        cx: &ResponseContext,
    ) -> Result<UnifiedChatResponse, UnifiedError>;

    /// One raw provider event → at most one tagged chunk
    ///
    /// `None` means the event carries nothing the client needs (pings,
    /// block-stop markers).
    fn normalize_stream_chunk(&self, event: &RawStreamEvent) -> Option<UnifiedStreamChunk>;

    /// Provider error body → classified unified error
    fn normalize_error(&self, status: Option<u16>, body: &str) -> UnifiedError;
}
