//! Unified type system
//!
//! Provider-agnostic wire model shared by the orchestrator, adapters, and
//! drivers. Everything a provider family understands is derived from these
//! types; everything a provider family returns is normalized back into them.

pub mod error;
pub mod message;
pub mod request;
pub mod response;
pub mod stream;

pub use error::{ErrorKind, FallbackSuggestion, GatewayError, UnifiedError};
pub use message::{ChatMessage, FunctionCall, MessageRole, Tool, ToolCall, ToolFunction};
pub use request::{
    ImageAttachment, ResponseFormat, RoutePreferences, RouteRequirements, ToolChoice,
    ToolChoiceMode, UnifiedChatRequest,
};
pub use response::{FinishReason, ModelInfo, ProbeReport, ResponseMetadata, UnifiedChatResponse, Usage};
pub use stream::{FunctionCallDelta, RawStreamEvent, ToolCallDelta, UnifiedStreamChunk};
