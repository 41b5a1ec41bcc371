//! # unigate
//!
//! A multi-tenant LLM gateway: one unified chat request in, routed to
//! OpenAI, Anthropic, or any OpenAI-compatible server, streamed or unary
//! reply out, conversation persisted per user.
//!
//! ## Architecture
//!
//! - **Unified wire model** ([`core::types`]): one request/response/chunk
//!   shape regardless of provider
//! - **Adapters** ([`core::adapters`]): stateless per-provider translation,
//!   registry with an OpenAI-compatible fallback
//! - **Drivers** ([`core::drivers`]): per-provider HTTP wire with lazy
//!   streaming sequences and cancellation at every suspension point
//! - **Orchestrator** ([`core::orchestrator`]): middleware, routing,
//!   context assembly, the streaming relay, and recovery policy
//! - **Stores** ([`storage`]): per-user connections, sessions, messages,
//!   and summaries over sea-orm
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use tokio_util::sync::CancellationToken;
//! use unigate::core::context::ContextStrategy;
//! use unigate::core::orchestrator::Orchestrator;
//! use unigate::core::types::{ChatMessage, UnifiedChatRequest};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let db = unigate::storage::connect_and_migrate("sqlite::memory:").await?;
//!     let gateway = Orchestrator::new(db, ContextStrategy::Recent, 100);
//!
//!     let mut request = UnifiedChatRequest::new(vec![ChatMessage::user("hello")]);
//!     request.user_id = uuid::Uuid::new_v4();
//!     let response = gateway.chat(request, CancellationToken::new()).await?;
//!     println!("{}", response.content);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod core;
pub mod server;
pub mod storage;

pub use config::GatewayConfig;
pub use core::orchestrator::Orchestrator;
pub use core::types::{
    ChatMessage, GatewayError, MessageRole, UnifiedChatRequest, UnifiedChatResponse, UnifiedError,
    UnifiedStreamChunk,
};
