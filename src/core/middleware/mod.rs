//! Middleware chain
//!
//! Cross-cutting concerns wrapped around the orchestrator: pre-processors
//! run in registration order and may mutate the request or short-circuit
//! with an error; post-processors run in reverse order over the outcome.

pub mod logging;
pub mod metrics;
pub mod rate_limit;
pub mod retry;
pub mod validation;

pub use logging::LoggingMiddleware;
pub use metrics::{MetricsMiddleware, MetricsRegistry, RequestStats};
pub use rate_limit::RateLimitMiddleware;
pub use retry::RetryMarkerMiddleware;
pub use validation::ValidationMiddleware;

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Instant;
use uuid::Uuid;

use super::types::{UnifiedChatRequest, UnifiedChatResponse, UnifiedError};

/// Per-request context threaded through the chain
#[derive(Debug, Clone)]
pub struct RequestCx {
    pub request_id: Uuid,
    pub user_id: Uuid,
    pub started: Instant,
    /// Resolved routing facts, filled in by the orchestrator before post runs
    pub provider: Option<String>,
    pub model: Option<String>,
    pub connection_id: Option<Uuid>,
    pub streaming: bool,
    /// Set by the retry-marker middleware when the outcome is retryable
    pub retryable: bool,
}

impl RequestCx {
    pub fn new(user_id: Uuid, streaming: bool) -> Self {
        Self {
            request_id: Uuid::new_v4(),
            user_id,
            started: Instant::now(),
            provider: None,
            model: None,
            connection_id: None,
            streaming,
            retryable: false,
        }
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.started.elapsed().as_millis() as u64
    }
}

/// One composable processing stage
#[async_trait]
pub trait ChatMiddleware: Send + Sync {
    fn name(&self) -> &'static str;

    /// Runs before the provider call; may mutate the request or reject it
    async fn pre(
        &self,
        _cx: &mut RequestCx,
        _request: &mut UnifiedChatRequest,
    ) -> Result<(), UnifiedError> {
        Ok(())
    }

    /// Runs after the provider call over the response-or-error outcome
    async fn post(
        &self,
        _cx: &mut RequestCx,
        _request: &UnifiedChatRequest,
        _outcome: &mut Result<UnifiedChatResponse, UnifiedError>,
    ) {
    }
}

/// Ordered middleware stack
#[derive(Clone, Default)]
pub struct MiddlewareChain {
    stack: Vec<Arc<dyn ChatMiddleware>>,
}

impl MiddlewareChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// The built-in stack: validation, logging, metrics, rate limit, retry marker
    pub fn standard(metrics: Arc<MetricsRegistry>, requests_per_minute: u32) -> Self {
        Self::new()
            .with(ValidationMiddleware)
            .with(LoggingMiddleware)
            .with(MetricsMiddleware::new(metrics))
            .with(RateLimitMiddleware::new(requests_per_minute))
            .with(RetryMarkerMiddleware)
    }

    pub fn with<M: ChatMiddleware + 'static>(mut self, middleware: M) -> Self {
        self.stack.push(Arc::new(middleware));
        self
    }

    /// Pre-processors in registration order; first error short-circuits
    pub async fn run_pre(
        &self,
        cx: &mut RequestCx,
        request: &mut UnifiedChatRequest,
    ) -> Result<(), UnifiedError> {
        for middleware in &self.stack {
            middleware.pre(cx, request).await?;
        }
        Ok(())
    }

    /// Post-processors in reverse registration order
    pub async fn run_post(
        &self,
        cx: &mut RequestCx,
        request: &UnifiedChatRequest,
        outcome: &mut Result<UnifiedChatResponse, UnifiedError>,
    ) {
        for middleware in self.stack.iter().rev() {
            middleware.post(cx, request, outcome).await;
        }
    }
}
