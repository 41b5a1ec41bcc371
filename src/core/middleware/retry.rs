//! Retry-marker middleware
//!
//! Flags retryable outcomes on the request context so the orchestrator's
//! recovery policy can act. Deliberately does not re-issue anything itself.

use async_trait::async_trait;

use super::{ChatMiddleware, RequestCx};
use crate::core::types::{UnifiedChatRequest, UnifiedChatResponse, UnifiedError};

pub struct RetryMarkerMiddleware;

#[async_trait]
impl ChatMiddleware for RetryMarkerMiddleware {
    fn name(&self) -> &'static str {
        "retry_marker"
    }

    async fn post(
        &self,
        cx: &mut RequestCx,
        _request: &UnifiedChatRequest,
        outcome: &mut Result<UnifiedChatResponse, UnifiedError>,
    ) {
        cx.retryable = match outcome {
            Ok(_) => false,
            Err(error) => error.retry,
        };
    }
}
