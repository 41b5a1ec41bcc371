//! Structured request logging middleware

use async_trait::async_trait;
use tracing::{info, warn};

use super::{ChatMiddleware, RequestCx};
use crate::core::types::{UnifiedChatRequest, UnifiedChatResponse, UnifiedError};

/// One record at request start, one at finish
pub struct LoggingMiddleware;

#[async_trait]
impl ChatMiddleware for LoggingMiddleware {
    fn name(&self) -> &'static str {
        "logging"
    }

    async fn pre(
        &self,
        cx: &mut RequestCx,
        request: &mut UnifiedChatRequest,
    ) -> Result<(), UnifiedError> {
        info!(
            request_id = %cx.request_id,
            user_id = %cx.user_id,
            session_id = ?request.session_id,
            messages = request.messages.len(),
            streaming = cx.streaming,
            provider_pref = request.preferences.provider.as_deref().unwrap_or("-"),
            "chat request accepted"
        );
        Ok(())
    }

    async fn post(
        &self,
        cx: &mut RequestCx,
        _request: &UnifiedChatRequest,
        outcome: &mut Result<UnifiedChatResponse, UnifiedError>,
    ) {
        match outcome {
            Ok(response) => info!(
                request_id = %cx.request_id,
                provider = %response.metadata.provider,
                model = %response.metadata.model,
                latency_ms = response.metadata.latency_ms,
                total_tokens = response.usage.total_tokens,
                retries = response.metadata.retries,
                fallback = response.metadata.fallback_used,
                "chat request completed"
            ),
            Err(error) => warn!(
                request_id = %cx.request_id,
                kind = %error.kind,
                code = %error.code,
                latency_ms = cx.elapsed_ms(),
                retry = error.retry,
                "chat request failed"
            ),
        }
    }
}
