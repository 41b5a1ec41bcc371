//! Request validation middleware

use async_trait::async_trait;

use super::{ChatMiddleware, RequestCx};
use crate::core::types::{MessageRole, UnifiedChatRequest, UnifiedError};

/// Rejects structurally unusable requests before any resolution work
pub struct ValidationMiddleware;

#[async_trait]
impl ChatMiddleware for ValidationMiddleware {
    fn name(&self) -> &'static str {
        "validation"
    }

    async fn pre(
        &self,
        cx: &mut RequestCx,
        request: &mut UnifiedChatRequest,
    ) -> Result<(), UnifiedError> {
        if cx.user_id.is_nil() {
            return Err(UnifiedError::invalid("request carries no user identity"));
        }
        if request.messages.is_empty() {
            return Err(UnifiedError::invalid("messages must not be empty"));
        }
        for (i, message) in request.messages.iter().enumerate() {
            let has_payload = !message.content.is_empty()
                || message.tool_calls.as_ref().is_some_and(|c| !c.is_empty());
            if !has_payload {
                return Err(UnifiedError::invalid(format!(
                    "message {i} has neither content nor tool calls"
                )));
            }
            if matches!(message.role, MessageRole::Tool | MessageRole::Function)
                && message.tool_call_id.is_none()
                && message.name.is_none()
            {
                return Err(UnifiedError::invalid(format!(
                    "message {i} is a tool result without a tool_call_id"
                )));
            }
        }
        if let Some(t) = request.temperature {
            if !(0.0..=2.0).contains(&t) {
                return Err(UnifiedError::invalid("temperature must be within [0, 2]"));
            }
        }
        Ok(())
    }
}
