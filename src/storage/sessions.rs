//! Session store
//!
//! Sessions, messages, and summaries for one user's conversations. Message
//! importance is computed at write time so context assembly never rescores
//! history. Listing order is creation order and the store never reorders:
//! the orchestrator's own sequencing (user turn, then assistant turn) is the
//! only ordering authority within a session.

use chrono::Utc;
use sea_orm::entity::prelude::*;
use sea_orm::sea_query::Expr;
use sea_orm::{ActiveValue::Set, DatabaseConnection, PaginatorTrait, QueryOrder, QuerySelect};
use serde_json::json;
use uuid::Uuid;

use super::entities::{message, session, summary, Message, Session, Summary};
use super::StorageError;
use crate::core::context::importance;
use crate::core::types::{MessageRole, ToolCall};

/// Input for one stored message
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub role: MessageRole,
    pub content: String,
    pub tool_calls: Option<Vec<ToolCall>>,
    pub tool_call_id: Option<String>,
    /// Delivery facts; `{"truncated": true}` after a cancelled stream
    pub metadata: serde_json::Value,
}

impl NewMessage {
    pub fn text(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            tool_calls: None,
            tool_call_id: None,
            metadata: json!({}),
        }
    }

    pub fn truncated(mut self) -> Self {
        self.metadata["truncated"] = json!(true);
        self
    }
}

/// Partial session update
#[derive(Debug, Clone, Default)]
pub struct SessionPatch {
    pub title: Option<String>,
    pub provider: Option<String>,
    pub model: Option<String>,
    pub metadata: Option<serde_json::Value>,
}

/// Input for one stored summary
#[derive(Debug, Clone)]
pub struct NewSummary {
    pub summary_text: String,
    pub message_count: i32,
    pub start_message_id: Uuid,
    pub end_message_id: Uuid,
    pub tokens_saved: i32,
    pub model_used: String,
}

#[derive(Clone)]
pub struct SessionStore {
    db: DatabaseConnection,
}

impl SessionStore {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    // ==================== Sessions ====================

    pub async fn create_session(
        &self,
        user_id: Uuid,
        title: impl Into<String>,
        provider: Option<String>,
        model: Option<String>,
    ) -> Result<Session, StorageError> {
        let now = Utc::now().fixed_offset();
        let row = session::ActiveModel {
            id: Set(Uuid::new_v4()),
            user_id: Set(user_id),
            title: Set(title.into()),
            provider: Set(provider),
            model: Set(model),
            metadata: Set(json!({})),
            created_at: Set(now),
            updated_at: Set(now),
        };
        Ok(row.insert(&self.db).await?)
    }

    pub async fn get_session(
        &self,
        user_id: Uuid,
        session_id: Uuid,
    ) -> Result<Session, StorageError> {
        session::Entity::find()
            .filter(session::Column::Id.eq(session_id))
            .filter(session::Column::UserId.eq(user_id))
            .one(&self.db)
            .await?
            .ok_or(StorageError::not_found("session"))
    }

    pub async fn list_sessions(&self, user_id: Uuid) -> Result<Vec<Session>, StorageError> {
        Ok(session::Entity::find()
            .filter(session::Column::UserId.eq(user_id))
            .order_by_desc(session::Column::UpdatedAt)
            .all(&self.db)
            .await?)
    }

    pub async fn update_session(
        &self,
        user_id: Uuid,
        session_id: Uuid,
        patch: SessionPatch,
    ) -> Result<Session, StorageError> {
        let existing = self.get_session(user_id, session_id).await?;
        let mut row: session::ActiveModel = existing.into();
        if let Some(title) = patch.title {
            row.title = Set(title);
        }
        if let Some(provider) = patch.provider {
            row.provider = Set(Some(provider));
        }
        if let Some(model) = patch.model {
            row.model = Set(Some(model));
        }
        if let Some(metadata) = patch.metadata {
            row.metadata = Set(metadata);
        }
        row.updated_at = Set(Utc::now().fixed_offset());
        Ok(row.update(&self.db).await?)
    }

    pub async fn delete_session(
        &self,
        user_id: Uuid,
        session_id: Uuid,
    ) -> Result<(), StorageError> {
        // Scoped load first so one user cannot delete another's session
        let existing = self.get_session(user_id, session_id).await?;
        message::Entity::delete_many()
            .filter(message::Column::SessionId.eq(session_id))
            .exec(&self.db)
            .await?;
        summary::Entity::delete_many()
            .filter(summary::Column::SessionId.eq(session_id))
            .exec(&self.db)
            .await?;
        session::Entity::delete_by_id(existing.id)
            .exec(&self.db)
            .await?;
        Ok(())
    }

    // ==================== Messages ====================

    /// Append one message; importance is scored here, at write time
    pub async fn append_message(
        &self,
        session_id: Uuid,
        input: NewMessage,
    ) -> Result<Message, StorageError> {
        let scored = importance::score(input.role, &input.content);
        let tool_calls = input
            .tool_calls
            .map(|calls| serde_json::to_value(calls).unwrap_or_else(|_| json!([])));

        let row = message::ActiveModel {
            id: Set(Uuid::new_v4()),
            session_id: Set(session_id),
            role: Set(input.role.as_str().to_string()),
            content: Set(input.content),
            tool_calls: Set(tool_calls),
            tool_call_id: Set(input.tool_call_id),
            importance: Set(scored.importance),
            importance_flags: Set(serde_json::to_value(&scored.flags)
                .unwrap_or_else(|_| json!({}))),
            metadata: Set(input.metadata),
            created_at: Set(Utc::now().fixed_offset()),
        };
        let stored = row.insert(&self.db).await?;

        // Keep the session's recency honest for listing
        let _ = session::Entity::update_many()
            .col_expr(
                session::Column::UpdatedAt,
                Expr::value(Utc::now().fixed_offset()),
            )
            .filter(session::Column::Id.eq(session_id))
            .exec(&self.db)
            .await?;

        Ok(stored)
    }

    /// Messages in creation order
    pub async fn list_messages(&self, session_id: Uuid) -> Result<Vec<Message>, StorageError> {
        Ok(message::Entity::find()
            .filter(message::Column::SessionId.eq(session_id))
            .order_by_asc(message::Column::CreatedAt)
            .order_by_asc(message::Column::Id)
            .all(&self.db)
            .await?)
    }

    /// Messages created strictly after a point in time, in creation order
    pub async fn messages_after(
        &self,
        session_id: Uuid,
        after: chrono::DateTime<chrono::FixedOffset>,
    ) -> Result<Vec<Message>, StorageError> {
        Ok(message::Entity::find()
            .filter(message::Column::SessionId.eq(session_id))
            .filter(message::Column::CreatedAt.gt(after))
            .order_by_asc(message::Column::CreatedAt)
            .order_by_asc(message::Column::Id)
            .all(&self.db)
            .await?)
    }

    pub async fn count_messages(&self, session_id: Uuid) -> Result<u64, StorageError> {
        Ok(message::Entity::find()
            .filter(message::Column::SessionId.eq(session_id))
            .count(&self.db)
            .await?)
    }

    // ==================== Summaries ====================

    /// Insert a summary, replacing any prior one ending at the same message
    pub async fn upsert_summary(
        &self,
        session_id: Uuid,
        input: NewSummary,
    ) -> Result<Summary, StorageError> {
        summary::Entity::delete_many()
            .filter(summary::Column::SessionId.eq(session_id))
            .filter(summary::Column::EndMessageId.eq(input.end_message_id))
            .exec(&self.db)
            .await?;

        let row = summary::ActiveModel {
            id: Set(Uuid::new_v4()),
            session_id: Set(session_id),
            summary_text: Set(input.summary_text),
            message_count: Set(input.message_count),
            start_message_id: Set(input.start_message_id),
            end_message_id: Set(input.end_message_id),
            tokens_saved: Set(input.tokens_saved),
            model_used: Set(input.model_used),
            created_at: Set(Utc::now().fixed_offset()),
        };
        Ok(row.insert(&self.db).await?)
    }

    /// Summaries newest-first
    pub async fn list_summaries(&self, session_id: Uuid) -> Result<Vec<Summary>, StorageError> {
        Ok(summary::Entity::find()
            .filter(summary::Column::SessionId.eq(session_id))
            .order_by_desc(summary::Column::CreatedAt)
            .all(&self.db)
            .await?)
    }

    pub async fn latest_summary(&self, session_id: Uuid) -> Result<Option<Summary>, StorageError> {
        Ok(summary::Entity::find()
            .filter(summary::Column::SessionId.eq(session_id))
            .order_by_desc(summary::Column::CreatedAt)
            .limit(1)
            .one(&self.db)
            .await?)
    }
}

/// Wire role name back to the typed role; unknown names degrade to user
pub fn parse_role(role: &str) -> MessageRole {
    match role {
        "system" => MessageRole::System,
        "assistant" => MessageRole::Assistant,
        "tool" => MessageRole::Tool,
        "function" => MessageRole::Function,
        _ => MessageRole::User,
    }
}
