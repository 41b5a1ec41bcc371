//! Out-of-band session summarization
//!
//! When a session accumulates enough messages past its newest summary, a
//! background job condenses the oldest contiguous un-summarized run through
//! the user's default connection and stores the result for context
//! assembly.

use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::importance::estimate_tokens;
use crate::core::adapters::{AdapterRegistry, ResponseContext};
use crate::core::drivers::{driver_for, DriverError, ProviderEndpoint};
use crate::core::orchestrator::resolve::pick_model;
use crate::core::types::{ChatMessage, GatewayError, UnifiedChatRequest, UnifiedError};
use crate::storage::sessions::parse_role;
use crate::storage::{ConnectionRegistry, Message, Session, SessionStore, Summary};

/// Messages past the newest summary before a new one is due
pub const DEFAULT_SUMMARY_THRESHOLD: usize = 20;

const SUMMARY_PROMPT: &str = "Summarize the following conversation segment. Keep decisions, \
     code references, errors, and open questions. Respond with the summary text only.";

#[derive(Clone)]
pub struct Summarizer {
    store: SessionStore,
    connections: ConnectionRegistry,
    adapters: Arc<AdapterRegistry>,
    threshold: usize,
}

impl Summarizer {
    pub fn new(
        store: SessionStore,
        connections: ConnectionRegistry,
        adapters: Arc<AdapterRegistry>,
    ) -> Self {
        Self {
            store,
            connections,
            adapters,
            threshold: DEFAULT_SUMMARY_THRESHOLD,
        }
    }

    pub fn with_threshold(mut self, threshold: usize) -> Self {
        self.threshold = threshold.max(1);
        self
    }

    /// Fire-and-forget check after a turn persists
    pub fn spawn_if_due(&self, session: Session) {
        let job = self.clone();
        tokio::spawn(async move {
            match job.run_if_due(&session).await {
                Ok(Some(summary)) => info!(
                    session_id = %session.id,
                    messages = summary.message_count,
                    tokens_saved = summary.tokens_saved,
                    "session summarized"
                ),
                Ok(None) => {}
                Err(e) => warn!(session_id = %session.id, error = %e, "summarization failed"),
            }
        });
    }

    /// Summarize the un-summarized run if it crossed the threshold
    pub async fn run_if_due(&self, session: &Session) -> Result<Option<Summary>, GatewayError> {
        let run = self.unsummarized_run(session).await?;
        if run.len() < self.threshold {
            return Ok(None);
        }

        let connection = self
            .connections
            .get_global_default(session.user_id)
            .await?;
        let model = pick_model(
            &connection.provider_id,
            &connection.config,
            session.model.as_deref(),
        )
        .ok_or_else(|| {
            GatewayError::from(UnifiedError::invalid(
                "no model configured for summarization",
            ))
        })?;

        let transcript = render_transcript(&run);
        let request = UnifiedChatRequest::new(vec![
            ChatMessage::system(SUMMARY_PROMPT),
            ChatMessage::user(transcript),
        ]);

        let adapter = self.adapters.get(&connection.provider_id);
        let driver = driver_for(&connection.provider_id);
        let endpoint =
            ProviderEndpoint::from_config(&connection.config, driver.default_base_url())?;
        let body = adapter.normalize_request(&request, &model)?;

        let cancel = CancellationToken::new();
        let raw = driver
            .complete(&endpoint, body, &cancel)
            .await
            .map_err(|e| match e {
                DriverError::Cancelled => GatewayError::Cancelled,
                DriverError::Wire { status, body } => {
                    GatewayError::from(adapter.normalize_error(status, &body))
                }
            })?;
        let response = adapter.normalize_response(
            raw,
            &ResponseContext {
                provider: connection.provider_id.clone(),
                model: model.clone(),
                connection_id: Some(connection.id),
                ..Default::default()
            },
        )?;

        let covered_tokens: u32 = run.iter().map(|m| estimate_tokens(&m.content)).sum();
        let tokens_saved =
            covered_tokens.saturating_sub(estimate_tokens(&response.content)) as i32;

        let summary = self
            .store
            .upsert_summary(
                session.id,
                crate::storage::sessions::NewSummary {
                    summary_text: response.content,
                    message_count: run.len() as i32,
                    start_message_id: run.first().map(|m| m.id).unwrap_or_default(),
                    end_message_id: run.last().map(|m| m.id).unwrap_or_default(),
                    tokens_saved,
                    model_used: model,
                },
            )
            .await?;
        Ok(Some(summary))
    }

    /// The contiguous run after the newest summary (everything, lacking one)
    async fn unsummarized_run(&self, session: &Session) -> Result<Vec<Message>, GatewayError> {
        let run = match self.store.latest_summary(session.id).await? {
            Some(summary) => {
                self.store
                    .messages_after(session.id, summary.created_at)
                    .await?
            }
            None => self.store.list_messages(session.id).await?,
        };
        Ok(run)
    }
}

fn render_transcript(messages: &[Message]) -> String {
    let mut out = String::new();
    for message in messages {
        out.push_str(parse_role(&message.role).as_str());
        out.push_str(": ");
        out.push_str(&message.content);
        out.push('\n');
    }
    out
}
