//! Context-window assembly
//!
//! Rebuilds the message prefix for a session turn under per-provider
//! message and character budgets. Three paths, tried in order: summary
//! compression when history outgrew the window and a summary exists, the
//! importance-ranked "smart" selection when enabled, and the plain sliding
//! window otherwise.

pub mod importance;
pub mod summarizer;

pub use summarizer::Summarizer;

use serde_json::Value;

use crate::core::types::ChatMessage;
use crate::storage::sessions::parse_role;
use crate::storage::{Message, Session, SessionStore, StorageError};

/// Messages starting with this never re-enter context
pub const ERROR_SENTINEL: &str = "❌ Error:";

/// Assembly budget for one provider family
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContextLimits {
    pub max_messages: usize,
    pub max_chars: usize,
}

/// Budgets per provider family; unknown families get the compat budget
pub fn limits_for(provider_id: &str) -> ContextLimits {
    match provider_id {
        "openai" => ContextLimits {
            max_messages: 50,
            max_chars: 30_000,
        },
        "anthropic" => ContextLimits {
            max_messages: 100,
            max_chars: 80_000,
        },
        "local" | "ollama" | "lmstudio" => ContextLimits {
            max_messages: 10,
            max_chars: 6_000,
        },
        _ => ContextLimits {
            max_messages: 20,
            max_chars: 12_000,
        },
    }
}

/// Which selection path fills the window when no summary applies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ContextStrategy {
    /// Sliding window over the most recent messages
    #[default]
    Recent,
    /// Importance-ranked selection under a token budget
    Smart,
}

/// The reconstructed prefix for one turn
#[derive(Debug, Clone)]
pub struct AssembledContext {
    /// System prompts, summary preamble, and history; current turn appended last
    pub messages: Vec<ChatMessage>,
    pub using_summary: bool,
    /// History messages the window could not fit
    pub omitted: usize,
}

#[derive(Clone)]
pub struct ContextAssembler {
    store: SessionStore,
    strategy: ContextStrategy,
}

impl ContextAssembler {
    pub fn new(store: SessionStore, strategy: ContextStrategy) -> Self {
        Self { store, strategy }
    }

    /// Build the context for a new turn against one provider's budget
    pub async fn assemble(
        &self,
        session: &Session,
        provider_id: &str,
        current_turn: &[ChatMessage],
    ) -> Result<AssembledContext, StorageError> {
        let limits = limits_for(provider_id);

        let candidates: Vec<Message> = self
            .store
            .list_messages(session.id)
            .await?
            .into_iter()
            .filter(|m| !m.content.starts_with(ERROR_SENTINEL))
            .collect();

        let mut using_summary = false;
        let mut omitted = 0usize;
        let mut window: Vec<ChatMessage> = Vec::new();

        let summary = self.store.latest_summary(session.id).await?;
        let summary_applies = summary.is_some()
            && (candidates.len() > limits.max_messages || candidates.is_empty());

        if let Some(summary) = summary.filter(|_| summary_applies) {
            // Summary stands in for everything up to its creation; only the
            // tail after it rides along, newest max-1 of it
            let tail: Vec<&Message> = candidates
                .iter()
                .filter(|m| m.created_at > summary.created_at)
                .collect();
            let keep_from = tail.len().saturating_sub(limits.max_messages.saturating_sub(1));
            omitted = keep_from;
            window.push(ChatMessage::system(format!(
                "Previous conversation summary:\n{}",
                summary.summary_text
            )));
            window.extend(tail[keep_from..].iter().copied().map(to_chat_message));
            using_summary = true;
        } else {
            let (selected, dropped) = match self.strategy {
                ContextStrategy::Smart => smart_select(&candidates, limits),
                ContextStrategy::Recent => sliding_window(&candidates, limits),
            };
            omitted = dropped;
            window.extend(selected.into_iter().map(to_chat_message));
        }

        let mut messages = Vec::new();
        if let Some(prompt) = preference_prompt(session) {
            messages.push(ChatMessage::system(prompt));
        }
        let note_applies = self.strategy == ContextStrategy::Recent;
        if omitted > 0 && !using_summary && note_applies {
            messages.push(ChatMessage::system(format!(
                "[Note: Previous {omitted} messages omitted to fit context window]"
            )));
        }
        messages.extend(window);

        clamp_history(&mut messages, limits, &mut omitted);
        messages.extend(current_turn.iter().cloned());

        Ok(AssembledContext {
            messages,
            using_summary,
            omitted,
        })
    }
}

/// Stored row → wire message
fn to_chat_message(message: &Message) -> ChatMessage {
    ChatMessage {
        role: parse_role(&message.role),
        content: message.content.clone(),
        name: None,
        tool_call_id: message.tool_call_id.clone(),
        tool_calls: message
            .tool_calls
            .clone()
            .and_then(|v| serde_json::from_value(v).ok()),
    }
}

/// System prompt derived from the session's opaque preference blob
fn preference_prompt(session: &Session) -> Option<String> {
    if let Some(prompt) = session.metadata.get("system_prompt").and_then(Value::as_str) {
        if !prompt.is_empty() {
            return Some(prompt.to_string());
        }
    }
    session
        .metadata
        .get("response_style")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(|style| format!("Respond in a {style} style."))
}

/// Importance-ranked selection under message and token budgets
fn smart_select(candidates: &[Message], limits: ContextLimits) -> (Vec<&Message>, usize) {
    let token_budget = (limits.max_chars / 4) as u32;

    let mut ranked: Vec<usize> = (0..candidates.len()).collect();
    // Ties go to the newer message
    ranked.sort_by(|&a, &b| {
        candidates[b]
            .importance
            .partial_cmp(&candidates[a].importance)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| candidates[b].created_at.cmp(&candidates[a].created_at))
    });

    let mut spent = 0u32;
    let mut picked: Vec<usize> = Vec::new();
    for index in ranked {
        if picked.len() >= limits.max_messages {
            break;
        }
        let cost = importance::estimate_tokens(&candidates[index].content);
        if spent + cost > token_budget {
            continue;
        }
        spent += cost;
        picked.push(index);
    }

    // Back to chronological order
    picked.sort_unstable();
    let dropped = candidates.len() - picked.len();
    (picked.into_iter().map(|i| &candidates[i]).collect(), dropped)
}

/// Last-N window trimmed from the oldest end to fit the character budget
fn sliding_window(candidates: &[Message], limits: ContextLimits) -> (Vec<&Message>, usize) {
    let start = candidates.len().saturating_sub(limits.max_messages);
    let mut window: Vec<&Message> = candidates[start..].iter().collect();

    let mut total: usize = window.iter().map(|m| m.content.len()).sum();
    while total > limits.max_chars && window.len() > 2 {
        let removed = window.remove(0);
        total -= removed.content.len();
    }

    let dropped = candidates.len() - window.len();
    (window, dropped)
}

/// Enforce the hard caps on the conversational part of the history
///
/// Leading system entries (preference prompt, omission note, summary
/// preamble) stay; the oldest conversational entries go first.
fn clamp_history(messages: &mut Vec<ChatMessage>, limits: ContextLimits, omitted: &mut usize) {
    let head = messages
        .iter()
        .take_while(|m| m.role == crate::core::types::MessageRole::System)
        .count();

    while messages.len() - head > limits.max_messages {
        messages.remove(head);
        *omitted += 1;
    }

    let mut total: usize = messages[head..].iter().map(|m| m.content.len()).sum();
    while total > limits.max_chars && messages.len() - head > 2 {
        let removed = messages.remove(head);
        total -= removed.content.len();
        *omitted += 1;
    }
}
