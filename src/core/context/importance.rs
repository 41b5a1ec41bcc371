//! Message importance scoring
//!
//! Scored once, when a message is stored. The weights favor turns that the
//! smart context strategy should fight to keep: code, reported errors,
//! decisions, and user corrections.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::core::types::MessageRole;

static DIFF_MARKERS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^(\+\+\+ |--- |@@ )").expect("static regex"));

static ERROR_LANGUAGE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(error|exception|panic|traceback|failed|failure)\b").expect("static regex")
});

static DECISION_LANGUAGE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(we will|we'll|let's|lets|decided to|going with)\b").expect("static regex")
});

/// Signals recorded alongside the score
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportanceFlags {
    pub has_code: bool,
    pub has_error: bool,
    pub has_decision: bool,
    pub is_user_correction: bool,
    /// Rough token estimate, one token per four characters
    pub tokens: u32,
}

/// Score plus the flags that produced it
#[derive(Debug, Clone, PartialEq)]
pub struct Scored {
    pub importance: f64,
    pub flags: ImportanceFlags,
}

/// Rough token estimate used across context budgeting
pub fn estimate_tokens(text: &str) -> u32 {
    (text.len() as f64 / 4.0).ceil() as u32
}

/// Score one message
pub fn score(role: MessageRole, content: &str) -> Scored {
    let has_code = content.contains("```") || DIFF_MARKERS.is_match(content);
    let has_error = ERROR_LANGUAGE.is_match(content);
    let has_decision = DECISION_LANGUAGE.is_match(content);
    let trimmed = content.trim_start().to_lowercase();
    let is_user_correction = role == MessageRole::User
        && (trimmed.starts_with("actually") || trimmed.starts_with("no,"));

    let mut importance: f64 = 0.5;
    if has_code {
        importance += 0.2;
    }
    if has_error {
        importance += 0.2;
    }
    if has_decision {
        importance += 0.15;
    }
    if is_user_correction {
        importance += 0.15;
    }

    Scored {
        importance: importance.clamp(0.0, 1.0),
        flags: ImportanceFlags {
            has_code,
            has_error,
            has_decision,
            is_user_correction,
            tokens: estimate_tokens(content),
        },
    }
}
