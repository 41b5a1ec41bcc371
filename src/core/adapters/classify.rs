//! Provider error classification
//!
//! Deterministic mapping from a provider's error text to the unified
//! taxonomy: a case-insensitive substring match, checked in a fixed order.
//! A parseable JSON body `{"error": {"code": ..}}` (or `type`) overrides the
//! machine-readable code but never the classified kind.

use crate::core::types::{ErrorKind, UnifiedError};

/// Classify raw provider error text into a taxonomy kind
pub fn classify_text(text: &str) -> ErrorKind {
    let lower = text.to_lowercase();
    let has = |needles: &[&str]| needles.iter().any(|n| lower.contains(n));

    if has(&["rate limit", "too many requests"]) {
        ErrorKind::RateLimit
    } else if has(&["unauthorized", "authentication", "api key"]) {
        ErrorKind::Auth
    } else if has(&["context length", "maximum context", "token limit"]) {
        ErrorKind::ModelLimit
    } else if has(&["connection", "timeout", "network"]) {
        ErrorKind::Network
    } else if has(&["invalid", "bad request"]) {
        ErrorKind::Invalid
    } else {
        ErrorKind::Provider
    }
}

/// Machine-readable code from a JSON error body, when one is present
fn json_code(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    let error = value.get("error")?;
    error
        .get("code")
        .or_else(|| error.get("type"))
        .and_then(|c| c.as_str())
        .map(str::to_string)
}

/// Human-readable message from a JSON error body, else the body itself
fn error_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| {
            v.get("error")?
                .get("message")
                .and_then(|m| m.as_str())
                .map(str::to_string)
        })
        .unwrap_or_else(|| body.trim().to_string())
}

/// Build a classified error from an HTTP status and response body
pub fn classify(status: Option<u16>, body: &str) -> UnifiedError {
    let kind = classify_text(body);
    let code = json_code(body).unwrap_or_else(|| match status {
        Some(s) => format!("http_{s}"),
        None => kind.as_str().to_string(),
    });
    UnifiedError::new(kind, code, error_message(body))
}
