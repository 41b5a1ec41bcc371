//! Error taxonomy
//!
//! `UnifiedError` is the normalized record every provider failure is mapped
//! into: a classified kind, a provider-or-HTTP `code`, a retry hint, and an
//! optional fallback suggestion. `GatewayError` is the top-level error the
//! orchestrator surfaces; cancellation is its own variant because it is an
//! expected termination, not a failure.

use serde::{Deserialize, Serialize};

/// Classified failure kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    RateLimit,
    Auth,
    ModelLimit,
    Network,
    Invalid,
    Capability,
    Provider,
    Unknown,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RateLimit => "rate_limit",
            Self::Auth => "auth",
            Self::ModelLimit => "model_limit",
            Self::Network => "network",
            Self::Invalid => "invalid",
            Self::Capability => "capability",
            Self::Provider => "provider",
            Self::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Alternate route suggested by an adapter alongside an error
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FallbackSuggestion {
    pub provider: String,
    pub model: String,
    pub reason: String,
}

/// The normalized error record
#[derive(Debug, Clone, Serialize, Deserialize, thiserror::Error)]
#[error("{kind} error ({code}): {message}")]
pub struct UnifiedError {
    #[serde(rename = "type")]
    pub kind: ErrorKind,
    pub code: String,
    pub message: String,
    pub retry: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fallback: Option<FallbackSuggestion>,
}

impl UnifiedError {
    pub fn new(kind: ErrorKind, code: impl Into<String>, message: impl Into<String>) -> Self {
        let retry = matches!(
            kind,
            ErrorKind::RateLimit | ErrorKind::ModelLimit | ErrorKind::Network
        );
        Self {
            kind,
            code: code.into(),
            message: message.into(),
            retry,
            fallback: None,
        }
    }

    pub fn rate_limit(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::RateLimit, "rate_limit", message)
    }

    pub fn auth(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Auth, "auth", message)
    }

    pub fn model_limit(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ModelLimit, "model_limit", message)
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Network, "network", message)
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Invalid, "invalid", message)
    }

    pub fn capability(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Capability, "capability", message)
    }

    pub fn provider(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Provider, "provider", message)
    }

    pub fn unknown(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Unknown, "unknown", message)
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = code.into();
        self
    }

    pub fn with_fallback(mut self, provider: impl Into<String>, model: impl Into<String>, reason: impl Into<String>) -> Self {
        self.fallback = Some(FallbackSuggestion {
            provider: provider.into(),
            model: model.into(),
            reason: reason.into(),
        });
        self
    }

    /// HTTP status a transport layer should map this error to
    pub fn http_status(&self) -> u16 {
        match self.kind {
            ErrorKind::RateLimit => 429,
            ErrorKind::Auth => 401,
            ErrorKind::Invalid => 400,
            ErrorKind::ModelLimit => 413,
            ErrorKind::Capability => 422,
            ErrorKind::Network => 502,
            ErrorKind::Provider | ErrorKind::Unknown => 502,
        }
    }
}

impl From<serde_json::Error> for UnifiedError {
    fn from(err: serde_json::Error) -> Self {
        Self::new(ErrorKind::Provider, "parse", format!("malformed provider payload: {err}"))
    }
}

/// Top-level error surfaced by the orchestration core
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// The caller cancelled or the per-request deadline elapsed
    #[error("request cancelled")]
    Cancelled,

    /// A normalized upstream failure
    #[error(transparent)]
    Upstream(#[from] UnifiedError),

    /// Persistence layer failure
    #[error("storage error: {0}")]
    Storage(#[from] crate::storage::StorageError),

    /// Invalid or missing configuration
    #[error("configuration error: {0}")]
    Configuration(String),
}

impl GatewayError {
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    pub fn to_http_status(&self) -> u16 {
        match self {
            // Client went away; 499 by nginx convention
            Self::Cancelled => 499,
            Self::Upstream(e) => e.http_status(),
            Self::Storage(_) => 500,
            Self::Configuration(_) => 500,
        }
    }

    /// The unified record, when this error carries one
    pub fn as_unified(&self) -> Option<&UnifiedError> {
        match self {
            Self::Upstream(e) => Some(e),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_defaults_follow_kind() {
        assert!(UnifiedError::rate_limit("x").retry);
        assert!(UnifiedError::network("x").retry);
        assert!(UnifiedError::model_limit("x").retry);
        assert!(!UnifiedError::auth("x").retry);
        assert!(!UnifiedError::provider("x").retry);
        assert!(!UnifiedError::invalid("x").retry);
    }

    #[test]
    fn test_error_wire_shape() {
        let err = UnifiedError::rate_limit("too many requests")
            .with_fallback("openai", "gpt-3.5-turbo", "anthropic overloaded");
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["type"], "rate_limit");
        assert_eq!(json["retry"], true);
        assert_eq!(json["fallback"]["provider"], "openai");
        assert_eq!(json["fallback"]["model"], "gpt-3.5-turbo");
    }

    #[test]
    fn test_http_status_mapping() {
        assert_eq!(UnifiedError::rate_limit("x").http_status(), 429);
        assert_eq!(UnifiedError::auth("x").http_status(), 401);
        assert_eq!(UnifiedError::invalid("x").http_status(), 400);
        assert_eq!(GatewayError::Cancelled.to_http_status(), 499);
    }
}
