//! Provider drivers
//!
//! A driver owns the HTTP wire for one provider family: unary completion,
//! the lazy streaming chunk sequence, model discovery, and the zero-token
//! configuration probe. Drivers are stateless apart from a shared HTTP
//! client and know nothing about the unified model; they move provider JSON
//! in and raw events out, and the caller's cancellation token reaches every
//! send and every chunk read.

pub mod anthropic;
pub mod compat;
pub mod openai;
pub mod sse;

pub use anthropic::AnthropicDriver;
pub use compat::OpenAiCompatDriver;
pub use openai::OpenAiDriver;

use async_trait::async_trait;
use futures::Stream;
use serde_json::Value;
use std::pin::Pin;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use url::Url;

use super::types::{ModelInfo, ProbeReport, RawStreamEvent, UnifiedError};

/// Wire-level failure or cancellation from a driver
///
/// Drivers do not classify errors; they hand the status and body back so the
/// adapter's classifier decides the taxonomy kind.
#[derive(Debug, thiserror::Error)]
pub enum DriverError {
    #[error("request cancelled")]
    Cancelled,

    #[error("upstream failure: {body}")]
    Wire { status: Option<u16>, body: String },
}

impl DriverError {
    pub fn transport(err: impl std::fmt::Display) -> Self {
        // Transport errors never saw an HTTP status; the message text still
        // feeds the substring classifier ("connection", "timeout", ...)
        Self::Wire {
            status: None,
            body: format!("connection error: {err}"),
        }
    }

    pub fn http(status: u16, body: impl Into<String>) -> Self {
        Self::Wire {
            status: Some(status),
            body: body.into(),
        }
    }
}

/// Lazy, finite sequence of raw provider events
///
/// The producer closes the sequence after a terminal finish reason,
/// end-of-stream, or a fatal transport error emitted as the final element.
pub type RawEventStream = Pin<Box<dyn Stream<Item = Result<RawStreamEvent, DriverError>> + Send>>;

/// Wire coordinates resolved from one user connection
#[derive(Debug, Clone)]
pub struct ProviderEndpoint {
    pub base_url: String,
    pub api_key: Option<String>,
    /// Models configured on the connection; compat discovery falls back here
    pub models: Vec<String>,
    pub timeout: Duration,
}

impl ProviderEndpoint {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: None,
            models: Vec::new(),
            timeout: Duration::from_secs(120),
        }
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    /// Build from a connection's config JSON, with a family default base URL
    ///
    /// A `base_url` that does not parse as an absolute http(s) URL rejects
    /// the connection as `invalid` before anything touches the wire.
    pub fn from_config(config: &Value, default_base_url: &str) -> Result<Self, UnifiedError> {
        let raw = config
            .get("base_url")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .unwrap_or(default_base_url);
        let parsed = Url::parse(raw).map_err(|e| {
            UnifiedError::invalid(format!("connection base_url is not a valid URL: {e}"))
        })?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(UnifiedError::invalid(format!(
                "connection base_url must be http or https, got {}",
                parsed.scheme()
            )));
        }
        let base_url = raw.trim_end_matches('/').to_string();

        let api_key = config
            .get("api_key")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_string);
        let models = config
            .get("models")
            .and_then(Value::as_array)
            .map(|list| {
                list.iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();
        let timeout = config
            .get("timeout_secs")
            .and_then(Value::as_u64)
            .map(Duration::from_secs)
            .unwrap_or(Duration::from_secs(120));

        Ok(Self {
            base_url,
            api_key,
            models,
            timeout,
        })
    }
}

/// HTTP client for one provider family
#[async_trait]
pub trait ProviderDriver: Send + Sync {
    /// Provider family name, matching the adapter registry key
    fn name(&self) -> &'static str;

    /// Base URL used when a connection's config does not set one
    fn default_base_url(&self) -> &'static str;

    /// Unary completion; returns the provider's raw JSON response
    async fn complete(
        &self,
        endpoint: &ProviderEndpoint,
        body: Value,
        cancel: &CancellationToken,
    ) -> Result<Value, DriverError>;

    /// Streaming completion as a lazy chunk sequence
    async fn stream_complete(
        &self,
        endpoint: &ProviderEndpoint,
        body: Value,
        cancel: CancellationToken,
    ) -> Result<RawEventStream, DriverError>;

    /// Models this endpoint serves
    async fn get_models(&self, endpoint: &ProviderEndpoint) -> Result<Vec<ModelInfo>, DriverError>;

    /// Zero-token reachability and credential probe
    async fn validate_config(&self, endpoint: &ProviderEndpoint) -> Result<ProbeReport, DriverError>;
}

/// Process-level bootstrap key for a family, backstopping connections
/// created without one; per-connection keys always win
pub fn bootstrap_api_key(provider_type: &str) -> Option<String> {
    let var = match provider_type {
        "openai" => "OPENAI_API_KEY",
        "anthropic" => "ANTHROPIC_API_KEY",
        _ => return None,
    };
    std::env::var(var).ok().filter(|v| !v.is_empty())
}

/// Driver for a provider type; unknown families use the compat wire
pub fn driver_for(provider_type: &str) -> std::sync::Arc<dyn ProviderDriver> {
    use once_cell::sync::Lazy;
    use std::sync::Arc;

    static OPENAI: Lazy<Arc<OpenAiDriver>> = Lazy::new(|| Arc::new(OpenAiDriver::new()));
    static ANTHROPIC: Lazy<Arc<AnthropicDriver>> = Lazy::new(|| Arc::new(AnthropicDriver::new()));
    static COMPAT: Lazy<Arc<OpenAiCompatDriver>> =
        Lazy::new(|| Arc::new(OpenAiCompatDriver::new()));

    match provider_type {
        "openai" => OPENAI.clone(),
        "anthropic" => ANTHROPIC.clone(),
        _ => COMPAT.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_endpoint_from_config() {
        let config = json!({
            "base_url": "http://localhost:11434/v1/",
            "api_key": "sk-local",
            "models": ["llama3", "mistral"],
            "timeout_secs": 30
        });
        let endpoint =
            ProviderEndpoint::from_config(&config, "https://api.openai.com/v1").unwrap();
        assert_eq!(endpoint.base_url, "http://localhost:11434/v1");
        assert_eq!(endpoint.api_key.as_deref(), Some("sk-local"));
        assert_eq!(endpoint.models, vec!["llama3", "mistral"]);
        assert_eq!(endpoint.timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_endpoint_defaults() {
        let endpoint =
            ProviderEndpoint::from_config(&json!({}), "https://api.openai.com/v1").unwrap();
        assert_eq!(endpoint.base_url, "https://api.openai.com/v1");
        assert!(endpoint.api_key.is_none());
        assert!(endpoint.models.is_empty());
    }

    #[test]
    fn test_endpoint_rejects_malformed_base_url() {
        let config = json!({ "base_url": "not a url" });
        let err =
            ProviderEndpoint::from_config(&config, "https://api.openai.com/v1").unwrap_err();
        assert_eq!(err.kind, crate::core::types::ErrorKind::Invalid);

        let config = json!({ "base_url": "ftp://host/v1" });
        let err =
            ProviderEndpoint::from_config(&config, "https://api.openai.com/v1").unwrap_err();
        assert_eq!(err.kind, crate::core::types::ErrorKind::Invalid);
        assert!(err.message.contains("http"));
    }

    #[test]
    fn test_driver_routing() {
        assert_eq!(driver_for("openai").name(), "openai");
        assert_eq!(driver_for("anthropic").name(), "anthropic");
        assert_eq!(driver_for("ollama").name(), "openai-compatible");
    }
}
