//! OpenAI-compatible driver
//!
//! Chat-completions wire against a configurable base URL: Ollama, LM Studio,
//! vLLM, and any other server speaking the OpenAI dialect. Local servers
//! ignore authentication, so a placeholder bearer token stands in when the
//! connection carries no key. Model discovery is tolerant: servers that
//! don't implement `/models` fall back to the connection's configured list.

use async_trait::async_trait;
use futures::StreamExt;
use serde_json::Value;
use std::time::Instant;
use tokio_util::sync::CancellationToken;

use super::sse::SseFramer;
use super::{DriverError, ProviderDriver, ProviderEndpoint, RawEventStream};
use crate::core::types::{ModelInfo, ProbeReport, RawStreamEvent};

/// Stands in for servers that ignore authentication entirely
const PLACEHOLDER_API_KEY: &str = "sk-no-key-required";

#[derive(Debug, Clone)]
pub struct OpenAiCompatDriver {
    name: &'static str,
    default_base_url: &'static str,
    /// Fall back to configured models when `/models` is unavailable
    tolerant_discovery: bool,
    client: reqwest::Client,
}

impl Default for OpenAiCompatDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl OpenAiCompatDriver {
    pub fn new() -> Self {
        Self::with_identity("openai-compatible", "http://localhost:11434/v1", true)
    }

    /// Same wire under a different family identity (used by the OpenAI driver)
    pub(super) fn with_identity(
        name: &'static str,
        default_base_url: &'static str,
        tolerant_discovery: bool,
    ) -> Self {
        Self {
            name,
            default_base_url,
            tolerant_discovery,
            client: reqwest::Client::builder()
                .connect_timeout(std::time::Duration::from_secs(10))
                .build()
                .unwrap_or_default(),
        }
    }

    fn bearer(endpoint: &ProviderEndpoint) -> String {
        format!(
            "Bearer {}",
            endpoint.api_key.as_deref().unwrap_or(PLACEHOLDER_API_KEY)
        )
    }

    /// POST with cancellation racing the send; non-2xx becomes a wire error
    async fn post(
        &self,
        endpoint: &ProviderEndpoint,
        path: &str,
        body: &Value,
        cancel: &CancellationToken,
        bounded: bool,
    ) -> Result<reqwest::Response, DriverError> {
        let url = format!("{}{}", endpoint.base_url, path);
        let mut request = self
            .client
            .post(&url)
            .header("Authorization", Self::bearer(endpoint))
            .json(body);
        if bounded {
            request = request.timeout(endpoint.timeout);
        }

        let response = tokio::select! {
            _ = cancel.cancelled() => return Err(DriverError::Cancelled),
            result = request.send() => result.map_err(DriverError::transport)?,
        };

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(DriverError::http(status.as_u16(), body));
        }
        Ok(response)
    }
}

#[async_trait]
impl ProviderDriver for OpenAiCompatDriver {
    fn name(&self) -> &'static str {
        self.name
    }

    fn default_base_url(&self) -> &'static str {
        self.default_base_url
    }

    async fn complete(
        &self,
        endpoint: &ProviderEndpoint,
        body: Value,
        cancel: &CancellationToken,
    ) -> Result<Value, DriverError> {
        let response = self
            .post(endpoint, "/chat/completions", &body, cancel, true)
            .await?;
        let bytes = tokio::select! {
            _ = cancel.cancelled() => return Err(DriverError::Cancelled),
            bytes = response.bytes() => bytes.map_err(DriverError::transport)?,
        };
        serde_json::from_slice(&bytes)
            .map_err(|e| DriverError::transport(format!("malformed response body: {e}")))
    }

    async fn stream_complete(
        &self,
        endpoint: &ProviderEndpoint,
        mut body: Value,
        cancel: CancellationToken,
    ) -> Result<RawEventStream, DriverError> {
        body["stream"] = Value::Bool(true);
        let response = self
            .post(endpoint, "/chat/completions", &body, &cancel, false)
            .await?;

        let stream = async_stream::stream! {
            let mut bytes = response.bytes_stream();
            let mut framer = SseFramer::new();

            'relay: loop {
                let chunk = tokio::select! {
                    _ = cancel.cancelled() => {
                        yield Err(DriverError::Cancelled);
                        break 'relay;
                    }
                    chunk = bytes.next() => chunk,
                };

                match chunk {
                    Some(Ok(chunk)) => {
                        for frame in framer.push(&chunk) {
                            if frame.data.trim() == "[DONE]" {
                                break 'relay;
                            }
                            if frame.data.is_empty() {
                                continue;
                            }
                            match serde_json::from_str::<Value>(&frame.data) {
                                Ok(data) => {
                                    yield Ok(match frame.event {
                                        Some(event) => RawStreamEvent::named(event, data),
                                        None => RawStreamEvent::new(data),
                                    });
                                }
                                // Partial servers emit stray non-JSON lines; skip them
                                Err(_) => continue,
                            }
                        }
                    }
                    Some(Err(e)) => {
                        yield Err(DriverError::transport(e));
                        break 'relay;
                    }
                    None => break 'relay,
                }
            }
        };

        Ok(Box::pin(stream))
    }

    async fn get_models(&self, endpoint: &ProviderEndpoint) -> Result<Vec<ModelInfo>, DriverError> {
        let url = format!("{}/models", endpoint.base_url);
        let result: Result<Vec<ModelInfo>, DriverError> = async {
            let response = self
                .client
                .get(&url)
                .header("Authorization", Self::bearer(endpoint))
                .timeout(endpoint.timeout)
                .send()
                .await
                .map_err(DriverError::transport)?;
            let status = response.status();
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(DriverError::http(status.as_u16(), body));
            }
            let value: Value = response
                .json()
                .await
                .map_err(|e| DriverError::transport(format!("malformed model list: {e}")))?;
            let models = value
                .get("data")
                .and_then(Value::as_array)
                .map(|list| {
                    list.iter()
                        .filter_map(|m| m.get("id").and_then(Value::as_str))
                        .map(ModelInfo::new)
                        .collect()
                })
                .unwrap_or_default();
            Ok(models)
        }
        .await;

        match result {
            Ok(models) if !models.is_empty() => Ok(models),
            Ok(_) | Err(_) if self.tolerant_discovery => Ok(endpoint
                .models
                .iter()
                .map(|m| ModelInfo::new(m.as_str()))
                .collect()),
            other => other,
        }
    }

    async fn validate_config(
        &self,
        endpoint: &ProviderEndpoint,
    ) -> Result<ProbeReport, DriverError> {
        let started = Instant::now();
        let url = format!("{}/models", endpoint.base_url);
        let outcome = self
            .client
            .get(&url)
            .header("Authorization", Self::bearer(endpoint))
            .timeout(endpoint.timeout)
            .send()
            .await;
        let latency_ms = started.elapsed().as_millis() as u64;

        let report = match outcome {
            Ok(response) if response.status().is_success() => ProbeReport {
                available: true,
                latency_ms,
                message: None,
            },
            Ok(response) => ProbeReport {
                available: false,
                latency_ms,
                message: Some(format!("endpoint answered {}", response.status())),
            },
            Err(e) => ProbeReport {
                available: false,
                latency_ms,
                message: Some(format!("unreachable: {e}")),
            },
        };
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity() {
        let driver = OpenAiCompatDriver::new();
        assert_eq!(driver.name(), "openai-compatible");
        assert_eq!(driver.default_base_url(), "http://localhost:11434/v1");
    }

    #[test]
    fn test_placeholder_bearer_when_no_key() {
        let endpoint = ProviderEndpoint::new("http://localhost:1234/v1");
        assert_eq!(
            OpenAiCompatDriver::bearer(&endpoint),
            "Bearer sk-no-key-required"
        );

        let endpoint = endpoint.with_api_key("sk-real");
        assert_eq!(OpenAiCompatDriver::bearer(&endpoint), "Bearer sk-real");
    }
}
