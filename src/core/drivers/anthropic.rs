//! Anthropic driver
//!
//! Claude's messages API: `POST /v1/messages` with `x-api-key` and a pinned
//! `anthropic-version`, streaming as named SSE events (`message_start`,
//! `content_block_start`, `content_block_delta`, `message_delta`,
//! `message_stop`). There is no models endpoint; discovery returns a static
//! catalog.

use async_trait::async_trait;
use futures::StreamExt;
use serde_json::{Value, json};
use std::time::Instant;
use tokio_util::sync::CancellationToken;

use super::sse::SseFramer;
use super::{DriverError, ProviderDriver, ProviderEndpoint, RawEventStream};
use crate::core::types::{ModelInfo, ProbeReport, RawStreamEvent};

const API_VERSION: &str = "2023-06-01";

/// Catalog served in place of a models endpoint
const KNOWN_MODELS: &[&str] = &[
    "claude-3-5-sonnet-20241022",
    "claude-3-5-haiku-20241022",
    "claude-3-opus-20240229",
    "claude-3-sonnet-20240229",
    "claude-3-haiku-20240307",
];

#[derive(Debug, Clone)]
pub struct AnthropicDriver {
    client: reqwest::Client,
}

impl Default for AnthropicDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl AnthropicDriver {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::builder()
                .connect_timeout(std::time::Duration::from_secs(10))
                .build()
                .unwrap_or_default(),
        }
    }

    async fn post_messages(
        &self,
        endpoint: &ProviderEndpoint,
        body: &Value,
        cancel: &CancellationToken,
        bounded: bool,
    ) -> Result<reqwest::Response, DriverError> {
        let url = format!("{}/v1/messages", endpoint.base_url);
        let mut request = self
            .client
            .post(&url)
            .header("x-api-key", endpoint.api_key.as_deref().unwrap_or_default())
            .header("anthropic-version", API_VERSION)
            .header("content-type", "application/json")
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
impl ProviderDriver for AnthropicDriver {
    fn name(&self) -> &'static str {
        "anthropic"
    }

    fn default_base_url(&self) -> &'static str {
        "https://api.anthropic.com"
    }

    async fn complete(
        &self,
        endpoint: &ProviderEndpoint,
        body: Value,
        cancel: &CancellationToken,
    ) -> Result<Value, DriverError> {
        let response = self.post_messages(endpoint, &body, cancel, true).await?;
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
        let response = self.post_messages(endpoint, &body, &cancel, false).await?;

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
                            if frame.data.is_empty() {
                                continue;
                            }
                            let Ok(data) = serde_json::from_str::<Value>(&frame.data) else {
                                continue;
                            };
                            let terminal = frame.event.as_deref() == Some("message_stop")
                                || data.get("type").and_then(Value::as_str)
                                    == Some("message_stop");
                            yield Ok(match frame.event {
                                Some(event) => RawStreamEvent::named(event, data),
                                None => RawStreamEvent::new(data),
                            });
                            if terminal {
                                break 'relay;
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

    async fn get_models(&self, _endpoint: &ProviderEndpoint) -> Result<Vec<ModelInfo>, DriverError> {
        Ok(KNOWN_MODELS
            .iter()
            .map(|id| {
                let mut model = ModelInfo::new(*id);
                model.owned_by = Some("anthropic".to_string());
                model
            })
            .collect())
    }

    async fn validate_config(
        &self,
        endpoint: &ProviderEndpoint,
    ) -> Result<ProbeReport, DriverError> {
        // An empty messages list is rejected before any tokens are sampled,
        // but only after the key is checked: 400 means reachable and
        // authenticated, 401/403 means bad credentials.
        let probe = json!({
            "model": endpoint.models.first().map(String::as_str).unwrap_or("claude-3-haiku-20240307"),
            "messages": [],
            "max_tokens": 1,
        });
        let started = Instant::now();
        let cancel = CancellationToken::new();
        let outcome = self.post_messages(endpoint, &probe, &cancel, true).await;
        let latency_ms = started.elapsed().as_millis() as u64;

        let report = match outcome {
            Ok(_) => ProbeReport {
                available: true,
                latency_ms,
                message: None,
            },
            Err(DriverError::Wire { status: Some(400), .. }) => ProbeReport {
                available: true,
                latency_ms,
                message: None,
            },
            Err(DriverError::Wire { status, body }) => ProbeReport {
                available: false,
                latency_ms,
                message: Some(match status {
                    Some(s) => format!("endpoint answered {s}: {body}"),
                    None => body,
                }),
            },
            Err(DriverError::Cancelled) => ProbeReport {
                available: false,
                latency_ms,
                message: Some("probe cancelled".to_string()),
            },
        };
        Ok(report)
    }
}
