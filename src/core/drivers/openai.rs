//! OpenAI driver
//!
//! api.openai.com speaks the exact wire the compat driver implements, so
//! this driver is the compat wire pinned to the hosted base URL, with strict
//! model discovery (a failing `/v1/models` is an error, not a shrug).

use async_trait::async_trait;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use super::compat::OpenAiCompatDriver;
use super::{DriverError, ProviderDriver, ProviderEndpoint, RawEventStream};
use crate::core::types::{ModelInfo, ProbeReport};

#[derive(Debug, Clone)]
pub struct OpenAiDriver {
    inner: OpenAiCompatDriver,
}

impl Default for OpenAiDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl OpenAiDriver {
    pub fn new() -> Self {
        Self {
            inner: OpenAiCompatDriver::with_identity("openai", "https://api.openai.com/v1", false),
        }
    }
}

#[async_trait]
impl ProviderDriver for OpenAiDriver {
    fn name(&self) -> &'static str {
        "openai"
    }

    fn default_base_url(&self) -> &'static str {
        "https://api.openai.com/v1"
    }

    async fn complete(
        &self,
        endpoint: &ProviderEndpoint,
        body: Value,
        cancel: &CancellationToken,
    ) -> Result<Value, DriverError> {
        self.inner.complete(endpoint, body, cancel).await
    }

    async fn stream_complete(
        &self,
        endpoint: &ProviderEndpoint,
        body: Value,
        cancel: CancellationToken,
    ) -> Result<RawEventStream, DriverError> {
        self.inner.stream_complete(endpoint, body, cancel).await
    }

    async fn get_models(&self, endpoint: &ProviderEndpoint) -> Result<Vec<ModelInfo>, DriverError> {
        self.inner.get_models(endpoint).await
    }

    async fn validate_config(
        &self,
        endpoint: &ProviderEndpoint,
    ) -> Result<ProbeReport, DriverError> {
        self.inner.validate_config(endpoint).await
    }
}
