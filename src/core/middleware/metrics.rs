//! Per-route metrics middleware
//!
//! Latency and token counters bucketed by `(provider, model, connection)`.
//! The registry is shared with whatever exposes metrics to operators.

use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use uuid::Uuid;

use super::{ChatMiddleware, RequestCx};
use crate::core::types::{UnifiedChatRequest, UnifiedChatResponse, UnifiedError};

/// Counters for one `(provider, model, connection)` bucket
#[derive(Debug, Clone, Default)]
pub struct RequestStats {
    pub requests: u64,
    pub errors: u64,
    pub total_latency_ms: u64,
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub estimated_cost: f64,
}

impl RequestStats {
    pub fn average_latency_ms(&self) -> u64 {
        if self.requests == 0 {
            0
        } else {
            self.total_latency_ms / self.requests
        }
    }
}

type BucketKey = (String, String, Option<Uuid>);

/// Shared metrics store
#[derive(Debug, Default)]
pub struct MetricsRegistry {
    buckets: DashMap<BucketKey, RequestStats>,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn record(&self, key: BucketKey, latency_ms: u64, outcome: Result<(u32, u32, f64), ()>) {
        let mut bucket = self.buckets.entry(key).or_default();
        bucket.requests += 1;
        bucket.total_latency_ms += latency_ms;
        match outcome {
            Ok((prompt, completion, cost)) => {
                bucket.prompt_tokens += u64::from(prompt);
                bucket.completion_tokens += u64::from(completion);
                bucket.estimated_cost += cost;
            }
            Err(()) => bucket.errors += 1,
        }
    }

    pub fn snapshot(&self) -> Vec<(BucketKey, RequestStats)> {
        self.buckets
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }

    pub fn stats_for(&self, provider: &str, model: &str, connection_id: Option<Uuid>) -> Option<RequestStats> {
        self.buckets
            .get(&(provider.to_string(), model.to_string(), connection_id))
            .map(|b| b.value().clone())
    }
}

pub struct MetricsMiddleware {
    registry: Arc<MetricsRegistry>,
}

impl MetricsMiddleware {
    pub fn new(registry: Arc<MetricsRegistry>) -> Self {
        Self { registry }
    }
}

#[async_trait]
impl ChatMiddleware for MetricsMiddleware {
    fn name(&self) -> &'static str {
        "metrics"
    }

    async fn post(
        &self,
        cx: &mut RequestCx,
        _request: &UnifiedChatRequest,
        outcome: &mut Result<UnifiedChatResponse, UnifiedError>,
    ) {
        let (key, latency_ms, recorded) = match outcome {
            Ok(response) => (
                (
                    response.metadata.provider.clone(),
                    response.metadata.model.clone(),
                    response.metadata.connection_id,
                ),
                response.metadata.latency_ms,
                Ok((
                    response.usage.prompt_tokens,
                    response.usage.completion_tokens,
                    response.usage.estimated_cost,
                )),
            ),
            Err(_) => (
                (
                    cx.provider.clone().unwrap_or_else(|| "unresolved".to_string()),
                    cx.model.clone().unwrap_or_else(|| "unresolved".to_string()),
                    cx.connection_id,
                ),
                cx.elapsed_ms(),
                Err(()),
            ),
        };
        self.registry.record(key, latency_ms, recorded);
    }
}
