//! Per-user rate limiting middleware
//!
//! Token bucket per user: capacity = requests-per-minute, refilled
//! continuously. Check and spend happen under one bucket entry, so
//! concurrent requests cannot both pass on the same last token.

use async_trait::async_trait;
use dashmap::DashMap;
use std::time::Instant;
use uuid::Uuid;

use super::{ChatMiddleware, RequestCx};
use crate::core::types::{UnifiedChatRequest, UnifiedError};

pub const DEFAULT_REQUESTS_PER_MINUTE: u32 = 100;

#[derive(Debug)]
struct TokenBucket {
    tokens: f64,
    last_refill: Instant,
}

pub struct RateLimitMiddleware {
    requests_per_minute: u32,
    buckets: DashMap<Uuid, TokenBucket>,
}

impl RateLimitMiddleware {
    pub fn new(requests_per_minute: u32) -> Self {
        Self {
            requests_per_minute,
            buckets: DashMap::new(),
        }
    }

    /// Spend one token; false means the bucket is dry
    fn try_acquire(&self, user_id: Uuid, now: Instant) -> bool {
        let capacity = f64::from(self.requests_per_minute);
        let mut bucket = self.buckets.entry(user_id).or_insert_with(|| TokenBucket {
            tokens: capacity,
            last_refill: now,
        });

        let elapsed = now.duration_since(bucket.last_refill).as_secs_f64();
        bucket.tokens = (bucket.tokens + elapsed * capacity / 60.0).min(capacity);
        bucket.last_refill = now;

        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

impl Default for RateLimitMiddleware {
    fn default() -> Self {
        Self::new(DEFAULT_REQUESTS_PER_MINUTE)
    }
}

#[async_trait]
impl ChatMiddleware for RateLimitMiddleware {
    fn name(&self) -> &'static str {
        "rate_limit"
    }

    async fn pre(
        &self,
        cx: &mut RequestCx,
        _request: &mut UnifiedChatRequest,
    ) -> Result<(), UnifiedError> {
        if self.try_acquire(cx.user_id, Instant::now()) {
            Ok(())
        } else {
            Err(UnifiedError::rate_limit(format!(
                "user exceeded {} requests per minute",
                self.requests_per_minute
            )))
        }
    }
}
