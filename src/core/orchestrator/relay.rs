//! Streaming relay
//!
//! Single producer, single consumer: raw driver events come in, tagged
//! chunks go out through a bounded channel that backpressures the upstream
//! read. The relay buffers content for end-of-stream persistence, guarantees
//! exactly one terminal chunk, and turns a stuck upstream into cancellation
//! via the watchdog.

use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::core::adapters::Adapter;
use crate::core::drivers::{DriverError, RawEventStream};
use crate::core::types::{FinishReason, UnifiedError, UnifiedStreamChunk, Usage};

/// Idle limit before a stream is declared stuck and force-closed
pub const STREAM_WATCHDOG: Duration = Duration::from_secs(180);

/// Everything the orchestrator needs to know after a stream ends
#[derive(Debug, Default)]
pub struct RelayOutcome {
    /// Concatenated content deltas, for the persisted assistant message
    pub buffered: String,
    pub finish: Option<FinishReason>,
    pub usage: Option<Usage>,
    pub error: Option<UnifiedError>,
    pub cancelled: bool,
}

impl RelayOutcome {
    /// Clean completion with a terminal done chunk delivered
    pub fn completed(&self) -> bool {
        !self.cancelled && self.error.is_none() && self.finish.is_some()
    }
}

pub struct StreamRelay {
    adapter: Arc<dyn Adapter>,
    tx: mpsc::Sender<UnifiedStreamChunk>,
    cancel: CancellationToken,
    watchdog: Duration,
}

impl StreamRelay {
    pub fn new(
        adapter: Arc<dyn Adapter>,
        tx: mpsc::Sender<UnifiedStreamChunk>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            adapter,
            tx,
            cancel,
            watchdog: STREAM_WATCHDOG,
        }
    }

    pub fn with_watchdog(mut self, watchdog: Duration) -> Self {
        self.watchdog = watchdog;
        self
    }

    /// Drain the raw stream; returns once a terminal chunk was forwarded,
    /// the upstream closed, or the request was cancelled
    pub async fn run(self, mut raw: RawEventStream) -> RelayOutcome {
        let mut outcome = RelayOutcome::default();

        'relay: loop {
            let next = tokio::select! {
                _ = self.cancel.cancelled() => {
                    outcome.cancelled = true;
                    break 'relay;
                }
                next = tokio::time::timeout(self.watchdog, raw.next()) => next,
            };

            let item = match next {
                // Watchdog fired: raise cancellation so the driver aborts
                Err(_) => {
                    self.cancel.cancel();
                    outcome.cancelled = true;
                    break 'relay;
                }
                Ok(None) => break 'relay,
                Ok(Some(item)) => item,
            };

            match item {
                Ok(event) => {
                    let Some(chunk) = self.adapter.normalize_stream_chunk(&event) else {
                        continue;
                    };
                    match &chunk {
                        UnifiedStreamChunk::Content { content } => {
                            outcome.buffered.push_str(content);
                        }
                        UnifiedStreamChunk::Done {
                            finish_reason,
                            usage,
                        } => {
                            outcome.finish = Some(*finish_reason);
                            outcome.usage = *usage;
                        }
                        UnifiedStreamChunk::Error { error } => {
                            outcome.error = Some(error.clone());
                        }
                        _ => {}
                    }

                    let terminal = chunk.is_terminal();
                    if self.tx.send(chunk).await.is_err() {
                        // Downstream consumer is gone; treat as client cancel
                        self.cancel.cancel();
                        outcome.cancelled = true;
                        break 'relay;
                    }
                    if terminal {
                        break 'relay;
                    }
                }
                Err(DriverError::Cancelled) => {
                    outcome.cancelled = true;
                    break 'relay;
                }
                Err(DriverError::Wire { status, body }) => {
                    let error = self.adapter.normalize_error(status, &body);
                    outcome.error = Some(error.clone());
                    let _ = self.tx.send(UnifiedStreamChunk::Error { error }).await;
                    break 'relay;
                }
            }
        }

        // Upstream closed without saying why: report a clean stop so the
        // client always sees exactly one terminal chunk
        if !outcome.cancelled && outcome.error.is_none() && outcome.finish.is_none() {
            outcome.finish = Some(FinishReason::Stop);
            let _ = self
                .tx
                .send(UnifiedStreamChunk::done(FinishReason::Stop))
                .await;
        }

        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::adapters::OpenAiCompatAdapter;
    use crate::core::types::RawStreamEvent;
    use serde_json::json;

    fn content_event(text: &str) -> Result<RawStreamEvent, DriverError> {
        Ok(RawStreamEvent::new(json!({
            "choices": [{ "delta": { "content": text }, "finish_reason": null }]
        })))
    }

    fn done_event() -> Result<RawStreamEvent, DriverError> {
        Ok(RawStreamEvent::new(json!({
            "choices": [{ "delta": {}, "finish_reason": "stop" }]
        })))
    }

    fn relay(
        tx: mpsc::Sender<UnifiedStreamChunk>,
        cancel: CancellationToken,
    ) -> StreamRelay {
        StreamRelay::new(Arc::new(OpenAiCompatAdapter::new()), tx, cancel)
    }

    async fn collect(mut rx: mpsc::Receiver<UnifiedStreamChunk>) -> Vec<UnifiedStreamChunk> {
        let mut chunks = Vec::new();
        while let Some(chunk) = rx.recv().await {
            chunks.push(chunk);
        }
        chunks
    }

    #[tokio::test]
    async fn test_content_then_single_done() {
        let (tx, rx) = mpsc::channel(8);
        let raw: RawEventStream = Box::pin(futures::stream::iter(vec![
            content_event("Hel"),
            content_event("lo"),
            done_event(),
        ]));

        let outcome = relay(tx, CancellationToken::new()).run(raw).await;
        assert!(outcome.completed());
        assert_eq!(outcome.buffered, "Hello");

        let chunks = collect(rx).await;
        let dones = chunks
            .iter()
            .filter(|c| matches!(c, UnifiedStreamChunk::Done { .. }))
            .count();
        assert_eq!(dones, 1);
        assert!(matches!(chunks.last().unwrap(), UnifiedStreamChunk::Done { .. }));
    }

    #[tokio::test]
    async fn test_eof_without_finish_synthesizes_done() {
        let (tx, rx) = mpsc::channel(8);
        let raw: RawEventStream =
            Box::pin(futures::stream::iter(vec![content_event("partial")]));

        let outcome = relay(tx, CancellationToken::new()).run(raw).await;
        assert_eq!(outcome.finish, Some(FinishReason::Stop));

        let chunks = collect(rx).await;
        assert!(matches!(chunks.last().unwrap(), UnifiedStreamChunk::Done { .. }));
    }

    #[tokio::test]
    async fn test_wire_error_becomes_terminal_error_chunk() {
        let (tx, rx) = mpsc::channel(8);
        let raw: RawEventStream = Box::pin(futures::stream::iter(vec![
            content_event("x"),
            Err(DriverError::http(429, "rate limit exceeded")),
        ]));

        let outcome = relay(tx, CancellationToken::new()).run(raw).await;
        assert!(!outcome.completed());
        let error = outcome.error.unwrap();
        assert_eq!(error.kind, crate::core::types::ErrorKind::RateLimit);

        let chunks = collect(rx).await;
        // One terminal error chunk and nothing after it
        assert!(matches!(chunks.last().unwrap(), UnifiedStreamChunk::Error { .. }));
        let errors = chunks
            .iter()
            .filter(|c| matches!(c, UnifiedStreamChunk::Error { .. }))
            .count();
        assert_eq!(errors, 1);
    }

    #[tokio::test]
    async fn test_cancellation_keeps_partial_buffer() {
        let (tx, rx) = mpsc::channel(8);
        let cancel = CancellationToken::new();

        let cancel_after_two = cancel.clone();
        let raw: RawEventStream = Box::pin(async_stream::stream! {
            yield content_event("one ");
            yield content_event("two");
            cancel_after_two.cancel();
            // Upstream would keep going; the relay must not
            futures::future::pending::<()>().await;
            yield done_event();
        });

        let outcome = relay(tx, cancel).run(raw).await;
        assert!(outcome.cancelled);
        assert_eq!(outcome.buffered, "one two");
        assert!(outcome.finish.is_none());

        let chunks = collect(rx).await;
        // No synthesized done after a cancel
        assert!(!chunks.iter().any(|c| matches!(c, UnifiedStreamChunk::Done { .. })));
    }

    #[tokio::test]
    async fn test_watchdog_force_closes_stuck_stream() {
        let (tx, _rx) = mpsc::channel(8);
        let cancel = CancellationToken::new();
        let raw: RawEventStream = Box::pin(futures::stream::pending());

        let outcome = relay(tx, cancel.clone())
            .with_watchdog(Duration::from_millis(20))
            .run(raw)
            .await;
        assert!(outcome.cancelled);
        // The watchdog raises cancellation for the driver side too
        assert!(cancel.is_cancelled());
    }

    #[tokio::test]
    async fn test_dropped_consumer_cancels_upstream() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let cancel = CancellationToken::new();
        let raw: RawEventStream = Box::pin(futures::stream::iter(vec![
            content_event("a"),
            content_event("b"),
            done_event(),
        ]));

        let outcome = relay(tx, cancel.clone()).run(raw).await;
        assert!(outcome.cancelled);
        assert!(cancel.is_cancelled());
    }
}
