//! Request orchestration
//!
//! The entry point for every chat request: middleware, connection
//! resolution, adapter lookup, context assembly, the provider call (unary or
//! streaming relay), recovery policy, and persistence. The orchestrator owns
//! a request's whole lifetime; stores own the rows, adapters and drivers
//! stay stateless.
//!
//! Recovery policy in one place: `rate_limit` and `network` get one backoff
//! retry, `model_limit` gets one retry after shedding the oldest context
//! message, an error-carried fallback suggestion gets one hop, and nothing
//! is ever retried after the first byte reached the client or after
//! cancellation.

pub mod relay;
pub mod resolve;

pub use relay::{RelayOutcome, STREAM_WATCHDOG, StreamRelay};

use sea_orm::DatabaseConnection;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use tracing::{error, warn};
use uuid::Uuid;

use super::adapters::{Adapter, AdapterRegistry, ResponseContext};
use super::context::{ContextAssembler, ContextStrategy, Summarizer};
use super::drivers::{DriverError, ProviderDriver, ProviderEndpoint, driver_for};
use super::middleware::{MetricsRegistry, MiddlewareChain, RequestCx};
use super::pricing;
use super::types::{
    ErrorKind, GatewayError, MessageRole, ModelInfo, ProbeReport, ResponseMetadata, ToolCall,
    UnifiedChatRequest, UnifiedChatResponse, UnifiedError, UnifiedStreamChunk,
};
use crate::storage::sessions::NewMessage;
use crate::storage::{
    Connection, ConnectionRegistry, Session, SessionStore, StorageError,
};

/// Backoff before the single local retry
const RETRY_BACKOFF: Duration = Duration::from_millis(500);

/// Bounded channel between the relay and the transport consumer
const STREAM_CHANNEL_CAPACITY: usize = 32;

/// Everything resolved for one provider attempt
struct ActiveRoute {
    adapter: Arc<dyn Adapter>,
    driver: Arc<dyn ProviderDriver>,
    endpoint: ProviderEndpoint,
    provider_id: String,
    connection_id: Uuid,
    model: String,
}

#[derive(Clone)]
pub struct Orchestrator {
    adapters: Arc<AdapterRegistry>,
    sessions: SessionStore,
    connections: ConnectionRegistry,
    assembler: ContextAssembler,
    summarizer: Summarizer,
    middleware: MiddlewareChain,
    metrics: Arc<MetricsRegistry>,
}

impl Orchestrator {
    pub fn new(db: DatabaseConnection, strategy: ContextStrategy, requests_per_minute: u32) -> Self {
        let adapters = Arc::new(AdapterRegistry::new());
        let sessions = SessionStore::new(db.clone());
        let connections = ConnectionRegistry::new(db);
        let assembler = ContextAssembler::new(sessions.clone(), strategy);
        let summarizer = Summarizer::new(sessions.clone(), connections.clone(), adapters.clone());
        let metrics = Arc::new(MetricsRegistry::new());
        let middleware = MiddlewareChain::standard(metrics.clone(), requests_per_minute);

        Self {
            adapters,
            sessions,
            connections,
            assembler,
            summarizer,
            middleware,
            metrics,
        }
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    pub fn connections(&self) -> &ConnectionRegistry {
        &self.connections
    }

    pub fn adapters(&self) -> &Arc<AdapterRegistry> {
        &self.adapters
    }

    pub fn metrics(&self) -> &Arc<MetricsRegistry> {
        &self.metrics
    }

    // ==================== Unary ====================

    /// One request, one response
    pub async fn chat(
        &self,
        mut request: UnifiedChatRequest,
        cancel: CancellationToken,
    ) -> Result<UnifiedChatResponse, GatewayError> {
        let mut cx = RequestCx::new(request.user_id, false);

        if let Err(error) = self.middleware.run_pre(&mut cx, &mut request).await {
            let mut outcome = Err(error);
            self.middleware.run_post(&mut cx, &request, &mut outcome).await;
            return outcome.map_err(Into::into);
        }

        match self.execute_unary(&mut cx, &request, &cancel).await {
            Ok(response) => {
                let mut outcome = Ok(response);
                self.middleware.run_post(&mut cx, &request, &mut outcome).await;
                outcome.map_err(Into::into)
            }
            Err(GatewayError::Upstream(error)) => {
                let mut outcome = Err(error);
                self.middleware.run_post(&mut cx, &request, &mut outcome).await;
                outcome.map_err(Into::into)
            }
            // Cancellation is an expected termination, not a failure record
            Err(other) => Err(other),
        }
    }

    async fn execute_unary(
        &self,
        cx: &mut RequestCx,
        request: &UnifiedChatRequest,
        cancel: &CancellationToken,
    ) -> Result<UnifiedChatResponse, GatewayError> {
        let (mut route, session, mut effective) = self.prepare(cx, request).await?;
        self.persist_user_turn(session.as_ref(), request).await?;

        let started = Instant::now();
        let mut retries = 0u32;
        let mut fallback_used = false;
        let mut context_reduced = false;
        let mut backed_off = false;

        loop {
            let body = route.adapter.normalize_request(&effective, &route.model)?;
            let attempt = route.driver.complete(&route.endpoint, body, cancel).await;
            match attempt {
                Ok(raw) => {
                    let mut response = route.adapter.normalize_response(
                        raw,
                        &ResponseContext {
                            provider: route.provider_id.clone(),
                            model: route.model.clone(),
                            connection_id: Some(route.connection_id),
                            latency_ms: started.elapsed().as_millis() as u64,
                            retries,
                            fallback_used,
                        },
                    )?;
                    response.usage.total_tokens =
                        response.usage.prompt_tokens + response.usage.completion_tokens;

                    if let Some(session) = &session {
                        self.persist_assistant(
                            session,
                            response.content.clone(),
                            response.tools.clone(),
                            false,
                        )
                        .await;
                    }
                    return Ok(response);
                }
                Err(DriverError::Cancelled) => return Err(GatewayError::Cancelled),
                Err(DriverError::Wire { status, body }) => {
                    let error = route.adapter.normalize_error(status, &body);
                    match self
                        .recover(
                            RecoveryState {
                                error,
                                request: &mut effective,
                                route: &mut route,
                                user_id: request.user_id,
                                retries: &mut retries,
                                fallback_used: &mut fallback_used,
                                context_reduced: &mut context_reduced,
                                backed_off: &mut backed_off,
                            },
                            cancel,
                        )
                        .await?
                    {
                        Recovery::Retry => continue,
                        Recovery::GiveUp(error) => return Err(error.into()),
                    }
                }
            }
        }
    }

    // ==================== Streaming ====================

    /// One request, a lazy finite chunk sequence
    ///
    /// Resolution and connection errors surface as `Err` before any chunk
    /// flows; after that, failures arrive as the stream's terminal `error`
    /// chunk and never as a partial success.
    pub async fn chat_stream(
        &self,
        mut request: UnifiedChatRequest,
        cancel: CancellationToken,
    ) -> Result<ReceiverStream<UnifiedStreamChunk>, GatewayError> {
        let mut cx = RequestCx::new(request.user_id, true);

        if let Err(error) = self.middleware.run_pre(&mut cx, &mut request).await {
            let mut outcome = Err(error);
            self.middleware.run_post(&mut cx, &request, &mut outcome).await;
            return Err(match outcome {
                Err(error) => error.into(),
                Ok(_) => GatewayError::configuration("middleware rewrote a rejection"),
            });
        }

        let (mut route, session, mut effective) = self.prepare(&mut cx, &request).await?;
        self.persist_user_turn(session.as_ref(), &request).await?;

        let child = cancel.child_token();
        let started = Instant::now();
        let mut retries = 0u32;
        let mut fallback_used = false;
        let mut context_reduced = false;
        let mut backed_off = false;

        // Recovery applies only while establishing the stream; once bytes
        // move, the relay owns the outcome
        let raw = loop {
            let body = route.adapter.normalize_request(&effective, &route.model)?;
            let attempt = route
                .driver
                .stream_complete(&route.endpoint, body, child.clone())
                .await;
            match attempt {
                Ok(raw) => break raw,
                Err(DriverError::Cancelled) => return Err(GatewayError::Cancelled),
                Err(DriverError::Wire { status, body }) => {
                    let error = route.adapter.normalize_error(status, &body);
                    match self
                        .recover(
                            RecoveryState {
                                error,
                                request: &mut effective,
                                route: &mut route,
                                user_id: request.user_id,
                                retries: &mut retries,
                                fallback_used: &mut fallback_used,
                                context_reduced: &mut context_reduced,
                                backed_off: &mut backed_off,
                            },
                            &cancel,
                        )
                        .await?
                    {
                        Recovery::Retry => continue,
                        Recovery::GiveUp(error) => {
                            let mut outcome = Err(error);
                            self.middleware
                                .run_post(&mut cx, &request, &mut outcome)
                                .await;
                            return Err(match outcome {
                                Err(error) => error.into(),
                                Ok(_) => {
                                    GatewayError::configuration("middleware rewrote a rejection")
                                }
                            });
                        }
                    }
                }
            }
        };

        let (tx, rx) = mpsc::channel(STREAM_CHANNEL_CAPACITY);
        let relay = StreamRelay::new(route.adapter.clone(), tx, child);

        let orchestrator = self.clone();
        let meta = ResponseContext {
            provider: route.provider_id.clone(),
            model: route.model.clone(),
            connection_id: Some(route.connection_id),
            latency_ms: 0,
            retries,
            fallback_used,
        };
        tokio::spawn(async move {
            let outcome = relay.run(raw).await;
            orchestrator
                .finish_stream(outcome, session, meta, started, cx, request)
                .await;
        });

        Ok(ReceiverStream::new(rx))
    }

    /// End-of-stream bookkeeping: persistence, post-middlewares, summaries
    async fn finish_stream(
        &self,
        outcome: RelayOutcome,
        session: Option<Session>,
        meta: ResponseContext,
        started: Instant,
        mut cx: RequestCx,
        request: UnifiedChatRequest,
    ) {
        if let Some(session) = &session {
            if !outcome.buffered.is_empty() && outcome.error.is_none() {
                // Done chunks persist whole; cancelled partials persist
                // flagged, empty partials are discarded
                self.persist_assistant(
                    session,
                    outcome.buffered.clone(),
                    None,
                    outcome.cancelled,
                )
                .await;
            }
        }

        if outcome.cancelled {
            return;
        }

        let mut result = match &outcome.error {
            Some(error) => Err(error.clone()),
            None => {
                let mut usage = outcome.usage.unwrap_or_default();
                usage.total_tokens = usage.prompt_tokens + usage.completion_tokens;
                if usage.estimated_cost == 0.0 {
                    usage.estimated_cost =
                        pricing::estimate_cost(&usage, &meta.provider, &meta.model);
                }
                Ok(UnifiedChatResponse {
                    id: cx.request_id.to_string(),
                    content: outcome.buffered,
                    role: MessageRole::Assistant,
                    usage,
                    metadata: ResponseMetadata {
                        provider: meta.provider,
                        model: meta.model,
                        connection_id: meta.connection_id,
                        latency_ms: started.elapsed().as_millis() as u64,
                        retries: meta.retries,
                        fallback_used: meta.fallback_used,
                        truncated: false,
                    },
                    functions: None,
                    tools: None,
                    finish_reason: outcome.finish,
                })
            }
        };
        self.middleware.run_post(&mut cx, &request, &mut result).await;
    }

    // ==================== Shared request plumbing ====================

    /// Resolve the route, load the session, and assemble the effective
    /// message list for this turn
    async fn prepare(
        &self,
        cx: &mut RequestCx,
        request: &UnifiedChatRequest,
    ) -> Result<(ActiveRoute, Option<Session>, UnifiedChatRequest), GatewayError> {
        let connection = resolve::resolve_connection(&self.connections, request).await?;
        cx.provider = Some(connection.provider_id.clone());
        cx.connection_id = Some(connection.id);

        let session = match request.session_id {
            Some(session_id) => Some(
                self.sessions
                    .get_session(request.user_id, session_id)
                    .await
                    .map_err(|e| {
                        if e.is_not_found() {
                            GatewayError::from(UnifiedError::invalid("unknown session"))
                        } else {
                            GatewayError::Storage(e)
                        }
                    })?,
            ),
            None => None,
        };

        let explicit_model = request
            .preferences
            .model
            .as_deref()
            .or(session.as_ref().and_then(|s| s.model.as_deref()));
        let model = resolve::pick_model(&connection.provider_id, &connection.config, explicit_model)
            .ok_or_else(|| {
                GatewayError::from(UnifiedError::invalid(
                    "no model requested and none configured on the connection",
                ))
            })?;
        cx.model = Some(model.clone());

        let mut effective = request.clone();
        if let Some(session) = &session {
            let assembled = self
                .assembler
                .assemble(session, &connection.provider_id, &request.messages)
                .await
                .map_err(storage_to_unified)?;
            effective.messages = assembled.messages;
        }

        let route = self.route_for(&connection, model)?;
        Ok((route, session, effective))
    }

    fn route_for(&self, connection: &Connection, model: String) -> Result<ActiveRoute, GatewayError> {
        let adapter = self.adapters.get(&connection.provider_id);
        let driver = driver_for(&connection.provider_id);
        let mut endpoint =
            ProviderEndpoint::from_config(&connection.config, driver.default_base_url())?;
        if endpoint.api_key.is_none() {
            endpoint.api_key = super::drivers::bootstrap_api_key(&connection.provider_id);
        }
        Ok(ActiveRoute {
            adapter,
            driver,
            endpoint,
            provider_id: connection.provider_id.clone(),
            connection_id: connection.id,
            model,
        })
    }

    /// Store the current user turn before the provider call
    async fn persist_user_turn(
        &self,
        session: Option<&Session>,
        request: &UnifiedChatRequest,
    ) -> Result<(), GatewayError> {
        let Some(session) = session else {
            return Ok(());
        };
        let Some(user_turn) = request.latest_user_message() else {
            return Ok(());
        };
        self.sessions
            .append_message(
                session.id,
                NewMessage::text(MessageRole::User, user_turn.content.clone()),
            )
            .await
            .map_err(storage_to_unified)?;
        Ok(())
    }

    /// Store the assistant turn; a write failure never fails the request
    async fn persist_assistant(
        &self,
        session: &Session,
        content: String,
        tools: Option<Vec<ToolCall>>,
        truncated: bool,
    ) {
        let mut message = NewMessage {
            role: MessageRole::Assistant,
            content,
            tool_calls: tools,
            tool_call_id: None,
            metadata: serde_json::json!({}),
        };
        if truncated {
            message = message.truncated();
        }

        match self.sessions.append_message(session.id, message.clone()).await {
            Ok(_) => self.summarizer.spawn_if_due(session.clone()),
            Err(e) => {
                warn!(session_id = %session.id, error = %e, "assistant persist failed, retrying in background");
                let store = self.sessions.clone();
                let session_id = session.id;
                tokio::spawn(async move {
                    tokio::time::sleep(Duration::from_secs(1)).await;
                    if let Err(e) = store.append_message(session_id, message).await {
                        error!(session_id = %session_id, error = %e, "assistant message lost after retry");
                    }
                });
            }
        }
    }

    // ==================== Recovery policy ====================

    async fn recover(
        &self,
        state: RecoveryState<'_>,
        cancel: &CancellationToken,
    ) -> Result<Recovery, GatewayError> {
        let RecoveryState {
            error,
            request,
            route,
            user_id,
            retries,
            fallback_used,
            context_reduced,
            backed_off,
        } = state;

        if error.kind == ErrorKind::ModelLimit
            && !*context_reduced
            && shed_oldest_message(request)
        {
            *context_reduced = true;
            *retries += 1;
            return Ok(Recovery::Retry);
        }

        if matches!(error.kind, ErrorKind::RateLimit | ErrorKind::Network) && !*backed_off {
            *backed_off = true;
            *retries += 1;
            let backoff = RETRY_BACKOFF * 2u32.pow((*retries).saturating_sub(1));
            tokio::select! {
                _ = cancel.cancelled() => return Err(GatewayError::Cancelled),
                _ = tokio::time::sleep(backoff) => {}
            }
            return Ok(Recovery::Retry);
        }

        if let Some(fallback) = &error.fallback {
            if !*fallback_used {
                match self.connections.get_default(user_id, &fallback.provider).await {
                    Ok(connection) => {
                        warn!(
                            from = %route.provider_id,
                            to = %fallback.provider,
                            model = %fallback.model,
                            reason = %fallback.reason,
                            "taking provider fallback"
                        );
                        *route = self.route_for(&connection, fallback.model.clone())?;
                        *fallback_used = true;
                        *retries += 1;
                        return Ok(Recovery::Retry);
                    }
                    Err(e) if e.is_not_found() => {}
                    Err(e) => return Err(GatewayError::Storage(e)),
                }
            }
        }

        Ok(Recovery::GiveUp(error))
    }

    // ==================== Connection operations ====================

    /// Zero-token probe of one connection, reporting latency and availability
    pub async fn test_connection(
        &self,
        user_id: Uuid,
        connection_id: Uuid,
    ) -> Result<ProbeReport, GatewayError> {
        let connection = self
            .connections
            .get(user_id, connection_id)
            .await
            .map_err(storage_to_unified)?;
        let route = self.route_for(&connection, String::new())?;
        route
            .driver
            .validate_config(&route.endpoint)
            .await
            .map_err(|e| driver_error(route.adapter.as_ref(), e))
    }

    /// Models one connection's endpoint serves
    pub async fn list_models(
        &self,
        user_id: Uuid,
        connection_id: Uuid,
    ) -> Result<Vec<ModelInfo>, GatewayError> {
        let connection = self
            .connections
            .get(user_id, connection_id)
            .await
            .map_err(storage_to_unified)?;
        let route = self.route_for(&connection, String::new())?;
        route
            .driver
            .get_models(&route.endpoint)
            .await
            .map_err(|e| driver_error(route.adapter.as_ref(), e))
    }
}

struct RecoveryState<'a> {
    error: UnifiedError,
    request: &'a mut UnifiedChatRequest,
    route: &'a mut ActiveRoute,
    user_id: Uuid,
    retries: &'a mut u32,
    fallback_used: &'a mut bool,
    context_reduced: &'a mut bool,
    backed_off: &'a mut bool,
}

enum Recovery {
    Retry,
    GiveUp(UnifiedError),
}

/// Drop the oldest non-system message to duck a context-length rejection
fn shed_oldest_message(request: &mut UnifiedChatRequest) -> bool {
    let Some(index) = request
        .messages
        .iter()
        .position(|m| m.role != MessageRole::System)
    else {
        return false;
    };
    // Shedding the only remaining conversational message gains nothing
    if request
        .messages
        .iter()
        .filter(|m| m.role != MessageRole::System)
        .count()
        <= 1
    {
        return false;
    }
    request.messages.remove(index);
    true
}

fn storage_to_unified(e: StorageError) -> GatewayError {
    match e {
        StorageError::NotFound { entity } => {
            GatewayError::from(UnifiedError::invalid(format!("{entity} not found")))
        }
        other => GatewayError::from(
            UnifiedError::unknown(other.to_string()).with_code("storage"),
        ),
    }
}

fn driver_error(adapter: &dyn Adapter, e: DriverError) -> GatewayError {
    match e {
        DriverError::Cancelled => GatewayError::Cancelled,
        DriverError::Wire { status, body } => adapter.normalize_error(status, &body).into(),
    }
}
