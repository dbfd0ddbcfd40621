// crates/mcs-gateway/src/server.rs
// ============================================================================
// Module: Gateway Server
// Description: HTTP/NDJSON transport, worker pool, and lifecycle.
// Purpose: Compose auth, registry, and dispatch behind one listener.
// Dependencies: axum, axum-server, rustls, tokio, tokio-stream
// ============================================================================

//! ## Overview
//! [`GatewayServer`] owns the listener and the call lifecycle. Both RPCs sit
//! behind [`require_bearer`]; each accepted `CallTool` takes one of
//! `max_workers` permits and runs end-to-end on the blocking pool, pushing
//! NDJSON chunk lines through a bounded channel into the response body. When
//! the caller goes away the next push fails and the tool sequence is dropped.
//!
//! Shutdown order: stop accepting calls, drain in-flight calls within the
//! grace period, then close every remote backend.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::time::Duration;
use std::time::Instant;

use axum::Extension;
use axum::Json;
use axum::Router;
use axum::body::Body;
use axum::extract::DefaultBodyLimit;
use axum::extract::State;
use axum::http::StatusCode;
use axum::http::header::CONTENT_TYPE;
use axum::middleware;
use axum::response::IntoResponse;
use axum::response::Response;
use axum::routing::get;
use axum::routing::post;
use axum_server::Handle;
use axum_server::tls_rustls::RustlsConfig;
use bytes::Bytes;
use mcs_config::GatewayConfig;
use mcs_config::ServerConfig;
use mcs_core::CALL_TOOL_PATH;
use mcs_core::HEALTH_PATH;
use mcs_core::LIST_TOOLS_PATH;
use mcs_core::NDJSON_CONTENT_TYPE;
use mcs_core::RpcCode;
use mcs_core::RpcStatus;
use mcs_core::ToolCallChunk;
use mcs_core::ToolCallRequest;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::Semaphore;
use tokio::sync::mpsc;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::ReceiverStream;

use crate::audit::AuditSink;
use crate::audit::LifecycleAuditEvent;
use crate::audit::LifecycleKind;
use crate::audit::ToolCallAuditEvent;
use crate::audit::ToolCallAuditParams;
use crate::audit::audit_sink_from_config;
use crate::auth::AuthContext;
use crate::auth::AuthGate;
use crate::auth::require_bearer;
use crate::dispatch::CallOutcome;
use crate::dispatch::ChunkSink;
use crate::dispatch::DispatchEngine;
use crate::dispatch::SinkClosed;
use crate::jwks::JwksTokenValidator;
use crate::jwks::TokenVerifier;
use crate::registry::ToolRegistry;
use crate::telemetry::GatewayMetrics;
use crate::telemetry::NoopMetrics;
use crate::telemetry::RpcMethod;
use crate::telemetry::RpcMetricEvent;
use crate::telemetry::RpcOutcome;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Gateway server failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GatewayServerError {
    /// Configuration is invalid.
    #[error("config error: {0}")]
    Config(String),
    /// A component could not be constructed.
    #[error("init error: {0}")]
    Init(String),
    /// The listener failed.
    #[error("transport error: {0}")]
    Transport(String),
}

// ============================================================================
// SECTION: Server
// ============================================================================

/// Components a server is assembled from.
pub struct GatewayParts {
    /// Listener, limits, and TLS settings.
    pub server: ServerConfig,
    /// Frozen tool registry.
    pub registry: Arc<ToolRegistry>,
    /// Bearer token verifier.
    pub verifier: Arc<dyn TokenVerifier>,
    /// Audience every token must carry.
    pub audience: String,
    /// Audit sink.
    pub audit: Arc<dyn AuditSink>,
    /// Metrics sink.
    pub metrics: Arc<dyn GatewayMetrics>,
}

/// Authenticated tool gateway.
pub struct GatewayServer {
    /// Listener, limits, and TLS settings.
    config: ServerConfig,
    /// Token gate shared by both RPC routes.
    gate: Arc<AuthGate>,
    /// Per-request state.
    state: Arc<GatewayState>,
}

/// State shared by RPC handlers.
struct GatewayState {
    /// Call semantics.
    engine: DispatchEngine,
    /// Bounded worker pool.
    workers: Arc<Semaphore>,
    /// Total worker permits.
    worker_permits: u32,
    /// Chunk channel depth per call.
    stream_buffer: usize,
    /// Set once shutdown starts.
    draining: AtomicBool,
    /// Audit sink.
    audit: Arc<dyn AuditSink>,
    /// Metrics sink.
    metrics: Arc<dyn GatewayMetrics>,
}

impl GatewayServer {
    /// Builds a server from configuration: audit sink, token validator, and
    /// registry (spawning every backend). Performs blocking I/O.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayServerError`] when configuration is invalid or a
    /// component cannot be built. Unavailable backends are not errors.
    pub fn from_config(mut config: GatewayConfig) -> Result<Self, GatewayServerError> {
        config.validate().map_err(|err| GatewayServerError::Config(err.to_string()))?;
        let audit = audit_sink_from_config(&config.server.audit)
            .map_err(|err| GatewayServerError::Init(format!("audit log: {err}")))?;
        let verifier = JwksTokenValidator::from_config(&config.auth)
            .map_err(|err| GatewayServerError::Init(err.to_string()))?;
        let registry =
            ToolRegistry::from_config(&config.tools, &config.backends, Arc::clone(&audit))
                .map_err(|err| GatewayServerError::Init(err.to_string()))?;
        Ok(Self::new(GatewayParts {
            server: config.server,
            registry: Arc::new(registry),
            verifier: Arc::new(verifier),
            audience: config.auth.audience,
            audit,
            metrics: Arc::new(NoopMetrics),
        }))
    }

    /// Assembles a server from prepared components.
    #[must_use]
    pub fn new(parts: GatewayParts) -> Self {
        let max_workers = parts.server.limits.max_workers.max(1);
        let gate = Arc::new(AuthGate::new(parts.verifier, parts.audience, Arc::clone(&parts.audit)));
        let state = Arc::new(GatewayState {
            engine: DispatchEngine::new(parts.registry),
            workers: Arc::new(Semaphore::new(max_workers)),
            worker_permits: u32::try_from(max_workers).unwrap_or(u32::MAX),
            stream_buffer: parts.server.limits.stream_buffer.max(1),
            draining: AtomicBool::new(false),
            audit: parts.audit,
            metrics: parts.metrics,
        });
        Self {
            config: parts.server,
            gate,
            state,
        }
    }

    /// Returns the tool registry.
    #[must_use]
    pub fn registry(&self) -> &Arc<ToolRegistry> {
        self.state.engine.registry()
    }

    /// Builds the HTTP router.
    #[must_use]
    pub fn router(&self) -> Router {
        let rpc = Router::new()
            .route(LIST_TOOLS_PATH, post(handle_list_tools))
            .route(CALL_TOOL_PATH, post(handle_call_tool))
            .route_layer(middleware::from_fn_with_state(Arc::clone(&self.gate), require_bearer))
            .with_state(Arc::clone(&self.state));
        Router::new()
            .route(HEALTH_PATH, get(handle_health))
            .merge(rpc)
            .layer(DefaultBodyLimit::max(self.config.max_body_bytes))
    }

    /// Binds the configured address and serves until `shutdown` resolves.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayServerError`] when binding or serving fails.
    pub async fn serve<F>(self, shutdown: F) -> Result<(), GatewayServerError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr =
            self.config.bind_addr().map_err(|err| GatewayServerError::Config(err.to_string()))?;
        match self.config.tls.clone() {
            Some(tls) => {
                let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();
                let tls_config = RustlsConfig::from_pem_file(&tls.cert_path, &tls.key_path)
                    .await
                    .map_err(|err| GatewayServerError::Init(format!("tls: {err}")))?;
                self.run(Listener::Tls(addr, tls_config), shutdown).await
            }
            None => {
                let listener = TcpListener::bind(addr)
                    .await
                    .map_err(|err| GatewayServerError::Transport(format!("bind {addr}: {err}")))?;
                self.run(Listener::Plain(listener), shutdown).await
            }
        }
    }

    /// Serves plaintext HTTP on an already bound listener.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayServerError`] when serving fails.
    pub async fn serve_listener<F>(
        self,
        listener: TcpListener,
        shutdown: F,
    ) -> Result<(), GatewayServerError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.run(Listener::Plain(listener), shutdown).await
    }

    /// Runs the accept loop, then drains and tears down.
    async fn run<F>(self, listener: Listener, shutdown: F) -> Result<(), GatewayServerError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let app = self.router().into_make_service_with_connect_info::<SocketAddr>();
        let (stop_tx, stop_rx) = oneshot::channel::<()>();
        let (address, mut server) = match listener {
            Listener::Plain(listener) => {
                let address = listener
                    .local_addr()
                    .map_err(|err| GatewayServerError::Transport(err.to_string()))?;
                let task: JoinHandle<std::io::Result<()>> = tokio::spawn(async move {
                    axum::serve(listener, app)
                        .with_graceful_shutdown(async move {
                            let _ = stop_rx.await;
                        })
                        .await
                });
                (address, task)
            }
            Listener::Tls(address, tls_config) => {
                let handle = Handle::new();
                let watcher = handle.clone();
                tokio::spawn(async move {
                    let _ = stop_rx.await;
                    watcher.graceful_shutdown(None);
                });
                let task: JoinHandle<std::io::Result<()>> = tokio::spawn(async move {
                    axum_server::bind_rustls(address, tls_config).handle(handle).serve(app).await
                });
                (address, task)
            }
        };
        self.state.audit.record_lifecycle(
            &LifecycleAuditEvent::new(LifecycleKind::Listening).with_message(address.to_string()),
        );

        let grace = Duration::from_millis(self.config.shutdown_grace_ms);
        let (served, deadline) = tokio::select! {
            joined = &mut server => {
                self.begin_shutdown();
                (joined, tokio::time::Instant::now() + grace)
            }
            () = shutdown => {
                self.begin_shutdown();
                let deadline = tokio::time::Instant::now() + grace;
                let _ = stop_tx.send(());
                let joined = match tokio::time::timeout_at(deadline, &mut server).await {
                    Ok(joined) => joined,
                    Err(_) => {
                        server.abort();
                        Ok(Ok(()))
                    }
                };
                (joined, deadline)
            }
        };
        self.finish_shutdown(deadline).await;
        match served {
            Ok(Ok(())) => Ok(()),
            Ok(Err(err)) => Err(GatewayServerError::Transport(err.to_string())),
            Err(err) => Err(GatewayServerError::Transport(err.to_string())),
        }
    }

    /// Stops accepting calls.
    fn begin_shutdown(&self) {
        if !self.state.draining.swap(true, Ordering::AcqRel) {
            self.state
                .audit
                .record_lifecycle(&LifecycleAuditEvent::new(LifecycleKind::ShutdownStarted));
        }
    }

    /// Waits for in-flight calls until `deadline`, then closes every backend.
    async fn finish_shutdown(&self, deadline: tokio::time::Instant) {
        let drained = tokio::time::timeout_at(
            deadline,
            Arc::clone(&self.state.workers).acquire_many_owned(self.state.worker_permits),
        )
        .await;
        if drained.is_err() {
            self.state.audit.record_lifecycle(
                &LifecycleAuditEvent::new(LifecycleKind::DrainTimedOut)
                    .with_message(format!("{} ms grace elapsed", self.config.shutdown_grace_ms)),
            );
        }
        let registry = Arc::clone(self.state.engine.registry());
        let _ = tokio::task::spawn_blocking(move || registry.shutdown()).await;
        self.state.audit.record_lifecycle(&LifecycleAuditEvent::new(LifecycleKind::Stopped));
    }
}

/// Listener variants.
enum Listener {
    /// Plain TCP.
    Plain(TcpListener),
    /// TLS via rustls.
    Tls(SocketAddr, RustlsConfig),
}

// ============================================================================
// SECTION: Handlers
// ============================================================================

/// Liveness check.
async fn handle_health() -> &'static str {
    "ok"
}

/// `ListTools` handler.
async fn handle_list_tools(State(state): State<Arc<GatewayState>>) -> Response {
    let started = Instant::now();
    if state.draining.load(Ordering::Acquire) {
        state.record_metrics(RpcMethod::ListTools, None, RpcOutcome::Rejected, 0, started);
        return rejection(RpcCode::Unavailable, "server is shutting down");
    }
    let response = state.engine.list_tools();
    state.record_metrics(RpcMethod::ListTools, None, RpcOutcome::Ok, 0, started);
    Json(response).into_response()
}

/// `CallTool` handler.
async fn handle_call_tool(
    State(state): State<Arc<GatewayState>>,
    Extension(auth): Extension<AuthContext>,
    body: Bytes,
) -> Response {
    let started = Instant::now();
    let subject = auth.subject().map(str::to_string);
    if state.draining.load(Ordering::Acquire) {
        state.record_rejection("", subject, "server is shutting down", started);
        return rejection(RpcCode::Unavailable, "server is shutting down");
    }
    let request: ToolCallRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(err) => {
            let message = format!("invalid CallTool request: {err}");
            state.record_rejection("", subject, &message, started);
            return rejection(RpcCode::InvalidArgument, message);
        }
    };
    let tool = match state.engine.lookup(&request.tool_name) {
        Ok(tool) => tool,
        Err(err) => {
            let message = err.to_string();
            state.record_rejection(&request.tool_name, subject, &message, started);
            return rejection(RpcCode::NotFound, message);
        }
    };
    let Ok(permit) = Arc::clone(&state.workers).acquire_owned().await else {
        state.record_rejection(&request.tool_name, subject, "worker pool closed", started);
        return rejection(RpcCode::Unavailable, "server is shutting down");
    };

    let (tx, rx) = mpsc::channel::<Bytes>(state.stream_buffer);
    let worker = Arc::clone(&state);
    tokio::task::spawn_blocking(move || {
        let _permit = permit;
        let mut sink = ChannelSink {
            tx,
        };
        let outcome = worker.engine.stream(&tool, request.arguments, &mut sink);
        drop(sink);
        worker.record_call(&request.tool_name, subject, &outcome, started);
    });

    let body = Body::from_stream(ReceiverStream::new(rx).map(Ok::<Bytes, Infallible>));
    ([(CONTENT_TYPE, NDJSON_CONTENT_TYPE)], body).into_response()
}

/// Builds a status rejection.
fn rejection(code: RpcCode, message: impl Into<String>) -> Response {
    let status =
        StatusCode::from_u16(code.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Json(RpcStatus::new(code, message))).into_response()
}

// ============================================================================
// SECTION: Call Bookkeeping
// ============================================================================

impl GatewayState {
    /// Records a finished call.
    fn record_call(
        &self,
        tool: &str,
        subject: Option<String>,
        outcome: &CallOutcome,
        started: Instant,
    ) {
        let rpc_outcome = match outcome {
            CallOutcome::Completed {
                ..
            } => RpcOutcome::Ok,
            CallOutcome::Failed {
                ..
            } => RpcOutcome::Failed,
            CallOutcome::Cancelled {
                ..
            } => RpcOutcome::Cancelled,
        };
        self.audit.record_tool_call(&ToolCallAuditEvent::new(ToolCallAuditParams {
            tool: tool.to_string(),
            state: outcome.state(),
            chunks: outcome.chunks(),
            error: outcome.error_message().map(str::to_string),
            elapsed_ms: started.elapsed().as_millis(),
            subject,
        }));
        self.record_metrics(
            RpcMethod::CallTool,
            Some(tool),
            rpc_outcome,
            outcome.chunks(),
            started,
        );
    }

    /// Records a call rejected before streaming.
    fn record_rejection(
        &self,
        tool: &str,
        subject: Option<String>,
        message: &str,
        started: Instant,
    ) {
        self.audit.record_tool_call(&ToolCallAuditEvent::new(ToolCallAuditParams {
            tool: tool.to_string(),
            state: "rejected",
            chunks: 0,
            error: Some(message.to_string()),
            elapsed_ms: started.elapsed().as_millis(),
            subject,
        }));
        let tool = (!tool.is_empty()).then_some(tool);
        self.record_metrics(RpcMethod::CallTool, tool, RpcOutcome::Rejected, 0, started);
    }

    /// Emits the request counter and latency.
    fn record_metrics(
        &self,
        method: RpcMethod,
        tool: Option<&str>,
        outcome: RpcOutcome,
        chunks: u64,
        started: Instant,
    ) {
        let event = RpcMetricEvent {
            method,
            tool: tool.map(str::to_string),
            outcome,
            chunks,
        };
        self.metrics.record_request(event.clone());
        self.metrics.record_latency(event, started.elapsed());
    }
}

/// Sink that pushes NDJSON lines into the response body channel.
struct ChannelSink {
    /// Body channel.
    tx: mpsc::Sender<Bytes>,
}

impl ChunkSink for ChannelSink {
    fn emit(&mut self, chunk: ToolCallChunk) -> Result<(), SinkClosed> {
        let line = chunk.to_ndjson_line().map_err(|_| SinkClosed)?;
        self.tx.blocking_send(Bytes::from(line)).map_err(|_| SinkClosed)
    }
}
