// crates/mcs-gateway/src/audit.rs
// ============================================================================
// Module: Gateway Audit Logging
// Description: Structured audit events for auth, tool calls, and lifecycle.
// Purpose: Emit JSON-lines audit records without a hard logging backend.
// Dependencies: mcs-config, serde, serde_json
// ============================================================================

//! ## Overview
//! Audit events are serialized as one JSON object per line. Sinks route them
//! to stderr, an append-only file, or nowhere. Token values are never logged;
//! only their SHA-256 fingerprint is.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs::OpenOptions;
use std::io;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use mcs_config::ServerAuditConfig;
use serde::Serialize;

// ============================================================================
// SECTION: Labels
// ============================================================================

/// Auth decision outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthDecision {
    /// Token accepted.
    Allow,
    /// Token rejected.
    Deny,
}

/// Lifecycle event classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleKind {
    /// Remote backend handshake completed.
    BackendConnected,
    /// Remote backend failed to start; its tools are omitted.
    BackendUnavailable,
    /// A registration replaced an existing tool name.
    ToolNameCollision,
    /// Listener accepting calls.
    Listening,
    /// Shutdown requested; no new calls accepted.
    ShutdownStarted,
    /// In-flight calls did not finish within the grace period.
    DrainTimedOut,
    /// Remote backend session closed.
    BackendClosed,
    /// Shutdown finished.
    Stopped,
}

// ============================================================================
// SECTION: Events
// ============================================================================

/// Auth decision audit event.
#[derive(Debug, Clone, Serialize)]
pub struct AuthAuditEvent {
    /// Event identifier.
    pub event: &'static str,
    /// Event timestamp (milliseconds since epoch).
    pub timestamp_ms: u128,
    /// Decision outcome.
    pub decision: AuthDecision,
    /// RPC path being authorized.
    pub rpc: String,
    /// Caller IP address when known.
    pub peer_ip: Option<String>,
    /// Token subject on allow.
    pub subject: Option<String>,
    /// SHA-256 fingerprint of the presented token.
    pub token_fingerprint: Option<String>,
    /// Auth error kind label on deny.
    pub reason: Option<&'static str>,
}

impl AuthAuditEvent {
    /// Builds an allow event.
    #[must_use]
    pub fn allowed(
        rpc: impl Into<String>,
        peer_ip: Option<String>,
        subject: Option<String>,
        token_fingerprint: String,
    ) -> Self {
        Self {
            event: "mcs_auth",
            timestamp_ms: now_ms(),
            decision: AuthDecision::Allow,
            rpc: rpc.into(),
            peer_ip,
            subject,
            token_fingerprint: Some(token_fingerprint),
            reason: None,
        }
    }

    /// Builds a deny event.
    #[must_use]
    pub fn denied(
        rpc: impl Into<String>,
        peer_ip: Option<String>,
        token_fingerprint: Option<String>,
        reason: &'static str,
    ) -> Self {
        Self {
            event: "mcs_auth",
            timestamp_ms: now_ms(),
            decision: AuthDecision::Deny,
            rpc: rpc.into(),
            peer_ip,
            subject: None,
            token_fingerprint,
            reason: Some(reason),
        }
    }
}

/// Tool call audit event.
#[derive(Debug, Clone, Serialize)]
pub struct ToolCallAuditEvent {
    /// Event identifier.
    pub event: &'static str,
    /// Event timestamp (milliseconds since epoch).
    pub timestamp_ms: u128,
    /// Requested tool name.
    pub tool: String,
    /// Final call state label.
    pub state: &'static str,
    /// Number of chunks emitted.
    pub chunks: u64,
    /// Error message for failed or rejected calls.
    pub error: Option<String>,
    /// Wall-clock duration of the call.
    pub elapsed_ms: u128,
    /// Caller subject when known.
    pub subject: Option<String>,
}

/// Inputs required to construct a tool call audit event.
pub struct ToolCallAuditParams {
    /// Requested tool name.
    pub tool: String,
    /// Final call state label.
    pub state: &'static str,
    /// Number of chunks emitted.
    pub chunks: u64,
    /// Error message for failed or rejected calls.
    pub error: Option<String>,
    /// Wall-clock duration of the call.
    pub elapsed_ms: u128,
    /// Caller subject when known.
    pub subject: Option<String>,
}

impl ToolCallAuditEvent {
    /// Creates a tool call event with a consistent timestamp.
    #[must_use]
    pub fn new(params: ToolCallAuditParams) -> Self {
        Self {
            event: "mcs_tool_call",
            timestamp_ms: now_ms(),
            tool: params.tool,
            state: params.state,
            chunks: params.chunks,
            error: params.error,
            elapsed_ms: params.elapsed_ms,
            subject: params.subject,
        }
    }
}

/// Server and backend lifecycle audit event.
#[derive(Debug, Clone, Serialize)]
pub struct LifecycleAuditEvent {
    /// Event identifier.
    pub event: &'static str,
    /// Event timestamp (milliseconds since epoch).
    pub timestamp_ms: u128,
    /// Lifecycle classification.
    pub kind: LifecycleKind,
    /// Backend name when relevant.
    pub backend: Option<String>,
    /// Tool name when relevant.
    pub tool: Option<String>,
    /// Free-form detail.
    pub message: Option<String>,
}

impl LifecycleAuditEvent {
    /// Creates a bare lifecycle event.
    #[must_use]
    pub fn new(kind: LifecycleKind) -> Self {
        Self {
            event: "mcs_lifecycle",
            timestamp_ms: now_ms(),
            kind,
            backend: None,
            tool: None,
            message: None,
        }
    }

    /// Sets the backend name.
    #[must_use]
    pub fn with_backend(mut self, backend: impl Into<String>) -> Self {
        self.backend = Some(backend.into());
        self
    }

    /// Sets the tool name.
    #[must_use]
    pub fn with_tool(mut self, tool: impl Into<String>) -> Self {
        self.tool = Some(tool.into());
        self
    }

    /// Sets the detail message.
    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

// ============================================================================
// SECTION: Trait
// ============================================================================

/// Audit sink for gateway events.
pub trait AuditSink: Send + Sync {
    /// Records an auth decision.
    fn record_auth(&self, event: &AuthAuditEvent);

    /// Records a finished or rejected tool call.
    fn record_tool_call(&self, event: &ToolCallAuditEvent);

    /// Records a lifecycle transition.
    fn record_lifecycle(&self, event: &LifecycleAuditEvent);
}

/// Audit sink that logs JSON lines to stderr.
pub struct StderrAuditSink;

impl StderrAuditSink {
    /// Serializes and writes one line.
    fn write<T: Serialize>(event: &T) {
        if let Ok(payload) = serde_json::to_string(event) {
            let _ = writeln!(std::io::stderr(), "{payload}");
        }
    }
}

impl AuditSink for StderrAuditSink {
    fn record_auth(&self, event: &AuthAuditEvent) {
        Self::write(event);
    }

    fn record_tool_call(&self, event: &ToolCallAuditEvent) {
        Self::write(event);
    }

    fn record_lifecycle(&self, event: &LifecycleAuditEvent) {
        Self::write(event);
    }
}

/// Audit sink that logs JSON lines to a file.
pub struct FileAuditSink {
    /// File handle used for append-only logging.
    file: Mutex<std::fs::File>,
}

impl FileAuditSink {
    /// Opens the audit log file in append mode.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened.
    pub fn new(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            file: Mutex::new(file),
        })
    }

    /// Serializes and appends one line.
    fn write<T: Serialize>(&self, event: &T) {
        if let Ok(payload) = serde_json::to_string(event)
            && let Ok(mut file) = self.file.lock()
        {
            let _ = writeln!(file, "{payload}");
            let _ = file.flush();
        }
    }
}

impl AuditSink for FileAuditSink {
    fn record_auth(&self, event: &AuthAuditEvent) {
        self.write(event);
    }

    fn record_tool_call(&self, event: &ToolCallAuditEvent) {
        self.write(event);
    }

    fn record_lifecycle(&self, event: &LifecycleAuditEvent) {
        self.write(event);
    }
}

/// No-op audit sink.
pub struct NoopAuditSink;

impl AuditSink for NoopAuditSink {
    fn record_auth(&self, _event: &AuthAuditEvent) {}

    fn record_tool_call(&self, _event: &ToolCallAuditEvent) {}

    fn record_lifecycle(&self, _event: &LifecycleAuditEvent) {}
}

/// Builds the sink selected by `[server.audit]`.
///
/// # Errors
///
/// Returns an error when the audit file cannot be opened.
pub fn audit_sink_from_config(config: &ServerAuditConfig) -> io::Result<Arc<dyn AuditSink>> {
    if !config.enabled {
        return Ok(Arc::new(NoopAuditSink));
    }
    match &config.path {
        Some(path) => Ok(Arc::new(FileAuditSink::new(Path::new(path))?)),
        None => Ok(Arc::new(StderrAuditSink)),
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Current time in milliseconds since the epoch.
fn now_ms() -> u128 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis()
}
