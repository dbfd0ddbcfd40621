// crates/mcs-gateway/src/remote.rs
// ============================================================================
// Module: Remote MCP Backends
// Description: Stdio MCP sessions and the tool sources they back.
// Purpose: Proxy tools served by external processes through one contract.
// Dependencies: base64, serde, serde_json, mcs-config, mcs-core
// ============================================================================

//! ## Overview
//! A [`RemoteBackendConnection`] owns one duplex session with an external MCP
//! server, usually a child process speaking JSON-RPC over stdio. At most one
//! call is in flight per connection: callers take a [`SessionPermit`] (the
//! serialization token) and hold it until their output sequence is consumed
//! or dropped. [`RemoteToolSource`] binds one remote tool name to a shared
//! connection and translates MCP content items into [`OutputItem`]s.
//!
//! Security posture: backend output is untrusted; message sizes are capped
//! and malformed content becomes an in-band fault.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::VecDeque;
use std::fmt;
use std::io::BufRead;
use std::io::BufReader;
use std::io::Read;
use std::io::Write;
use std::process::Child;
use std::process::Command;
use std::process::Stdio;
use std::sync::Arc;
use std::sync::Condvar;
use std::sync::Mutex;
use std::sync::PoisonError;
use std::sync::TryLockError;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::thread;
use std::time::Duration;
use std::time::Instant;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use mcs_config::BackendConfig;
use mcs_config::BackendFraming;
use mcs_core::OutputItem;
use mcs_core::OutputStream;
use mcs_core::ToolArguments;
use mcs_core::ToolDefinition;
use mcs_core::ToolFault;
use mcs_core::ToolOutput;
use mcs_core::ToolSource;
use serde::Deserialize;
use serde_json::Value;
use serde_json::json;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// MCP protocol revision offered during `initialize`.
pub const MCP_PROTOCOL_VERSION: &str = "2024-11-05";
/// Client name reported during `initialize`.
const CLIENT_NAME: &str = "mcs-gateway";
/// Upper bound on `tools/list` pages.
const MAX_LIST_PAGES: usize = 256;
/// Time a backend gets to exit after stdin closes.
const EXIT_GRACE: Duration = Duration::from_millis(500);
/// Poll interval while waiting for exit.
const EXIT_POLL: Duration = Duration::from_millis(25);

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Remote backend failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackendError {
    /// The backend process could not be started.
    #[error("backend spawn failed: {0}")]
    Spawn(String),
    /// Reading or writing the session failed.
    #[error("backend transport failed: {0}")]
    Transport(String),
    /// The backend sent something that is not valid MCP.
    #[error("backend protocol error: {0}")]
    Protocol(String),
    /// The backend answered with a JSON-RPC error.
    #[error("backend error: {0}")]
    Remote(String),
    /// A single message exceeded the configured cap.
    #[error("backend message exceeds {0} bytes")]
    ResponseTooLarge(usize),
    /// The session is closed or broken.
    #[error("backend session closed")]
    Closed,
}

impl BackendError {
    /// Returns true when the error leaves the session unusable.
    const fn breaks_session(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::Protocol(_) | Self::ResponseTooLarge(_))
    }
}

// ============================================================================
// SECTION: Session
// ============================================================================

/// Byte streams behind a connection.
struct Session {
    /// Backend output.
    reader: BufReader<Box<dyn Read + Send>>,
    /// Backend input; `None` once closed.
    writer: Option<Box<dyn Write + Send>>,
}

/// Tool metadata advertised by a backend.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RemoteToolInfo {
    /// Backend-local tool name.
    pub name: String,
    /// Tool description.
    #[serde(default)]
    pub description: Option<String>,
}

/// One long-lived MCP session.
pub struct RemoteBackendConnection {
    /// Backend name used as the namespace prefix.
    name: String,
    /// Message framing.
    framing: BackendFraming,
    /// Per-message size cap.
    max_message_bytes: usize,
    /// Session streams; `None` after close.
    session: Mutex<Option<Session>>,
    /// Child process when the backend was spawned; locked independently of
    /// `session`.
    child: Mutex<Option<Child>>,
    /// Serialization token: true while a call holds the session.
    busy: Mutex<bool>,
    /// Signals token release.
    released: Condvar,
    /// Set after a transport or protocol failure.
    broken: AtomicBool,
    /// JSON-RPC request id counter.
    next_id: AtomicU64,
}

impl fmt::Debug for RemoteBackendConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteBackendConnection")
            .field("name", &self.name)
            .field("broken", &self.is_broken())
            .finish_non_exhaustive()
    }
}

impl RemoteBackendConnection {
    /// Spawns the configured backend process and performs the handshake.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError`] when the process cannot start or the
    /// handshake fails.
    pub fn spawn(config: &BackendConfig) -> Result<Arc<Self>, BackendError> {
        let (program, args) = config
            .command
            .split_first()
            .ok_or_else(|| BackendError::Spawn("backend command is empty".to_string()))?;
        let mut cmd = Command::new(program);
        cmd.args(args);
        cmd.envs(&config.env);
        cmd.stdin(Stdio::piped());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::null());
        let mut child =
            cmd.spawn().map_err(|err| BackendError::Spawn(format!("{program}: {err}")))?;
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| BackendError::Spawn("backend stdin unavailable".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| BackendError::Spawn("backend stdout unavailable".to_string()))?;
        let session = Session {
            reader: BufReader::new(Box::new(stdout)),
            writer: Some(Box::new(stdin)),
        };
        Self::open(&config.name, config.framing, config.max_response_bytes, session, Some(child))
    }

    /// Performs the handshake over arbitrary streams.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError`] when the handshake fails.
    pub fn from_streams(
        name: &str,
        framing: BackendFraming,
        max_message_bytes: usize,
        reader: Box<dyn Read + Send>,
        writer: Box<dyn Write + Send>,
    ) -> Result<Arc<Self>, BackendError> {
        let session = Session {
            reader: BufReader::new(reader),
            writer: Some(writer),
        };
        Self::open(name, framing, max_message_bytes, session, None)
    }

    /// Wraps a session and runs `initialize`.
    fn open(
        name: &str,
        framing: BackendFraming,
        max_message_bytes: usize,
        session: Session,
        child: Option<Child>,
    ) -> Result<Arc<Self>, BackendError> {
        let connection = Arc::new(Self {
            name: name.to_string(),
            framing,
            max_message_bytes,
            session: Mutex::new(Some(session)),
            child: Mutex::new(child),
            busy: Mutex::new(false),
            released: Condvar::new(),
            broken: AtomicBool::new(false),
            next_id: AtomicU64::new(1),
        });
        let permit = connection.acquire()?;
        connection.request(
            &permit,
            "initialize",
            json!({
                "protocolVersion": MCP_PROTOCOL_VERSION,
                "capabilities": {},
                "clientInfo": {"name": CLIENT_NAME, "version": env!("CARGO_PKG_VERSION")},
            }),
        )?;
        connection.notify(&permit, "notifications/initialized")?;
        drop(permit);
        Ok(connection)
    }

    /// Returns the backend name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns true after a transport failure or close.
    #[must_use]
    pub fn is_broken(&self) -> bool {
        self.broken.load(Ordering::Acquire)
    }

    /// Blocks until the serialization token is free and takes it.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError::Closed`] when the token lock is unusable.
    pub fn acquire(self: &Arc<Self>) -> Result<SessionPermit, BackendError> {
        let mut busy = self.busy.lock().map_err(|_| BackendError::Closed)?;
        while *busy {
            busy = self.released.wait(busy).map_err(|_| BackendError::Closed)?;
        }
        *busy = true;
        drop(busy);
        Ok(SessionPermit {
            connection: Arc::clone(self),
        })
    }

    /// Lists every tool the backend advertises, following pagination.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError`] when the listing fails.
    pub fn list_tools(self: &Arc<Self>) -> Result<Vec<RemoteToolInfo>, BackendError> {
        let permit = self.acquire()?;
        let mut tools = Vec::new();
        let mut cursor: Option<String> = None;
        for _ in 0..MAX_LIST_PAGES {
            let params = cursor.as_ref().map_or_else(|| json!({}), |c| json!({"cursor": c}));
            let result = self.request(&permit, "tools/list", params)?;
            let page: ToolsListPage = serde_json::from_value(result)
                .map_err(|err| self.fail(BackendError::Protocol(format!("tools/list: {err}"))))?;
            tools.extend(page.tools.into_iter().filter(|tool| !tool.name.trim().is_empty()));
            match page.next_cursor {
                Some(next) if !next.is_empty() => cursor = Some(next),
                _ => return Ok(tools),
            }
        }
        Err(self.fail(BackendError::Protocol("tools/list pagination did not end".to_string())))
    }

    /// Calls `tool` and translates its result. The caller must hold the
    /// serialization token.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError`] on transport, protocol, or JSON-RPC failure.
    pub fn call_tool(
        &self,
        permit: &SessionPermit,
        tool: &str,
        arguments: ToolArguments,
    ) -> Result<Vec<ToolOutput>, BackendError> {
        let result = self.request(
            permit,
            "tools/call",
            json!({"name": tool, "arguments": Value::Object(arguments.into_map())}),
        )?;
        let result: CallToolResult = serde_json::from_value(result)
            .map_err(|err| BackendError::Protocol(format!("tools/call: {err}")))?;
        Ok(translate_result(result))
    }

    /// Closes the session: stdin first, then a short wait, then kill.
    ///
    /// Never waits for an in-flight call. When a call holds the session,
    /// the child is killed at once and the blocked read sees end of stream.
    pub fn close(&self) {
        self.broken.store(true, Ordering::Release);
        let session = match self.session.try_lock() {
            Ok(mut guard) => guard.take(),
            Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner().take(),
            Err(TryLockError::WouldBlock) => None,
        };
        let input_closed = session.is_some();
        drop(session);
        let taken = self.child.lock().unwrap_or_else(PoisonError::into_inner).take();
        let Some(mut child) = taken else {
            return;
        };
        if input_closed {
            let deadline = Instant::now() + EXIT_GRACE;
            while Instant::now() < deadline {
                match child.try_wait() {
                    Ok(Some(_)) | Err(_) => break,
                    Ok(None) => thread::sleep(EXIT_POLL),
                }
            }
        }
        terminate(&mut child);
    }

    /// Sends one request and waits for the matching response.
    fn request(
        &self,
        _permit: &SessionPermit,
        method: &str,
        params: Value,
    ) -> Result<Value, BackendError> {
        if self.is_broken() {
            return Err(BackendError::Closed);
        }
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let message = json!({"jsonrpc": "2.0", "id": id, "method": method, "params": params});
        self.exchange(&message, id).map_err(|err| self.fail(err))
    }

    /// Sends a notification.
    fn notify(&self, _permit: &SessionPermit, method: &str) -> Result<(), BackendError> {
        let message = json!({"jsonrpc": "2.0", "method": method});
        let mut guard = self.session.lock().map_err(|_| BackendError::Closed)?;
        let session = guard.as_mut().ok_or(BackendError::Closed)?;
        self.write_message(session, &message).map_err(|err| self.fail(err))
    }

    /// Writes `message` and reads until the response with `id` arrives.
    fn exchange(&self, message: &Value, id: u64) -> Result<Value, BackendError> {
        let mut guard = self.session.lock().map_err(|_| BackendError::Closed)?;
        let session = guard.as_mut().ok_or(BackendError::Closed)?;
        self.write_message(session, message)?;
        loop {
            let bytes = self.read_message(&mut session.reader)?;
            let Ok(response) = serde_json::from_slice::<RpcMessage>(&bytes) else {
                continue;
            };
            if response.method.is_some() || response.id.as_ref().and_then(Value::as_u64) != Some(id)
            {
                continue;
            }
            if let Some(error) = response.error {
                return Err(BackendError::Remote(error.message));
            }
            return response
                .result
                .ok_or_else(|| BackendError::Protocol("response without result".to_string()));
        }
    }

    /// Encodes and writes one message with the configured framing.
    fn write_message(&self, session: &mut Session, message: &Value) -> Result<(), BackendError> {
        let payload = serde_json::to_vec(message)
            .map_err(|err| BackendError::Protocol(format!("request encoding failed: {err}")))?;
        let writer = session.writer.as_mut().ok_or(BackendError::Closed)?;
        let written = match self.framing {
            BackendFraming::Ndjson => {
                writer.write_all(&payload).and_then(|()| writer.write_all(b"\n"))
            }
            BackendFraming::ContentLength => {
                let header = format!("Content-Length: {}\r\n\r\n", payload.len());
                writer.write_all(header.as_bytes()).and_then(|()| writer.write_all(&payload))
            }
        };
        written
            .and_then(|()| writer.flush())
            .map_err(|err| BackendError::Transport(format!("write failed: {err}")))
    }

    /// Reads one framed message.
    fn read_message(
        &self,
        reader: &mut BufReader<Box<dyn Read + Send>>,
    ) -> Result<Vec<u8>, BackendError> {
        match self.framing {
            BackendFraming::Ndjson => read_line_message(reader, self.max_message_bytes),
            BackendFraming::ContentLength => read_framed(reader, self.max_message_bytes),
        }
    }

    /// Marks the session broken when `err` is fatal and passes it through.
    fn fail(&self, err: BackendError) -> BackendError {
        if err.breaks_session() {
            self.broken.store(true, Ordering::Release);
        }
        err
    }
}

impl Drop for RemoteBackendConnection {
    fn drop(&mut self) {
        let slot = self.child.get_mut().unwrap_or_else(PoisonError::into_inner);
        if let Some(mut child) = slot.take() {
            terminate(&mut child);
        }
    }
}

/// Kills `child` unless it already exited, then reaps it.
fn terminate(child: &mut Child) {
    if let Ok(Some(_)) = child.try_wait() {
        return;
    }
    let _ = child.kill();
    let _ = child.wait();
}

/// Serialization token for one connection; released on drop.
pub struct SessionPermit {
    /// Connection the token belongs to.
    connection: Arc<RemoteBackendConnection>,
}

impl Drop for SessionPermit {
    fn drop(&mut self) {
        let mut busy = self.connection.busy.lock().unwrap_or_else(PoisonError::into_inner);
        *busy = false;
        drop(busy);
        self.connection.released.notify_one();
    }
}

// ============================================================================
// SECTION: Tool Source
// ============================================================================

/// Tool served by a remote backend, published as `backend:tool`.
#[derive(Debug, Clone)]
pub struct RemoteToolSource {
    /// Registry name.
    public_name: String,
    /// Backend-local tool name.
    remote_name: String,
    /// Description.
    description: String,
    /// Shared session.
    connection: Arc<RemoteBackendConnection>,
}

impl RemoteToolSource {
    /// Binds `info` on `connection` under its namespaced name.
    #[must_use]
    pub fn new(connection: &Arc<RemoteBackendConnection>, info: RemoteToolInfo) -> Self {
        Self {
            public_name: format!("{}:{}", connection.name(), info.name),
            description: info.description.unwrap_or_default(),
            remote_name: info.name,
            connection: Arc::clone(connection),
        }
    }

    /// Returns the namespaced registry name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.public_name
    }
}

impl ToolSource for RemoteToolSource {
    fn describe(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.public_name.clone(),
            description: self.description.clone(),
        }
    }

    fn invoke(&self, arguments: ToolArguments) -> OutputStream {
        Box::new(RemoteCall {
            state: RemoteCallState::Pending {
                connection: Arc::clone(&self.connection),
                tool: self.remote_name.clone(),
                arguments,
            },
            public_name: self.public_name.clone(),
        })
    }
}

/// Lazy output of one remote call.
struct RemoteCall {
    /// Current state.
    state: RemoteCallState,
    /// Name used in fault messages.
    public_name: String,
}

/// Remote call lifecycle.
enum RemoteCallState {
    /// Token not yet taken.
    Pending {
        /// Shared session.
        connection: Arc<RemoteBackendConnection>,
        /// Backend-local tool name.
        tool: String,
        /// Call arguments.
        arguments: ToolArguments,
    },
    /// Result buffered; token held until drained.
    Streaming {
        /// Held serialization token.
        _permit: SessionPermit,
        /// Remaining items.
        items: VecDeque<ToolOutput>,
    },
    /// Finished; token released.
    Done,
}

impl RemoteCall {
    /// Fault for a failed exchange.
    fn fault(&self, err: &BackendError) -> ToolFault {
        ToolFault::runtime(format!("Remote tool '{}' failed: {err}", self.public_name))
    }
}

impl Iterator for RemoteCall {
    type Item = ToolOutput;

    fn next(&mut self) -> Option<Self::Item> {
        match std::mem::replace(&mut self.state, RemoteCallState::Done) {
            RemoteCallState::Done => None,
            RemoteCallState::Pending {
                connection,
                tool,
                arguments,
            } => {
                let permit = match connection.acquire() {
                    Ok(permit) => permit,
                    Err(err) => return Some(Err(self.fault(&err))),
                };
                match connection.call_tool(&permit, &tool, arguments) {
                    Ok(items) => {
                        self.state = RemoteCallState::Streaming {
                            _permit: permit,
                            items: items.into(),
                        };
                        self.next()
                    }
                    Err(err) => Some(Err(self.fault(&err))),
                }
            }
            RemoteCallState::Streaming {
                _permit,
                mut items,
            } => {
                let item = items.pop_front()?;
                if item.is_ok() {
                    self.state = RemoteCallState::Streaming {
                        _permit,
                        items,
                    };
                }
                Some(item)
            }
        }
    }
}

// ============================================================================
// SECTION: Wire Model
// ============================================================================

/// Any JSON-RPC message read from the backend.
#[derive(Debug, Deserialize)]
struct RpcMessage {
    /// Request id for responses.
    #[serde(default)]
    id: Option<Value>,
    /// Present on requests and notifications.
    #[serde(default)]
    method: Option<String>,
    /// Success payload.
    #[serde(default)]
    result: Option<Value>,
    /// Error payload.
    #[serde(default)]
    error: Option<RpcErrorBody>,
}

/// JSON-RPC error body.
#[derive(Debug, Deserialize)]
struct RpcErrorBody {
    /// Error message.
    message: String,
}

/// One `tools/list` page.
#[derive(Debug, Deserialize)]
struct ToolsListPage {
    /// Tools on this page.
    #[serde(default)]
    tools: Vec<RemoteToolInfo>,
    /// Cursor for the next page.
    #[serde(rename = "nextCursor", default)]
    next_cursor: Option<String>,
}

/// `tools/call` result.
#[derive(Debug, Deserialize)]
struct CallToolResult {
    /// Ordered content items.
    #[serde(default)]
    content: Vec<ContentItem>,
    /// Optional structured output.
    #[serde(rename = "structuredContent", default)]
    structured_content: Option<Value>,
    /// Tool-level failure flag.
    #[serde(rename = "isError", default)]
    is_error: bool,
}

/// MCP content item.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentItem {
    /// Plain text.
    Text {
        /// Text body.
        text: String,
    },
    /// Base64 image.
    Image {
        /// Base64 payload.
        data: String,
        /// MIME type.
        #[serde(rename = "mimeType")]
        mime_type: String,
    },
    /// Base64 audio.
    Audio {
        /// Base64 payload.
        data: String,
        /// MIME type.
        #[serde(rename = "mimeType")]
        mime_type: String,
    },
    /// Embedded resource.
    Resource {
        /// Resource body.
        resource: EmbeddedResource,
    },
    /// Link to a resource.
    ResourceLink {
        /// Resource URI.
        uri: String,
    },
    /// Unrecognized item type.
    #[serde(other)]
    Unknown,
}

/// Embedded resource contents.
#[derive(Debug, Deserialize)]
struct EmbeddedResource {
    /// Resource URI.
    uri: String,
    /// Text contents.
    #[serde(default)]
    text: Option<String>,
    /// Base64 contents.
    #[serde(default)]
    blob: Option<String>,
    /// MIME type.
    #[serde(rename = "mimeType", default)]
    mime_type: Option<String>,
}

/// Translates a call result into ordered outputs.
fn translate_result(result: CallToolResult) -> Vec<ToolOutput> {
    if result.is_error {
        let message = result
            .content
            .iter()
            .filter_map(|item| match item {
                ContentItem::Text {
                    text,
                } => Some(text.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("\n");
        let message =
            if message.is_empty() { "Remote tool reported an error.".to_string() } else { message };
        return vec![Err(ToolFault::runtime(message))];
    }
    let mut outputs = Vec::with_capacity(result.content.len() + 1);
    for item in result.content {
        match translate_item(item) {
            Ok(Some(output)) => outputs.push(Ok(output)),
            Ok(None) => {}
            Err(fault) => {
                outputs.push(Err(fault));
                return outputs;
            }
        }
    }
    if let Some(structured) = result.structured_content {
        outputs.push(Ok(OutputItem::Structured(structured)));
    }
    outputs
}

/// Translates one content item; unknown types are dropped.
fn translate_item(item: ContentItem) -> Result<Option<OutputItem>, ToolFault> {
    match item {
        ContentItem::Text {
            text,
        } => Ok(Some(OutputItem::Text(text))),
        ContentItem::Image {
            data,
            mime_type,
        }
        | ContentItem::Audio {
            data,
            mime_type,
        } => Ok(Some(OutputItem::binary(decode_base64(&data)?, mime_type))),
        ContentItem::Resource {
            resource,
        } => match (resource.text, resource.blob) {
            (Some(text), _) => Ok(Some(OutputItem::Text(format!(
                "[Resource: {}]\n{text}",
                resource.uri
            )))),
            (None, Some(blob)) => Ok(Some(OutputItem::binary(
                decode_base64(&blob)?,
                resource.mime_type.unwrap_or_else(|| "application/octet-stream".to_string()),
            ))),
            (None, None) => Ok(Some(OutputItem::Text(format!("[Resource: {}]", resource.uri)))),
        },
        ContentItem::ResourceLink {
            uri,
        } => Ok(Some(OutputItem::Text(format!("[Resource link: {uri}]")))),
        ContentItem::Unknown => Ok(None),
    }
}

/// Decodes a base64 payload.
fn decode_base64(data: &str) -> Result<Vec<u8>, ToolFault> {
    STANDARD
        .decode(data.as_bytes())
        .map_err(|err| ToolFault::runtime(format!("Remote content is not valid base64: {err}")))
}

// ============================================================================
// SECTION: Framing Helpers
// ============================================================================

/// Reads one non-empty newline-delimited message.
fn read_line_message(
    reader: &mut BufReader<Box<dyn Read + Send>>,
    max_bytes: usize,
) -> Result<Vec<u8>, BackendError> {
    let limit = u64::try_from(max_bytes).unwrap_or(u64::MAX).saturating_add(1);
    loop {
        let mut buf = Vec::new();
        let read = reader
            .by_ref()
            .take(limit)
            .read_until(b'\n', &mut buf)
            .map_err(|err| BackendError::Transport(format!("read failed: {err}")))?;
        if read == 0 {
            return Err(BackendError::Transport("backend closed its output".to_string()));
        }
        if buf.last() == Some(&b'\n') {
            buf.pop();
        } else if buf.len() > max_bytes {
            return Err(BackendError::ResponseTooLarge(max_bytes));
        }
        if buf.iter().any(|byte| !byte.is_ascii_whitespace()) {
            return Ok(buf);
        }
    }
}

/// Reads a payload framed with `Content-Length` headers.
fn read_framed(
    reader: &mut BufReader<Box<dyn Read + Send>>,
    max_bytes: usize,
) -> Result<Vec<u8>, BackendError> {
    let mut content_length: Option<usize> = None;
    let mut line = String::new();
    loop {
        line.clear();
        let bytes = reader
            .read_line(&mut line)
            .map_err(|err| BackendError::Transport(format!("read failed: {err}")))?;
        if bytes == 0 {
            return Err(BackendError::Transport("backend closed its output".to_string()));
        }
        if line.trim().is_empty() {
            if content_length.is_some() {
                break;
            }
            continue;
        }
        if let Some(value) = line.strip_prefix("Content-Length:") {
            let parsed = value
                .trim()
                .parse::<usize>()
                .map_err(|_| BackendError::Protocol("invalid content length".to_string()))?;
            content_length = Some(parsed);
        }
    }
    let len = content_length
        .ok_or_else(|| BackendError::Protocol("missing content length header".to_string()))?;
    if len > max_bytes {
        return Err(BackendError::ResponseTooLarge(max_bytes));
    }
    let mut buf = vec![0u8; len];
    reader
        .read_exact(&mut buf)
        .map_err(|err| BackendError::Transport(format!("read failed: {err}")))?;
    Ok(buf)
}

#[cfg(test)]
pub(crate) mod tests;
