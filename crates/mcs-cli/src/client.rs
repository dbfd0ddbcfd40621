// crates/mcs-cli/src/client.rs
// ============================================================================
// Module: Gateway Client
// Description: HTTP client for ListTools/CallTool and token acquisition.
// Purpose: Give the CLI streaming access to a running gateway.
// Dependencies: reqwest, serde, url, mcs-core
// ============================================================================

//! ## Overview
//! [`GatewayClient`] issues `ListTools` and `CallTool` against a gateway and
//! decodes the NDJSON chunk stream as bytes arrive, handing each chunk to a
//! caller callback. [`request_token`] performs an OAuth2 client-credentials
//! grant against the identity provider's token endpoint.
//!
//! Security posture: server responses are untrusted; bodies are size-limited,
//! sequence numbering is checked, and secrets never appear in `Debug` output.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::time::Duration;

use mcs_core::CALL_TOOL_PATH;
use mcs_core::LIST_TOOLS_PATH;
use mcs_core::ListToolsResponse;
use mcs_core::ToolArguments;
use mcs_core::ToolCallChunk;
use mcs_core::ToolCallRequest;
use reqwest::Client;
use reqwest::Response;
use reqwest::header::CONTENT_TYPE;
use reqwest::redirect::Policy;
use serde::Deserialize;
use thiserror::Error;
use url::Url;
use url::form_urlencoded;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Maximum size of a non-streamed response body.
pub const MAX_RESPONSE_BYTES: usize = 4 * 1024 * 1024;

/// Maximum size of a single streamed chunk line.
pub const MAX_CHUNK_LINE_BYTES: usize = 32 * 1024 * 1024;

/// Connection establishment timeout.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Gateway client errors.
///
/// # Invariants
/// - String payloads are user-facing and may include untrusted server text.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Client configuration error.
    #[error("client config error: {0}")]
    Config(String),
    /// Network or HTTP failure.
    #[error("transport error: {0}")]
    Transport(String),
    /// The server rejected the request before streaming.
    #[error("{code} (http {status}): {message}")]
    Rejected {
        /// HTTP status code.
        status: u16,
        /// Server-supplied error code.
        code: String,
        /// Server-supplied message.
        message: String,
    },
    /// Response did not follow the wire format.
    #[error("protocol error: {0}")]
    Protocol(String),
    /// Response size exceeds limits.
    #[error("response exceeds size limit ({actual} > {limit})")]
    ResponseTooLarge {
        /// Observed size in bytes.
        actual: usize,
        /// Maximum size in bytes.
        limit: usize,
    },
    /// The chunk callback failed.
    #[error("{0}")]
    Handler(String),
}

// ============================================================================
// SECTION: Gateway Client
// ============================================================================

/// Authenticated client for one gateway.
#[derive(Clone)]
pub struct GatewayClient {
    /// Shared HTTP client.
    http: Client,
    /// Gateway base URL.
    base: Url,
    /// Bearer token attached to every RPC.
    token: String,
}

impl std::fmt::Debug for GatewayClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayClient")
            .field("base", &self.base.as_str())
            .field("token", &"<redacted>")
            .finish_non_exhaustive()
    }
}

/// Totals observed over one `CallTool` stream.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallSummary {
    /// Number of chunks received.
    pub chunks: u64,
    /// True when the stream ended with an error chunk.
    pub failed: bool,
}

impl CallSummary {
    /// Checks ordering and folds one chunk into the totals.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Protocol`] on a sequence gap or output after an
    /// error chunk.
    pub fn observe(&mut self, chunk: &ToolCallChunk) -> Result<(), ClientError> {
        if self.failed {
            return Err(ClientError::Protocol(format!(
                "chunk {} arrived after an error chunk",
                chunk.sequence_id
            )));
        }
        if chunk.sequence_id != self.chunks {
            return Err(ClientError::Protocol(format!(
                "expected sequence_id {}, got {}",
                self.chunks, chunk.sequence_id
            )));
        }
        self.chunks += 1;
        self.failed = chunk.is_error();
        Ok(())
    }
}

impl GatewayClient {
    /// Creates a client for the gateway at `server` (for example
    /// `https://gateway:50051`).
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Config`] when the URL is invalid or the HTTP
    /// client cannot be constructed.
    pub fn new(server: &str, token: impl Into<String>) -> Result<Self, ClientError> {
        let base = Url::parse(server)
            .map_err(|err| ClientError::Config(format!("invalid server url {server}: {err}")))?;
        if !matches!(base.scheme(), "http" | "https") {
            return Err(ClientError::Config(format!(
                "server url must use http or https: {server}"
            )));
        }
        let http = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .redirect(Policy::none())
            .build()
            .map_err(|err| ClientError::Config(err.to_string()))?;
        Ok(Self {
            http,
            base,
            token: token.into(),
        })
    }

    /// Calls `ListTools`.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError`] when the request fails or is rejected.
    pub async fn list_tools(&self) -> Result<ListToolsResponse, ClientError> {
        let response = self
            .http
            .post(self.endpoint(LIST_TOOLS_PATH)?)
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(|err| ClientError::Transport(err.to_string()))?;
        let response = accept(response).await?;
        let body = read_body_with_limit(response, MAX_RESPONSE_BYTES).await?;
        serde_json::from_slice(&body)
            .map_err(|err| ClientError::Protocol(format!("invalid ListTools response: {err}")))
    }

    /// Calls `CallTool`, handing each chunk to `on_chunk` as it arrives.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError`] when the request is rejected, the stream
    /// breaks, a chunk is malformed, or `on_chunk` fails. In-band error
    /// chunks are not errors; they are reported via [`CallSummary::failed`].
    pub async fn call_tool<F>(
        &self,
        tool_name: &str,
        arguments: ToolArguments,
        mut on_chunk: F,
    ) -> Result<CallSummary, ClientError>
    where
        F: FnMut(ToolCallChunk) -> Result<(), ClientError>,
    {
        let request = ToolCallRequest {
            tool_name: tool_name.to_string(),
            arguments,
        };
        let response = self
            .http
            .post(self.endpoint(CALL_TOOL_PATH)?)
            .bearer_auth(&self.token)
            .json(&request)
            .send()
            .await
            .map_err(|err| ClientError::Transport(err.to_string()))?;
        let mut response = accept(response).await?;
        let mut decoder = ChunkDecoder::new(MAX_CHUNK_LINE_BYTES);
        let mut summary = CallSummary::default();
        while let Some(bytes) =
            response.chunk().await.map_err(|err| ClientError::Transport(err.to_string()))?
        {
            for chunk in decoder.push(&bytes)? {
                summary.observe(&chunk)?;
                on_chunk(chunk)?;
            }
        }
        if let Some(chunk) = decoder.finish()? {
            summary.observe(&chunk)?;
            on_chunk(chunk)?;
        }
        Ok(summary)
    }

    /// Resolves an RPC path against the base URL.
    fn endpoint(&self, path: &str) -> Result<Url, ClientError> {
        self.base.join(path).map_err(|err| ClientError::Config(err.to_string()))
    }
}

// ============================================================================
// SECTION: Chunk Decoding
// ============================================================================

/// Incremental NDJSON decoder for `CallTool` bodies.
///
/// # Invariants
/// - `pending` never holds a complete line after [`ChunkDecoder::push`].
#[derive(Debug)]
pub struct ChunkDecoder {
    /// Bytes of the current partial line.
    pending: Vec<u8>,
    /// Maximum bytes a single line may occupy.
    max_line_bytes: usize,
}

impl ChunkDecoder {
    /// Creates a decoder with a per-line size limit.
    #[must_use]
    pub const fn new(max_line_bytes: usize) -> Self {
        Self {
            pending: Vec::new(),
            max_line_bytes,
        }
    }

    /// Appends received bytes and returns every chunk they complete.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError`] when a line is not a chunk or grows past the
    /// limit.
    pub fn push(&mut self, bytes: &[u8]) -> Result<Vec<ToolCallChunk>, ClientError> {
        self.pending.extend_from_slice(bytes);
        let mut chunks = Vec::new();
        while let Some(end) = self.pending.iter().position(|byte| *byte == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=end).collect();
            if line.len() > self.max_line_bytes {
                return Err(ClientError::ResponseTooLarge {
                    actual: line.len(),
                    limit: self.max_line_bytes,
                });
            }
            if let Some(chunk) = parse_line(&line)? {
                chunks.push(chunk);
            }
        }
        if self.pending.len() > self.max_line_bytes {
            return Err(ClientError::ResponseTooLarge {
                actual: self.pending.len(),
                limit: self.max_line_bytes,
            });
        }
        Ok(chunks)
    }

    /// Decodes a trailing line that lacked a newline terminator.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Protocol`] when the trailing bytes are not a
    /// chunk.
    pub fn finish(self) -> Result<Option<ToolCallChunk>, ClientError> {
        parse_line(&self.pending)
    }
}

/// Parses one NDJSON line; blank lines yield `None`.
fn parse_line(line: &[u8]) -> Result<Option<ToolCallChunk>, ClientError> {
    let trimmed = line.trim_ascii();
    if trimmed.is_empty() {
        return Ok(None);
    }
    serde_json::from_slice(trimmed)
        .map(Some)
        .map_err(|err| ClientError::Protocol(format!("invalid chunk line: {err}")))
}

// ============================================================================
// SECTION: Token Acquisition
// ============================================================================

/// OAuth2 client-credentials grant parameters.
#[derive(Clone)]
pub struct TokenRequest {
    /// Token endpoint URL.
    pub endpoint: String,
    /// OAuth2 client identifier.
    pub client_id: String,
    /// OAuth2 client secret.
    pub client_secret: String,
    /// Optional audience parameter.
    pub audience: Option<String>,
}

impl std::fmt::Debug for TokenRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenRequest")
            .field("endpoint", &self.endpoint)
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("audience", &self.audience)
            .finish()
    }
}

impl TokenRequest {
    /// Encodes the grant as an `application/x-www-form-urlencoded` body.
    #[must_use]
    pub fn form_body(&self) -> String {
        let mut form = form_urlencoded::Serializer::new(String::new());
        form.append_pair("grant_type", "client_credentials");
        form.append_pair("client_id", &self.client_id);
        form.append_pair("client_secret", &self.client_secret);
        if let Some(audience) = &self.audience {
            form.append_pair("audience", audience);
        }
        form.finish()
    }
}

/// Successful token endpoint response.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    /// Issued access token.
    access_token: String,
}

/// OAuth2 error response.
#[derive(Debug, Deserialize)]
struct OAuthErrorBody {
    /// Error code.
    error: String,
    /// Optional description.
    #[serde(default)]
    error_description: Option<String>,
}

/// Performs a client-credentials grant and returns the access token.
///
/// # Errors
///
/// Returns [`ClientError`] when the endpoint is unreachable, rejects the
/// client, or answers without an access token.
pub async fn request_token(
    request: &TokenRequest,
    timeout: Duration,
) -> Result<String, ClientError> {
    let http = Client::builder()
        .connect_timeout(CONNECT_TIMEOUT)
        .timeout(timeout)
        .redirect(Policy::none())
        .build()
        .map_err(|err| ClientError::Config(err.to_string()))?;
    let response = http
        .post(&request.endpoint)
        .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(request.form_body())
        .send()
        .await
        .map_err(|err| ClientError::Transport(err.to_string()))?;
    let status = response.status();
    let body = read_body_with_limit(response, MAX_RESPONSE_BYTES).await?;
    if !status.is_success() {
        return Err(match serde_json::from_slice::<OAuthErrorBody>(&body) {
            Ok(error) => ClientError::Rejected {
                status: status.as_u16(),
                code: error.error,
                message: error.error_description.unwrap_or_default(),
            },
            Err(_) => ClientError::Rejected {
                status: status.as_u16(),
                code: "http_error".to_string(),
                message: String::from_utf8_lossy(&body).trim().to_string(),
            },
        });
    }
    let token: TokenResponse = serde_json::from_slice(&body)
        .map_err(|err| ClientError::Protocol(format!("invalid token response: {err}")))?;
    Ok(token.access_token)
}

// ============================================================================
// SECTION: HTTP Helpers
// ============================================================================

/// Gateway rejection body.
#[derive(Debug, Deserialize)]
struct StatusBody {
    /// Error code label.
    code: String,
    /// Caller-facing message.
    message: String,
}

/// Passes successful responses through and converts rejections.
async fn accept(response: Response) -> Result<Response, ClientError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = read_body_with_limit(response, MAX_RESPONSE_BYTES).await?;
    Err(match serde_json::from_slice::<StatusBody>(&body) {
        Ok(parsed) => ClientError::Rejected {
            status: status.as_u16(),
            code: parsed.code,
            message: parsed.message,
        },
        Err(_) => ClientError::Rejected {
            status: status.as_u16(),
            code: "http_error".to_string(),
            message: String::from_utf8_lossy(&body).trim().to_string(),
        },
    })
}

/// Reads a response body while enforcing a hard byte limit.
async fn read_body_with_limit(
    mut response: Response,
    limit: usize,
) -> Result<Vec<u8>, ClientError> {
    let mut body = Vec::new();
    while let Some(chunk) =
        response.chunk().await.map_err(|err| ClientError::Transport(err.to_string()))?
    {
        let total = body.len().saturating_add(chunk.len());
        if total > limit {
            return Err(ClientError::ResponseTooLarge {
                actual: total,
                limit,
            });
        }
        body.extend_from_slice(&chunk);
    }
    Ok(body)
}

#[cfg(test)]
mod tests;
