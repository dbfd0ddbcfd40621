// crates/mcs-core/src/protocol.rs
// ============================================================================
// Module: RPC Wire Model
// Description: Request, response, and chunk payloads for ListTools/CallTool.
// Purpose: Share one serde model between the gateway and its clients.
// Dependencies: serde, serde_json, base64
// ============================================================================

//! ## Overview
//! The gateway exposes two operations. `ListTools` answers with a
//! [`ListToolsResponse`]. `CallTool` takes a [`ToolCallRequest`] and streams
//! newline-delimited [`ToolCallChunk`] objects. Pre-stream rejections carry an
//! [`RpcStatus`] body.
//!
//! Chunk JSON shape: `{"sequence_id":0,"text":"..."}`,
//! `{"sequence_id":1,"image":{"data":"<base64>","mime_type":"..."}}`, or
//! `{"sequence_id":2,"error":"..."}`.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;

use crate::tool::ToolArguments;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Route for the `ListTools` operation.
pub const LIST_TOOLS_PATH: &str = "/mcs.ModuleContext/ListTools";
/// Route for the `CallTool` operation.
pub const CALL_TOOL_PATH: &str = "/mcs.ModuleContext/CallTool";
/// Unauthenticated liveness route.
pub const HEALTH_PATH: &str = "/healthz";
/// Content type of streamed `CallTool` responses.
pub const NDJSON_CONTENT_TYPE: &str = "application/x-ndjson";

// ============================================================================
// SECTION: Tool Listing
// ============================================================================

/// Public description of one registered tool.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// Registry name (bare for native tools, `backend:tool` for remote ones).
    pub name: String,
    /// Human-readable description.
    pub description: String,
}

/// `ListTools` response body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListToolsResponse {
    /// Every tool currently in the registry.
    pub tools: Vec<ToolDefinition>,
}

// ============================================================================
// SECTION: Tool Calls
// ============================================================================

/// `CallTool` request body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallRequest {
    /// Requested tool name.
    pub tool_name: String,
    /// Argument mapping passed to the tool.
    #[serde(default)]
    pub arguments: ToolArguments,
}

/// One streamed unit of `CallTool` output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCallChunk {
    /// Position of this chunk within the call, starting at zero.
    pub sequence_id: u64,
    /// Exactly one payload variant.
    #[serde(flatten)]
    pub content: ChunkContent,
}

impl ToolCallChunk {
    /// Returns true when this chunk carries an error.
    #[must_use]
    pub const fn is_error(&self) -> bool {
        matches!(self.content, ChunkContent::Error(_))
    }

    /// Encodes the chunk as one newline-terminated JSON line.
    ///
    /// # Errors
    ///
    /// Returns [`serde_json::Error`] when serialization fails.
    pub fn to_ndjson_line(&self) -> Result<Vec<u8>, serde_json::Error> {
        let mut line = serde_json::to_vec(self)?;
        line.push(b'\n');
        Ok(line)
    }
}

/// Chunk payload variants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkContent {
    /// Text output.
    Text(String),
    /// Binary output with its MIME type.
    Image(ImagePayload),
    /// Terminal error message.
    Error(String),
}

/// Binary chunk payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImagePayload {
    /// Raw bytes, base64 encoded on the wire.
    #[serde(with = "base64_bytes")]
    pub data: Vec<u8>,
    /// MIME type of `data`.
    pub mime_type: String,
}

// ============================================================================
// SECTION: Status
// ============================================================================

/// RPC-level rejection codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RpcCode {
    /// Missing or invalid credentials.
    Unauthenticated,
    /// Unknown tool name.
    NotFound,
    /// Request body could not be understood.
    InvalidArgument,
    /// Server is shutting down.
    Unavailable,
    /// Unexpected server failure.
    Internal,
}

impl RpcCode {
    /// Returns the HTTP status code used for this rejection.
    #[must_use]
    pub const fn http_status(self) -> u16 {
        match self {
            Self::Unauthenticated => 401,
            Self::NotFound => 404,
            Self::InvalidArgument => 400,
            Self::Unavailable => 503,
            Self::Internal => 500,
        }
    }

    /// Returns a stable label for logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Unauthenticated => "unauthenticated",
            Self::NotFound => "not_found",
            Self::InvalidArgument => "invalid_argument",
            Self::Unavailable => "unavailable",
            Self::Internal => "internal",
        }
    }
}

/// Rejection body returned before any chunk is streamed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RpcStatus {
    /// Rejection code.
    pub code: RpcCode,
    /// Caller-facing message.
    pub message: String,
}

impl RpcStatus {
    /// Builds a status body.
    #[must_use]
    pub fn new(code: RpcCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Serde adapter encoding byte vectors as standard base64 strings.
mod base64_bytes {
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;
    use serde::Deserialize;
    use serde::Deserializer;
    use serde::Serializer;

    /// Serializes bytes as base64.
    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    /// Deserializes base64 into bytes.
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD.decode(encoded.as_bytes()).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests;
