// crates/mcs-core/src/tool.rs
// ============================================================================
// Module: Tool Contract
// Description: Tool source trait, arguments, output items, and faults.
// Purpose: Normalize native and remote tool execution behind one contract.
// Dependencies: serde, serde_json, thiserror
// ============================================================================

//! ## Overview
//! A [`ToolSource`] turns an argument mapping into a lazy, ordered,
//! non-restartable sequence of [`ToolOutput`] values. Production happens only
//! as the sequence is pulled. A source reports failure in-band by yielding an
//! `Err(ToolFault)`; consumers stop pulling after the first fault.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;
use serde_json::Map;
use serde_json::Value;
use thiserror::Error;

use crate::protocol::ToolDefinition;

// ============================================================================
// SECTION: Arguments
// ============================================================================

/// String-keyed argument mapping supplied with a tool call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ToolArguments(Map<String, Value>);

impl ToolArguments {
    /// Creates an empty argument mapping.
    #[must_use]
    pub fn new() -> Self {
        Self(Map::new())
    }

    /// Wraps an existing JSON object.
    #[must_use]
    pub const fn from_map(map: Map<String, Value>) -> Self {
        Self(map)
    }

    /// Returns a copy with `key` set to `value`.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    /// Returns the raw value for `key`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Returns the string value for `key` when present and a string.
    #[must_use]
    pub fn optional_str(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }

    /// Returns the non-empty string value for `key`.
    ///
    /// # Errors
    ///
    /// Returns an `InvalidArgument` [`ToolFault`] when the argument is absent,
    /// not a string, or blank.
    pub fn required_str(&self, key: &str) -> Result<&str, ToolFault> {
        match self.0.get(key) {
            Some(Value::String(value)) if !value.trim().is_empty() => Ok(value),
            Some(Value::String(_)) | None => Err(ToolFault::invalid_argument(format!(
                "A '{key}' argument is required."
            ))),
            Some(_) => Err(ToolFault::invalid_argument(format!("'{key}' must be a string."))),
        }
    }

    /// Returns true when no arguments were supplied.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Borrows the underlying JSON object.
    #[must_use]
    pub const fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    /// Consumes the mapping and returns the JSON object.
    #[must_use]
    pub fn into_map(self) -> Map<String, Value> {
        self.0
    }
}

// ============================================================================
// SECTION: Output
// ============================================================================

/// One unit of tool output.
#[derive(Debug, Clone, PartialEq)]
pub enum OutputItem {
    /// Plain text.
    Text(String),
    /// Binary payload with its MIME type.
    Binary {
        /// Raw bytes.
        data: Vec<u8>,
        /// MIME type of `data`.
        mime_type: String,
    },
    /// Structured JSON value.
    Structured(Value),
}

impl OutputItem {
    /// Builds a text item.
    #[must_use]
    pub fn text(value: impl Into<String>) -> Self {
        Self::Text(value.into())
    }

    /// Builds a binary item.
    #[must_use]
    pub fn binary(data: Vec<u8>, mime_type: impl Into<String>) -> Self {
        Self::Binary {
            data,
            mime_type: mime_type.into(),
        }
    }
}

/// Classification of a tool fault.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultKind {
    /// A required argument was missing or malformed.
    InvalidArgument,
    /// The tool failed while producing output.
    Runtime,
}

impl FaultKind {
    /// Returns a stable label for logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::InvalidArgument => "invalid_argument",
            Self::Runtime => "tool_runtime_error",
        }
    }
}

/// Fault reported in-band by a tool source.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct ToolFault {
    /// Fault classification.
    kind: FaultKind,
    /// Caller-visible message.
    message: String,
}

impl ToolFault {
    /// Builds an `InvalidArgument` fault.
    #[must_use]
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self {
            kind: FaultKind::InvalidArgument,
            message: message.into(),
        }
    }

    /// Builds a runtime fault.
    #[must_use]
    pub fn runtime(message: impl Into<String>) -> Self {
        Self {
            kind: FaultKind::Runtime,
            message: message.into(),
        }
    }

    /// Returns the fault classification.
    #[must_use]
    pub const fn kind(&self) -> FaultKind {
        self.kind
    }

    /// Returns the caller-visible message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Single element of a tool's output sequence.
pub type ToolOutput = Result<OutputItem, ToolFault>;

/// Lazy, ordered, non-restartable output sequence.
pub type OutputStream = Box<dyn Iterator<Item = ToolOutput> + Send>;

/// Returns a sequence yielding exactly one item.
#[must_use]
pub fn single(item: OutputItem) -> OutputStream {
    Box::new(std::iter::once(Ok(item)))
}

/// Returns a sequence whose first and only element is `fault`.
#[must_use]
pub fn failed(fault: ToolFault) -> OutputStream {
    Box::new(std::iter::once(Err(fault)))
}

/// Returns a sequence over already-produced items.
#[must_use]
pub fn from_items(items: Vec<OutputItem>) -> OutputStream {
    Box::new(items.into_iter().map(Ok))
}

// ============================================================================
// SECTION: Tool Source
// ============================================================================

/// Executable tool capability shared by native and remote tools.
pub trait ToolSource: Send + Sync {
    /// Returns the public name and description.
    fn describe(&self) -> ToolDefinition;

    /// Starts a call. No work may happen until the returned sequence is pulled.
    fn invoke(&self, arguments: ToolArguments) -> OutputStream;
}
