// crates/mcs-gateway/src/dispatch.rs
// ============================================================================
// Module: Dispatch Engine
// Description: ListTools and CallTool semantics over the tool registry.
// Purpose: Turn tool output into gapless, sequence-numbered chunks.
// Dependencies: mcs-core, serde_jcs, thiserror
// ============================================================================

//! ## Overview
//! [`DispatchEngine`] resolves tool names and drives a tool's output sequence
//! into a [`ChunkSink`]. Every produced item becomes exactly one chunk with
//! the next sequence id starting at zero. A fault (including a panic inside
//! the tool) ends the stream with exactly one error chunk; the call still
//! completes normally. Unknown names are rejected before any chunk exists.
//! When the sink closes, the sequence is dropped without further pulls.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::panic::catch_unwind;
use std::sync::Arc;

use mcs_core::ChunkContent;
use mcs_core::ImagePayload;
use mcs_core::ListToolsResponse;
use mcs_core::OutputItem;
use mcs_core::ToolArguments;
use mcs_core::ToolCallChunk;
use mcs_core::ToolSource;
use thiserror::Error;

use crate::registry::RegisteredTool;
use crate::registry::ToolRegistry;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Pre-stream rejections.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DispatchError {
    /// No tool is registered under the requested name.
    #[error("tool not found: {0}")]
    NotFound(String),
}

/// Returned by a [`ChunkSink`] once the caller is gone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("chunk sink closed")]
pub struct SinkClosed;

// ============================================================================
// SECTION: Sink
// ============================================================================

/// Destination for emitted chunks.
pub trait ChunkSink {
    /// Delivers one chunk.
    ///
    /// # Errors
    ///
    /// Returns [`SinkClosed`] when the caller no longer accepts chunks.
    fn emit(&mut self, chunk: ToolCallChunk) -> Result<(), SinkClosed>;
}

impl ChunkSink for Vec<ToolCallChunk> {
    fn emit(&mut self, chunk: ToolCallChunk) -> Result<(), SinkClosed> {
        self.push(chunk);
        Ok(())
    }
}

// ============================================================================
// SECTION: Outcome
// ============================================================================

/// Terminal state of a streamed call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallOutcome {
    /// The sequence ended without a fault.
    Completed {
        /// Chunks emitted.
        chunks: u64,
    },
    /// The sequence faulted; the last chunk is the error chunk.
    Failed {
        /// Chunks emitted, including the error chunk.
        chunks: u64,
        /// Fault message.
        message: String,
    },
    /// The sink closed before the sequence ended.
    Cancelled {
        /// Chunks delivered before the sink closed.
        chunks: u64,
    },
}

impl CallOutcome {
    /// Returns the number of chunks delivered.
    #[must_use]
    pub const fn chunks(&self) -> u64 {
        match self {
            Self::Completed {
                chunks,
            }
            | Self::Failed {
                chunks, ..
            }
            | Self::Cancelled {
                chunks,
            } => *chunks,
        }
    }

    /// Returns a stable state label.
    #[must_use]
    pub const fn state(&self) -> &'static str {
        match self {
            Self::Completed {
                ..
            } => "completed",
            Self::Failed {
                ..
            } => "failed",
            Self::Cancelled {
                ..
            } => "cancelled",
        }
    }

    /// Returns the fault message for failed calls.
    #[must_use]
    pub fn error_message(&self) -> Option<&str> {
        match self {
            Self::Failed {
                message, ..
            } => Some(message),
            _ => None,
        }
    }
}

// ============================================================================
// SECTION: Engine
// ============================================================================

/// Implements the two gateway RPCs against a registry.
#[derive(Clone)]
pub struct DispatchEngine {
    /// Frozen tool table.
    registry: Arc<ToolRegistry>,
}

impl DispatchEngine {
    /// Wraps a registry.
    #[must_use]
    pub const fn new(registry: Arc<ToolRegistry>) -> Self {
        Self {
            registry,
        }
    }

    /// Returns the registry.
    #[must_use]
    pub const fn registry(&self) -> &Arc<ToolRegistry> {
        &self.registry
    }

    /// Lists every registered tool.
    #[must_use]
    pub fn list_tools(&self) -> ListToolsResponse {
        ListToolsResponse {
            tools: self.registry.definitions(),
        }
    }

    /// Resolves a tool name.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::NotFound`] for unknown names.
    pub fn lookup(&self, name: &str) -> Result<RegisteredTool, DispatchError> {
        self.registry.get(name).ok_or_else(|| DispatchError::NotFound(name.to_string()))
    }

    /// Looks up and streams a call in one step.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::NotFound`] without emitting any chunk.
    pub fn call(
        &self,
        name: &str,
        arguments: ToolArguments,
        sink: &mut dyn ChunkSink,
    ) -> Result<CallOutcome, DispatchError> {
        let tool = self.lookup(name)?;
        Ok(self.stream(&tool, arguments, sink))
    }

    /// Drives `tool` to completion, a fault, or sink closure.
    pub fn stream(
        &self,
        tool: &dyn ToolSource,
        arguments: ToolArguments,
        sink: &mut dyn ChunkSink,
    ) -> CallOutcome {
        let mut emitted = 0u64;
        let mut output = match catch_unwind(AssertUnwindSafe(|| tool.invoke(arguments))) {
            Ok(output) => output,
            Err(panic) => return finish_with_error(sink, emitted, panic_message(panic.as_ref())),
        };
        loop {
            let next = match catch_unwind(AssertUnwindSafe(|| output.next())) {
                Ok(next) => next,
                Err(panic) => {
                    return finish_with_error(sink, emitted, panic_message(panic.as_ref()));
                }
            };
            let item = match next {
                None => {
                    return CallOutcome::Completed {
                        chunks: emitted,
                    };
                }
                Some(Err(fault)) => {
                    return finish_with_error(sink, emitted, fault.message().to_string());
                }
                Some(Ok(item)) => item,
            };
            let content = match chunk_content(item) {
                Ok(content) => content,
                Err(message) => return finish_with_error(sink, emitted, message),
            };
            let chunk = ToolCallChunk {
                sequence_id: emitted,
                content,
            };
            if sink.emit(chunk).is_err() {
                return CallOutcome::Cancelled {
                    chunks: emitted,
                };
            }
            emitted += 1;
        }
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Emits the terminal error chunk.
fn finish_with_error(sink: &mut dyn ChunkSink, emitted: u64, message: String) -> CallOutcome {
    let chunk = ToolCallChunk {
        sequence_id: emitted,
        content: ChunkContent::Error(message.clone()),
    };
    if sink.emit(chunk).is_err() {
        return CallOutcome::Cancelled {
            chunks: emitted,
        };
    }
    CallOutcome::Failed {
        chunks: emitted + 1,
        message,
    }
}

/// Encodes one output item as chunk content.
fn chunk_content(item: OutputItem) -> Result<ChunkContent, String> {
    match item {
        OutputItem::Text(text) => Ok(ChunkContent::Text(text)),
        OutputItem::Binary {
            data,
            mime_type,
        } => Ok(ChunkContent::Image(ImagePayload {
            data,
            mime_type,
        })),
        OutputItem::Structured(value) => serde_jcs::to_string(&value)
            .map(ChunkContent::Text)
            .map_err(|err| format!("structured output encoding failed: {err}")),
    }
}

/// Extracts a readable message from a panic payload.
fn panic_message(payload: &(dyn Any + Send)) -> String {
    let detail = payload
        .downcast_ref::<&str>()
        .map(|message| (*message).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned());
    match detail {
        Some(detail) => format!("internal tool error: {detail}"),
        None => "internal tool error".to_string(),
    }
}

#[cfg(test)]
mod tests;
