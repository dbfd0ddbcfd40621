// crates/mcs-core/src/native.rs
// ============================================================================
// Module: Native Tool Source
// Description: In-process tool backed by a thread-safe function.
// Purpose: Wrap local tool bodies as a ToolSource value object.
// Dependencies: mcs-core tool contract
// ============================================================================

//! ## Overview
//! [`NativeToolSource`] binds a public name and description to a handler
//! function. Handlers must be callable concurrently; every invocation gets its
//! own output sequence.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;

use crate::protocol::ToolDefinition;
use crate::tool::OutputStream;
use crate::tool::ToolArguments;
use crate::tool::ToolSource;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Handler signature for native tools.
pub type NativeHandler = dyn Fn(ToolArguments) -> OutputStream + Send + Sync;

/// Tool implemented by a local function.
#[derive(Clone)]
pub struct NativeToolSource {
    /// Public metadata.
    definition: ToolDefinition,
    /// Shared handler.
    handler: Arc<NativeHandler>,
}

impl NativeToolSource {
    /// Builds a native tool from its name, description, and handler.
    pub fn new<F>(name: impl Into<String>, description: impl Into<String>, handler: F) -> Self
    where
        F: Fn(ToolArguments) -> OutputStream + Send + Sync + 'static,
    {
        Self {
            definition: ToolDefinition {
                name: name.into(),
                description: description.into(),
            },
            handler: Arc::new(handler),
        }
    }

    /// Returns the registered name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.definition.name
    }
}

impl fmt::Debug for NativeToolSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeToolSource").field("name", &self.definition.name).finish()
    }
}

impl ToolSource for NativeToolSource {
    fn describe(&self) -> ToolDefinition {
        self.definition.clone()
    }

    fn invoke(&self, arguments: ToolArguments) -> OutputStream {
        (self.handler)(arguments)
    }
}
