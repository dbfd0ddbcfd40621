// crates/mcs-gateway/src/registry.rs
// ============================================================================
// Module: Tool Registry
// Description: Name-to-source mapping for native and remote tools.
// Purpose: Merge every tool source into one immutable lookup table.
// Dependencies: mcs-config, mcs-core, mcs-tools
// ============================================================================

//! ## Overview
//! The registry is built once at startup. Native tools register first, then
//! each configured backend in order; a later registration under an existing
//! name replaces the earlier one and emits a collision warning. A backend
//! that fails to start is skipped. After [`ToolRegistryBuilder::build`] the
//! table never changes.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;

use mcs_config::BackendConfig;
use mcs_core::NativeToolSource;
use mcs_core::OutputStream;
use mcs_core::ToolArguments;
use mcs_core::ToolDefinition;
use mcs_core::ToolSource;
use mcs_tools::NativeToolsConfig;
use mcs_tools::ToolBuildError;
use mcs_tools::builtin_tool_sources;

use crate::audit::AuditSink;
use crate::audit::LifecycleAuditEvent;
use crate::audit::LifecycleKind;
use crate::remote::BackendError;
use crate::remote::RemoteBackendConnection;
use crate::remote::RemoteToolSource;

// ============================================================================
// SECTION: Registered Tool
// ============================================================================

/// Tool entry: either a local function or a remote proxy.
#[derive(Debug, Clone)]
pub enum RegisteredTool {
    /// In-process tool.
    Native(NativeToolSource),
    /// Tool served by a backend session.
    Remote(RemoteToolSource),
}

impl ToolSource for RegisteredTool {
    fn describe(&self) -> ToolDefinition {
        match self {
            Self::Native(tool) => tool.describe(),
            Self::Remote(tool) => tool.describe(),
        }
    }

    fn invoke(&self, arguments: ToolArguments) -> OutputStream {
        match self {
            Self::Native(tool) => tool.invoke(arguments),
            Self::Remote(tool) => tool.invoke(arguments),
        }
    }
}

// ============================================================================
// SECTION: Builder
// ============================================================================

/// Accumulates tools before the registry is frozen.
pub struct ToolRegistryBuilder {
    /// Tools keyed by public name.
    tools: BTreeMap<String, RegisteredTool>,
    /// Connected backends, in registration order.
    backends: Vec<Arc<RemoteBackendConnection>>,
    /// Sink for collision and backend events.
    audit: Arc<dyn AuditSink>,
}

impl ToolRegistryBuilder {
    /// Starts an empty registry.
    #[must_use]
    pub fn new(audit: Arc<dyn AuditSink>) -> Self {
        Self {
            tools: BTreeMap::new(),
            backends: Vec::new(),
            audit,
        }
    }

    /// Registers a native tool under its own name.
    pub fn register_native(&mut self, tool: NativeToolSource) -> &mut Self {
        let name = tool.name().to_string();
        self.insert(name, RegisteredTool::Native(tool));
        self
    }

    /// Registers every tool a connected backend advertises.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError`] when listing fails; the connection is closed
    /// and nothing is registered.
    pub fn register_backend(
        &mut self,
        connection: Arc<RemoteBackendConnection>,
    ) -> Result<usize, BackendError> {
        let infos = match connection.list_tools() {
            Ok(infos) => infos,
            Err(err) => {
                connection.close();
                return Err(err);
            }
        };
        let count = infos.len();
        for info in infos {
            let tool = RemoteToolSource::new(&connection, info);
            self.insert(tool.name().to_string(), RegisteredTool::Remote(tool));
        }
        self.audit.record_lifecycle(
            &LifecycleAuditEvent::new(LifecycleKind::BackendConnected)
                .with_backend(connection.name())
                .with_message(format!("{count} tools")),
        );
        self.backends.push(connection);
        Ok(count)
    }

    /// Spawns and registers a configured backend. Failures are audited and
    /// the backend is skipped.
    pub fn connect_backend(&mut self, config: &BackendConfig) -> usize {
        let registered = RemoteBackendConnection::spawn(config)
            .and_then(|connection| self.register_backend(connection));
        match registered {
            Ok(count) => count,
            Err(err) => {
                self.audit.record_lifecycle(
                    &LifecycleAuditEvent::new(LifecycleKind::BackendUnavailable)
                        .with_backend(&config.name)
                        .with_message(err.to_string()),
                );
                0
            }
        }
    }

    /// Freezes the registry.
    #[must_use]
    pub fn build(self) -> ToolRegistry {
        ToolRegistry {
            tools: self.tools,
            backends: self.backends,
            audit: self.audit,
            closed: AtomicBool::new(false),
        }
    }

    /// Inserts with last-writer-wins semantics.
    fn insert(&mut self, name: String, tool: RegisteredTool) {
        let replaced = self.tools.insert(name.clone(), tool);
        if replaced.is_some() {
            self.audit.record_lifecycle(
                &LifecycleAuditEvent::new(LifecycleKind::ToolNameCollision)
                    .with_tool(name)
                    .with_message("later registration replaced the existing tool"),
            );
        }
    }
}

// ============================================================================
// SECTION: Registry
// ============================================================================

/// Immutable tool table shared by every call.
pub struct ToolRegistry {
    /// Tools keyed by public name.
    tools: BTreeMap<String, RegisteredTool>,
    /// Backend sessions owned by the registry.
    backends: Vec<Arc<RemoteBackendConnection>>,
    /// Sink for shutdown events.
    audit: Arc<dyn AuditSink>,
    /// Set once backends are closed.
    closed: AtomicBool,
}

impl ToolRegistry {
    /// Builds the registry from native tool settings and backend configs.
    ///
    /// # Errors
    ///
    /// Returns [`ToolBuildError`] when native tool settings are invalid.
    /// Backend failures are not errors.
    pub fn from_config(
        tools: &NativeToolsConfig,
        backends: &[BackendConfig],
        audit: Arc<dyn AuditSink>,
    ) -> Result<Self, ToolBuildError> {
        let mut builder = ToolRegistryBuilder::new(audit);
        for tool in builtin_tool_sources(tools)? {
            builder.register_native(tool);
        }
        for backend in backends {
            builder.connect_backend(backend);
        }
        Ok(builder.build())
    }

    /// Returns every tool definition sorted by name.
    #[must_use]
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools.values().map(ToolSource::describe).collect()
    }

    /// Looks up a tool by exact name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<RegisteredTool> {
        self.tools.get(name).cloned()
    }

    /// Returns the number of registered tools.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Returns true when no tools are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Returns the names of connected backends.
    #[must_use]
    pub fn backend_names(&self) -> Vec<&str> {
        self.backends.iter().map(|backend| backend.name()).collect()
    }

    /// Closes every backend session. Later calls are no-ops.
    pub fn shutdown(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        for backend in &self.backends {
            backend.close();
            self.audit.record_lifecycle(
                &LifecycleAuditEvent::new(LifecycleKind::BackendClosed).with_backend(backend.name()),
            );
        }
    }
}
