// crates/mcs-gateway/src/lib.rs
// ============================================================================
// Module: MCS Gateway Library
// Description: Authenticated tool gateway over HTTP/NDJSON.
// Purpose: Token validation, tool registry, streaming dispatch, and serving.
// Dependencies: mcs-config, mcs-core, mcs-tools, axum, jsonwebtoken
// ============================================================================

//! ## Overview
//! `mcs-gateway` serves `ListTools` and `CallTool` to authenticated callers.
//! Bearer tokens are verified against the identity provider's published
//! keys, tools come from in-process sources and remote MCP backends, and
//! call output streams as sequence-numbered chunks.
//!
//! Security posture: every RPC input is untrusted; auth is fail-closed.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod audit;
pub mod auth;
pub mod dispatch;
pub mod jwks;
pub mod registry;
pub mod remote;
pub mod server;
pub mod telemetry;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use audit::AuditSink;
pub use audit::FileAuditSink;
pub use audit::NoopAuditSink;
pub use audit::StderrAuditSink;
pub use auth::AuthContext;
pub use auth::AuthError;
pub use auth::AuthGate;
pub use dispatch::CallOutcome;
pub use dispatch::ChunkSink;
pub use dispatch::DispatchEngine;
pub use dispatch::DispatchError;
pub use jwks::JwksTokenValidator;
pub use jwks::TokenClaims;
pub use jwks::TokenVerifier;
pub use registry::RegisteredTool;
pub use registry::ToolRegistry;
pub use registry::ToolRegistryBuilder;
pub use remote::BackendError;
pub use remote::RemoteBackendConnection;
pub use remote::RemoteToolSource;
pub use server::GatewayParts;
pub use server::GatewayServer;
pub use server::GatewayServerError;
pub use telemetry::GatewayMetrics;
pub use telemetry::NoopMetrics;
