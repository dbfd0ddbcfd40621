// crates/mcs-config/src/lib.rs
// ============================================================================
// Module: MCS Config Library
// Description: Canonical config model and validation for the gateway.
// Purpose: Single source of truth for mcs.toml semantics.
// Dependencies: mcs-tools, serde, toml, url
// ============================================================================

//! ## Overview
//! `mcs-config` defines the gateway configuration: listener and TLS settings,
//! token validation against the identity provider, native tool settings, and
//! remote MCP backends. Loading is strict and fail-closed.
//!
//! Security posture: config inputs are untrusted.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod config;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use config::*;
