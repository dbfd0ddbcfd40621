// crates/mcs-cli/src/lib.rs
// ============================================================================
// Module: MCS CLI Library
// Description: Shared modules for the `mcs` command-line binary.
// Purpose: Expose the gateway client and message catalog for tests.
// Dependencies: mcs-core, reqwest, url
// ============================================================================

//! ## Overview
//! Library half of the `mcs` binary. The [`client`] module talks to a running
//! gateway and to the identity provider's token endpoint; [`i18n`] holds the
//! user-facing message catalog behind the [`t!`] macro.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod client;
pub mod i18n;
