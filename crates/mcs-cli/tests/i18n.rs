// crates/mcs-cli/tests/i18n.rs
// ============================================================================
// Module: CLI Message Catalog Tests
// Description: Exercises catalog lookup and placeholder substitution.
// ============================================================================

//! ## Overview
//! Exercises catalog lookups and placeholder substitution.

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    reason = "Test-only assertions use unwrap/expect for clarity."
)]

use mcs_cli::i18n::MessageArg;
use mcs_cli::i18n::translate;
use mcs_cli::t;

/// Confirms placeholders are substituted.
#[test]
fn translate_substitutes_placeholders() {
    let rendered = translate("tools.call.error", vec![
        MessageArg::new("sequence", "4"),
        MessageArg::new("message", "File not found at 'x'."),
    ]);
    assert_eq!(rendered, "[4] ERROR: File not found at 'x'.");
}

/// Confirms a missing key renders as the key itself.
#[test]
fn missing_key_renders_as_key() {
    assert_eq!(translate("no.such.key", Vec::new()), "no.such.key");
}

/// Confirms the macro formats named arguments.
#[test]
fn macro_formats_named_arguments() {
    assert_eq!(t!("main.version", version = "0.3.0"), "mcs 0.3.0");
    assert_eq!(t!("tools.list.entry", name = "files:read", description = "Reads"), "files:read\tReads");
}

/// Confirms unused placeholders remain visible.
#[test]
fn unused_placeholders_stay_visible() {
    assert_eq!(t!("serve.ready", tools = 3), "Serving 3 tools on {bind}.");
}
