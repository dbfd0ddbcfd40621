// crates/mcs-tools/tests/builtin_tools.rs
// ============================================================================
// Module: Built-in Tool Assembly Tests
// Description: Integration tests for builtin_tool_sources.
// Purpose: Confirm enablement filtering and config validation.
// Dependencies: mcs-tools, mcs-core
// ============================================================================

//! ## Overview
//! Checks which built-in tools the public constructor enables.

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    reason = "Test-only assertions use unwrap/expect for clarity."
)]

use mcs_core::ToolSource;
use mcs_tools::NativeToolsConfig;
use mcs_tools::builtin_tool_sources;

/// Names of the tools `config` enables, in registration order.
fn names(config: &NativeToolsConfig) -> Vec<String> {
    builtin_tool_sources(config).unwrap().iter().map(|source| source.describe().name).collect()
}

/// Confirms every built-in tool is enabled by default.
#[test]
fn all_tools_enabled_by_default() {
    assert_eq!(
        names(&NativeToolsConfig::default()),
        vec!["file_reader", "web_search", "image_fetcher", "render_html"]
    );
}

/// Confirms the enabled list filters the built-in tools.
#[test]
fn enabled_list_filters_tools() {
    let config = NativeToolsConfig {
        enabled: Some(vec!["web_search".to_string(), "file_reader".to_string()]),
        ..NativeToolsConfig::default()
    };
    assert_eq!(names(&config), vec!["file_reader", "web_search"]);
}

/// Confirms an unknown enabled tool name is rejected.
#[test]
fn unknown_enabled_tool_is_rejected() {
    let config = NativeToolsConfig {
        enabled: Some(vec!["shell".to_string()]),
        ..NativeToolsConfig::default()
    };
    let err = builtin_tool_sources(&config).unwrap_err();
    assert!(err.to_string().contains("shell"));
}

/// Confirms the tools table parses from a TOML fragment.
#[test]
fn tools_table_parses_from_toml_fragment() {
    let config: NativeToolsConfig = serde_json::from_value(serde_json::json!({
        "enabled": ["image_fetcher"],
        "image_fetcher": {"allow_http": true, "max_bytes": 2048}
    }))
    .unwrap();
    assert!(config.image_fetcher.allow_http);
    assert_eq!(config.image_fetcher.max_bytes, 2048);
    assert_eq!(config.image_fetcher.timeout_ms, 10_000);
}
