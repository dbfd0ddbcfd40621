// crates/mcs-cli/src/i18n.rs
// ============================================================================
// Module: CLI Message Catalog
// Description: Message catalog and placeholder substitution for the CLI.
// Purpose: Keep user-facing strings in one table.
// Dependencies: Standard library collections.
// ============================================================================

//! ## Overview
//! Every line the `mcs` binary prints is looked up here by key and rendered
//! through the [`t!`](crate::t) macro.
//!
//! ## Invariants
//! - The catalog is built once and read-only thereafter.
//! - Missing keys render as the key itself.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::HashMap;
use std::sync::OnceLock;

// ============================================================================
// SECTION: Types
// ============================================================================

/// A named placeholder value captured by the [`macro@crate::t`] macro.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageArg {
    /// Placeholder name without braces.
    pub key: &'static str,
    /// Preformatted value.
    pub value: String,
}

impl MessageArg {
    /// Creates a placeholder binding.
    #[must_use]
    pub fn new(key: &'static str, value: impl Into<String>) -> Self {
        Self {
            key,
            value: value.into(),
        }
    }
}

// ============================================================================
// SECTION: Catalog
// ============================================================================

/// English message templates keyed by stable identifiers.
const MESSAGES: &[(&str, &str)] = &[
    ("main.version", "mcs {version}"),
    ("config.load_failed", "Failed to load config: {error}"),
    ("config.validate.ok", "Config valid."),
    ("serve.init_failed", "Failed to initialize gateway: {error}"),
    ("serve.failed", "Gateway server failed: {error}"),
    ("serve.join_failed", "Gateway initialization task failed: {error}"),
    ("serve.ready", "Serving {tools} tools on {bind}."),
    ("serve.stopped", "Gateway stopped."),
    ("token.endpoint_invalid", "Invalid identity provider settings: {error}"),
    ("token.failed", "Token request failed: {error}"),
    ("tools.client_failed", "Cannot reach gateway: {error}"),
    ("tools.args_invalid", "--args must be a JSON object: {error}"),
    ("tools.list.failed", "ListTools failed: {error}"),
    ("tools.list.empty", "No tools registered."),
    ("tools.list.entry", "{name}\t{description}"),
    ("tools.call.failed", "CallTool failed: {error}"),
    ("tools.call.text", "[{sequence}] {text}"),
    ("tools.call.image", "[{sequence}] <{mime_type}, {bytes} bytes>"),
    ("tools.call.error", "[{sequence}] ERROR: {message}"),
    ("output.stream.stdout", "stdout"),
    ("output.stream.stderr", "stderr"),
    ("output.write_failed", "Failed to write to {stream}: {error}"),
];

/// Returns the lazily built message table.
fn catalog() -> &'static HashMap<&'static str, &'static str> {
    static CATALOG: OnceLock<HashMap<&'static str, &'static str>> = OnceLock::new();
    CATALOG.get_or_init(|| MESSAGES.iter().copied().collect())
}

/// Renders `key` with each `{placeholder}` replaced by its argument.
#[must_use]
pub fn translate(key: &str, args: Vec<MessageArg>) -> String {
    let template = catalog().get(key).copied().unwrap_or(key);
    if args.is_empty() {
        return template.to_string();
    }
    let mut result = template.to_string();
    for arg in args {
        let placeholder = format!("{{{}}}", arg.key);
        result = result.replace(&placeholder, &arg.value);
    }
    result
}

// ============================================================================
// SECTION: Macro
// ============================================================================

/// Formats a catalog message from a key and named arguments.
///
/// # Arguments
///
/// - `$key` must match a catalog entry.
/// - Named arguments are substituted into `{placeholder}` positions.
#[macro_export]
macro_rules! t {
    ($key:literal $(, $name:ident = $value:expr )* $(,)?) => {{
        let args = ::std::vec![
            $(
                $crate::i18n::MessageArg::new(stringify!($name), $value.to_string()),
            )*
        ];
        $crate::i18n::translate($key, args)
    }};
}
