// crates/mcs-tools/src/render_html.rs
// ============================================================================
// Module: HTML Render Tool
// Description: Prints caller-supplied HTML to the server console.
// Purpose: Let operators inspect HTML produced by callers.
// Dependencies: mcs-core
// ============================================================================

//! ## Overview
//! `render_html {html_string}` writes the caller's HTML to the server console
//! and yields a single confirmation line. Nothing is written until the first
//! pull.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::io::Write;
use std::sync::Arc;
use std::sync::Mutex;

use mcs_core::NativeToolSource;
use mcs_core::OutputItem;
use mcs_core::OutputStream;
use mcs_core::ToolArguments;
use mcs_core::ToolFault;
use mcs_core::tool::failed;
use serde::Deserialize;

use crate::ToolBuildError;
use crate::config::RENDER_HTML;
use crate::config::require_nonzero;

// ============================================================================
// SECTION: Configuration
// ============================================================================

/// Confirmation returned after the HTML is written.
pub const RENDER_CONFIRMATION: &str = "SUCCESS: HTML content received and printed to server console.";

/// HTML render settings (`[tools.render_html]`).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RenderHtmlConfig {
    /// Maximum accepted HTML size in bytes.
    #[serde(default = "default_max_bytes")]
    pub max_bytes: usize,
}

impl Default for RenderHtmlConfig {
    fn default() -> Self {
        Self {
            max_bytes: default_max_bytes(),
        }
    }
}

impl RenderHtmlConfig {
    /// Validates limits.
    pub(crate) fn validate(&self) -> Result<(), ToolBuildError> {
        require_nonzero(
            "tools.render_html.max_bytes",
            u64::try_from(self.max_bytes).unwrap_or(u64::MAX),
        )
    }
}

/// Default HTML cap (1 MiB).
const fn default_max_bytes() -> usize {
    1024 * 1024
}

// ============================================================================
// SECTION: Tool
// ============================================================================

/// Shared console writer.
pub type Console = Arc<Mutex<Box<dyn Write + Send>>>;

/// Writes HTML to a console sink.
pub struct HtmlRenderer {
    /// Tool settings.
    config: RenderHtmlConfig,
    /// Console destination.
    console: Console,
}

impl HtmlRenderer {
    /// Builds a renderer writing to `console`.
    #[must_use]
    pub fn new(config: RenderHtmlConfig, console: Console) -> Self {
        Self {
            config,
            console,
        }
    }

    /// Builds a renderer writing to the process stderr.
    #[must_use]
    pub fn to_stderr(config: RenderHtmlConfig) -> Self {
        Self::new(config, Arc::new(Mutex::new(Box::new(std::io::stderr()))))
    }

    /// Starts rendering the `html_string` argument.
    #[must_use]
    pub fn run(self: &Arc<Self>, arguments: &ToolArguments) -> OutputStream {
        let html = match arguments.required_str("html_string") {
            Ok(html) => html.to_string(),
            Err(fault) => return failed(fault),
        };
        if html.len() > self.config.max_bytes {
            return failed(ToolFault::invalid_argument(format!(
                "'html_string' exceeds {} bytes.",
                self.config.max_bytes
            )));
        }
        let tool = Arc::clone(self);
        let mut pending = Some(html);
        Box::new(std::iter::from_fn(move || pending.take().map(|html| tool.render(&html))))
    }

    /// Wraps the tool as a registry source.
    #[must_use]
    pub fn into_source(self) -> NativeToolSource {
        let tool = Arc::new(self);
        NativeToolSource::new(
            RENDER_HTML,
            "Prints an HTML document to the server console for inspection.",
            move |arguments| tool.run(&arguments),
        )
    }

    /// Writes the framed HTML block.
    fn render(&self, html: &str) -> Result<OutputItem, ToolFault> {
        let mut console = self
            .console
            .lock()
            .map_err(|_| ToolFault::runtime("Console lock poisoned."))?;
        writeln!(console, "--- render_html: {} bytes ---", html.len())
            .and_then(|()| writeln!(console, "{html}"))
            .and_then(|()| writeln!(console, "--- end render_html ---"))
            .and_then(|()| console.flush())
            .map_err(|err| ToolFault::runtime(format!("Console write failed: {err}")))?;
        Ok(OutputItem::text(RENDER_CONFIRMATION))
    }
}
