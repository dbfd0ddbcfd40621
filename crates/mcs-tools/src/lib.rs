// crates/mcs-tools/src/lib.rs
// ============================================================================
// Module: MCS Native Tools
// Description: Built-in tools served in-process by the MCS gateway.
// Purpose: Provide file, web search, image fetch, and HTML render tools.
// Dependencies: mcs-core, reqwest, serde, url, infer
// ============================================================================

//! ## Overview
//! Each tool is a value object with its own configuration that converts into
//! a [`mcs_core::NativeToolSource`]. [`builtin_tool_sources`] builds every
//! tool enabled by [`NativeToolsConfig`]. Tool bodies run on gateway worker
//! threads and use blocking I/O.
//!
//! Security posture: tool arguments are untrusted caller input.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod config;
pub mod file_reader;
mod http;
pub mod image_fetcher;
pub mod render_html;
pub mod web_search;

// ============================================================================
// SECTION: Imports
// ============================================================================

use mcs_core::NativeToolSource;
use thiserror::Error;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use config::FILE_READER;
pub use config::IMAGE_FETCHER;
pub use config::NativeToolsConfig;
pub use config::RENDER_HTML;
pub use config::WEB_SEARCH;
pub use file_reader::FileReader;
pub use file_reader::FileReaderConfig;
pub use image_fetcher::ImageFetcher;
pub use image_fetcher::ImageFetcherConfig;
pub use render_html::HtmlRenderer;
pub use render_html::RenderHtmlConfig;
pub use web_search::WebSearch;
pub use web_search::WebSearchConfig;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors raised while constructing native tools.
#[derive(Debug, Error)]
pub enum ToolBuildError {
    /// Tool configuration is invalid.
    #[error("tool config error: {0}")]
    Config(String),
    /// Outbound HTTP client could not be built.
    #[error("tool http client error: {0}")]
    Client(String),
}

// ============================================================================
// SECTION: Construction
// ============================================================================

/// Builds every native tool enabled by `config`, in a stable order.
///
/// # Errors
///
/// Returns [`ToolBuildError`] when configuration is invalid or an HTTP client
/// cannot be constructed.
pub fn builtin_tool_sources(
    config: &NativeToolsConfig,
) -> Result<Vec<NativeToolSource>, ToolBuildError> {
    config.validate()?;
    let mut sources = Vec::new();
    if config.is_enabled(FILE_READER) {
        sources.push(FileReader::new(config.file_reader.clone()).into_source());
    }
    if config.is_enabled(WEB_SEARCH) {
        sources.push(WebSearch::new(config.web_search.clone())?.into_source());
    }
    if config.is_enabled(IMAGE_FETCHER) {
        sources.push(ImageFetcher::new(config.image_fetcher.clone())?.into_source());
    }
    if config.is_enabled(RENDER_HTML) {
        sources.push(HtmlRenderer::to_stderr(config.render_html.clone()).into_source());
    }
    Ok(sources)
}
