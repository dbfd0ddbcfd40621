// crates/mcs-tools/src/config.rs
// ============================================================================
// Module: Native Tool Configuration
// Description: Enablement and per-tool settings for built-in tools.
// Purpose: Deserialize the `[tools]` table and validate it fail-closed.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! The `[tools]` table selects which built-in tools are registered and carries
//! each tool's settings. Unknown tool names fail validation.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;

use crate::ToolBuildError;
use crate::file_reader::FileReaderConfig;
use crate::image_fetcher::ImageFetcherConfig;
use crate::render_html::RenderHtmlConfig;
use crate::web_search::WebSearchConfig;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Registry name of the file reader tool.
pub const FILE_READER: &str = "file_reader";
/// Registry name of the web search tool.
pub const WEB_SEARCH: &str = "web_search";
/// Registry name of the image fetcher tool.
pub const IMAGE_FETCHER: &str = "image_fetcher";
/// Registry name of the HTML render tool.
pub const RENDER_HTML: &str = "render_html";

/// Every built-in tool name.
pub const BUILTIN_TOOL_NAMES: [&str; 4] = [FILE_READER, WEB_SEARCH, IMAGE_FETCHER, RENDER_HTML];

// ============================================================================
// SECTION: Types
// ============================================================================

/// Native tool configuration (`[tools]`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct NativeToolsConfig {
    /// Allow-list of built-in tools; `None` enables all of them.
    #[serde(default)]
    pub enabled: Option<Vec<String>>,
    /// File reader settings.
    #[serde(default)]
    pub file_reader: FileReaderConfig,
    /// Web search settings.
    #[serde(default)]
    pub web_search: WebSearchConfig,
    /// Image fetcher settings.
    #[serde(default)]
    pub image_fetcher: ImageFetcherConfig,
    /// HTML render settings.
    #[serde(default)]
    pub render_html: RenderHtmlConfig,
}

impl NativeToolsConfig {
    /// Returns true when the named built-in tool should be registered.
    #[must_use]
    pub fn is_enabled(&self, name: &str) -> bool {
        self.enabled.as_ref().is_none_or(|names| names.iter().any(|entry| entry == name))
    }

    /// Validates tool settings.
    ///
    /// # Errors
    ///
    /// Returns [`ToolBuildError::Config`] for unknown tool names or zero limits.
    pub fn validate(&self) -> Result<(), ToolBuildError> {
        if let Some(names) = &self.enabled {
            for name in names {
                if !BUILTIN_TOOL_NAMES.contains(&name.as_str()) {
                    return Err(ToolBuildError::Config(format!(
                        "tools.enabled contains unknown tool: {name}"
                    )));
                }
            }
        }
        self.file_reader.validate()?;
        self.web_search.validate()?;
        self.image_fetcher.validate()?;
        self.render_html.validate()?;
        Ok(())
    }
}

/// Rejects zero-valued limits.
pub(crate) fn require_nonzero(field: &str, value: u64) -> Result<(), ToolBuildError> {
    if value == 0 {
        return Err(ToolBuildError::Config(format!("{field} must be greater than zero")));
    }
    Ok(())
}
