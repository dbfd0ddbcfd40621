// crates/mcs-tools/src/image_fetcher.rs
// ============================================================================
// Module: Image Fetcher Tool
// Description: Downloads an image and yields it as one binary item.
// Purpose: Bring remote binary content into a tool call.
// Dependencies: mcs-core, reqwest, infer
// ============================================================================

//! ## Overview
//! `image_fetcher {url}` downloads the target when pulled and yields one
//! binary item. The MIME type comes from the `Content-Type` header, falling
//! back to magic-byte sniffing and then `application/octet-stream`.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use mcs_core::NativeToolSource;
use mcs_core::OutputItem;
use mcs_core::OutputStream;
use mcs_core::ToolArguments;
use mcs_core::ToolFault;
use mcs_core::tool::failed;
use reqwest::blocking::Client;
use reqwest::header::CONTENT_TYPE;
use serde::Deserialize;

use crate::ToolBuildError;
use crate::config::IMAGE_FETCHER;
use crate::config::require_nonzero;
use crate::http::build_client;
use crate::http::parse_target;
use crate::http::read_response_limited;

// ============================================================================
// SECTION: Configuration
// ============================================================================

/// Fallback MIME type when none can be determined.
const OCTET_STREAM: &str = "application/octet-stream";

/// Image fetcher settings (`[tools.image_fetcher]`).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ImageFetcherConfig {
    /// Request timeout in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Maximum download size in bytes.
    #[serde(default = "default_max_bytes")]
    pub max_bytes: usize,
    /// Allow cleartext `http://` targets.
    #[serde(default)]
    pub allow_http: bool,
}

impl Default for ImageFetcherConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_timeout_ms(),
            max_bytes: default_max_bytes(),
            allow_http: false,
        }
    }
}

impl ImageFetcherConfig {
    /// Validates limits.
    pub(crate) fn validate(&self) -> Result<(), ToolBuildError> {
        require_nonzero("tools.image_fetcher.timeout_ms", self.timeout_ms)?;
        require_nonzero(
            "tools.image_fetcher.max_bytes",
            u64::try_from(self.max_bytes).unwrap_or(u64::MAX),
        )
    }
}

/// Default request timeout.
const fn default_timeout_ms() -> u64 {
    10_000
}

/// Default download cap (10 MiB).
const fn default_max_bytes() -> usize {
    10 * 1024 * 1024
}

// ============================================================================
// SECTION: Tool
// ============================================================================

/// Downloads images by URL.
#[derive(Debug, Clone)]
pub struct ImageFetcher {
    /// Tool settings.
    config: ImageFetcherConfig,
    /// Outbound HTTP client.
    client: Client,
}

impl ImageFetcher {
    /// Builds the tool and its HTTP client.
    ///
    /// # Errors
    ///
    /// Returns [`ToolBuildError`] when the HTTP client cannot be built.
    pub fn new(config: ImageFetcherConfig) -> Result<Self, ToolBuildError> {
        let client = build_client(config.timeout_ms)?;
        Ok(Self {
            config,
            client,
        })
    }

    /// Starts a download of the `url` argument.
    #[must_use]
    pub fn run(self: &Arc<Self>, arguments: &ToolArguments) -> OutputStream {
        let target = match arguments.required_str("url") {
            Ok(url) => url.to_string(),
            Err(fault) => return failed(fault),
        };
        let tool = Arc::clone(self);
        let mut pending = Some(target);
        Box::new(std::iter::from_fn(move || pending.take().map(|target| tool.fetch(&target))))
    }

    /// Wraps the tool as a registry source.
    #[must_use]
    pub fn into_source(self) -> NativeToolSource {
        let tool = Arc::new(self);
        NativeToolSource::new(
            IMAGE_FETCHER,
            "Downloads an image from a URL and returns it as binary content.",
            move |arguments| tool.run(&arguments),
        )
    }

    /// Downloads `target` into one binary item.
    fn fetch(&self, target: &str) -> Result<OutputItem, ToolFault> {
        let url = parse_target(target, self.config.allow_http)?;
        let mut response = self
            .client
            .get(url)
            .send()
            .map_err(|err| ToolFault::runtime(format!("Image request failed: {err}")))?;
        if !response.status().is_success() {
            return Err(ToolFault::runtime(format!(
                "Image request failed with status {}.",
                response.status().as_u16()
            )));
        }
        let declared = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.split(';').next())
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(str::to_string);
        let data = read_response_limited(&mut response, self.config.max_bytes)?;
        let mime_type = declared
            .or_else(|| infer::get(&data).map(|kind| kind.mime_type().to_string()))
            .unwrap_or_else(|| OCTET_STREAM.to_string());
        Ok(OutputItem::binary(data, mime_type))
    }
}
