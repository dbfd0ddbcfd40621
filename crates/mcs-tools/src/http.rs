// crates/mcs-tools/src/http.rs
// ============================================================================
// Module: Tool HTTP Helpers
// Description: Shared blocking HTTP client setup and bounded body reads.
// Purpose: Keep outbound fetches time-bounded and size-bounded.
// Dependencies: reqwest, url
// ============================================================================

//! ## Overview
//! Builds the blocking client shared by the network tools and reads response
//! bodies under a byte cap.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::io::Read;
use std::time::Duration;

use mcs_core::ToolFault;
use reqwest::blocking::Client;
use reqwest::blocking::Response;
use reqwest::redirect::Policy;
use url::Url;

use crate::ToolBuildError;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// User agent sent on outbound tool requests.
pub(crate) const USER_AGENT: &str = "mcs-gateway/0.1";
/// Maximum redirects followed by tool fetches.
const MAX_REDIRECTS: usize = 5;

// ============================================================================
// SECTION: Client
// ============================================================================

/// Builds a blocking client with a whole-request timeout.
pub(crate) fn build_client(timeout_ms: u64) -> Result<Client, ToolBuildError> {
    Client::builder()
        .timeout(Duration::from_millis(timeout_ms))
        .user_agent(USER_AGENT)
        .redirect(Policy::limited(MAX_REDIRECTS))
        .build()
        .map_err(|err| ToolBuildError::Client(err.to_string()))
}

/// Parses a caller-supplied URL and enforces the scheme policy.
pub(crate) fn parse_target(raw: &str, allow_http: bool) -> Result<Url, ToolFault> {
    let url = Url::parse(raw.trim())
        .map_err(|err| ToolFault::invalid_argument(format!("Invalid URL '{raw}': {err}")))?;
    match url.scheme() {
        "https" => {}
        "http" if allow_http => {}
        "http" => return Err(ToolFault::invalid_argument("Plain http URLs are not allowed.")),
        other => {
            return Err(ToolFault::invalid_argument(format!("Unsupported URL scheme: {other}")));
        }
    }
    if !url.username().is_empty() || url.password().is_some() {
        return Err(ToolFault::invalid_argument("URLs with embedded credentials are not allowed."));
    }
    Ok(url)
}

// ============================================================================
// SECTION: Bodies
// ============================================================================

/// Reads the response body while enforcing a byte limit.
pub(crate) fn read_response_limited(
    response: &mut Response,
    max_bytes: usize,
) -> Result<Vec<u8>, ToolFault> {
    let max_bytes_u64 = u64::try_from(max_bytes).unwrap_or(u64::MAX);
    if let Some(expected) = response.content_length()
        && expected > max_bytes_u64
    {
        return Err(ToolFault::runtime(format!("Response exceeds {max_bytes} bytes.")));
    }
    let mut buf = Vec::new();
    response
        .take(max_bytes_u64.saturating_add(1))
        .read_to_end(&mut buf)
        .map_err(|err| ToolFault::runtime(format!("Failed to read response: {err}")))?;
    if buf.len() > max_bytes {
        return Err(ToolFault::runtime(format!("Response exceeds {max_bytes} bytes.")));
    }
    Ok(buf)
}
