// crates/mcs-tools/src/web_search.rs
// ============================================================================
// Module: Web Search Tool
// Description: DuckDuckGo instant-answer search.
// Purpose: Stream a search announcement followed by textual results.
// Dependencies: mcs-core, reqwest, serde, url
// ============================================================================

//! ## Overview
//! `web_search {query}` first yields an announcement, then performs the HTTP
//! lookup when the next item is pulled. Results are the instant answer (when
//! present) followed by related topics, or a single "no results" line.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::VecDeque;
use std::sync::Arc;

use mcs_core::NativeToolSource;
use mcs_core::OutputItem;
use mcs_core::OutputStream;
use mcs_core::ToolArguments;
use mcs_core::ToolFault;
use mcs_core::ToolOutput;
use mcs_core::tool::failed;
use reqwest::blocking::Client;
use serde::Deserialize;
use url::Url;

use crate::ToolBuildError;
use crate::config::WEB_SEARCH;
use crate::config::require_nonzero;
use crate::http::build_client;
use crate::http::read_response_limited;

// ============================================================================
// SECTION: Configuration
// ============================================================================

/// Web search settings (`[tools.web_search]`).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct WebSearchConfig {
    /// Instant-answer API endpoint.
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    /// Request timeout in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Maximum response size in bytes.
    #[serde(default = "default_max_response_bytes")]
    pub max_response_bytes: usize,
    /// Maximum related topics yielded per search.
    #[serde(default = "default_max_results")]
    pub max_results: usize,
}

impl Default for WebSearchConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            timeout_ms: default_timeout_ms(),
            max_response_bytes: default_max_response_bytes(),
            max_results: default_max_results(),
        }
    }
}

impl WebSearchConfig {
    /// Validates endpoint and limits.
    pub(crate) fn validate(&self) -> Result<(), ToolBuildError> {
        let endpoint = Url::parse(&self.endpoint).map_err(|err| {
            ToolBuildError::Config(format!("tools.web_search.endpoint is invalid: {err}"))
        })?;
        if !matches!(endpoint.scheme(), "http" | "https") {
            return Err(ToolBuildError::Config(
                "tools.web_search.endpoint must use http or https".to_string(),
            ));
        }
        require_nonzero("tools.web_search.timeout_ms", self.timeout_ms)?;
        require_nonzero(
            "tools.web_search.max_response_bytes",
            u64::try_from(self.max_response_bytes).unwrap_or(u64::MAX),
        )
    }
}

/// Default DuckDuckGo instant-answer endpoint.
fn default_endpoint() -> String {
    "https://api.duckduckgo.com/".to_string()
}

/// Default request timeout.
const fn default_timeout_ms() -> u64 {
    10_000
}

/// Default response cap (1 MiB).
const fn default_max_response_bytes() -> usize {
    1024 * 1024
}

/// Default related-topic cap.
const fn default_max_results() -> usize {
    10
}

// ============================================================================
// SECTION: Tool
// ============================================================================

/// Instant-answer web search.
#[derive(Debug, Clone)]
pub struct WebSearch {
    /// Tool settings.
    config: WebSearchConfig,
    /// Outbound HTTP client.
    client: Client,
}

impl WebSearch {
    /// Builds the tool and its HTTP client.
    ///
    /// # Errors
    ///
    /// Returns [`ToolBuildError`] when the HTTP client cannot be built.
    pub fn new(config: WebSearchConfig) -> Result<Self, ToolBuildError> {
        let client = build_client(config.timeout_ms)?;
        Ok(Self {
            config,
            client,
        })
    }

    /// Starts a search for the `query` argument.
    #[must_use]
    pub fn run(self: &Arc<Self>, arguments: &ToolArguments) -> OutputStream {
        let query = match arguments.required_str("query") {
            Ok(query) => query.to_string(),
            Err(fault) => return failed(fault),
        };
        Box::new(SearchStream {
            tool: Arc::clone(self),
            query,
            phase: SearchPhase::Announce,
        })
    }

    /// Wraps the tool as a registry source.
    #[must_use]
    pub fn into_source(self) -> NativeToolSource {
        let tool = Arc::new(self);
        NativeToolSource::new(
            WEB_SEARCH,
            "Searches the web and streams back instant answers and related links.",
            move |arguments| tool.run(&arguments),
        )
    }

    /// Performs the lookup and renders result lines.
    fn search(&self, query: &str) -> Result<VecDeque<OutputItem>, ToolFault> {
        let url = Url::parse_with_params(&self.config.endpoint, &[
            ("q", query),
            ("format", "json"),
            ("no_html", "1"),
            ("skip_disambig", "1"),
        ])
        .map_err(|err| ToolFault::runtime(format!("Search endpoint invalid: {err}")))?;
        let mut response = self
            .client
            .get(url)
            .send()
            .map_err(|err| ToolFault::runtime(format!("Search request failed: {err}")))?;
        if !response.status().is_success() {
            return Err(ToolFault::runtime(format!(
                "Search request failed with status {}.",
                response.status().as_u16()
            )));
        }
        let body = read_response_limited(&mut response, self.config.max_response_bytes)?;
        let answer: InstantAnswer = serde_json::from_slice(&body)
            .map_err(|err| ToolFault::runtime(format!("Search response unreadable: {err}")))?;
        Ok(render_answer(&answer, self.config.max_results))
    }
}

// ============================================================================
// SECTION: Response Model
// ============================================================================

/// Subset of the instant-answer payload.
#[derive(Debug, Default, Deserialize)]
struct InstantAnswer {
    /// Summary text.
    #[serde(rename = "AbstractText", default)]
    abstract_text: String,
    /// Related topics, possibly grouped.
    #[serde(rename = "RelatedTopics", default)]
    related_topics: Vec<RelatedTopic>,
}

/// Related topic or topic group.
#[derive(Debug, Default, Deserialize)]
struct RelatedTopic {
    /// Topic text.
    #[serde(rename = "Text", default)]
    text: Option<String>,
    /// Topic link.
    #[serde(rename = "FirstURL", default)]
    first_url: Option<String>,
    /// Nested topics for grouped entries.
    #[serde(rename = "Topics", default)]
    topics: Vec<Self>,
}

/// Renders the answer into output lines.
fn render_answer(answer: &InstantAnswer, max_results: usize) -> VecDeque<OutputItem> {
    let mut lines = VecDeque::new();
    if !answer.abstract_text.trim().is_empty() {
        lines.push_back(OutputItem::text(format!("Instant Answer: {}", answer.abstract_text)));
    }
    let mut topics = Vec::new();
    flatten_topics(&answer.related_topics, &mut topics);
    if !topics.is_empty() && max_results > 0 {
        lines.push_back(OutputItem::text("Related Topics:"));
    }
    for topic in topics.into_iter().take(max_results) {
        lines.push_back(OutputItem::text(topic));
    }
    if lines.is_empty() {
        lines.push_back(OutputItem::text("No direct results found."));
    }
    lines
}

/// Collects `- text: url` lines depth-first.
fn flatten_topics(topics: &[RelatedTopic], out: &mut Vec<String>) {
    for topic in topics {
        if let (Some(text), Some(url)) = (&topic.text, &topic.first_url) {
            out.push(format!("- {text}: {url}"));
        }
        flatten_topics(&topic.topics, out);
    }
}

// ============================================================================
// SECTION: Stream
// ============================================================================

/// Lazy search output.
struct SearchStream {
    /// Shared tool.
    tool: Arc<WebSearch>,
    /// Caller query.
    query: String,
    /// Current phase.
    phase: SearchPhase,
}

/// Search stream phases.
enum SearchPhase {
    /// Announcement not yet yielded.
    Announce,
    /// Lookup not yet performed.
    Lookup,
    /// Yielding buffered results.
    Results(VecDeque<OutputItem>),
    /// Finished.
    Done,
}

impl Iterator for SearchStream {
    type Item = ToolOutput;

    fn next(&mut self) -> Option<Self::Item> {
        match std::mem::replace(&mut self.phase, SearchPhase::Done) {
            SearchPhase::Announce => {
                self.phase = SearchPhase::Lookup;
                Some(Ok(OutputItem::text(format!("Searching the web for: '{}'...", self.query))))
            }
            SearchPhase::Lookup => match self.tool.search(&self.query) {
                Ok(mut results) => {
                    let first = results.pop_front();
                    self.phase = SearchPhase::Results(results);
                    first.map(Ok)
                }
                Err(fault) => Some(Err(fault)),
            },
            SearchPhase::Results(mut results) => {
                let next = results.pop_front();
                self.phase = SearchPhase::Results(results);
                next.map(Ok)
            }
            SearchPhase::Done => None,
        }
    }
}
