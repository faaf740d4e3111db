//! Search provider abstraction
//!
//! A unified interface over web search backends:
//! - SearXNG (self-hosted metasearch, JSON API)
//! - Tavily (hosted search API)
//!
//! Adapters map backend rows into `SearchResult` and normalize every
//! failure into a `ProviderError` so the retry policy can classify it.
//! Results pass through `validate_results` before the pipeline sees
//! them.

use crate::model::SearchResult;
use crate::policy::ProviderError;
use lazy_static::lazy_static;
use regex::Regex;
use reqwest::Client;
use std::collections::HashSet;
use std::time::Duration;
use tracing::debug;

pub mod searxng;
pub mod tavily;

pub use searxng::SearxngProvider;
pub use tavily::TavilyProvider;

/// Candidates kept per run across all providers
pub const MAX_CANDIDATES: usize = 20;

/// Search provider trait - all search backends implement this
#[async_trait::async_trait]
pub trait SearchProvider: Send + Sync {
    /// Tag attached to every result from this backend
    fn source_tag(&self) -> &str;

    /// Run one query. Backends must report reachability problems as
    /// errors, never as a silent empty list.
    async fn search(&self, query: &str) -> std::result::Result<Vec<SearchResult>, ProviderError>;

    /// Fetch a result page as plain text, for snippet expansion.
    /// Backends without a fetcher return `Ok(None)`.
    async fn fetch_page(&self, url: &str) -> std::result::Result<Option<String>, ProviderError> {
        let _ = url;
        Ok(None)
    }
}

lazy_static! {
    static ref URL_RE: Regex = Regex::new(r"^https?://[^\s/$.?#][^\s]*$").unwrap();
}

/// Syntactically valid absolute URL
pub fn is_valid_url(url: &str) -> bool {
    URL_RE.is_match(url)
}

/// Apply the provider-boundary invariants: drop rows with empty titles
/// or invalid URLs, dedupe by URL, cap the candidate list.
pub fn validate_results(results: Vec<SearchResult>) -> Vec<SearchResult> {
    let mut seen: HashSet<String> = HashSet::new();
    let before = results.len();
    let validated: Vec<SearchResult> = results
        .into_iter()
        .filter(|r| !r.title.trim().is_empty())
        .filter(|r| is_valid_url(&r.url))
        .filter(|r| seen.insert(r.url.clone()))
        .take(MAX_CANDIDATES)
        .collect();
    if validated.len() < before {
        debug!("validation dropped {} of {} results", before - validated.len(), before);
    }
    validated
}

/// Shared HTTP client builder for search backends and page fetches
pub fn http_client(timeout_ms: u64) -> Client {
    Client::builder()
        .user_agent(concat!("deepsearch/", env!("CARGO_PKG_VERSION")))
        .timeout(Duration::from_millis(timeout_ms))
        .redirect(reqwest::redirect::Policy::limited(10))
        .build()
        .unwrap_or_else(|_| Client::new())
}

/// Fetch a page and reduce it to plain text
pub async fn fetch_page_text(
    client: &Client,
    url: &str,
) -> std::result::Result<String, ProviderError> {
    let response = client
        .get(url)
        .send()
        .await
        .map_err(ProviderError::from_transport)?;
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(ProviderError::from_status(status, &body));
    }
    let html = response.text().await.map_err(ProviderError::from_transport)?;
    Ok(html_to_text(&html))
}

lazy_static! {
    static ref SCRIPT_RE: Regex =
        Regex::new(r"(?is)<(script|style)[^>]*>.*?</(script|style)>").unwrap();
    static ref TAG_RE: Regex = Regex::new(r"<[^>]+>").unwrap();
}

/// Strip markup from an HTML document, keeping readable text
pub fn html_to_text(html: &str) -> String {
    let without_scripts = SCRIPT_RE.replace_all(html, " ");
    let without_tags = TAG_RE.replace_all(&without_scripts, " ");
    let decoded = without_tags
        .replace("&nbsp;", " ")
        .replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'");
    decoded.split_whitespace().collect::<Vec<_>>().join(" ")
}
