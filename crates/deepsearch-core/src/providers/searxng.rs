//! SearXNG metasearch adapter
//!
//! Talks to a self-hosted SearXNG instance over its JSON API:
//! `GET {base}/search?q=...&format=json`.

use crate::config::SearchProviderConfig;
use crate::model::SearchResult;
use crate::policy::ProviderError;
use crate::providers::{fetch_page_text, http_client, SearchProvider};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

/// One result row from the SearXNG JSON API
#[derive(Debug, Deserialize)]
struct SearxngRow {
    #[serde(default)]
    title: String,
    #[serde(default)]
    url: String,
    #[serde(default)]
    content: String,
    #[serde(default)]
    score: Option<f32>,
}

#[derive(Debug, Deserialize)]
struct SearxngResponse {
    #[serde(default)]
    results: Vec<SearxngRow>,
}

/// Adapter for a SearXNG instance
pub struct SearxngProvider {
    client: Client,
    base_url: String,
    max_results: usize,
}

impl SearxngProvider {
    pub fn new(config: &SearchProviderConfig) -> Self {
        Self {
            client: http_client(config.timeout_ms),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            max_results: config.max_results,
        }
    }

    fn map_rows(&self, rows: Vec<SearxngRow>) -> Vec<SearchResult> {
        rows.into_iter()
            .take(self.max_results)
            .map(|row| SearchResult {
                title: row.title,
                url: row.url,
                snippet: row.content,
                source_tag: self.source_tag().to_string(),
                raw_score: row.score,
            })
            .collect()
    }
}

#[async_trait]
impl SearchProvider for SearxngProvider {
    fn source_tag(&self) -> &str {
        "searxng"
    }

    async fn search(&self, query: &str) -> std::result::Result<Vec<SearchResult>, ProviderError> {
        let url = format!("{}/search", self.base_url);
        debug!("searxng query: {query}");
        let response = self
            .client
            .get(&url)
            .query(&[("q", query), ("format", "json")])
            .send()
            .await
            .map_err(ProviderError::from_transport)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::from_status(status, &body));
        }

        let parsed: SearxngResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::new(format!("invalid searxng response: {e}")))?;
        Ok(self.map_rows(parsed.results))
    }

    async fn fetch_page(&self, url: &str) -> std::result::Result<Option<String>, ProviderError> {
        fetch_page_text(&self.client, url).await.map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider() -> SearxngProvider {
        SearxngProvider::new(&SearchProviderConfig {
            id: "searxng".to_string(),
            kind: "searxng".to_string(),
            base_url: "http://localhost:8888/".to_string(),
            api_key: None,
            daily_quota: None,
            timeout_ms: 8000,
            max_results: 2,
        })
    }

    #[test]
    fn test_response_parsing_and_mapping() {
        let body = r#"{
            "query": "rust",
            "results": [
                {"title": "Rust language", "url": "https://rust-lang.org", "content": "systems language", "score": 2.5},
                {"title": "Rust book", "url": "https://doc.rust-lang.org/book", "content": "learn rust"},
                {"title": "Extra", "url": "https://example.com", "content": "dropped by cap"}
            ],
            "suggestions": []
        }"#;
        let parsed: SearxngResponse = serde_json::from_str(body).unwrap();
        let mapped = provider().map_rows(parsed.results);
        assert_eq!(mapped.len(), 2);
        assert_eq!(mapped[0].title, "Rust language");
        assert_eq!(mapped[0].snippet, "systems language");
        assert_eq!(mapped[0].source_tag, "searxng");
        assert_eq!(mapped[0].raw_score, Some(2.5));
        assert_eq!(mapped[1].raw_score, None);
    }

    #[test]
    fn test_empty_response_parses() {
        let parsed: SearxngResponse = serde_json::from_str("{}").unwrap();
        assert!(parsed.results.is_empty());
    }

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let p = provider();
        assert_eq!(p.base_url, "http://localhost:8888");
    }
}
