//! Tavily search adapter
//!
//! Hosted search API: `POST {base}/search` with bearer auth.

use crate::config::SearchProviderConfig;
use crate::model::SearchResult;
use crate::policy::ProviderError;
use crate::providers::{fetch_page_text, http_client, SearchProvider};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Debug, Serialize)]
struct TavilySearchRequest {
    query: String,
    max_results: usize,
    search_depth: String,
}

/// One result row from the Tavily API
#[derive(Debug, Deserialize)]
struct TavilyRow {
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
struct TavilySearchResponse {
    #[serde(default)]
    results: Vec<TavilyRow>,
}

/// Adapter for the Tavily search API
pub struct TavilyProvider {
    client: Client,
    base_url: String,
    api_key: String,
    max_results: usize,
}

impl TavilyProvider {
    pub fn new(config: &SearchProviderConfig) -> Self {
        Self {
            client: http_client(config.timeout_ms),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone().unwrap_or_default(),
            max_results: config.max_results,
        }
    }

    fn map_rows(&self, rows: Vec<TavilyRow>) -> Vec<SearchResult> {
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
impl SearchProvider for TavilyProvider {
    fn source_tag(&self) -> &str {
        "tavily"
    }

    async fn search(&self, query: &str) -> std::result::Result<Vec<SearchResult>, ProviderError> {
        let url = format!("{}/search", self.base_url);
        let request = TavilySearchRequest {
            query: query.to_string(),
            max_results: self.max_results,
            search_depth: "basic".to_string(),
        };
        debug!("tavily query: {query}");
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(ProviderError::from_transport)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::from_status(status, &body));
        }

        let parsed: TavilySearchResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::new(format!("invalid tavily response: {e}")))?;
        Ok(self.map_rows(parsed.results))
    }

    async fn fetch_page(&self, url: &str) -> std::result::Result<Option<String>, ProviderError> {
        fetch_page_text(&self.client, url).await.map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider() -> TavilyProvider {
        TavilyProvider::new(&SearchProviderConfig {
            id: "tavily".to_string(),
            kind: "tavily".to_string(),
            base_url: "https://api.tavily.com".to_string(),
            api_key: Some("tvly-test".to_string()),
            daily_quota: Some(1000),
            timeout_ms: 8000,
            max_results: 5,
        })
    }

    #[test]
    fn test_request_shape() {
        let request = TavilySearchRequest {
            query: "rust async".to_string(),
            max_results: 5,
            search_depth: "basic".to_string(),
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["query"], "rust async");
        assert_eq!(json["max_results"], 5);
        assert_eq!(json["search_depth"], "basic");
    }

    #[test]
    fn test_response_parsing_and_mapping() {
        let body = r#"{
            "query": "rust async",
            "results": [
                {"title": "Tokio", "url": "https://tokio.rs", "content": "async runtime", "score": 0.98},
                {"title": "Async book", "url": "https://rust-lang.github.io/async-book", "content": "guide", "score": 0.91}
            ],
            "response_time": 0.6
        }"#;
        let parsed: TavilySearchResponse = serde_json::from_str(body).unwrap();
        let mapped = provider().map_rows(parsed.results);
        assert_eq!(mapped.len(), 2);
        assert_eq!(mapped[0].title, "Tokio");
        assert_eq!(mapped[0].source_tag, "tavily");
        assert_eq!(mapped[0].raw_score, Some(0.98));
    }
}
