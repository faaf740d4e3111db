//! OpenAI-compatible chat-completions adapter
//!
//! Works against any service speaking the `/v1/chat/completions`
//! protocol (vLLM, OpenRouter, OpenAI itself). Quota is read from the
//! conventional `x-ratelimit-*` response headers when the backend
//! sends them.

use crate::config::LlmProviderConfig;
use crate::llm::{ChatMessage, LlmProvider, QuotaStatus};
use crate::policy::ProviderError;
use async_trait::async_trait;
use reqwest::header::HeaderMap;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

#[derive(Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

/// Adapter for an OpenAI-compatible completions service
pub struct OpenAiProvider {
    client: Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
}

impl OpenAiProvider {
    pub fn new(config: &LlmProviderConfig) -> Self {
        let client = Client::builder()
            .user_agent(concat!("deepsearch/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .unwrap_or_else(|_| Client::new());
        Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            api_key: config.api_key.clone(),
        }
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => request.bearer_auth(key),
            None => request,
        }
    }
}

/// Pull the first choice's content out of a completions body
fn parse_completion(body: &str) -> std::result::Result<String, ProviderError> {
    let response: ChatResponse = serde_json::from_str(body)
        .map_err(|e| ProviderError::new(format!("invalid completions response: {e}")))?;
    response
        .choices
        .into_iter()
        .next()
        .map(|choice| choice.message.content)
        .ok_or_else(|| ProviderError::new("no choices in completions response"))
}

/// Read quota from conventional rate-limit headers
fn quota_from_headers(headers: &HeaderMap) -> QuotaStatus {
    let read = |name: &str| -> Option<u64> {
        headers
            .get(name)?
            .to_str()
            .ok()?
            .trim()
            .parse::<u64>()
            .ok()
    };
    match (
        read("x-ratelimit-remaining-requests"),
        read("x-ratelimit-limit-requests"),
    ) {
        (Some(remaining), Some(limit)) => QuotaStatus::Known { remaining, limit },
        (Some(remaining), None) => QuotaStatus::Known {
            remaining,
            limit: remaining,
        },
        _ => QuotaStatus::Unknown,
    }
}

#[async_trait]
impl LlmProvider for OpenAiProvider {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate(
        &self,
        messages: Vec<ChatMessage>,
    ) -> std::result::Result<String, ProviderError> {
        let request = ChatRequest {
            model: self.model.clone(),
            messages,
            temperature: 0.7,
            max_tokens: 1024,
        };
        let url = format!("{}/v1/chat/completions", self.base_url);
        debug!("completions call to {} as {}", self.base_url, self.model);

        let response = self
            .authorize(self.client.post(&url).json(&request))
            .send()
            .await
            .map_err(ProviderError::from_transport)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::from_status(status, &body));
        }

        let body = response.text().await.map_err(ProviderError::from_transport)?;
        parse_completion(&body)
    }

    async fn probe_quota(&self) -> QuotaStatus {
        let url = format!("{}/v1/models", self.base_url);
        let response = match self.authorize(self.client.get(&url)).send().await {
            Ok(response) => response,
            Err(e) => {
                debug!("quota probe failed: {e}");
                return QuotaStatus::Unknown;
            }
        };
        if response.status() == reqwest::StatusCode::TOO_MANY_REQUESTS
            || response.status() == reqwest::StatusCode::PAYMENT_REQUIRED
        {
            let limit = match quota_from_headers(response.headers()) {
                QuotaStatus::Known { limit, .. } => limit,
                QuotaStatus::Unknown => 0,
            };
            return QuotaStatus::Known {
                remaining: 0,
                limit,
            };
        }
        quota_from_headers(response.headers())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    #[test]
    fn test_parse_completion() {
        let body = r#"{
            "id": "cmpl-1",
            "choices": [
                {"index": 0, "message": {"role": "assistant", "content": "The answer."}}
            ],
            "usage": {"prompt_tokens": 10, "completion_tokens": 3}
        }"#;
        assert_eq!(parse_completion(body).unwrap(), "The answer.");
    }

    #[test]
    fn test_parse_completion_no_choices() {
        let err = parse_completion(r#"{"choices": []}"#).unwrap_err();
        assert!(err.message.contains("no choices"));
    }

    #[test]
    fn test_parse_completion_bad_json() {
        assert!(parse_completion("not json").is_err());
    }

    #[test]
    fn test_quota_from_headers() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-ratelimit-remaining-requests",
            HeaderValue::from_static("42"),
        );
        headers.insert(
            "x-ratelimit-limit-requests",
            HeaderValue::from_static("100"),
        );
        assert_eq!(
            quota_from_headers(&headers),
            QuotaStatus::Known {
                remaining: 42,
                limit: 100
            }
        );
    }

    #[test]
    fn test_quota_missing_headers_is_unknown() {
        assert_eq!(quota_from_headers(&HeaderMap::new()), QuotaStatus::Unknown);
    }
}
