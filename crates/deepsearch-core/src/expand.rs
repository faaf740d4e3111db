//! Snippet expansion
//!
//! Results arriving with missing or very short snippets get one
//! expansion attempt: first a page fetch through the originating
//! provider, then an LLM summary when fetching is unavailable or too
//! thin. The LLM leg is skipped entirely once quota is known to be
//! exhausted; callers signal that by passing no LLM.

use crate::config::ExpandConfig;
use crate::llm::{ChatMessage, LlmProvider};
use crate::model::SearchResult;
use crate::providers::SearchProvider;
use crate::rank::chunker::floor_char_boundary;
use std::time::Duration;
use tracing::debug;

/// Upper bound for a derived snippet
const SNIPPET_MAX_CHARS: usize = 480;

/// Page text handed to the LLM for summarization
const SUMMARY_INPUT_CHARS: usize = 2000;

/// Cut text down to a snippet, breaking at a word boundary
pub fn derive_snippet(text: &str, max_chars: usize) -> String {
    let text = text.trim();
    if text.len() <= max_chars {
        return text.to_string();
    }
    let cut = floor_char_boundary(text, max_chars);
    let cut = text[..cut].rfind(' ').unwrap_or(cut);
    text[..cut].trim_end().to_string()
}

/// One-shot snippet expander for a run
pub struct SnippetExpander {
    config: ExpandConfig,
}

impl SnippetExpander {
    pub fn new(config: ExpandConfig) -> Self {
        Self { config }
    }

    /// True when a snippet is too short to rank or synthesize from
    pub fn is_weak(&self, snippet: &str) -> bool {
        snippet.trim().len() < self.config.weak_snippet_chars
    }

    /// Expand every weak snippet in place. Returns trace notes, one per
    /// attempted result.
    pub async fn expand(
        &self,
        provider: &dyn SearchProvider,
        llm: Option<&dyn LlmProvider>,
        results: &mut [SearchResult],
    ) -> Vec<String> {
        let mut notes = Vec::new();
        for result in results.iter_mut() {
            if !self.is_weak(&result.snippet) {
                continue;
            }
            match self.expand_one(provider, llm, result).await {
                Ok(via) => {
                    notes.push(format!("expanded snippet for {} via {via}", result.url));
                }
                Err(reason) => {
                    debug!("snippet expansion failed for {}: {reason}", result.url);
                    notes.push(format!(
                        "snippet expansion failed for {}: {reason}",
                        result.url
                    ));
                }
            }
        }
        notes
    }

    async fn expand_one(
        &self,
        provider: &dyn SearchProvider,
        llm: Option<&dyn LlmProvider>,
        result: &mut SearchResult,
    ) -> std::result::Result<&'static str, String> {
        let timeout = Duration::from_millis(self.config.fetch_timeout_ms);
        let mut page_text = None;

        match tokio::time::timeout(timeout, provider.fetch_page(&result.url)).await {
            Ok(Ok(Some(text))) => {
                let snippet = derive_snippet(&text, SNIPPET_MAX_CHARS);
                if !self.is_weak(&snippet) {
                    result.snippet = snippet;
                    return Ok("page fetch");
                }
                page_text = Some(text);
            }
            Ok(Ok(None)) => {}
            Ok(Err(e)) => {
                debug!("page fetch failed for {}: {e}", result.url);
            }
            Err(_) => {
                debug!("page fetch timed out for {}", result.url);
            }
        }

        let llm = match llm {
            Some(llm) => llm,
            None => return Err("page fetch yielded nothing and no LLM available".to_string()),
        };

        let material = match page_text {
            Some(text) => {
                let cut = floor_char_boundary(&text, SUMMARY_INPUT_CHARS);
                format!("Page content:\n{}", &text[..cut])
            }
            None => format!("Only the URL is known: {}", result.url),
        };
        let messages = vec![
            ChatMessage::system(
                "You write terse, factual two-sentence snippets describing web pages. \
                 Respond with the snippet only.",
            ),
            ChatMessage::user(format!(
                "Title: {}\nURL: {}\n{}",
                result.title, result.url, material
            )),
        ];
        let summary = llm
            .generate(messages)
            .await
            .map_err(|e| format!("llm summary failed: {e}"))?;
        let snippet = derive_snippet(&summary, SNIPPET_MAX_CHARS);
        if self.is_weak(&snippet) {
            return Err("llm summary too short".to_string());
        }
        result.snippet = snippet;
        Ok("llm summary")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::QuotaStatus;
    use crate::policy::ProviderError;
    use async_trait::async_trait;

    struct PageProvider {
        page: Option<String>,
        fail: bool,
    }

    #[async_trait]
    impl SearchProvider for PageProvider {
        fn source_tag(&self) -> &str {
            "mock"
        }

        async fn search(
            &self,
            _query: &str,
        ) -> std::result::Result<Vec<SearchResult>, ProviderError> {
            Ok(Vec::new())
        }

        async fn fetch_page(
            &self,
            _url: &str,
        ) -> std::result::Result<Option<String>, ProviderError> {
            if self.fail {
                return Err(ProviderError::new("fetch refused"));
            }
            Ok(self.page.clone())
        }
    }

    struct CannedLlm {
        reply: String,
    }

    #[async_trait]
    impl LlmProvider for CannedLlm {
        fn model_name(&self) -> &str {
            "canned"
        }

        async fn generate(
            &self,
            _messages: Vec<ChatMessage>,
        ) -> std::result::Result<String, ProviderError> {
            Ok(self.reply.clone())
        }

        async fn probe_quota(&self) -> QuotaStatus {
            QuotaStatus::Unknown
        }
    }

    fn weak_result() -> SearchResult {
        SearchResult::new("Page", "https://example.com/doc", "thin", "mock")
    }

    fn expander() -> SnippetExpander {
        SnippetExpander::new(ExpandConfig::default())
    }

    #[test]
    fn test_derive_snippet_word_boundary() {
        let text = "alpha beta gamma delta";
        let snippet = derive_snippet(text, 12);
        assert_eq!(snippet, "alpha beta");
        assert_eq!(derive_snippet("short", 100), "short");
    }

    #[tokio::test]
    async fn test_strong_snippets_left_alone() {
        let provider = PageProvider {
            page: Some("page body ".repeat(50)),
            fail: false,
        };
        let mut results = vec![SearchResult::new(
            "Page",
            "https://example.com",
            "a perfectly serviceable snippet that is long enough",
            "mock",
        )];
        let before = results[0].snippet.clone();
        let notes = expander().expand(&provider, None, &mut results).await;
        assert!(notes.is_empty());
        assert_eq!(results[0].snippet, before);
    }

    #[tokio::test]
    async fn test_page_fetch_expands_weak_snippet() {
        let provider = PageProvider {
            page: Some("A real page describing the topic in reasonable depth. ".repeat(4)),
            fail: false,
        };
        let mut results = vec![weak_result()];
        let notes = expander().expand(&provider, None, &mut results).await;
        assert_eq!(notes.len(), 1);
        assert!(notes[0].contains("via page fetch"));
        assert!(results[0].snippet.len() >= 40);
    }

    #[tokio::test]
    async fn test_llm_fallback_when_no_page() {
        let provider = PageProvider {
            page: None,
            fail: false,
        };
        let llm = CannedLlm {
            reply: "A two sentence description of the page. It covers the topic.".to_string(),
        };
        let mut results = vec![weak_result()];
        let notes = expander()
            .expand(&provider, Some(&llm), &mut results)
            .await;
        assert!(notes[0].contains("via llm summary"));
        assert!(results[0].snippet.starts_with("A two sentence"));
    }

    #[tokio::test]
    async fn test_failure_leaves_snippet_unchanged() {
        let provider = PageProvider {
            page: None,
            fail: true,
        };
        let mut results = vec![weak_result()];
        let notes = expander().expand(&provider, None, &mut results).await;
        assert_eq!(results[0].snippet, "thin");
        assert!(notes[0].contains("snippet expansion failed"));
    }

    #[tokio::test]
    async fn test_short_llm_reply_is_a_failure() {
        let provider = PageProvider {
            page: None,
            fail: false,
        };
        let llm = CannedLlm {
            reply: "nope".to_string(),
        };
        let mut results = vec![weak_result()];
        let notes = expander()
            .expand(&provider, Some(&llm), &mut results)
            .await;
        assert!(notes[0].contains("too short"));
        assert_eq!(results[0].snippet, "thin");
    }
}
