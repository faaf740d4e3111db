//! Fallback result constructors
//!
//! Every degraded outcome is still a well-formed [`PipelineResult`]
//! returned as `Ok`. Callers distinguish the rungs by `search_type`.
//! None of these results is cacheable.

use crate::model::{CacheMeta, PipelineResult, Query, SearchType};
use chrono::Utc;

fn base(
    query: &Query,
    fingerprint: &str,
    search_type: SearchType,
    summary: String,
    generated_by_llm: bool,
    reasoning: Vec<String>,
) -> PipelineResult {
    PipelineResult {
        summary,
        sources: Vec::new(),
        reasoning,
        query: query.raw.clone(),
        timestamp: Utc::now(),
        user_id: query.user_id.clone(),
        generated_by_llm,
        search_type,
        cache_meta: CacheMeta {
            fingerprint: fingerprint.to_string(),
            cacheable: false,
        },
    }
}

/// Search produced nothing usable but the model answered from its own
/// knowledge.
pub fn llm_only(
    query: &Query,
    fingerprint: &str,
    summary: String,
    reasoning: Vec<String>,
) -> PipelineResult {
    base(
        query,
        fingerprint,
        SearchType::LlmOnlyFallback,
        summary,
        true,
        reasoning,
    )
}

/// Every LLM provider is out of quota, so no synthesis is possible.
pub fn quota_exceeded(query: &Query, fingerprint: &str, reasoning: Vec<String>) -> PipelineResult {
    let summary = format!(
        "The language model quota for today is exhausted, so \"{}\" could not \
         be answered right now. You can run a manual web search for \"{}\" in \
         the meantime, or retry once the quota resets.",
        query.raw, query.raw
    );
    base(
        query,
        fingerprint,
        SearchType::QuotaExceeded,
        summary,
        false,
        reasoning,
    )
}

/// Both the search backends and the model failed; nothing to show.
pub fn search_error(query: &Query, fingerprint: &str, reasoning: Vec<String>) -> PipelineResult {
    let summary = format!(
        "No answer could be produced for \"{}\": the search backends and the \
         language model were both unavailable. Please try again later.",
        query.raw
    );
    base(
        query,
        fingerprint,
        SearchType::SearchError,
        summary,
        false,
        reasoning,
    )
}

/// The same user already has an identical query running.
pub fn already_in_progress(query: &Query, fingerprint: &str) -> PipelineResult {
    let summary = format!(
        "A search for \"{}\" is already in progress for this user. Wait for it \
         to finish, then ask again to get the completed answer.",
        query.raw
    );
    base(
        query,
        fingerprint,
        SearchType::AlreadyInProgress,
        summary,
        false,
        vec!["duplicate run suppressed".to_string()],
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query() -> Query {
        Query::new("rust async runtimes", "u1")
    }

    #[test]
    fn test_fallbacks_are_never_cacheable() {
        let q = query();
        let results = [
            llm_only(&q, "fp", "a summary long enough to be useful".into(), vec![]),
            quota_exceeded(&q, "fp", vec![]),
            search_error(&q, "fp", vec![]),
            already_in_progress(&q, "fp"),
        ];
        for result in &results {
            assert!(!result.cache_meta.cacheable);
            assert!(result.sources.is_empty());
        }
    }

    #[test]
    fn test_quota_message_names_the_query() {
        let q = query();
        let result = quota_exceeded(&q, "fp", vec![]);
        assert!(result.summary.contains("rust async runtimes"));
        assert!(result.summary.to_lowercase().contains("manual web search"));
        assert!(!result.generated_by_llm);
        assert_eq!(result.search_type, SearchType::QuotaExceeded);
    }

    #[test]
    fn test_llm_only_is_marked_generated() {
        let q = query();
        let result = llm_only(&q, "fp", "model-written answer body".into(), vec![]);
        assert!(result.generated_by_llm);
        assert_eq!(result.search_type, SearchType::LlmOnlyFallback);
    }

    #[test]
    fn test_in_progress_message() {
        let q = query();
        let result = already_in_progress(&q, "fp");
        assert!(result.summary.contains("already in progress"));
        assert_eq!(result.search_type, SearchType::AlreadyInProgress);
    }
}
