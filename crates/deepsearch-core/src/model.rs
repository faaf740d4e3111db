//! Core data model: queries, search results, chunks, pipeline output

use crate::error::{DeepSearchError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Speaker of one conversation history entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// One prior turn of the conversation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub role: Role,
    pub content: String,
}

impl HistoryEntry {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Caller-supplied stage hints
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueryOptions {
    /// Preferred LLM, matched against registry model names
    #[serde(default)]
    pub model: Option<String>,

    /// Cap on search results requested from providers
    #[serde(default)]
    pub max_results: Option<usize>,
}

/// One request into the pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Query {
    /// Raw user text
    pub raw: String,

    /// Prior conversation turns, oldest first
    #[serde(default)]
    pub history: Vec<HistoryEntry>,

    /// Opaque caller identity, namespaces the cache
    pub user_id: String,

    #[serde(default)]
    pub options: QueryOptions,
}

impl Query {
    pub fn new(raw: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            raw: raw.into(),
            history: Vec::new(),
            user_id: user_id.into(),
            options: QueryOptions::default(),
        }
    }

    pub fn with_history(mut self, history: Vec<HistoryEntry>) -> Self {
        self.history = history;
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.options.model = Some(model.into());
        self
    }

    /// Reject requests the pipeline cannot act on
    pub fn validate(&self) -> Result<()> {
        if self.raw.trim().is_empty() {
            return Err(DeepSearchError::InvalidRequest(
                "query text is empty".to_string(),
            ));
        }
        if self.user_id.trim().is_empty() {
            return Err(DeepSearchError::InvalidRequest(
                "user id is empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// One web result from a search provider
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    pub title: String,
    pub url: String,
    pub snippet: String,

    /// Which provider produced this row
    pub source_tag: String,

    /// Backend-native relevance score, when the provider reports one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_score: Option<f32>,
}

impl SearchResult {
    pub fn new(
        title: impl Into<String>,
        url: impl Into<String>,
        snippet: impl Into<String>,
        source_tag: impl Into<String>,
    ) -> Self {
        Self {
            title: title.into(),
            url: url.into(),
            snippet: snippet.into(),
            source_tag: source_tag.into(),
            raw_score: None,
        }
    }
}

/// A chunk of one search result's snippet, scored by the reranker
#[derive(Debug, Clone)]
pub struct ResultChunk {
    /// Index of the parent in the run's result list
    pub parent: usize,

    pub text: String,
    pub start_offset: usize,
    pub end_offset: usize,

    /// Set once the chunk has been embedded
    pub embedding: Option<Vec<f32>>,

    /// Cosine similarity against the query embedding
    pub similarity: Option<f32>,
}

/// Which path produced a pipeline result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchType {
    CacheHit,
    Normal,
    LlmOnlyFallback,
    QuotaExceeded,
    SearchError,
    AlreadyInProgress,
}

impl SearchType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CacheHit => "cache_hit",
            Self::Normal => "normal",
            Self::LlmOnlyFallback => "llm_only_fallback",
            Self::QuotaExceeded => "quota_exceeded",
            Self::SearchError => "search_error",
            Self::AlreadyInProgress => "already_in_progress",
        }
    }
}

/// Cache bookkeeping attached to every result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheMeta {
    /// Content hash of (user, normalized query, provider profile)
    pub fingerprint: String,

    /// Only normal results may be written back to the cache
    pub cacheable: bool,
}

/// Final output of one pipeline run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineResult {
    /// Synthesized answer text
    pub summary: String,

    /// Results cited by the answer
    pub sources: Vec<SearchResult>,

    /// Stage decisions and failed attempts, in order
    pub reasoning: Vec<String>,

    /// The raw query this answers
    pub query: String,

    pub timestamp: DateTime<Utc>,
    pub user_id: String,

    /// True when an LLM produced the summary
    pub generated_by_llm: bool,

    pub search_type: SearchType,
    pub cache_meta: CacheMeta,
}

/// One progress step emission
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressEvent {
    /// Zero-based index into the declared step list
    pub step_index: usize,
    pub total_steps: usize,
    pub message: String,
    pub timestamp: DateTime<Utc>,

    /// True for watchdog re-emissions of the current step
    #[serde(default)]
    pub keepalive: bool,
}

/// Process-local identifier of one pipeline run
pub type RunId = u64;
