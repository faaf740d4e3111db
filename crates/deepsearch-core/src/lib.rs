//! Deepsearch Core Library
//!
//! Core functionality for the deepsearch retrieval-augmented answer
//! engine.
//!
//! # Features
//! - Search provider fan-out with sequential failover
//! - Snippet expansion for weak results via page fetch or LLM summary
//! - Chunking, hashed bag-of-words embeddings, and weighted reranking
//! - Multi-stage LLM synthesis with quota-aware retry and backoff
//! - Content-addressed per-user result cache
//! - Fallback cascade so degraded runs still answer

pub mod cache;
pub mod config;
pub mod error;
pub mod expand;
pub mod llm;
pub mod model;
pub mod pipeline;
pub mod policy;
pub mod providers;
pub mod query;
pub mod rank;
pub mod registry;

pub use cache::{sanitize_user_id, CacheEntry, CacheStats, CacheStore};
pub use config::{
    CacheConfig, ChunkConfig, Config, EmbeddingConfig, ExpandConfig, LlmProviderConfig,
    MatcherConfig, PipelineConfig, ProvidersConfig, RerankConfig, RetryConfig,
    SearchProviderConfig, SubtopicsConfig,
};
pub use error::{DeepSearchError, Error, Result};
pub use expand::SnippetExpander;
pub use llm::{ChatMessage, LlmProvider, OpenAiProvider, QuotaStatus};
pub use model::{
    CacheMeta, HistoryEntry, PipelineResult, ProgressEvent, Query, QueryOptions, ResultChunk,
    Role, RunId, SearchResult, SearchType,
};
pub use pipeline::{DeepSearchEngine, ProgressHub, RunHandle, STEPS};
pub use policy::{
    backoff_delay_ms, classify, decide, ErrorClass, PolicyAction, ProviderError,
};
pub use providers::{validate_results, SearchProvider, SearxngProvider, TavilyProvider};
pub use query::{fingerprint, normalize};
pub use rank::{chunk_text, BowEmbedder, Embedder, Ranker, ScoredChunk, TextChunk};
pub use registry::{ProviderKind, ProviderRegistry, ProviderState};

/// Default config directory name
pub const CONFIG_DIR_NAME: &str = "deepsearch";
