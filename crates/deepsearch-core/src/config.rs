//! Configuration management

use crate::error::{DeepSearchError, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Cache store configuration
    #[serde(default)]
    pub cache: CacheConfig,

    /// Pipeline-wide limits
    #[serde(default)]
    pub pipeline: PipelineConfig,

    /// Provider declarations, ordered by preference
    #[serde(default)]
    pub providers: ProvidersConfig,

    /// Retry and error-classification policy
    #[serde(default)]
    pub retry: RetryConfig,

    /// Reranker score weights
    #[serde(default)]
    pub rerank: RerankConfig,

    /// Chunking parameters
    #[serde(default)]
    pub chunk: ChunkConfig,

    /// Embedding parameters
    #[serde(default)]
    pub embedding: EmbeddingConfig,

    /// Synthesis decomposition
    #[serde(default)]
    pub subtopics: SubtopicsConfig,

    /// Snippet expansion
    #[serde(default)]
    pub expand: ExpandConfig,
}

/// Cache store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Entry time-to-live in seconds
    #[serde(default = "default_cache_ttl")]
    pub ttl_seconds: u64,

    /// Cache root directory
    #[serde(default = "default_cache_root")]
    pub root: PathBuf,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_seconds: default_cache_ttl(),
            root: default_cache_root(),
        }
    }
}

fn default_cache_ttl() -> u64 {
    86400
}

fn default_cache_root() -> PathBuf {
    if let Ok(root) = std::env::var("DEEPSEARCH_CACHE_ROOT") {
        return PathBuf::from(root);
    }
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(crate::CONFIG_DIR_NAME)
        .join("results")
}

/// Pipeline-wide limits
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Per-run deadline in milliseconds
    #[serde(default = "default_deadline_ms")]
    pub deadline_ms: u64,

    /// Maximum runs executing at once across all users
    #[serde(default = "default_global_concurrency")]
    pub global_concurrency: usize,

    /// Runs allowed to wait for a slot beyond the concurrency cap
    #[serde(default = "default_queue_bound")]
    pub queue_bound: usize,

    /// Re-emit the current progress step every second while a stage runs
    #[serde(default)]
    pub watchdog: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            deadline_ms: default_deadline_ms(),
            global_concurrency: default_global_concurrency(),
            queue_bound: default_queue_bound(),
            watchdog: false,
        }
    }
}

fn default_deadline_ms() -> u64 {
    45_000
}

fn default_global_concurrency() -> usize {
    32
}

fn default_queue_bound() -> usize {
    128
}

/// Provider declarations
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ProvidersConfig {
    /// Search backends, tried in order
    #[serde(default)]
    pub search: Vec<SearchProviderConfig>,

    /// LLM backends, primary first
    #[serde(default)]
    pub llm: Vec<LlmProviderConfig>,
}

impl ProvidersConfig {
    /// Built-in entries from environment variables, used when the YAML
    /// declares no providers at all.
    pub fn from_env() -> Self {
        let mut search = Vec::new();
        if let Ok(url) = std::env::var("DEEPSEARCH_SEARXNG_URL") {
            search.push(SearchProviderConfig {
                id: "searxng".to_string(),
                kind: "searxng".to_string(),
                base_url: url,
                api_key: None,
                daily_quota: None,
                timeout_ms: default_search_timeout_ms(),
                max_results: default_max_results(),
            });
        }
        if let Ok(key) = std::env::var("DEEPSEARCH_TAVILY_API_KEY") {
            search.push(SearchProviderConfig {
                id: "tavily".to_string(),
                kind: "tavily".to_string(),
                base_url: "https://api.tavily.com".to_string(),
                api_key: Some(key),
                daily_quota: None,
                timeout_ms: default_search_timeout_ms(),
                max_results: default_max_results(),
            });
        }

        let mut llm = Vec::new();
        if let Ok(url) = std::env::var("DEEPSEARCH_LLM_URL") {
            llm.push(LlmProviderConfig {
                id: "primary".to_string(),
                kind: "openai".to_string(),
                base_url: url,
                model: std::env::var("DEEPSEARCH_LLM_MODEL")
                    .unwrap_or_else(|_| default_llm_model()),
                api_key: std::env::var("DEEPSEARCH_LLM_API_KEY").ok(),
                daily_quota: None,
                timeout_ms: default_llm_timeout_ms(),
            });
        }

        Self { search, llm }
    }

    /// True if no backend of either kind is declared
    pub fn is_empty(&self) -> bool {
        self.search.is_empty() && self.llm.is_empty()
    }
}

/// One search backend declaration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchProviderConfig {
    /// Registry identifier, unique per kind
    pub id: String,

    /// Adapter selector ("searxng" or "tavily")
    pub kind: String,

    /// Service base URL
    pub base_url: String,

    /// API key for authenticated services
    #[serde(default)]
    pub api_key: Option<String>,

    /// Requests allowed per UTC day, unlimited when absent
    #[serde(default)]
    pub daily_quota: Option<u64>,

    /// Per-call timeout in milliseconds
    #[serde(default = "default_search_timeout_ms")]
    pub timeout_ms: u64,

    /// Result rows requested from the backend
    #[serde(default = "default_max_results")]
    pub max_results: usize,
}

pub(crate) fn default_search_timeout_ms() -> u64 {
    8_000
}

fn default_max_results() -> usize {
    10
}

/// One LLM backend declaration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmProviderConfig {
    /// Registry identifier, unique per kind
    pub id: String,

    /// Adapter selector (currently "openai")
    pub kind: String,

    /// Service base URL
    pub base_url: String,

    /// Model name passed to the completions endpoint
    #[serde(default = "default_llm_model")]
    pub model: String,

    /// API key for authenticated services
    #[serde(default)]
    pub api_key: Option<String>,

    /// Requests allowed per UTC day, unlimited when absent
    #[serde(default)]
    pub daily_quota: Option<u64>,

    /// Per-call timeout in milliseconds
    #[serde(default = "default_llm_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_llm_model() -> String {
    "meta-llama/Llama-3.1-8B-Instruct".to_string()
}

pub(crate) fn default_llm_timeout_ms() -> u64 {
    30_000
}

/// Retry and error-classification policy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Attempts per provider before failing over
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// First backoff delay in milliseconds, doubled per attempt
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    /// Substrings that classify an error message when no structured hint exists
    #[serde(default = "default_matchers")]
    pub matchers: MatcherConfig,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            matchers: default_matchers(),
        }
    }
}

fn default_max_attempts() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    1_000
}

/// Error-message substrings per classification
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatcherConfig {
    /// Patterns indicating exhausted quota
    pub quota: Vec<String>,

    /// Patterns indicating rate limiting
    pub rate_limit: Vec<String>,

    /// Patterns indicating a transient backend condition
    pub transient: Vec<String>,
}

fn default_matchers() -> MatcherConfig {
    MatcherConfig {
        quota: vec!["quota".to_string(), "exceeded".to_string()],
        rate_limit: vec!["429".to_string(), "Too Many Requests".to_string()],
        transient: vec![
            "503".to_string(),
            "Service Unavailable".to_string(),
            "overloaded".to_string(),
        ],
    }
}

/// Reranker score weights, must sum to 1
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RerankConfig {
    /// Weight of cosine similarity
    #[serde(default = "default_alpha")]
    pub alpha: f32,

    /// Weight of the domain prior
    #[serde(default = "default_beta")]
    pub beta: f32,

    /// Weight of the length prior
    #[serde(default = "default_gamma")]
    pub gamma: f32,

    /// Reranked results carried into synthesis
    #[serde(default = "default_top_k")]
    pub top_k: usize,
}

impl Default for RerankConfig {
    fn default() -> Self {
        Self {
            alpha: default_alpha(),
            beta: default_beta(),
            gamma: default_gamma(),
            top_k: default_top_k(),
        }
    }
}

fn default_alpha() -> f32 {
    0.7
}

fn default_beta() -> f32 {
    0.2
}

fn default_gamma() -> f32 {
    0.1
}

fn default_top_k() -> usize {
    5
}

/// Chunking parameters
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ChunkConfig {
    /// Target chunk size in characters
    #[serde(default = "default_target_chars")]
    pub target_chars: usize,

    /// Overlap carried between adjacent chunks
    #[serde(default = "default_overlap")]
    pub overlap: usize,

    /// Chunks kept per search result
    #[serde(default = "default_max_per_result")]
    pub max_per_result: usize,

    /// Chunks kept per run
    #[serde(default = "default_max_per_run")]
    pub max_per_run: usize,
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            target_chars: default_target_chars(),
            overlap: default_overlap(),
            max_per_result: default_max_per_result(),
            max_per_run: default_max_per_run(),
        }
    }
}

fn default_target_chars() -> usize {
    800
}

fn default_overlap() -> usize {
    100
}

fn default_max_per_result() -> usize {
    5
}

fn default_max_per_run() -> usize {
    50
}

/// Embedding parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// Vector dimension
    #[serde(default = "default_dimension")]
    pub dimension: usize,

    /// Language tag partitioning the embedding cache
    #[serde(default = "default_language")]
    pub language: String,

    /// Per-call timeout in milliseconds for remote embedders
    #[serde(default = "default_embed_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            dimension: default_dimension(),
            language: default_language(),
            timeout_ms: default_embed_timeout_ms(),
        }
    }
}

fn default_dimension() -> usize {
    128
}

fn default_language() -> String {
    "en".to_string()
}

fn default_embed_timeout_ms() -> u64 {
    5_000
}

/// Synthesis decomposition
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SubtopicsConfig {
    /// Maximum subtopic sections in the final answer
    #[serde(default = "default_max_subtopics")]
    pub max: usize,
}

impl Default for SubtopicsConfig {
    fn default() -> Self {
        Self {
            max: default_max_subtopics(),
        }
    }
}

fn default_max_subtopics() -> usize {
    3
}

/// Snippet expansion
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ExpandConfig {
    /// Snippets shorter than this are considered weak
    #[serde(default = "default_weak_snippet_chars")]
    pub weak_snippet_chars: usize,

    /// Page fetch timeout in milliseconds
    #[serde(default = "default_fetch_timeout_ms")]
    pub fetch_timeout_ms: u64,
}

impl Default for ExpandConfig {
    fn default() -> Self {
        Self {
            weak_snippet_chars: default_weak_snippet_chars(),
            fetch_timeout_ms: default_fetch_timeout_ms(),
        }
    }
}

fn default_weak_snippet_chars() -> usize {
    40
}

fn default_fetch_timeout_ms() -> u64 {
    8_000
}

impl Config {
    /// Load config from `$DEEPSEARCH_CONFIG`, else the default path,
    /// else built-in defaults. Empty provider lists are backfilled from
    /// the environment.
    pub fn load() -> Result<Self> {
        let path = match std::env::var("DEEPSEARCH_CONFIG") {
            Ok(p) => PathBuf::from(p),
            Err(_) => Self::default_path(),
        };
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(&path)?;
            serde_yaml::from_str::<Config>(&content)?
        } else {
            Config::default()
        };
        if config.providers.is_empty() {
            config.providers = ProvidersConfig::from_env();
        }
        config.validate()?;
        Ok(config)
    }

    /// Save config to default path
    pub fn save(&self) -> Result<()> {
        let path = Self::default_path();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_yaml::to_string(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Get default config path
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(crate::CONFIG_DIR_NAME)
            .join("config.yml")
    }

    /// Reject configurations the pipeline cannot run with
    pub fn validate(&self) -> Result<()> {
        let weight_sum = self.rerank.alpha + self.rerank.beta + self.rerank.gamma;
        if (weight_sum - 1.0).abs() > 1e-6 {
            return Err(DeepSearchError::Config(format!(
                "rerank weights must sum to 1, got {weight_sum}"
            )));
        }
        if self.embedding.dimension == 0 {
            return Err(DeepSearchError::Config(
                "embedding dimension must be positive".to_string(),
            ));
        }
        if self.pipeline.global_concurrency == 0 {
            return Err(DeepSearchError::Config(
                "global_concurrency must be positive".to_string(),
            ));
        }
        if self.retry.max_attempts == 0 {
            return Err(DeepSearchError::Config(
                "retry.max_attempts must be positive".to_string(),
            ));
        }
        if self.chunk.target_chars < 50 {
            return Err(DeepSearchError::Config(
                "chunk.target_chars must be at least 50".to_string(),
            ));
        }
        for p in &self.providers.search {
            if p.id.is_empty() {
                return Err(DeepSearchError::Config(
                    "search provider with empty id".to_string(),
                ));
            }
        }
        for p in &self.providers.llm {
            if p.id.is_empty() {
                return Err(DeepSearchError::Config(
                    "llm provider with empty id".to_string(),
                ));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_validates() {
        let config = Config::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_bad_rerank_weights_rejected() {
        let mut config = Config::default();
        config.rerank.alpha = 0.9;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_dimension_rejected() {
        let mut config = Config::default();
        config.embedding.dimension = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_yaml_round_trip() {
        let config = Config::default();
        let yaml = serde_yaml::to_string(&config).unwrap();
        let parsed: Config = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(parsed.cache.ttl_seconds, config.cache.ttl_seconds);
        assert_eq!(parsed.rerank.top_k, config.rerank.top_k);
        assert_eq!(parsed.chunk.target_chars, config.chunk.target_chars);
    }

    #[test]
    fn test_partial_yaml_fills_defaults() {
        let yaml = "pipeline:\n  deadline_ms: 10000\n";
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.pipeline.deadline_ms, 10_000);
        assert_eq!(config.pipeline.global_concurrency, 32);
        assert_eq!(config.cache.ttl_seconds, 86400);
    }
}
