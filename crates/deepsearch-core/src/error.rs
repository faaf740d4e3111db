//! Error types for deepsearch

use thiserror::Error;

/// Result type alias using DeepSearchError
pub type Result<T> = std::result::Result<T, DeepSearchError>;

/// Error type alias for convenience
pub type Error = DeepSearchError;

/// Exit codes for CLI
pub mod exit_codes {
    pub const SUCCESS: i32 = 0;
    pub const GENERAL_ERROR: i32 = 1;
    pub const INVALID_INPUT: i32 = 3;
    pub const QUEUE_FULL: i32 = 4;
}

/// Main error type for deepsearch
#[derive(Debug, Error)]
pub enum DeepSearchError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Run queue full, retry after {retry_after_ms}ms")]
    QueueFull { retry_after_ms: u64 },

    #[error("Provider error: {0}")]
    Provider(String),

    #[error("LLM error: {0}")]
    Llm(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Cache error: {0}")]
    Cache(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Regex error: {0}")]
    Regex(#[from] regex::Error),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl DeepSearchError {
    /// Get the exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::InvalidRequest(_) | Self::Config(_) => exit_codes::INVALID_INPUT,
            Self::QueueFull { .. } => exit_codes::QUEUE_FULL,
            _ => exit_codes::GENERAL_ERROR,
        }
    }
}
