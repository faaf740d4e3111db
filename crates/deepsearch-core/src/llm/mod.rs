//! LLM provider abstraction
//!
//! Text-generation backends implement a uniform generate + quota-probe
//! contract. Prompts are built by the pipeline; adapters never alter
//! them.

use crate::policy::ProviderError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub mod openai;

pub use openai::OpenAiProvider;

/// Chat message for completion requests
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

/// Remaining request quota as reported by a backend
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuotaStatus {
    Known { remaining: u64, limit: u64 },
    Unknown,
}

impl QuotaStatus {
    /// True only when the backend positively reported zero remaining
    pub fn is_exhausted(&self) -> bool {
        matches!(self, Self::Known { remaining: 0, .. })
    }
}

/// LLM provider trait - all text-generation backends implement this
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Model identifier served by this provider
    fn model_name(&self) -> &str;

    /// Generate text for the given messages
    async fn generate(
        &self,
        messages: Vec<ChatMessage>,
    ) -> std::result::Result<String, ProviderError>;

    /// Ask the backend how much quota is left. `Unknown` means the
    /// caller should assume availability.
    async fn probe_quota(&self) -> QuotaStatus;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chat_message_roles() {
        assert_eq!(ChatMessage::system("x").role, "system");
        assert_eq!(ChatMessage::user("y").role, "user");
    }

    #[test]
    fn test_quota_exhaustion() {
        assert!(QuotaStatus::Known {
            remaining: 0,
            limit: 100
        }
        .is_exhausted());
        assert!(!QuotaStatus::Known {
            remaining: 5,
            limit: 100
        }
        .is_exhausted());
        assert!(!QuotaStatus::Unknown.is_exhausted());
    }
}
