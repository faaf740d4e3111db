//! Provider failure classification and retry policy
//!
//! Every provider call routes its outcome through this module. Adapters
//! attach a structured class hint when the backend reports one (HTTP
//! status); otherwise classification falls back to the configured
//! message matchers. The decision function is pure so the policy can be
//! tested without providers.

use crate::config::{MatcherConfig, RetryConfig};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failure classes the policy distinguishes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    QuotaExhausted,
    RateLimited,
    Transient,
    Fatal,
}

/// A failed provider call, normalized at the adapter boundary
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct ProviderError {
    pub message: String,

    /// Structured classification from the backend, preferred over
    /// message matching when present
    pub class_hint: Option<ErrorClass>,
}

impl ProviderError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            class_hint: None,
        }
    }

    pub fn with_class(mut self, class: ErrorClass) -> Self {
        self.class_hint = Some(class);
        self
    }

    /// Map an HTTP response into a provider error. Unambiguous statuses
    /// carry a class hint; everything else is left to the matchers.
    pub fn from_status(status: reqwest::StatusCode, body: &str) -> Self {
        let error = Self::new(format!("(HTTP {status}): {body}"));
        match status {
            reqwest::StatusCode::TOO_MANY_REQUESTS => error.with_class(ErrorClass::RateLimited),
            reqwest::StatusCode::PAYMENT_REQUIRED => error.with_class(ErrorClass::QuotaExhausted),
            reqwest::StatusCode::SERVICE_UNAVAILABLE | reqwest::StatusCode::GATEWAY_TIMEOUT => {
                error.with_class(ErrorClass::Transient)
            }
            _ => error,
        }
    }

    /// Map a transport error. Timeouts are worth retrying, everything
    /// else means the backend is unreachable.
    pub fn from_transport(err: reqwest::Error) -> Self {
        let class = if err.is_timeout() {
            ErrorClass::Transient
        } else {
            ErrorClass::Fatal
        };
        Self::new(format!("request failed: {err}")).with_class(class)
    }
}

/// What the orchestrator should do after a classified failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyAction {
    /// Sleep this long, then retry the same provider
    RetryAfterMs(u64),

    /// Give up on this provider; the caller moves to the next peer or,
    /// when none remains, to the fallback cascade
    Failover,
}

/// Classify a failure: provider hint first, then configured matchers,
/// fatal when nothing matches.
pub fn classify(error: &ProviderError, matchers: &MatcherConfig) -> ErrorClass {
    if let Some(class) = error.class_hint {
        return class;
    }
    let message = error.message.to_lowercase();
    let matches = |patterns: &[String]| {
        patterns
            .iter()
            .any(|p| message.contains(&p.to_lowercase()))
    };
    if matches(&matchers.quota) {
        ErrorClass::QuotaExhausted
    } else if matches(&matchers.rate_limit) {
        ErrorClass::RateLimited
    } else if matches(&matchers.transient) {
        ErrorClass::Transient
    } else {
        ErrorClass::Fatal
    }
}

/// Backoff delay before retry number `attempt + 1`. Doubles per attempt
/// from the configured base.
pub fn backoff_delay_ms(attempt: u32, base_delay_ms: u64) -> u64 {
    let exp = attempt.min(16);
    base_delay_ms.saturating_mul(1u64 << exp)
}

/// Decide the next action for a classified failure. `attempt` counts
/// completed attempts against this provider, starting at 1.
pub fn decide(class: ErrorClass, attempt: u32, retry: &RetryConfig) -> PolicyAction {
    match class {
        ErrorClass::QuotaExhausted | ErrorClass::Fatal => PolicyAction::Failover,
        ErrorClass::RateLimited | ErrorClass::Transient => {
            if attempt >= retry.max_attempts {
                PolicyAction::Failover
            } else {
                PolicyAction::RetryAfterMs(backoff_delay_ms(
                    attempt.saturating_sub(1),
                    retry.base_delay_ms,
                ))
            }
        }
    }
}
