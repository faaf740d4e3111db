//! Provider registry
//!
//! Tracks the ordered provider lists per kind together with quota
//! counters and health flags. Adapters themselves live on the engine;
//! the registry only decides who is eligible and in what order.
//! Counters reset at the UTC day boundary, health resets on success.

use crate::error::Result;
use crate::policy::ErrorClass;
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, info, warn};

/// Where quota counters are persisted between runs
pub fn default_registry_path() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(crate::CONFIG_DIR_NAME)
        .join("registry.json")
}

/// Provider kind discriminator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    Search,
    Llm,
    Embedding,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Search => "search",
            Self::Llm => "llm",
            Self::Embedding => "embedding",
        }
    }
}

/// Mutable state tracked for one provider
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderState {
    pub id: String,
    pub kind: ProviderKind,

    /// Model served, for LLM entries
    pub model: Option<String>,

    /// Requests allowed per UTC day, unlimited when absent
    pub daily_quota: Option<u64>,

    pub used_today: u64,
    pub healthy: bool,
    pub exhausted: bool,
    pub last_reset: NaiveDate,
}

impl ProviderState {
    fn new(id: String, kind: ProviderKind, model: Option<String>, daily_quota: Option<u64>) -> Self {
        Self {
            id,
            kind,
            model,
            daily_quota,
            used_today: 0,
            healthy: true,
            exhausted: false,
            last_reset: Utc::now().date_naive(),
        }
    }

    fn reset_if_new_day(&mut self, today: NaiveDate) {
        if self.last_reset < today {
            self.used_today = 0;
            self.exhausted = false;
            self.healthy = true;
            self.last_reset = today;
        }
    }

    fn quota_spent(&self) -> bool {
        matches!(self.daily_quota, Some(quota) if self.used_today >= quota)
    }

    /// Eligible for dispatch right now
    pub fn available(&self) -> bool {
        self.healthy && !self.exhausted && !self.quota_spent()
    }
}

/// Ordered provider state per kind
pub struct ProviderRegistry {
    entries: Mutex<Vec<ProviderState>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(Vec::new()),
        }
    }

    /// Register a provider. Order of registration is order of preference
    /// within a kind.
    pub fn register(
        &self,
        id: impl Into<String>,
        kind: ProviderKind,
        model: Option<String>,
        daily_quota: Option<u64>,
    ) {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.push(ProviderState::new(id.into(), kind, model, daily_quota));
    }

    /// Ordered ids of providers currently eligible for a kind
    pub fn candidates(&self, kind: ProviderKind) -> Vec<String> {
        let today = Utc::now().date_naive();
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries
            .iter_mut()
            .filter(|e| e.kind == kind)
            .filter_map(|e| {
                e.reset_if_new_day(today);
                e.available().then(|| e.id.clone())
            })
            .collect()
    }

    /// First eligible provider of a kind
    pub fn next(&self, kind: ProviderKind) -> Option<String> {
        self.candidates(kind).into_iter().next()
    }

    /// Eligible LLM provider serving the given model
    pub fn find_llm_by_model(&self, model: &str) -> Option<String> {
        let today = Utc::now().date_naive();
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries
            .iter_mut()
            .filter(|e| e.kind == ProviderKind::Llm)
            .find_map(|e| {
                e.reset_if_new_day(today);
                (e.available() && e.model.as_deref() == Some(model)).then(|| e.id.clone())
            })
    }

    /// Count a dispatched request against the provider's quota
    pub fn record_request(&self, id: &str) {
        let today = Utc::now().date_naive();
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(e) = entries.iter_mut().find(|e| e.id == id) {
            e.reset_if_new_day(today);
            e.used_today += 1;
            if e.quota_spent() {
                info!("provider {} spent its daily quota", id);
                e.exhausted = true;
            }
        }
    }

    /// Clear the health flag after a successful call
    pub fn mark_success(&self, id: &str) {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(e) = entries.iter_mut().find(|e| e.id == id) {
            e.healthy = true;
        }
    }

    /// Record a classified failure
    pub fn mark_failure(&self, id: &str, class: ErrorClass) {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(e) = entries.iter_mut().find(|e| e.id == id) {
            match class {
                ErrorClass::QuotaExhausted => {
                    info!("provider {} marked quota-exhausted", id);
                    e.exhausted = true;
                }
                ErrorClass::Fatal => {
                    warn!("provider {} marked unhealthy", id);
                    e.healthy = false;
                }
                ErrorClass::RateLimited | ErrorClass::Transient => {
                    debug!("provider {} transient failure", id);
                }
            }
        }
    }

    /// True when the provider is known to have no quota left
    pub fn is_exhausted(&self, id: &str) -> bool {
        let today = Utc::now().date_naive();
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries
            .iter_mut()
            .find(|e| e.id == id)
            .map(|e| {
                e.reset_if_new_day(today);
                e.exhausted || e.quota_spent()
            })
            .unwrap_or(false)
    }

    /// Consistent copy of all provider states
    pub fn snapshot(&self) -> Vec<ProviderState> {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.clone()
    }

    /// Restore counters to a clean slate
    pub fn reset(&self) {
        let today = Utc::now().date_naive();
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        for e in entries.iter_mut() {
            e.used_today = 0;
            e.healthy = true;
            e.exhausted = false;
            e.last_reset = today;
        }
    }

    /// Persist counters and flags so quota accounting survives restarts
    pub fn save(&self, path: &Path) -> Result<()> {
        let snapshot = self.snapshot();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(&snapshot)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Merge a saved snapshot onto the registered entries. Unknown ids
    /// are ignored; snapshots from a previous UTC day reset on merge.
    pub fn load(&self, path: &Path) -> Result<()> {
        if !path.exists() {
            return Ok(());
        }
        let content = std::fs::read_to_string(path)?;
        let saved: Vec<ProviderState> = serde_json::from_str(&content)?;
        let today = Utc::now().date_naive();
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        for mut state in saved {
            state.reset_if_new_day(today);
            if let Some(e) = entries
                .iter_mut()
                .find(|e| e.id == state.id && e.kind == state.kind)
            {
                e.used_today = state.used_today;
                e.healthy = state.healthy;
                e.exhausted = state.exhausted;
                e.last_reset = state.last_reset;
            }
        }
        Ok(())
    }
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn registry() -> ProviderRegistry {
        let r = ProviderRegistry::new();
        r.register("searxng", ProviderKind::Search, None, None);
        r.register("tavily", ProviderKind::Search, None, Some(100));
        r.register("primary", ProviderKind::Llm, Some("llama".to_string()), Some(2));
        r.register("backup", ProviderKind::Llm, Some("mistral".to_string()), None);
        r
    }

    #[test]
    fn test_candidates_keep_registration_order() {
        let r = registry();
        assert_eq!(r.candidates(ProviderKind::Search), vec!["searxng", "tavily"]);
        assert_eq!(r.next(ProviderKind::Llm), Some("primary".to_string()));
    }

    #[test]
    fn test_exhausted_provider_skipped() {
        let r = registry();
        r.mark_failure("searxng", ErrorClass::QuotaExhausted);
        assert_eq!(r.candidates(ProviderKind::Search), vec!["tavily"]);
        assert!(r.is_exhausted("searxng"));
    }

    #[test]
    fn test_unhealthy_provider_skipped_until_success() {
        let r = registry();
        r.mark_failure("searxng", ErrorClass::Fatal);
        assert_eq!(r.candidates(ProviderKind::Search), vec!["tavily"]);
        r.mark_success("searxng");
        assert_eq!(r.candidates(ProviderKind::Search), vec!["searxng", "tavily"]);
    }

    #[test]
    fn test_quota_countdown_exhausts() {
        let r = registry();
        r.record_request("primary");
        assert!(!r.is_exhausted("primary"));
        r.record_request("primary");
        assert!(r.is_exhausted("primary"));
        assert_eq!(r.next(ProviderKind::Llm), Some("backup".to_string()));
    }

    #[test]
    fn test_find_llm_by_model() {
        let r = registry();
        assert_eq!(r.find_llm_by_model("mistral"), Some("backup".to_string()));
        assert_eq!(r.find_llm_by_model("unknown"), None);
    }

    #[test]
    fn test_daily_reset_clears_counters() {
        let r = registry();
        r.record_request("primary");
        r.record_request("primary");
        assert!(r.is_exhausted("primary"));

        {
            let mut entries = r.entries.lock().unwrap();
            let e = entries.iter_mut().find(|e| e.id == "primary").unwrap();
            e.last_reset = Utc::now().date_naive() - chrono::Duration::days(1);
        }
        assert!(!r.is_exhausted("primary"));
        let state = r
            .snapshot()
            .into_iter()
            .find(|s| s.id == "primary")
            .unwrap();
        assert_eq!(state.used_today, 0);
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("registry.json");

        let r = registry();
        r.record_request("tavily");
        r.mark_failure("primary", ErrorClass::QuotaExhausted);
        r.save(&path).unwrap();

        let fresh = registry();
        fresh.load(&path).unwrap();
        assert!(fresh.is_exhausted("primary"));
        let state = fresh
            .snapshot()
            .into_iter()
            .find(|s| s.id == "tavily")
            .unwrap();
        assert_eq!(state.used_today, 1);
    }

    #[test]
    fn test_load_ignores_unknown_ids() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("registry.json");

        let other = ProviderRegistry::new();
        other.register("stranger", ProviderKind::Search, None, None);
        other.record_request("stranger");
        other.save(&path).unwrap();

        let r = registry();
        r.load(&path).unwrap();
        assert_eq!(r.snapshot().len(), 4);
    }

    #[test]
    fn test_reset_restores_everything() {
        let r = registry();
        r.record_request("primary");
        r.mark_failure("searxng", ErrorClass::Fatal);
        r.reset();
        assert_eq!(r.candidates(ProviderKind::Search), vec!["searxng", "tavily"]);
        assert!(!r.is_exhausted("primary"));
    }
}
