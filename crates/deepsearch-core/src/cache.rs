//! Durable per-user result cache
//!
//! Entries are content-addressed: `<root>/<user>/<fingerprint>.json`,
//! where the fingerprint hashes the normalized query and provider
//! profile. Reads never fail a run; any IO or parse problem is logged
//! and treated as a miss.

use crate::config::CacheConfig;
use crate::error::Result;
use crate::model::PipelineResult;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

/// One cached pipeline result with its expiry data
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    pub payload: PipelineResult,
    pub created_at: DateTime<Utc>,
    pub ttl_seconds: u64,
}

impl CacheEntry {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        let age = now.signed_duration_since(self.created_at).num_seconds();
        age < 0 || age as u64 > self.ttl_seconds
    }

    /// A payload with no answer and no sources is not worth serving
    pub fn is_valid(&self) -> bool {
        !(self.payload.summary.trim().is_empty() && self.payload.sources.is_empty())
    }
}

/// Filesystem-backed cache of pipeline results
pub struct CacheStore {
    root: PathBuf,
    default_ttl_seconds: u64,
}

/// Cache statistics
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct CacheStats {
    pub total_entries: usize,
    pub expired_entries: usize,
    pub active_entries: usize,
    pub total_bytes: u64,
}

/// Map a user id onto a filesystem-safe directory component
pub fn sanitize_user_id(user_id: &str) -> String {
    let sanitized: String = user_id
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.' {
                c
            } else {
                '_'
            }
        })
        .collect();
    // Dot-only ids would resolve outside the cache root
    if sanitized.is_empty() || sanitized.chars().all(|c| c == '.') {
        return "_".to_string();
    }
    sanitized
}

impl CacheStore {
    pub fn new(root: impl Into<PathBuf>, default_ttl_seconds: u64) -> Self {
        Self {
            root: root.into(),
            default_ttl_seconds,
        }
    }

    pub fn from_config(config: &CacheConfig) -> Self {
        Self::new(config.root.clone(), config.ttl_seconds)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn entry_path(&self, user_id: &str, fingerprint: &str) -> PathBuf {
        self.root
            .join(sanitize_user_id(user_id))
            .join(format!("{fingerprint}.json"))
    }

    /// Look up a cached result. Expired or invalid entries are misses.
    pub fn get(&self, user_id: &str, fingerprint: &str) -> Option<PipelineResult> {
        let path = self.entry_path(user_id, fingerprint);
        let content = match std::fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                warn!("cache read failed for {}: {}", path.display(), e);
                return None;
            }
        };
        let entry: CacheEntry = match serde_json::from_str(&content) {
            Ok(entry) => entry,
            Err(e) => {
                warn!("cache entry corrupt at {}: {}", path.display(), e);
                return None;
            }
        };
        if entry.is_expired(Utc::now()) {
            debug!("cache entry expired: {fingerprint}");
            return None;
        }
        if !entry.is_valid() {
            debug!("cache entry failed validation: {fingerprint}");
            return None;
        }
        Some(entry.payload)
    }

    /// Write a result. Atomic per fingerprint: the entry is written to a
    /// temp file in the target directory, then renamed over the final
    /// path. Results not marked cacheable are skipped.
    pub fn put(&self, result: &PipelineResult) -> Result<()> {
        if !result.cache_meta.cacheable {
            debug!(
                "skipping cache write for {} result",
                result.search_type.as_str()
            );
            return Ok(());
        }
        let fingerprint = &result.cache_meta.fingerprint;
        let path = self.entry_path(&result.user_id, fingerprint);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let entry = CacheEntry {
            payload: result.clone(),
            created_at: Utc::now(),
            ttl_seconds: self.default_ttl_seconds,
        };
        let content = serde_json::to_string_pretty(&entry)?;
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, content)?;
        std::fs::rename(&tmp, &path)?;
        debug!("cached result {fingerprint} for user {}", result.user_id);
        Ok(())
    }

    /// Count entries, optionally for one user only
    pub fn stats(&self, user_id: Option<&str>) -> CacheStats {
        let dir = match user_id {
            Some(user) => self.root.join(sanitize_user_id(user)),
            None => self.root.clone(),
        };
        let mut stats = CacheStats::default();
        if !dir.exists() {
            return stats;
        }
        let now = Utc::now();
        for entry in WalkDir::new(&dir).min_depth(1).into_iter().flatten() {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            stats.total_entries += 1;
            if let Ok(meta) = entry.metadata() {
                stats.total_bytes += meta.len();
            }
            let expired = std::fs::read_to_string(path)
                .ok()
                .and_then(|content| serde_json::from_str::<CacheEntry>(&content).ok())
                .map(|e| e.is_expired(now))
                .unwrap_or(true);
            if expired {
                stats.expired_entries += 1;
            }
        }
        stats.active_entries = stats.total_entries - stats.expired_entries;
        stats
    }

    /// Remove all entries, optionally for one user only. Returns the
    /// number of entries removed.
    pub fn clear(&self, user_id: Option<&str>) -> Result<usize> {
        let dir = match user_id {
            Some(user) => self.root.join(sanitize_user_id(user)),
            None => self.root.clone(),
        };
        if !dir.exists() {
            return Ok(0);
        }
        let mut removed = 0;
        for entry in WalkDir::new(&dir).min_depth(1).into_iter().flatten() {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            match std::fs::remove_file(path) {
                Ok(()) => removed += 1,
                Err(e) => warn!("failed to remove {}: {}", path.display(), e),
            }
        }
        Ok(removed)
    }

    /// Remove expired entries only. Returns the number removed.
    pub fn cleanup(&self) -> Result<usize> {
        if !self.root.exists() {
            return Ok(0);
        }
        let now = Utc::now();
        let mut removed = 0;
        for entry in WalkDir::new(&self.root).min_depth(1).into_iter().flatten() {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let expired = std::fs::read_to_string(path)
                .ok()
                .and_then(|content| serde_json::from_str::<CacheEntry>(&content).ok())
                .map(|e| e.is_expired(now))
                .unwrap_or(true);
            if expired {
                match std::fs::remove_file(path) {
                    Ok(()) => removed += 1,
                    Err(e) => warn!("failed to remove {}: {}", path.display(), e),
                }
            }
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{CacheMeta, SearchResult, SearchType};
    use tempfile::TempDir;

    fn sample_result(user_id: &str, fingerprint: &str) -> PipelineResult {
        PipelineResult {
            summary: "an answer long enough to count".to_string(),
            sources: vec![SearchResult::new(
                "Title",
                "https://example.com",
                "snippet",
                "searxng",
            )],
            reasoning: vec![],
            query: "question".to_string(),
            timestamp: Utc::now(),
            user_id: user_id.to_string(),
            generated_by_llm: true,
            search_type: SearchType::Normal,
            cache_meta: CacheMeta {
                fingerprint: fingerprint.to_string(),
                cacheable: true,
            },
        }
    }

    #[test]
    fn test_put_then_get_round_trips() {
        let dir = TempDir::new().unwrap();
        let store = CacheStore::new(dir.path(), 3600);
        let result = sample_result("u1", "fp1");
        store.put(&result).unwrap();

        let cached = store.get("u1", "fp1").unwrap();
        assert_eq!(
            serde_json::to_string(&cached).unwrap(),
            serde_json::to_string(&result).unwrap()
        );
    }

    #[test]
    fn test_missing_entry_is_none() {
        let dir = TempDir::new().unwrap();
        let store = CacheStore::new(dir.path(), 3600);
        assert!(store.get("u1", "missing").is_none());
    }

    #[test]
    fn test_expired_entry_is_none() {
        let dir = TempDir::new().unwrap();
        let store = CacheStore::new(dir.path(), 3600);
        let entry = CacheEntry {
            payload: sample_result("u1", "fp1"),
            created_at: Utc::now() - chrono::Duration::days(2),
            ttl_seconds: 3600,
        };
        let path = dir.path().join("u1").join("fp1.json");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, serde_json::to_string(&entry).unwrap()).unwrap();

        assert!(store.get("u1", "fp1").is_none());
    }

    #[test]
    fn test_empty_payload_rejected() {
        let dir = TempDir::new().unwrap();
        let store = CacheStore::new(dir.path(), 3600);
        let mut result = sample_result("u1", "fp1");
        result.summary = String::new();
        result.sources.clear();
        store.put(&result).unwrap();

        assert!(store.get("u1", "fp1").is_none());
    }

    #[test]
    fn test_corrupt_entry_is_none() {
        let dir = TempDir::new().unwrap();
        let store = CacheStore::new(dir.path(), 3600);
        let path = dir.path().join("u1").join("fp1.json");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "not json at all").unwrap();

        assert!(store.get("u1", "fp1").is_none());
    }

    #[test]
    fn test_non_cacheable_not_written() {
        let dir = TempDir::new().unwrap();
        let store = CacheStore::new(dir.path(), 3600);
        let mut result = sample_result("u1", "fp1");
        result.cache_meta.cacheable = false;
        result.search_type = SearchType::QuotaExceeded;
        store.put(&result).unwrap();

        assert!(store.get("u1", "fp1").is_none());
        assert_eq!(store.stats(Some("u1")).total_entries, 0);
    }

    #[test]
    fn test_no_tmp_file_left_behind() {
        let dir = TempDir::new().unwrap();
        let store = CacheStore::new(dir.path(), 3600);
        store.put(&sample_result("u1", "fp1")).unwrap();

        let files: Vec<_> = std::fs::read_dir(dir.path().join("u1"))
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        assert_eq!(files, vec!["fp1.json".to_string()]);
    }

    #[test]
    fn test_user_id_sanitized_for_paths() {
        assert_eq!(sanitize_user_id("user@host/../x"), "user_host_.._x");
        assert_eq!(sanitize_user_id(".."), "_");
        assert_eq!(sanitize_user_id(""), "_");

        let dir = TempDir::new().unwrap();
        let store = CacheStore::new(dir.path(), 3600);
        store.put(&sample_result("user@host", "fp1")).unwrap();
        assert!(dir.path().join("user_host").join("fp1.json").exists());
        assert!(store.get("user@host", "fp1").is_some());
    }

    #[test]
    fn test_stats_and_clear() {
        let dir = TempDir::new().unwrap();
        let store = CacheStore::new(dir.path(), 3600);
        store.put(&sample_result("u1", "fp1")).unwrap();
        store.put(&sample_result("u1", "fp2")).unwrap();
        store.put(&sample_result("u2", "fp3")).unwrap();

        assert_eq!(store.stats(None).total_entries, 3);
        assert_eq!(store.stats(Some("u1")).total_entries, 2);
        assert_eq!(store.stats(None).active_entries, 3);

        assert_eq!(store.clear(Some("u1")).unwrap(), 2);
        assert_eq!(store.stats(None).total_entries, 1);
        assert_eq!(store.clear(None).unwrap(), 1);
        assert_eq!(store.stats(None).total_entries, 0);
    }

    #[test]
    fn test_cleanup_removes_only_expired() {
        let dir = TempDir::new().unwrap();
        let store = CacheStore::new(dir.path(), 3600);
        store.put(&sample_result("u1", "live")).unwrap();

        let entry = CacheEntry {
            payload: sample_result("u1", "stale"),
            created_at: Utc::now() - chrono::Duration::days(2),
            ttl_seconds: 3600,
        };
        let path = dir.path().join("u1").join("stale.json");
        std::fs::write(&path, serde_json::to_string(&entry).unwrap()).unwrap();

        assert_eq!(store.cleanup().unwrap(), 1);
        assert!(store.get("u1", "live").is_some());
        assert!(store.get("u1", "stale").is_none());
    }
}
