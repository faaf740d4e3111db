//! Text embedding
//!
//! The default embedder is a deterministic bag-of-words hasher, good
//! enough to rank snippets without a model server. The trait is async
//! so a remote neural embedder can slot in behind the same contract.

use crate::config::EmbeddingConfig;
use crate::error::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use tracing::debug;

/// Embedding generation trait
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Generate embedding for a single text
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Get embedding dimensions
    fn dimensions(&self) -> usize;

    /// Get model name
    fn model_name(&self) -> &str;
}

/// Deterministic hashed bag-of-words embedder
pub struct BowEmbedder {
    dimension: usize,
}

impl BowEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self { dimension }
    }

    pub fn from_config(config: &EmbeddingConfig) -> Self {
        Self::new(config.dimension)
    }

    /// Stable token bucket in [0, dimension)
    fn bucket(&self, token: &str) -> usize {
        let hash = blake3::hash(token.as_bytes());
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&hash.as_bytes()[..8]);
        (u64::from_le_bytes(bytes) % self.dimension as u64) as usize
    }

    /// Embed without the async ceremony; identical input yields an
    /// identical vector, leading and trailing whitespace is ignored.
    pub fn embed_sync(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimension];
        for token in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            let token = token.to_lowercase();
            vector[self.bucket(&token)] += 1.0;
        }
        l2_normalize(&mut vector);
        vector
    }
}

#[async_trait]
impl Embedder for BowEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        Ok(self.embed_sync(text))
    }

    fn dimensions(&self) -> usize {
        self.dimension
    }

    fn model_name(&self) -> &str {
        "bow-hash"
    }
}

/// Scale a vector to unit length, leaving zero vectors untouched
pub fn l2_normalize(vector: &mut [f32]) {
    let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in vector.iter_mut() {
            *x /= norm;
        }
    }
}

/// Run-local embedding cache, partitioned by language tag. Populated
/// once per run, then read without locking.
pub struct EmbeddingCache {
    language: String,
    entries: HashMap<String, Vec<f32>>,
}

impl EmbeddingCache {
    pub fn new(language: impl Into<String>) -> Self {
        Self {
            language: language.into(),
            entries: HashMap::new(),
        }
    }

    fn key(&self, text: &str) -> String {
        format!("{}:{}", self.language, text.trim())
    }

    /// Embed all texts not yet cached, up to `max_concurrent` at a time.
    /// Results keep input order internally, so repeated texts resolve to
    /// the same vector.
    pub async fn populate(
        &mut self,
        embedder: &dyn Embedder,
        texts: &[&str],
        max_concurrent: usize,
    ) -> Result<()> {
        use futures::stream::{self, StreamExt};

        let pending: Vec<String> = texts
            .iter()
            .map(|t| t.trim().to_string())
            .filter(|t| !self.entries.contains_key(&self.key(t)))
            .collect();
        if pending.is_empty() {
            return Ok(());
        }
        debug!("embedding {} texts", pending.len());

        // Futures are built eagerly so the stream type carries no closure;
        // a closure returning an async block here fails the higher-ranked
        // lifetime check when the enclosing future is tokio::spawn-ed
        // (rust-lang/rust#89976). buffer_unordered still caps execution.
        let embed_futures: Vec<_> = pending
            .iter()
            .enumerate()
            .map(|(idx, text)| async move { (idx, embedder.embed(text).await) })
            .collect();
        let results: Vec<(usize, Result<Vec<f32>>)> = stream::iter(embed_futures)
            .buffer_unordered(max_concurrent.max(1))
            .collect()
            .await;

        let mut sorted = results;
        sorted.sort_by_key(|(idx, _)| *idx);
        for (idx, result) in sorted {
            let vector = result?;
            let key = self.key(&pending[idx]);
            self.entries.insert(key, vector);
        }
        Ok(())
    }

    /// Cached vector for a text, if `populate` saw it
    pub fn get(&self, text: &str) -> Option<&Vec<f32>> {
        self.entries.get(&self.key(text))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_embedding_is_deterministic() {
        let embedder = BowEmbedder::new(128);
        assert_eq!(
            embedder.embed_sync("quantum computing basics"),
            embedder.embed_sync("quantum computing basics")
        );
    }

    #[test]
    fn test_whitespace_invariance() {
        let embedder = BowEmbedder::new(128);
        assert_eq!(
            embedder.embed_sync("  rust async runtime "),
            embedder.embed_sync("rust async runtime")
        );
    }

    #[test]
    fn test_vectors_are_unit_length() {
        let embedder = BowEmbedder::new(64);
        let v = embedder.embed_sync("some text with several words in it");
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_empty_text_is_zero_vector() {
        let embedder = BowEmbedder::new(64);
        let v = embedder.embed_sync("   ");
        assert!(v.iter().all(|x| *x == 0.0));
    }

    #[test]
    fn test_similar_texts_share_mass() {
        let embedder = BowEmbedder::new(128);
        let a = embedder.embed_sync("rust is a systems programming language");
        let b = embedder.embed_sync("rust is a language for systems work");
        let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
        assert!(dot > 0.0);
    }

    #[tokio::test]
    async fn test_cache_populate_and_get() {
        let embedder = BowEmbedder::new(32);
        let mut cache = EmbeddingCache::new("en");
        cache
            .populate(&embedder, &["first text here", "second text here"], 4)
            .await
            .unwrap();
        assert_eq!(cache.len(), 2);
        assert!(cache.get("first text here").is_some());
        assert!(cache.get(" first text here ").is_some());
        assert!(cache.get("unseen").is_none());
    }

    #[tokio::test]
    async fn test_cache_partitioned_by_language() {
        let embedder = BowEmbedder::new(32);
        let mut en = EmbeddingCache::new("en");
        let mut de = EmbeddingCache::new("de");
        en.populate(&embedder, &["hello"], 1).await.unwrap();
        de.populate(&embedder, &["hello"], 1).await.unwrap();
        assert_ne!(en.key("hello"), de.key("hello"));
    }
}
