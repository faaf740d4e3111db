//! Chunking, embedding, and semantic reranking
//!
//! Candidates are chunks of expanded snippets. Each chunk is scored by
//! a weighted blend of cosine similarity against the query, a domain
//! prior for its parent URL, and a length prior for the chunk text.

pub mod chunker;
pub mod embed;

pub use chunker::{chunk_text, TextChunk, MIN_CHUNK_CHARS};
pub use embed::{l2_normalize, BowEmbedder, Embedder, EmbeddingCache};

use crate::config::{ChunkConfig, EmbeddingConfig, RerankConfig};
use crate::error::Result;
use crate::model::{ResultChunk, SearchResult};
use tracing::debug;

/// Scores within this margin are ties; insertion order wins
const TIE_EPSILON: f32 = 1e-6;

/// Concurrent embedding calls per run
const EMBED_CONCURRENCY: usize = 4;

/// Snippet length at which the length prior saturates
const LENGTH_PRIOR_SATURATION: f32 = 400.0;

/// A chunk with its fused rerank score
#[derive(Debug, Clone)]
pub struct ScoredChunk {
    pub chunk: ResultChunk,
    pub score: f32,
}

/// Cosine similarity. Returns 0 for mismatched dimensions or zero-norm
/// vectors rather than erroring.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}

/// Host portion of a URL, without scheme, port, or path
fn url_host(url: &str) -> &str {
    let rest = url
        .split_once("://")
        .map(|(_, rest)| rest)
        .unwrap_or(url);
    let host = rest.split(['/', '?', '#']).next().unwrap_or(rest);
    host.split(':').next().unwrap_or(host)
}

/// Trust prior for a source domain
pub fn domain_prior(url: &str) -> f32 {
    let host = url_host(url).to_lowercase();
    if host.contains("wikipedia") {
        1.0
    } else if host.ends_with(".edu") || host.ends_with(".gov") {
        0.8
    } else {
        0.5
    }
}

/// Longer candidates carry more context, saturating at 400 chars
pub fn length_prior(text: &str) -> f32 {
    (text.len() as f32 / LENGTH_PRIOR_SATURATION).min(1.0)
}

/// Descending score comparison with tie tolerance
fn compare_scores(a: f32, b: f32) -> std::cmp::Ordering {
    if (a - b).abs() <= TIE_EPSILON {
        std::cmp::Ordering::Equal
    } else {
        b.partial_cmp(&a).unwrap_or(std::cmp::Ordering::Equal)
    }
}

/// Chunking and reranking over one run's search results
pub struct Ranker {
    chunk_config: ChunkConfig,
    rerank_config: RerankConfig,
    embedding_config: EmbeddingConfig,
}

impl Ranker {
    pub fn new(
        chunk_config: ChunkConfig,
        rerank_config: RerankConfig,
        embedding_config: EmbeddingConfig,
    ) -> Self {
        Self {
            chunk_config,
            rerank_config,
            embedding_config,
        }
    }

    /// Split results into chunks, capped per result and per run
    fn collect_chunks(&self, results: &[SearchResult]) -> Vec<ResultChunk> {
        let mut chunks = Vec::new();
        for (parent, result) in results.iter().enumerate() {
            for text_chunk in chunk_text(&result.snippet, &self.chunk_config) {
                if chunks.len() >= self.chunk_config.max_per_run {
                    debug!("chunk cap reached at {}", self.chunk_config.max_per_run);
                    return chunks;
                }
                chunks.push(ResultChunk {
                    parent,
                    text: text_chunk.text,
                    start_offset: text_chunk.start,
                    end_offset: text_chunk.end,
                    embedding: None,
                    similarity: None,
                });
            }
        }
        chunks
    }

    /// Chunk, embed, and rerank. The returned list is sorted by fused
    /// score, ties keeping insertion order; callers take the top K.
    pub async fn rank(
        &self,
        embedder: &dyn Embedder,
        query: &str,
        results: &[SearchResult],
    ) -> Result<Vec<ScoredChunk>> {
        let mut chunks = self.collect_chunks(results);
        if chunks.is_empty() {
            return Ok(Vec::new());
        }

        let mut cache = EmbeddingCache::new(self.embedding_config.language.clone());
        let mut texts: Vec<&str> = Vec::with_capacity(chunks.len() + 1);
        texts.push(query);
        texts.extend(chunks.iter().map(|c| c.text.as_str()));
        cache.populate(embedder, &texts, EMBED_CONCURRENCY).await?;

        let query_vector = cache.get(query).cloned().unwrap_or_default();

        let mut scored = Vec::with_capacity(chunks.len());
        for mut chunk in chunks.drain(..) {
            let vector = cache.get(&chunk.text).cloned().unwrap_or_default();
            let similarity = cosine_similarity(&query_vector, &vector);
            let parent = &results[chunk.parent];
            let score = self.rerank_config.alpha * similarity
                + self.rerank_config.beta * domain_prior(&parent.url)
                + self.rerank_config.gamma * length_prior(&chunk.text);
            chunk.similarity = Some(similarity);
            chunk.embedding = Some(vector);
            scored.push(ScoredChunk { chunk, score });
        }

        scored.sort_by(|a, b| compare_scores(a.score, b.score));
        debug!(
            "ranked {} chunks, best score {:.4}",
            scored.len(),
            scored.first().map(|s| s.score).unwrap_or(0.0)
        );
        Ok(scored)
    }

    /// Reranked results carried into synthesis
    pub fn top_k(&self) -> usize {
        self.rerank_config.top_k
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ranker() -> Ranker {
        Ranker::new(
            ChunkConfig::default(),
            RerankConfig::default(),
            EmbeddingConfig::default(),
        )
    }

    fn result(title: &str, url: &str, snippet: &str) -> SearchResult {
        SearchResult::new(title, url, snippet, "test")
    }

    #[test]
    fn test_cosine_identical_is_one() {
        let v = vec![0.6, 0.8];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_orthogonal_is_zero() {
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]), 0.0);
    }

    #[test]
    fn test_cosine_zero_norm_is_zero() {
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]), 0.0);
    }

    #[test]
    fn test_cosine_dimension_mismatch_is_zero() {
        assert_eq!(cosine_similarity(&[1.0, 1.0], &[1.0, 1.0, 1.0]), 0.0);
    }

    #[test]
    fn test_domain_priors() {
        assert_eq!(domain_prior("https://en.wikipedia.org/wiki/Rust"), 1.0);
        assert_eq!(domain_prior("https://web.mit.edu/paper"), 0.8);
        assert_eq!(domain_prior("https://www.nasa.gov/mission"), 0.8);
        assert_eq!(domain_prior("https://example.com/page"), 0.5);
        assert_eq!(domain_prior("http://blog.example.com:8080/x"), 0.5);
        assert_eq!(domain_prior("en.wikipedia.org/wiki/Rust"), 1.0);
    }

    #[test]
    fn test_length_prior_saturates() {
        assert!(length_prior("short") < 0.1);
        assert_eq!(length_prior(&"x".repeat(400)), 1.0);
        assert_eq!(length_prior(&"x".repeat(4000)), 1.0);
    }

    #[tokio::test]
    async fn test_rank_prefers_trusted_domains() {
        let snippet = "Rust is a systems programming language focused on safety, \
                       speed, and concurrency without a garbage collector.";
        let results = vec![
            result("Blog", "https://example.com/rust", snippet),
            result("Wiki", "https://en.wikipedia.org/wiki/Rust", snippet),
        ];
        let embedder = BowEmbedder::new(128);
        let ranked = ranker()
            .rank(&embedder, "rust language", &results)
            .await
            .unwrap();
        assert_eq!(ranked.len(), 2);
        assert_eq!(ranked[0].chunk.parent, 1, "wikipedia should outrank the blog");
        assert!(ranked[0].score > ranked[1].score);
    }

    #[tokio::test]
    async fn test_rank_ties_keep_insertion_order() {
        let snippet = "The exact same snippet text appears twice with enough length.";
        let results = vec![
            result("First", "https://example.com/a", snippet),
            result("Second", "https://example.com/b", snippet),
        ];
        let embedder = BowEmbedder::new(128);
        let ranked = ranker()
            .rank(&embedder, "snippet text", &results)
            .await
            .unwrap();
        assert_eq!(ranked.len(), 2);
        assert_eq!(ranked[0].chunk.parent, 0);
        assert_eq!(ranked[1].chunk.parent, 1);
    }

    #[tokio::test]
    async fn test_rank_attaches_similarity_and_embedding() {
        let results = vec![result(
            "Doc",
            "https://example.com",
            "A snippet about asynchronous runtimes that is long enough to chunk.",
        )];
        let embedder = BowEmbedder::new(64);
        let ranked = ranker()
            .rank(&embedder, "asynchronous runtimes", &results)
            .await
            .unwrap();
        assert_eq!(ranked.len(), 1);
        assert!(ranked[0].chunk.similarity.unwrap() > 0.0);
        assert_eq!(ranked[0].chunk.embedding.as_ref().unwrap().len(), 64);
    }

    #[tokio::test]
    async fn test_rank_respects_run_cap() {
        let long = "A sentence that repeats to fill space in the snippet. ".repeat(40);
        let results: Vec<_> = (0..30)
            .map(|i| result("R", &format!("https://example.com/{i}"), &long))
            .collect();
        let embedder = BowEmbedder::new(32);
        let ranked = ranker().rank(&embedder, "space", &results).await.unwrap();
        assert!(ranked.len() <= ChunkConfig::default().max_per_run);
    }

    #[tokio::test]
    async fn test_rank_empty_results() {
        let embedder = BowEmbedder::new(32);
        let ranked = ranker().rank(&embedder, "anything", &[]).await.unwrap();
        assert!(ranked.is_empty());
    }

    #[tokio::test]
    async fn test_short_snippets_produce_no_chunks() {
        let results = vec![result("Tiny", "https://example.com", "too short")];
        let embedder = BowEmbedder::new(32);
        let ranked = ranker().rank(&embedder, "tiny", &results).await.unwrap();
        assert!(ranked.is_empty());
    }
}
