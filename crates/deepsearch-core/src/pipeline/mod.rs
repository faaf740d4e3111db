//! Pipeline orchestration
//!
//! [`DeepSearchEngine`] owns the provider adapters, the registry, the
//! cache, and the concurrency machinery, and drives one query through
//! the staged pipeline. Degraded outcomes are ordinary results with a
//! fallback `search_type`; the only hard errors a caller sees are
//! invalid requests and a full admission queue.

pub mod fallback;
pub mod progress;
pub mod prompt;
mod run;

pub use progress::{ProgressHub, ProgressSender, STEPS};

use crate::cache::CacheStore;
use crate::config::{self, Config};
use crate::error::{DeepSearchError, Result};
use crate::expand::SnippetExpander;
use crate::llm::{LlmProvider, OpenAiProvider};
use crate::model::{PipelineResult, ProgressEvent, Query, RunId};
use crate::providers::{SearchProvider, SearxngProvider, TavilyProvider};
use crate::query::{fingerprint, normalize};
use crate::rank::{BowEmbedder, Embedder, Ranker};
use crate::registry::{ProviderKind, ProviderRegistry};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{broadcast, Semaphore};
use tracing::info;

/// Membership guard for the in-flight set. Inserting fails when an
/// identical run is active; dropping releases the slot on every exit
/// path.
struct SingleFlight<'a> {
    set: &'a Mutex<HashSet<String>>,
    key: String,
}

impl<'a> SingleFlight<'a> {
    fn acquire(set: &'a Mutex<HashSet<String>>, key: &str) -> Option<Self> {
        let mut in_flight = set.lock().unwrap_or_else(|e| e.into_inner());
        if !in_flight.insert(key.to_string()) {
            return None;
        }
        Some(Self {
            set,
            key: key.to_string(),
        })
    }
}

impl Drop for SingleFlight<'_> {
    fn drop(&mut self) {
        let mut in_flight = self.set.lock().unwrap_or_else(|e| e.into_inner());
        in_flight.remove(&self.key);
    }
}

/// A spawned run: its id, its progress stream, and its eventual result
pub struct RunHandle {
    pub run_id: RunId,
    pub progress: broadcast::Receiver<ProgressEvent>,
    task: tokio::task::JoinHandle<Result<PipelineResult>>,
}

impl RunHandle {
    /// Wait for the run to finish
    pub async fn wait(self) -> Result<PipelineResult> {
        match self.task.await {
            Ok(result) => result,
            Err(e) => Err(DeepSearchError::Other(anyhow::anyhow!(
                "pipeline task failed: {e}"
            ))),
        }
    }
}

/// The deep-search pipeline
pub struct DeepSearchEngine {
    pub(crate) config: Config,
    pub(crate) cache: CacheStore,
    pub(crate) registry: ProviderRegistry,
    pub(crate) search_adapters: HashMap<String, Arc<dyn SearchProvider>>,
    pub(crate) llm_adapters: HashMap<String, Arc<dyn LlmProvider>>,
    pub(crate) embedder: Arc<dyn Embedder>,
    pub(crate) ranker: Ranker,
    pub(crate) expander: SnippetExpander,

    in_flight: Mutex<HashSet<String>>,
    cancel_flags: Mutex<HashMap<RunId, Arc<AtomicBool>>>,
    run_slots: Arc<Semaphore>,
    queue_slots: Arc<Semaphore>,
    run_seq: AtomicU64,
    progress: ProgressHub,
}

impl DeepSearchEngine {
    /// Build the engine with adapters instantiated from configuration
    pub fn new(config: Config) -> Result<Self> {
        let mut search: Vec<(String, Arc<dyn SearchProvider>)> = Vec::new();
        for declared in &config.providers.search {
            let adapter: Arc<dyn SearchProvider> = match declared.kind.as_str() {
                "searxng" => Arc::new(SearxngProvider::new(declared)),
                "tavily" => Arc::new(TavilyProvider::new(declared)),
                other => {
                    return Err(DeepSearchError::Config(format!(
                        "unknown search provider kind: {other}"
                    )))
                }
            };
            search.push((declared.id.clone(), adapter));
        }

        let mut llms: Vec<(String, Arc<dyn LlmProvider>)> = Vec::new();
        for declared in &config.providers.llm {
            let adapter: Arc<dyn LlmProvider> = match declared.kind.as_str() {
                "openai" => Arc::new(OpenAiProvider::new(declared)),
                other => {
                    return Err(DeepSearchError::Config(format!(
                        "unknown llm provider kind: {other}"
                    )))
                }
            };
            llms.push((declared.id.clone(), adapter));
        }

        Ok(Self::with_providers(config, search, llms))
    }

    /// Build the engine around caller-supplied adapters. Registration
    /// order is failover order; quota and model metadata are taken from
    /// matching config entries when present.
    pub fn with_providers(
        config: Config,
        search: Vec<(String, Arc<dyn SearchProvider>)>,
        llms: Vec<(String, Arc<dyn LlmProvider>)>,
    ) -> Self {
        let registry = ProviderRegistry::new();

        let mut search_adapters = HashMap::new();
        for (id, adapter) in search {
            let quota = config
                .providers
                .search
                .iter()
                .find(|p| p.id == id)
                .and_then(|p| p.daily_quota);
            registry.register(&id, ProviderKind::Search, None, quota);
            search_adapters.insert(id, adapter);
        }

        let mut llm_adapters = HashMap::new();
        for (id, adapter) in llms {
            let declared = config.providers.llm.iter().find(|p| p.id == id);
            let model = declared
                .map(|p| p.model.clone())
                .unwrap_or_else(|| adapter.model_name().to_string());
            let quota = declared.and_then(|p| p.daily_quota);
            registry.register(&id, ProviderKind::Llm, Some(model), quota);
            llm_adapters.insert(id, adapter);
        }

        let embedder: Arc<dyn Embedder> = Arc::new(BowEmbedder::from_config(&config.embedding));
        registry.register(
            "bow",
            ProviderKind::Embedding,
            Some(embedder.model_name().to_string()),
            None,
        );

        let cache = CacheStore::from_config(&config.cache);
        let ranker = Ranker::new(config.chunk, config.rerank, config.embedding.clone());
        let expander = SnippetExpander::new(config.expand);

        let capacity = config.pipeline.global_concurrency;
        let queue = capacity + config.pipeline.queue_bound;

        Self {
            config,
            cache,
            registry,
            search_adapters,
            llm_adapters,
            embedder,
            ranker,
            expander,
            in_flight: Mutex::new(HashSet::new()),
            cancel_flags: Mutex::new(HashMap::new()),
            run_slots: Arc::new(Semaphore::new(capacity)),
            queue_slots: Arc::new(Semaphore::new(queue)),
            run_seq: AtomicU64::new(0),
            progress: ProgressHub::new(),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn cache(&self) -> &CacheStore {
        &self.cache
    }

    pub fn registry(&self) -> &ProviderRegistry {
        &self.registry
    }

    /// Run a query through the pipeline and wait for the result
    pub async fn search(&self, query: Query) -> Result<PipelineResult> {
        let run_id = self.next_run_id();
        self.search_inner(run_id, query).await
    }

    /// Spawn a run and return a handle carrying its progress stream.
    /// The stream is open before the run starts, so no event is missed.
    pub fn start_search(self: &Arc<Self>, query: Query) -> RunHandle {
        let run_id = self.next_run_id();
        let sender = self.progress.get_or_create(run_id);
        let receiver = sender.subscribe();
        let engine = self.clone();
        let task = tokio::spawn(async move { engine.search_inner(run_id, query).await });
        RunHandle {
            run_id,
            progress: receiver,
            task,
        }
    }

    /// Subscribe to a running query's progress events
    pub fn subscribe_progress(&self, run_id: RunId) -> Option<broadcast::Receiver<ProgressEvent>> {
        self.progress.subscribe(run_id)
    }

    /// Request cooperative cancellation. Returns false for unknown or
    /// finished runs.
    pub fn cancel(&self, run_id: RunId) -> bool {
        let flags = self.cancel_flags.lock().unwrap_or_else(|e| e.into_inner());
        match flags.get(&run_id) {
            Some(flag) => {
                flag.store(true, Ordering::SeqCst);
                true
            }
            None => false,
        }
    }

    fn next_run_id(&self) -> RunId {
        self.run_seq.fetch_add(1, Ordering::Relaxed) + 1
    }

    async fn search_inner(&self, run_id: RunId, query: Query) -> Result<PipelineResult> {
        let result = self.run_admitted(run_id, &query).await;
        self.progress.remove(run_id);
        let mut flags = self.cancel_flags.lock().unwrap_or_else(|e| e.into_inner());
        flags.remove(&run_id);
        drop(flags);
        result
    }

    async fn run_admitted(&self, run_id: RunId, query: &Query) -> Result<PipelineResult> {
        query.validate()?;

        // Admission: a queue slot must be free right now, a run slot is
        // waited for. Both are held for the whole run.
        let _queue_slot = match self.queue_slots.clone().try_acquire_owned() {
            Ok(permit) => permit,
            Err(_) => {
                return Err(DeepSearchError::QueueFull {
                    retry_after_ms: self.config.retry.base_delay_ms,
                })
            }
        };
        let _run_slot = self
            .run_slots
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| DeepSearchError::Provider("engine is shutting down".to_string()))?;

        let normalized = normalize(&query.raw, &query.history);
        let fp = fingerprint(&query.user_id, &normalized, query.options.model.as_deref());

        let _flight = match SingleFlight::acquire(&self.in_flight, &fp) {
            Some(guard) => guard,
            None => {
                info!("duplicate run suppressed for fingerprint {fp}");
                return Ok(fallback::already_in_progress(query, &fp));
            }
        };

        let sender = self.progress.get_or_create(run_id);
        let cancel = Arc::new(AtomicBool::new(false));
        {
            let mut flags = self.cancel_flags.lock().unwrap_or_else(|e| e.into_inner());
            flags.insert(run_id, cancel.clone());
        }
        let watchdog = self
            .config
            .pipeline
            .watchdog
            .then(|| progress::spawn_watchdog(sender.clone()));

        let result = run::execute(self, query, normalized, fp, sender, cancel).await;

        if let Some(handle) = watchdog {
            handle.abort();
        }
        result
    }

    /// Per-call timeout for a search provider
    pub(crate) fn search_call_timeout(&self, id: &str) -> Duration {
        let ms = self
            .config
            .providers
            .search
            .iter()
            .find(|p| p.id == id)
            .map(|p| p.timeout_ms)
            .unwrap_or_else(config::default_search_timeout_ms);
        Duration::from_millis(ms)
    }

    /// Per-call timeout for an LLM provider
    pub(crate) fn llm_call_timeout(&self, id: &str) -> Duration {
        let ms = self
            .config
            .providers
            .llm
            .iter()
            .find(|p| p.id == id)
            .map(|p| p.timeout_ms)
            .unwrap_or_else(config::default_llm_timeout_ms);
        Duration::from_millis(ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::SearchType;

    fn engine() -> DeepSearchEngine {
        let mut config = Config::default();
        config.cache.root = std::env::temp_dir().join("deepsearch-engine-test-cache");
        DeepSearchEngine::with_providers(config, Vec::new(), Vec::new())
    }

    #[test]
    fn test_single_flight_blocks_duplicates() {
        let set = Mutex::new(HashSet::new());
        let first = SingleFlight::acquire(&set, "fp");
        assert!(first.is_some());
        assert!(SingleFlight::acquire(&set, "fp").is_none());
        drop(first);
        assert!(SingleFlight::acquire(&set, "fp").is_some());
    }

    #[test]
    fn test_unknown_provider_kind_rejected() {
        let mut config = Config::default();
        config.providers.search.push(crate::config::SearchProviderConfig {
            id: "mystery".to_string(),
            kind: "mystery".to_string(),
            base_url: "https://example.com".to_string(),
            api_key: None,
            daily_quota: None,
            timeout_ms: 1000,
            max_results: 5,
        });
        let err = DeepSearchEngine::new(config).err().map(|e| e.to_string());
        assert!(err.unwrap().contains("unknown search provider kind"));
    }

    #[tokio::test]
    async fn test_empty_query_rejected() {
        let engine = engine();
        let err = engine.search(Query::new("   ", "u1")).await.err();
        assert!(matches!(err, Some(DeepSearchError::InvalidRequest(_))));
    }

    #[tokio::test]
    async fn test_no_llm_provider_degrades_to_quota_fallback() {
        let engine = engine();
        let result = engine
            .search(Query::new("completely unique question", "u1"))
            .await
            .unwrap();
        assert_eq!(result.search_type, SearchType::QuotaExceeded);
        assert!(!result.cache_meta.cacheable);
    }

    #[test]
    fn test_cancel_unknown_run() {
        let engine = engine();
        assert!(!engine.cancel(999));
    }

    #[test]
    fn test_run_ids_are_unique() {
        let engine = engine();
        let a = engine.next_run_id();
        let b = engine.next_run_id();
        assert_ne!(a, b);
    }
}
