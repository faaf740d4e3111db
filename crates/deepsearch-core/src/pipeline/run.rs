//! One pipeline run, stage by stage
//!
//! The stages read top to bottom: cache, quota probe, normalize,
//! search with failover, snippet expansion, rerank, synthesis, cache
//! write. Degradations never bubble as errors; they select a fallback
//! constructor instead. Cancellation and the run deadline are checked
//! at stage boundaries.

use super::fallback;
use super::progress::{step, ProgressSender};
use super::prompt;
use super::DeepSearchEngine;
use crate::error::Result;
use crate::llm::{ChatMessage, QuotaStatus};
use crate::model::{CacheMeta, PipelineResult, Query, SearchResult, SearchType};
use crate::policy::{classify, decide, ErrorClass, PolicyAction, ProviderError};
use crate::providers::validate_results;
use crate::rank::ScoredChunk;
use crate::registry::ProviderKind;
use chrono::Utc;
use std::mem;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// An answer shorter than this is not worth serving
const MIN_ANSWER_CHARS: usize = 40;

struct RunContext<'a> {
    engine: &'a DeepSearchEngine,
    query: &'a Query,
    normalized: String,
    fingerprint: String,
    progress: Arc<ProgressSender>,
    cancel: Arc<AtomicBool>,
    deadline: Instant,
    trace: Vec<String>,
}

impl RunContext<'_> {
    fn note(&mut self, message: impl Into<String>) {
        let message = message.into();
        debug!("{message}");
        self.trace.push(message);
    }

    fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    /// Cancellation or deadline cuts the run short with whatever rung
    /// fits what has been assembled so far.
    fn interrupted(&mut self) -> Option<PipelineResult> {
        if self.cancel.load(Ordering::SeqCst) {
            self.note("run cancelled");
        } else if self.remaining().is_zero() {
            self.note("deadline exceeded");
        } else {
            return None;
        }
        Some(fallback::search_error(
            self.query,
            &self.fingerprint,
            mem::take(&mut self.trace),
        ))
    }
}

pub(super) async fn execute(
    engine: &DeepSearchEngine,
    query: &Query,
    normalized: String,
    fingerprint: String,
    progress: Arc<ProgressSender>,
    cancel: Arc<AtomicBool>,
) -> Result<PipelineResult> {
    let deadline = Instant::now() + Duration::from_millis(engine.config.pipeline.deadline_ms);
    let mut ctx = RunContext {
        engine,
        query,
        normalized,
        fingerprint,
        progress,
        cancel,
        deadline,
        trace: Vec::new(),
    };

    // Cache first: an unexpired entry short-circuits everything
    ctx.progress.emit(step::CACHE_CHECK, "checking cache");
    if let Some(mut hit) = engine.cache.get(&query.user_id, &ctx.fingerprint) {
        info!("cache hit for fingerprint {}", ctx.fingerprint);
        hit.search_type = SearchType::CacheHit;
        hit.cache_meta.cacheable = false;
        hit.reasoning.push("served from cache".to_string());
        ctx.progress.emit(step::CACHE_WRITE, "served from cache");
        return Ok(hit);
    }
    ctx.note("cache miss");

    // Quota probe: pick the LLM the run will lean on and ask the
    // backend whether it still has budget. Exhausted quota with no
    // peer left means no synthesis is possible at all, so the run
    // short-circuits before spending any search calls.
    ctx.progress.emit(step::QUOTA_PROBE, "probing llm quota");
    let mut primary_llm = None;
    if let Some(model) = query.options.model.as_deref() {
        primary_llm = engine.registry.find_llm_by_model(model);
        if primary_llm.is_none() {
            ctx.note(format!(
                "requested model \"{model}\" not available, using default"
            ));
        }
    }
    let mut primary_llm = match primary_llm.or_else(|| engine.registry.next(ProviderKind::Llm)) {
        Some(id) => id,
        None => {
            ctx.note("no llm provider available");
            return Ok(fallback::quota_exceeded(
                query,
                &ctx.fingerprint,
                mem::take(&mut ctx.trace),
            ));
        }
    };
    if let Some(adapter) = engine.llm_adapters.get(&primary_llm) {
        let probe_timeout = engine.llm_call_timeout(&primary_llm).min(ctx.remaining());
        let status = match tokio::time::timeout(probe_timeout, adapter.probe_quota()).await {
            Ok(status) => status,
            Err(_) => {
                ctx.note("quota probe timed out, assuming available");
                QuotaStatus::Unknown
            }
        };
        if status.is_exhausted() {
            ctx.note(format!("llm {primary_llm} has no quota left today"));
            engine
                .registry
                .mark_failure(&primary_llm, ErrorClass::QuotaExhausted);
            match engine.registry.next(ProviderKind::Llm) {
                Some(peer) => {
                    ctx.note(format!("failing over to llm {peer}"));
                    primary_llm = peer;
                }
                None => {
                    ctx.note("no llm with remaining quota");
                    return Ok(fallback::quota_exceeded(
                        query,
                        &ctx.fingerprint,
                        mem::take(&mut ctx.trace),
                    ));
                }
            }
        } else if let QuotaStatus::Known { remaining, limit } = status {
            ctx.note(format!("llm quota: {remaining} of {limit} remaining"));
        } else {
            ctx.note("llm quota unknown, assuming available");
        }
    }

    ctx.progress.emit(step::NORMALIZE, "normalizing query");
    ctx.note(format!("normalized query: \"{}\"", ctx.normalized));
    if let Some(done) = ctx.interrupted() {
        return Ok(done);
    }

    // Search with sequential failover over the registered backends
    ctx.progress.emit(step::SEARCH, "searching the web");
    let searched = search_with_failover(&mut ctx).await;
    if let Some(done) = ctx.interrupted() {
        return Ok(done);
    }
    let (provider_id, mut results) = match searched {
        Some(found) => found,
        None => {
            ctx.note("every search provider failed");
            return Ok(knowledge_only_answer(&mut ctx, &primary_llm).await);
        }
    };
    if let Some(cap) = query.options.max_results {
        if results.len() > cap {
            ctx.note(format!("kept top {cap} of {} results", results.len()));
            results.truncate(cap);
        }
    }
    if results.is_empty() {
        ctx.note("search returned zero usable results");
        return Ok(knowledge_only_answer(&mut ctx, &primary_llm).await);
    }

    // Weak snippets get a second chance from the page itself or, if
    // quota allows, a model-written summary
    ctx.progress.emit(step::EXPAND, "expanding weak snippets");
    if let Some(adapter) = engine.search_adapters.get(&provider_id) {
        let expand_llm = (!engine.registry.is_exhausted(&primary_llm))
            .then(|| engine.llm_adapters.get(&primary_llm))
            .flatten()
            .map(|a| a.as_ref());
        let notes = engine
            .expander
            .expand(adapter.as_ref(), expand_llm, &mut results)
            .await;
        ctx.trace.extend(notes);
    }
    if let Some(done) = ctx.interrupted() {
        return Ok(done);
    }

    ctx.progress.emit(step::RERANK, "ranking evidence");
    let ranked = match engine
        .ranker
        .rank(engine.embedder.as_ref(), &ctx.normalized, &results)
        .await
    {
        Ok(ranked) => ranked,
        Err(e) => {
            ctx.note(format!("ranking failed: {e}"));
            Vec::new()
        }
    };
    let top = &ranked[..ranked.len().min(engine.ranker.top_k())];
    let strong = top
        .iter()
        .any(|scored| !engine.expander.is_weak(&results[scored.chunk.parent].snippet));
    if top.is_empty() || !strong {
        ctx.note("top-ranked evidence too weak to synthesize from");
        return Ok(knowledge_only_answer(&mut ctx, &primary_llm).await);
    }
    if let Some(done) = ctx.interrupted() {
        return Ok(done);
    }

    // Plan sections: one per distinct top-ranked source, best first
    ctx.progress.emit(step::SYNTH_PREP, "planning answer sections");
    let parent_order = distinct_parents(top);
    let sources: Vec<SearchResult> = parent_order.iter().map(|&p| results[p].clone()).collect();
    let section_count = engine.config.subtopics.max.min(parent_order.len()).max(1);
    let subtopics: Vec<String> = parent_order
        .iter()
        .take(section_count)
        .map(|&p| results[p].title.clone())
        .collect();
    ctx.note(format!(
        "synthesizing {} sections from {} sources",
        subtopics.len(),
        sources.len()
    ));

    // Sections run in parallel; the join preserves declared order
    let section_inputs: Vec<(usize, String, Vec<ChatMessage>)> = subtopics
        .iter()
        .enumerate()
        .map(|(i, title)| {
            (
                i,
                title.clone(),
                prompt::section_messages(&query.raw, title, &sources),
            )
        })
        .collect();
    for (i, title, _) in &section_inputs {
        ctx.progress.emit(
            step::SYNTH_SECTION_BASE + (*i).min(2),
            format!("synthesizing \"{title}\""),
        );
    }
    let deadline = ctx.deadline;
    let preferred = primary_llm.clone();
    let section_futures: Vec<_> = section_inputs
        .into_iter()
        .map(|(i, title, messages)| {
            let preferred = preferred.clone();
            async move {
                let (outcome, notes) =
                    generate_with_failover(engine, deadline, &messages, Some(&preferred)).await;
                (i, title, outcome, notes)
            }
        })
        .collect();
    let outcomes = futures::future::join_all(section_futures).await;

    let mut sections: Vec<(String, String)> = Vec::new();
    let mut quota_died = false;
    for (_i, title, outcome, notes) in outcomes {
        ctx.trace.extend(notes);
        match outcome {
            Ok(text) if !text.trim().is_empty() => sections.push((title, text)),
            Ok(_) => ctx.note(format!("section \"{title}\" came back empty, dropped")),
            Err(class) => {
                if class == Some(ErrorClass::QuotaExhausted) {
                    quota_died = true;
                }
                ctx.note(format!("section \"{title}\" failed, dropped"));
            }
        }
    }
    if sections.is_empty() {
        ctx.note("all sections failed");
        return Ok(if quota_died {
            fallback::quota_exceeded(query, &ctx.fingerprint, mem::take(&mut ctx.trace))
        } else {
            fallback::search_error(query, &ctx.fingerprint, mem::take(&mut ctx.trace))
        });
    }

    ctx.progress.emit(step::ASSEMBLE, "assembling answer");
    let summary = prompt::assemble_answer(&sections);
    if summary.trim().len() < MIN_ANSWER_CHARS {
        ctx.note("assembled answer too short to serve");
        return Ok(knowledge_only_answer(&mut ctx, &primary_llm).await);
    }
    ctx.note(format!("assembled answer from {} sections", sections.len()));
    let mut result = PipelineResult {
        summary,
        sources,
        reasoning: mem::take(&mut ctx.trace),
        query: query.raw.clone(),
        timestamp: Utc::now(),
        user_id: query.user_id.clone(),
        generated_by_llm: true,
        search_type: SearchType::Normal,
        cache_meta: CacheMeta {
            fingerprint: ctx.fingerprint.clone(),
            cacheable: true,
        },
    };

    // Cache problems are logged, never surfaced
    ctx.progress.emit(step::CACHE_WRITE, "writing cache");
    if let Err(e) = engine.cache.put(&result) {
        warn!("cache write failed for {}: {e}", result.cache_meta.fingerprint);
        result.reasoning.push(format!("cache write failed: {e}"));
    }
    Ok(result)
}

/// Walk the eligible search providers in order. Per provider, retry on
/// transient classes with exponential backoff, then fail over. `None`
/// means every provider was exhausted without a usable response.
async fn search_with_failover(ctx: &mut RunContext<'_>) -> Option<(String, Vec<SearchResult>)> {
    let engine = ctx.engine;
    let retry = engine.config.retry.clone();
    let query_text = ctx.normalized.clone();

    for id in engine.registry.candidates(ProviderKind::Search) {
        let Some(adapter) = engine.search_adapters.get(&id) else {
            continue;
        };
        let mut attempt = 1u32;
        loop {
            if ctx.remaining().is_zero() || ctx.cancel.load(Ordering::SeqCst) {
                return None;
            }
            engine.registry.record_request(&id);
            let call_timeout = engine.search_call_timeout(&id).min(ctx.remaining());
            let outcome =
                match tokio::time::timeout(call_timeout, adapter.search(&query_text)).await {
                    Ok(inner) => inner,
                    Err(_) => Err(ProviderError::new(format!(
                        "search timed out after {}ms",
                        call_timeout.as_millis()
                    ))
                    .with_class(ErrorClass::Transient)),
                };
            match outcome {
                Ok(rows) => {
                    engine.registry.mark_success(&id);
                    let validated = validate_results(rows);
                    ctx.note(format!("search via {id}: {} results", validated.len()));
                    return Some((id, validated));
                }
                Err(error) => {
                    let class = classify(&error, &retry.matchers);
                    engine.registry.mark_failure(&id, class);
                    ctx.note(format!(
                        "search {id} attempt {attempt} failed ({class:?}): {error}"
                    ));
                    match decide(class, attempt, &retry) {
                        PolicyAction::RetryAfterMs(delay) => {
                            tokio::time::sleep(
                                Duration::from_millis(delay).min(ctx.remaining()),
                            )
                            .await;
                            attempt += 1;
                        }
                        PolicyAction::Failover => break,
                    }
                }
            }
        }
    }
    None
}

/// Call an LLM with per-provider retries and failover, preferred
/// provider first. Returns the response or the class of the last
/// failure, plus trace notes for the caller to merge.
async fn generate_with_failover(
    engine: &DeepSearchEngine,
    deadline: Instant,
    messages: &[ChatMessage],
    preferred: Option<&str>,
) -> (
    std::result::Result<String, Option<ErrorClass>>,
    Vec<String>,
) {
    let retry = &engine.config.retry;
    let mut notes = Vec::new();
    let mut last_class = None;

    let mut order = engine.registry.candidates(ProviderKind::Llm);
    if let Some(wanted) = preferred {
        if let Some(pos) = order.iter().position(|id| id == wanted) {
            let id = order.remove(pos);
            order.insert(0, id);
        }
    }

    for id in order {
        let Some(adapter) = engine.llm_adapters.get(&id) else {
            continue;
        };
        let mut attempt = 1u32;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                notes.push("llm call skipped, deadline exhausted".to_string());
                return (Err(last_class), notes);
            }
            engine.registry.record_request(&id);
            let call_timeout = engine.llm_call_timeout(&id).min(remaining);
            let outcome = match tokio::time::timeout(
                call_timeout,
                adapter.generate(messages.to_vec()),
            )
            .await
            {
                Ok(inner) => inner,
                Err(_) => Err(ProviderError::new(format!(
                    "llm call timed out after {}ms",
                    call_timeout.as_millis()
                ))
                .with_class(ErrorClass::Transient)),
            };
            match outcome {
                Ok(text) => {
                    engine.registry.mark_success(&id);
                    notes.push(format!("llm {id} answered on attempt {attempt}"));
                    return (Ok(text), notes);
                }
                Err(error) => {
                    let class = classify(&error, &retry.matchers);
                    engine.registry.mark_failure(&id, class);
                    notes.push(format!(
                        "llm {id} attempt {attempt} failed ({class:?}): {error}"
                    ));
                    last_class = Some(class);
                    match decide(class, attempt, retry) {
                        PolicyAction::RetryAfterMs(delay) => {
                            tokio::time::sleep(Duration::from_millis(delay).min(remaining)).await;
                            attempt += 1;
                        }
                        PolicyAction::Failover => break,
                    }
                }
            }
        }
    }
    (Err(last_class), notes)
}

/// Search gave nothing usable; ask the model to answer on its own.
/// Degrades further down the cascade when even that fails.
async fn knowledge_only_answer(ctx: &mut RunContext<'_>, preferred: &str) -> PipelineResult {
    ctx.note("answering from model knowledge only");
    let messages = prompt::llm_only_messages(&ctx.query.raw);
    let (outcome, notes) =
        generate_with_failover(ctx.engine, ctx.deadline, &messages, Some(preferred)).await;
    ctx.trace.extend(notes);
    match outcome {
        Ok(text) if text.trim().len() >= MIN_ANSWER_CHARS => fallback::llm_only(
            ctx.query,
            &ctx.fingerprint,
            text,
            mem::take(&mut ctx.trace),
        ),
        Ok(_) => {
            ctx.note("model answer too short to serve");
            fallback::search_error(ctx.query, &ctx.fingerprint, mem::take(&mut ctx.trace))
        }
        Err(Some(ErrorClass::QuotaExhausted)) => {
            fallback::quota_exceeded(ctx.query, &ctx.fingerprint, mem::take(&mut ctx.trace))
        }
        Err(_) => fallback::search_error(ctx.query, &ctx.fingerprint, mem::take(&mut ctx.trace)),
    }
}

/// Distinct parent indices of the top chunks, in rank order
fn distinct_parents(top: &[ScoredChunk]) -> Vec<usize> {
    let mut order = Vec::new();
    for scored in top {
        if !order.contains(&scored.chunk.parent) {
            order.push(scored.chunk.parent);
        }
    }
    order
}
