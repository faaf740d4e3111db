//! Per-run progress stream
//!
//! Steps are declared up front; the orchestrator emits one event per
//! step transition, in order, at most once. Subscribers attach through
//! the hub by run id. An optional watchdog re-emits the current step
//! once a second flagged `keepalive` so slow stages do not look stuck.

use crate::model::{ProgressEvent, RunId};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::atomic::{AtomicIsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;
use tracing::debug;

/// Declared pipeline steps, in execution order
pub const STEPS: &[&str] = &[
    "cache-check",
    "quota-probe",
    "normalize",
    "search",
    "expand-snippets",
    "chunk-embed-rerank",
    "synth-prep",
    "synth-section-1",
    "synth-section-2",
    "synth-section-3",
    "assemble",
    "cache-write",
];

/// Indices into [`STEPS`]
pub mod step {
    pub const CACHE_CHECK: usize = 0;
    pub const QUOTA_PROBE: usize = 1;
    pub const NORMALIZE: usize = 2;
    pub const SEARCH: usize = 3;
    pub const EXPAND: usize = 4;
    pub const RERANK: usize = 5;
    pub const SYNTH_PREP: usize = 6;

    /// First of three section slots
    pub const SYNTH_SECTION_BASE: usize = 7;

    pub const ASSEMBLE: usize = 10;
    pub const CACHE_WRITE: usize = 11;
}

/// Buffered events per subscriber before lag kicks in
const CHANNEL_CAPACITY: usize = 64;

/// Emitter half of one run's progress stream
pub struct ProgressSender {
    tx: broadcast::Sender<ProgressEvent>,
    last_step: AtomicIsize,
}

impl ProgressSender {
    fn new(tx: broadcast::Sender<ProgressEvent>) -> Self {
        Self {
            tx,
            last_step: AtomicIsize::new(-1),
        }
    }

    /// Emit a step transition. Repeated or backwards indices are
    /// dropped, which keeps the stream monotonic even if a stage
    /// retries.
    pub fn emit(&self, step_index: usize, message: impl Into<String>) {
        let index = step_index as isize;
        let previous = self.last_step.fetch_max(index, Ordering::SeqCst);
        if index <= previous {
            debug!("suppressing duplicate progress emission for step {step_index}");
            return;
        }
        let event = ProgressEvent {
            step_index,
            total_steps: STEPS.len(),
            message: message.into(),
            timestamp: Utc::now(),
            keepalive: false,
        };
        // Send fails only when nobody is subscribed, which is fine
        let _ = self.tx.send(event);
    }

    /// Re-emit the current step as a keepalive
    pub fn emit_keepalive(&self) {
        let current = self.last_step.load(Ordering::SeqCst);
        if current < 0 {
            return;
        }
        let step_index = current as usize;
        let event = ProgressEvent {
            step_index,
            total_steps: STEPS.len(),
            message: STEPS.get(step_index).copied().unwrap_or("").to_string(),
            timestamp: Utc::now(),
            keepalive: true,
        };
        let _ = self.tx.send(event);
    }

    /// Index of the most recently emitted step, if any
    pub fn current_step(&self) -> Option<usize> {
        let current = self.last_step.load(Ordering::SeqCst);
        (current >= 0).then_some(current as usize)
    }

    /// Attach a new receiver to this run's stream
    pub fn subscribe(&self) -> broadcast::Receiver<ProgressEvent> {
        self.tx.subscribe()
    }
}

/// Spawn a 1s keepalive loop for a sender; abort the handle when the
/// run finishes.
pub fn spawn_watchdog(sender: Arc<ProgressSender>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(1));
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        // The first tick fires immediately; skip it
        interval.tick().await;
        loop {
            interval.tick().await;
            sender.emit_keepalive();
        }
    })
}

/// Registry of active run streams
pub struct ProgressHub {
    channels: Mutex<HashMap<RunId, Arc<ProgressSender>>>,
}

impl ProgressHub {
    pub fn new() -> Self {
        Self {
            channels: Mutex::new(HashMap::new()),
        }
    }

    /// Open the stream for a new run
    pub fn create(&self, run_id: RunId) -> Arc<ProgressSender> {
        let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        let sender = Arc::new(ProgressSender::new(tx));
        let mut channels = self.channels.lock().unwrap_or_else(|e| e.into_inner());
        channels.insert(run_id, sender.clone());
        sender
    }

    /// Reuse a stream opened by the caller, or open one. Lets a handle
    /// subscribe before the run task starts emitting.
    pub fn get_or_create(&self, run_id: RunId) -> Arc<ProgressSender> {
        {
            let channels = self.channels.lock().unwrap_or_else(|e| e.into_inner());
            if let Some(sender) = channels.get(&run_id) {
                return sender.clone();
            }
        }
        self.create(run_id)
    }

    /// Subscribe to a run's events. `None` when the run is unknown or
    /// already finished.
    pub fn subscribe(&self, run_id: RunId) -> Option<broadcast::Receiver<ProgressEvent>> {
        let channels = self.channels.lock().unwrap_or_else(|e| e.into_inner());
        channels.get(&run_id).map(|sender| sender.tx.subscribe())
    }

    /// Drop a finished run's stream
    pub fn remove(&self, run_id: RunId) {
        let mut channels = self.channels.lock().unwrap_or_else(|e| e.into_inner());
        channels.remove(&run_id);
    }
}

impl Default for ProgressHub {
    fn default() -> Self {
        Self::new()
    }
}
