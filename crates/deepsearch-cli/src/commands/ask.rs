//! Ask command

use crate::app::{AskArgs, OutputFormat};
use crate::output::{self, FormatOptions};
use crate::progress::ProgressReporter;
use anyhow::Result;
use deepsearch_core::{Config, DeepSearchEngine, DeepSearchError, HistoryEntry, Query};
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tracing::debug;

pub async fn run(args: AskArgs, config: Config, format: OutputFormat, verbose: bool) -> Result<()> {
    let mut query = Query::new(args.query.join(" "), args.user);
    query.options.model = args.model;
    query.options.max_results = args.max_results;
    if let Some(path) = &args.history {
        let content = std::fs::read_to_string(path).map_err(|e| {
            DeepSearchError::InvalidRequest(format!("history file {}: {e}", path.display()))
        })?;
        query.history = serde_json::from_str::<Vec<HistoryEntry>>(&content).map_err(|e| {
            DeepSearchError::InvalidRequest(format!("history file {}: {e}", path.display()))
        })?;
    }

    let engine = Arc::new(DeepSearchEngine::new(config)?);
    let state = crate::state_path();
    if let Err(e) = engine.registry().load(&state) {
        debug!("provider state not restored: {e}");
    }

    let mut handle = engine.start_search(query);
    let mut reporter = ProgressReporter::new(!args.no_progress && format == OutputFormat::Cli);
    loop {
        match handle.progress.recv().await {
            Ok(event) => reporter.update(&event),
            Err(RecvError::Lagged(_)) => continue,
            Err(RecvError::Closed) => break,
        }
    }
    reporter.finish();
    let result = handle.wait().await?;

    if let Err(e) = engine.registry().save(&state) {
        debug!("provider state not saved: {e}");
    }

    output::print_answer(&result, format, &FormatOptions { reasoning: verbose })?;
    Ok(())
}
