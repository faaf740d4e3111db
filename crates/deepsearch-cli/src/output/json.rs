//! JSON output formatter
//!
//! Emits the full result payload, including sources, reasoning trace,
//! and cache metadata.

use deepsearch_core::PipelineResult;

pub fn format_answer(result: &PipelineResult) -> String {
    serde_json::to_string_pretty(result).unwrap_or_else(|_| "{}".to_string()) + "\n"
}
