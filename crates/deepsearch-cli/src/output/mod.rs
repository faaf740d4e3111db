//! Output formatters

pub mod json;
pub mod markdown;
pub mod terminal;

use crate::app::OutputFormat;
use anyhow::Result;
use deepsearch_core::PipelineResult;

/// Format options
pub struct FormatOptions {
    /// Include the run's reasoning trace
    pub reasoning: bool,
}

/// Print one answer to stdout
pub fn print_answer(
    result: &PipelineResult,
    format: OutputFormat,
    options: &FormatOptions,
) -> Result<()> {
    match format {
        OutputFormat::Json => print!("{}", json::format_answer(result)),
        OutputFormat::Md => print!("{}", markdown::format_answer(result, options)),
        OutputFormat::Cli => terminal::print_answer(result, options)?,
    }
    Ok(())
}
