//! Terminal output formatter

use super::FormatOptions;
use chrono::Local;
use deepsearch_core::{PipelineResult, SearchType};
use std::io::Write;
use termcolor::{Color, ColorChoice, ColorSpec, StandardStream, WriteColor};

pub fn print_answer(result: &PipelineResult, options: &FormatOptions) -> std::io::Result<()> {
    let mut out = StandardStream::stdout(ColorChoice::Auto);

    for line in result.summary.lines() {
        match line.strip_prefix("## ") {
            Some(heading) => {
                out.set_color(ColorSpec::new().set_bold(true))?;
                writeln!(out, "{heading}")?;
                out.reset()?;
            }
            None => writeln!(out, "{line}")?,
        }
    }

    if !result.sources.is_empty() {
        writeln!(out)?;
        out.set_color(ColorSpec::new().set_bold(true))?;
        writeln!(out, "Sources")?;
        out.reset()?;
        for (i, source) in result.sources.iter().enumerate() {
            out.set_color(ColorSpec::new().set_fg(Some(Color::Cyan)))?;
            write!(out, "  [{}] ", i + 1)?;
            out.reset()?;
            writeln!(out, "{} ({})", source.title, source.url)?;
        }
    }

    if let Some(note) = degradation_note(result.search_type) {
        writeln!(out)?;
        out.set_color(ColorSpec::new().set_fg(Some(Color::Yellow)))?;
        writeln!(out, "note: {note}")?;
        out.reset()?;
    }

    if result.search_type == SearchType::CacheHit {
        let answered = result.timestamp.with_timezone(&Local);
        writeln!(out)?;
        out.set_color(ColorSpec::new().set_dimmed(true))?;
        writeln!(out, "cached answer from {}", answered.format("%Y-%m-%d %H:%M"))?;
        out.reset()?;
    }

    if options.reasoning && !result.reasoning.is_empty() {
        writeln!(out)?;
        out.set_color(ColorSpec::new().set_dimmed(true))?;
        for note in &result.reasoning {
            writeln!(out, "  - {note}")?;
        }
        out.reset()?;
    }

    Ok(())
}

fn degradation_note(search_type: SearchType) -> Option<&'static str> {
    match search_type {
        SearchType::Normal | SearchType::CacheHit => None,
        SearchType::LlmOnlyFallback => {
            Some("answered from model knowledge, web search was unavailable")
        }
        SearchType::QuotaExceeded => Some("the daily language model quota is exhausted"),
        SearchType::SearchError => Some("no backend could produce an answer"),
        SearchType::AlreadyInProgress => Some("an identical run is already in progress"),
    }
}
