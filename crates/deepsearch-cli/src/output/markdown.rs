//! Markdown output formatter

use super::FormatOptions;
use deepsearch_core::PipelineResult;

pub fn format_answer(result: &PipelineResult, options: &FormatOptions) -> String {
    let mut output = format!("# {}\n\n", result.query);
    output.push_str(result.summary.trim_end());
    output.push('\n');

    if !result.sources.is_empty() {
        output.push_str("\n## Sources\n\n");
        for (i, source) in result.sources.iter().enumerate() {
            output.push_str(&format!("{}. [{}]({})\n", i + 1, source.title, source.url));
        }
    }

    if options.reasoning && !result.reasoning.is_empty() {
        output.push_str("\n## Reasoning\n\n");
        for note in &result.reasoning {
            output.push_str(&format!("- {note}\n"));
        }
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use deepsearch_core::{CacheMeta, SearchResult, SearchType};

    fn sample_result() -> PipelineResult {
        PipelineResult {
            summary: "## Overview\n\nBody text.".to_string(),
            sources: vec![SearchResult::new(
                "A title",
                "https://example.com/a",
                "snippet",
                "test",
            )],
            reasoning: vec!["cache miss".to_string()],
            query: "a question".to_string(),
            timestamp: chrono::Utc::now(),
            user_id: "u1".to_string(),
            generated_by_llm: true,
            search_type: SearchType::Normal,
            cache_meta: CacheMeta {
                fingerprint: "abc".to_string(),
                cacheable: true,
            },
        }
    }

    #[test]
    fn test_markdown_includes_query_and_sources() {
        let output = format_answer(&sample_result(), &FormatOptions { reasoning: false });
        assert!(output.starts_with("# a question\n"));
        assert!(output.contains("1. [A title](https://example.com/a)"));
        assert!(!output.contains("## Reasoning"));
    }

    #[test]
    fn test_markdown_reasoning_is_opt_in() {
        let output = format_answer(&sample_result(), &FormatOptions { reasoning: true });
        assert!(output.contains("## Reasoning"));
        assert!(output.contains("- cache miss"));
    }
}
