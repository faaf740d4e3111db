//! Prompt construction for answer synthesis

use crate::llm::ChatMessage;
use crate::model::SearchResult;
use crate::rank::chunker::floor_char_boundary;

/// Per-source snippet budget inside a prompt
const SNIPPET_PROMPT_CHARS: usize = 300;

/// Messages for one subtopic section over a numbered source list.
/// Citations must use the bracketed indices; inventing URLs is
/// forbidden outright.
pub fn section_messages(
    query: &str,
    subtopic: &str,
    sources: &[SearchResult],
) -> Vec<ChatMessage> {
    vec![
        ChatMessage::system(
            "You are a research assistant. Write one focused, factual section \
             of a larger answer. Cite sources inline with their bracketed \
             index, like [1] or [2]. Use ONLY the sources listed; never invent \
             URLs or cite an index that is not in the list.",
        ),
        ChatMessage::user(build_section_prompt(query, subtopic, sources)),
    ]
}

fn build_section_prompt(query: &str, subtopic: &str, sources: &[SearchResult]) -> String {
    let mut prompt = format!(
        r#"Question: "{}"
Section topic: "{}"
Sources:
"#,
        query, subtopic
    );

    for (idx, source) in sources.iter().enumerate() {
        let cut = floor_char_boundary(&source.snippet, SNIPPET_PROMPT_CHARS);
        prompt.push_str(&format!(
            "[{}] {} — {}\n    {}\n",
            idx + 1,
            source.title,
            source.url,
            &source.snippet[..cut]
        ));
    }

    prompt.push_str(
        "\nWrite 2-4 paragraphs covering the section topic as it relates to \
         the question. Cite the sources you draw on by index.",
    );
    prompt
}

/// Messages for the model-knowledge-only fallback. The model must not
/// discuss its own limitations or the missing search results.
pub fn llm_only_messages(query: &str) -> Vec<ChatMessage> {
    vec![
        ChatMessage::system(
            "You are a research assistant answering from your own knowledge. \
             Give a direct, factual answer. Do not mention search results, \
             browsing, tools, or any limitation of yours; just answer the \
             question as well as you can.",
        ),
        ChatMessage::user(format!(r#"Question: "{}""#, query)),
    ]
}

/// Join synthesized sections into one markdown answer
pub fn assemble_answer(sections: &[(String, String)]) -> String {
    let mut answer = String::new();
    for (title, body) in sections {
        if !answer.is_empty() {
            answer.push_str("\n\n");
        }
        answer.push_str(&format!("## {}\n\n{}", title, body.trim()));
    }
    answer
}
