//! Query normalization and fingerprinting

use crate::model::HistoryEntry;

/// Stop words removed from queries before search and fingerprinting
const STOP_WORDS: &[&str] = &[
    "a", "an", "the", "and", "or", "in", "on", "at", "to", "for", "with", "of", "by", "from",
];

/// Lowercase, strip stop words, collapse whitespace
fn strip_tokens(text: &str) -> String {
    text.split_whitespace()
        .map(|word| word.to_lowercase())
        .filter(|word| !STOP_WORDS.contains(&word.as_str()))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Produce the optimized query string: trimmed, lowercased, stop words
/// removed, with conversational history folded in as trailing context.
/// Idempotent on already-normalized input.
pub fn normalize(raw: &str, history: &[HistoryEntry]) -> String {
    let base = strip_tokens(raw.trim());

    let folded = history
        .iter()
        .filter(|entry| !entry.content.trim().is_empty())
        .map(|entry| strip_tokens(&entry.content))
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ");

    if folded.is_empty() {
        base
    } else if base.is_empty() {
        folded
    } else {
        format!("{base} {folded}")
    }
}

/// Content hash identifying a (user, normalized query, provider profile)
/// tuple. Stable under insignificant whitespace changes in the raw query
/// because it hashes the normalized form.
pub fn fingerprint(user_id: &str, normalized_query: &str, model_hint: Option<&str>) -> String {
    let mut input = format!("{user_id}|{normalized_query}");
    if let Some(model) = model_hint {
        input.push_str("|model=");
        input.push_str(model);
    }
    blake3::hash(input.as_bytes()).to_hex().to_string()
}
