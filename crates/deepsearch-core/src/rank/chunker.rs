//! Deterministic snippet chunking for embedding

use crate::config::ChunkConfig;

/// Chunks shorter than this carry too little signal to rank
pub const MIN_CHUNK_CHARS: usize = 50;

/// One chunk of a larger text, with byte offsets into the original
#[derive(Debug, Clone)]
pub struct TextChunk {
    pub text: String,
    pub start: usize,
    pub end: usize,
}

/// Find a valid char boundary at or before the given byte index
pub(crate) fn floor_char_boundary(s: &str, index: usize) -> usize {
    if index >= s.len() {
        return s.len();
    }
    let mut i = index;
    while i > 0 && !s.is_char_boundary(i) {
        i -= 1;
    }
    i
}

/// Find a valid char boundary at or after the given byte index
fn ceil_char_boundary(s: &str, index: usize) -> usize {
    if index >= s.len() {
        return s.len();
    }
    let mut i = index;
    while i < s.len() && !s.is_char_boundary(i) {
        i += 1;
    }
    i
}

/// Last sentence end (". ", "? ", "! ") in the region, if any
fn find_sentence_break(region: &str) -> Option<usize> {
    [". ", "? ", "! "]
        .iter()
        .filter_map(|sep| region.rfind(sep).map(|pos| pos + 2))
        .max()
}

/// Split text into overlapping chunks. Prefers sentence ends in the
/// last half of the window, then word boundaries, then hard cuts.
/// Chunks below `MIN_CHUNK_CHARS` are discarded; at most
/// `config.max_per_result` chunks are returned.
pub fn chunk_text(content: &str, config: &ChunkConfig) -> Vec<TextChunk> {
    let target = config.target_chars;
    if content.trim().is_empty() {
        return Vec::new();
    }
    if content.len() <= target {
        if content.len() < MIN_CHUNK_CHARS {
            return Vec::new();
        }
        return vec![TextChunk {
            text: content.to_string(),
            start: 0,
            end: content.len(),
        }];
    }

    let mut chunks = Vec::new();
    let mut start = 0;

    while start < content.len() && chunks.len() < config.max_per_result {
        let raw_end = (start + target).min(content.len());
        let end = floor_char_boundary(content, raw_end);
        let mut chunk_end = end;

        // Look for a natural break in the last half of the window
        if end < content.len() {
            let search_start_raw = start + target / 2;
            let search_start = ceil_char_boundary(content, search_start_raw);

            if search_start < end {
                let search_region = &content[search_start..end];

                if let Some(pos) = find_sentence_break(search_region) {
                    chunk_end = search_start + pos;
                } else if let Some(pos) = search_region.rfind(' ') {
                    chunk_end = search_start + pos + 1;
                }
            }
        }

        chunk_end = floor_char_boundary(content, chunk_end);

        chunks.push(TextChunk {
            text: content[start..chunk_end].to_string(),
            start,
            end: chunk_end,
        });

        if chunk_end >= content.len() {
            break;
        }

        let new_start_raw = chunk_end.saturating_sub(config.overlap);
        let new_start = ceil_char_boundary(content, new_start_raw);
        // Overlap must never stall the walk
        start = if new_start > start { new_start } else { chunk_end };
    }

    chunks.retain(|c| c.text.len() >= MIN_CHUNK_CHARS);
    chunks
}
