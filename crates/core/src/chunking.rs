use crate::models::{Chunk, PipelineConfig};

const PARAGRAPH_SEPARATOR: &str = "\n\n";
const SEPARATOR_CHARS: usize = 2;

#[derive(Debug, Clone, Copy)]
pub struct ChunkingConfig {
    pub max_chars: usize,
    pub overlap_chars: usize,
    pub min_chars: usize,
}

impl From<&PipelineConfig> for ChunkingConfig {
    fn from(value: &PipelineConfig) -> Self {
        Self {
            max_chars: value.max_chunk_size,
            overlap_chars: value.chunk_overlap,
            min_chars: value.min_text_length,
        }
    }
}

/// Splits one page of normalized text into overlapping chunks.
///
/// Paragraphs accumulate until the next one would push the buffer past
/// `max_chars`; the buffer is then emitted and the next one is seeded with
/// its trailing `overlap_chars`. Lengths are counted in chars, and no chunk
/// exceeds `max_chars + overlap_chars`. Chunks shorter than `min_chars` are
/// dropped.
pub fn chunk_page(normalized: &str, page_number: u32, config: ChunkingConfig) -> Vec<Chunk> {
    let piece_limit = config.max_chars.saturating_sub(SEPARATOR_CHARS).max(1);
    let paragraphs = normalized
        .split(PARAGRAPH_SEPARATOR)
        .map(str::trim)
        .filter(|paragraph| !paragraph.is_empty())
        .flat_map(|paragraph| split_oversized(paragraph, piece_limit));

    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_len = 0usize;

    for paragraph in paragraphs {
        let paragraph_len = paragraph.chars().count();

        if !current.is_empty() && current_len + SEPARATOR_CHARS + paragraph_len > config.max_chars {
            let seed = overlap_tail(&current, config.overlap_chars);
            push_chunk(&mut chunks, &current, page_number, config.min_chars);

            current.clear();
            if !seed.is_empty() {
                current.push_str(&seed);
                current.push_str(PARAGRAPH_SEPARATOR);
            }
            current.push_str(&paragraph);
        } else {
            if !current.is_empty() {
                current.push_str(PARAGRAPH_SEPARATOR);
            }
            current.push_str(&paragraph);
        }

        current_len = current.chars().count();
    }

    push_chunk(&mut chunks, &current, page_number, config.min_chars);
    chunks
}

fn push_chunk(chunks: &mut Vec<Chunk>, buffer: &str, page_number: u32, min_chars: usize) {
    let content = buffer.trim();
    if !content.is_empty() && content.chars().count() >= min_chars {
        chunks.push(Chunk::new(content.to_string(), page_number));
    }
}

fn overlap_tail(text: &str, overlap_chars: usize) -> String {
    if overlap_chars == 0 {
        return String::new();
    }

    let total = text.chars().count();
    text.chars()
        .skip(total.saturating_sub(overlap_chars))
        .collect::<String>()
        .trim()
        .to_string()
}

/// Cuts a paragraph longer than `limit` chars into pieces, preferring a
/// whitespace boundary in the second half of each window.
fn split_oversized(paragraph: &str, limit: usize) -> Vec<String> {
    let chars: Vec<char> = paragraph.chars().collect();
    if chars.len() <= limit {
        return vec![paragraph.to_string()];
    }

    let mut pieces = Vec::new();
    let mut start = 0;
    while start < chars.len() {
        let mut end = (start + limit).min(chars.len());
        if end < chars.len() {
            if let Some(offset) = chars[start..end].iter().rposition(|c| c.is_whitespace()) {
                if offset > limit / 2 {
                    end = start + offset;
                }
            }
        }

        let piece = chars[start..end].iter().collect::<String>();
        let piece = piece.trim();
        if !piece.is_empty() {
            pieces.push(piece.to_string());
        }
        start = end;
    }

    pieces
}
