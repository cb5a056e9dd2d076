//! Chunker (C2): splits text into overlapping windows with a preference
//! for natural boundaries (paragraph, line, sentence) near the window edge.

#[derive(Debug, Clone, Copy)]
pub struct ChunkerConfig {
    pub chunk_size: usize,
    pub overlap: usize,
}

impl ChunkerConfig {
    pub fn new(chunk_size: usize, overlap: usize) -> Result<Self, String> {
        if overlap >= chunk_size {
            return Err(format!(
                "overlap ({overlap}) must be < chunk_size ({chunk_size})"
            ));
        }
        Ok(Self {
            chunk_size,
            overlap,
        })
    }
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self {
            chunk_size: 900,
            overlap: 120,
        }
    }
}

/// Finds the best natural cut point within `[search_start, hard_end)` of
/// `text`, preferring (in order) a paragraph break, a line break, then a
/// sentence terminator. Falls back to `hard_end` when none is found.
/// Returned offsets are byte offsets on a char boundary.
fn natural_cut_point(text: &str, search_start: usize, hard_end: usize) -> usize {
    let window = &text[search_start..hard_end];

    if let Some(pos) = window.rfind("\n\n") {
        return search_start + pos + 2;
    }
    if let Some(pos) = window.rfind('\n') {
        return search_start + pos + 1;
    }
    if let Some(pos) = window.rfind(". ") {
        return search_start + pos + 2;
    }
    hard_end
}

/// Splits `text` into overlapping chunks. Each chunk is trimmed; empty
/// chunks are discarded. `len(chunk) <= config.chunk_size` always holds.
pub fn chunk_text(text: &str, config: ChunkerConfig) -> Vec<String> {
    if text.is_empty() {
        return Vec::new();
    }

    let bytes_len = text.len();
    let step = config.chunk_size - config.overlap;
    let mut chunks = Vec::new();
    let mut start = 0usize;

    while start < bytes_len {
        let hard_end = char_boundary_at_most(text, start + config.chunk_size);
        let end = if hard_end >= bytes_len {
            bytes_len
        } else {
            let search_start = char_boundary_at_least(text, hard_end.saturating_sub(config.overlap));
            natural_cut_point(text, search_start, hard_end)
        };
        let end = end.max(start + 1).min(bytes_len);

        let slice = text[start..end].trim();
        if !slice.is_empty() {
            chunks.push(slice.to_string());
        }

        if end >= bytes_len {
            break;
        }
        let next_start = start + step;
        start = if next_start <= start { end } else { next_start.min(end) };
        start = char_boundary_at_least(text, start);
    }

    chunks
}

fn char_boundary_at_most(text: &str, idx: usize) -> usize {
    let mut idx = idx.min(text.len());
    while idx > 0 && !text.is_char_boundary(idx) {
        idx -= 1;
    }
    idx
}

fn char_boundary_at_least(text: &str, idx: usize) -> usize {
    let mut idx = idx.min(text.len());
    while idx < text.len() && !text.is_char_boundary(idx) {
        idx += 1;
    }
    idx
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunks_never_exceed_chunk_size() {
        let text = "word ".repeat(1000);
        let config = ChunkerConfig::new(200, 40).unwrap();
        let chunks = chunk_text(&text, config);
        assert!(chunks.iter().all(|c| c.len() <= config.chunk_size));
        assert!(!chunks.is_empty());
    }

    #[test]
    fn empty_input_yields_empty_output() {
        assert!(chunk_text("", ChunkerConfig::default()).is_empty());
    }

    #[test]
    fn prefers_paragraph_boundary_when_available() {
        let para_a = "a".repeat(50);
        let para_b = "b".repeat(50);
        let text = format!("{para_a}\n\n{para_b}");
        let config = ChunkerConfig::new(60, 10).unwrap();
        let chunks = chunk_text(&text, config);
        assert_eq!(chunks[0], para_a);
    }

    #[test]
    fn concatenation_covers_input_modulo_whitespace() {
        let text = "Sentence one. Sentence two. Sentence three. Sentence four.".repeat(5);
        let config = ChunkerConfig::new(80, 15).unwrap();
        let chunks = chunk_text(&text, config);
        let joined: String = chunks.join("");
        let stripped_original: String = text.chars().filter(|c| !c.is_whitespace()).collect();
        let stripped_joined: String = joined.chars().filter(|c| !c.is_whitespace()).collect();
        assert_eq!(stripped_original, stripped_joined);
    }

    #[test]
    fn rejects_overlap_not_smaller_than_chunk_size() {
        assert!(ChunkerConfig::new(100, 100).is_err());
        assert!(ChunkerConfig::new(100, 150).is_err());
    }
}
