//! Context Builder (C12): assembles a character-budgeted prompt context
//! from a ranked chunk list, framing each chunk so the answering model can
//! cite it, and escaping any citation-frame look-alikes already present in
//! the chunk content so an attacker can't forge a fake source boundary.

use std::collections::HashSet;

use common::domain::chunk::ScoredChunk;

/// Builds the context body plus a sources section, stopping before any
/// chunk whose inclusion would exceed `char_budget`. Returns the assembled
/// text and the number of chunks actually used. Duplicate `chunk_id`s are
/// dropped, first occurrence wins.
pub fn build_context(chunks: &[ScoredChunk], char_budget: usize) -> (String, usize) {
    if chunks.is_empty() || char_budget == 0 {
        return (String::new(), 0);
    }

    const SOURCES_HEADER: &str = "\nFUENTES:\n";

    let mut seen = HashSet::new();
    let mut used: Vec<&ScoredChunk> = Vec::new();
    let mut body = String::new();
    let mut sources = String::new();
    let mut total_len = 0usize;
    let mut citation_index = 0usize;

    for scored in chunks {
        if !seen.insert(scored.chunk.id) {
            continue;
        }
        citation_index += 1;
        let block = render_block(citation_index, scored);
        let source_line = format!(
            "[S{}] document_id={} chunk={}\n",
            citation_index,
            scored.chunk.document_id,
            scored.chunk.chunk_index + 1
        );
        // The FUENTES header is only paid for once, by whichever chunk
        // turns out to be the first one kept, so the running total always
        // matches what the final assembled string will actually contain.
        let header_cost = if used.is_empty() { SOURCES_HEADER.len() } else { 0 };
        let incremental = block.len() + source_line.len() + header_cost;
        if total_len + incremental > char_budget {
            citation_index -= 1;
            break;
        }
        total_len += incremental;
        body.push_str(&block);
        sources.push_str(&source_line);
        used.push(scored);
    }

    if used.is_empty() {
        return (String::new(), 0);
    }

    body.push_str(SOURCES_HEADER);
    body.push_str(&sources);

    (body, used.len())
}

fn render_block(citation_index: usize, scored: &ScoredChunk) -> String {
    format!(
        "---[S{i}]---\ndocument_id: {doc}\nchunk_index: {ci}\n{content}\n---[FIN S{i}]---\n",
        i = citation_index,
        doc = scored.chunk.document_id,
        ci = scored.chunk.chunk_index + 1,
        content = escape_citation_frames(&scored.chunk.content),
    )
}

/// Replaces exact `---[S<digits>]---` / `---[FIN S<digits>]---` sequences
/// found inside chunk content with an em-dash-delimited look-alike, so
/// content can't forge a source boundary the model would treat as real.
/// Arbitrary bracketed text (`[S1]` alone, `[foo]`, `--[S1]--`) is left
/// untouched since it can't be mistaken for a frame.
fn escape_citation_frames(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let n = chars.len();
    let mut out = String::with_capacity(text.len());
    let mut i = 0;
    while i < n {
        match citation_frame_len(&chars[i..]) {
            Some(len) => {
                let segment: String = chars[i..i + len].iter().collect();
                out.push('—');
                out.push_str(&segment[3..segment.len() - 3]);
                out.push('—');
                i += len;
            }
            None => {
                out.push(chars[i]);
                i += 1;
            }
        }
    }
    out
}

fn citation_frame_len(chars: &[char]) -> Option<usize> {
    let mut idx = match_literal(chars, "---[")?;
    if let Some(after_fin) = match_literal(&chars[idx..], "FIN ") {
        idx += after_fin;
    }
    idx += match_literal(&chars[idx..], "S")?;
    let digits_start = idx;
    while idx < chars.len() && chars[idx].is_ascii_digit() {
        idx += 1;
    }
    if idx == digits_start {
        return None;
    }
    idx += match_literal(&chars[idx..], "]---")?;
    Some(idx)
}

fn match_literal(chars: &[char], literal: &str) -> Option<usize> {
    let literal_chars: Vec<char> = literal.chars().collect();
    if chars.len() < literal_chars.len() {
        return None;
    }
    if chars[..literal_chars.len()] == literal_chars[..] {
        Some(literal_chars.len())
    } else {
        None
    }
}
