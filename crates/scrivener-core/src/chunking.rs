//! Deterministic chunking policies.
//!
//! Both policies are pure functions of `(content, policy)`: the change
//! tracker relies on re-chunking the same text producing the same spans.

use serde::{Deserialize, Serialize};

/// A chunk of text with byte offsets into the source content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkSpan {
    pub index: usize,
    pub start: usize,
    pub end: usize,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum ChunkingPolicy {
    /// Blank-line separated paragraphs; long paragraphs are split into
    /// overlapping word windows.
    Paragraph { max_tokens: usize, overlap_percent: f32 },
    /// Fixed-size character windows with overlap.
    SlidingWindow { window_chars: usize, overlap_chars: usize },
}

impl Default for ChunkingPolicy {
    fn default() -> Self { ChunkingPolicy::Paragraph { max_tokens: 500, overlap_percent: 0.2 } }
}

impl ChunkingPolicy {
    pub fn chunk(&self, content: &str) -> Vec<ChunkSpan> {
        let spans = match *self {
            ChunkingPolicy::Paragraph { max_tokens, overlap_percent } => paragraph_chunks(content, max_tokens, overlap_percent),
            ChunkingPolicy::SlidingWindow { window_chars, overlap_chars } => window_chunks(content, window_chars, overlap_chars),
        };
        spans
            .into_iter()
            .enumerate()
            .map(|(index, (start, end))| ChunkSpan { index, start, end, text: content[start..end].to_string() })
            .collect()
    }
}

/// Rough token estimate: one token per 0.75 words.
pub fn estimate_tokens(text: &str) -> usize {
    let word_count = text.split_whitespace().count();
    (word_count as f32 / 0.75) as usize
}

fn paragraph_chunks(content: &str, max_tokens: usize, overlap_percent: f32) -> Vec<(usize, usize)> {
    let mut out = Vec::new();
    for (start, end) in paragraph_spans(content) {
        let paragraph = &content[start..end];
        if estimate_tokens(paragraph) <= max_tokens.max(1) {
            out.push((start, end));
            continue;
        }
        let words = word_spans(paragraph, start);
        let words_per_chunk = ((max_tokens as f32 * 0.75) as usize).max(1);
        let overlap_words = ((words_per_chunk as f32 * overlap_percent.clamp(0.0, 0.9)) as usize).min(words_per_chunk - 1);
        let mut first = 0;
        while first < words.len() {
            let last = (first + words_per_chunk).min(words.len());
            out.push((words[first].0, words[last - 1].1));
            if last >= words.len() { break; }
            first = last - overlap_words;
        }
    }
    out
}

fn paragraph_spans(content: &str) -> Vec<(usize, usize)> {
    let mut raw = Vec::new();
    let mut start: Option<usize> = None;
    let mut end = 0;
    let mut offset = 0;
    for line in content.split_inclusive('\n') {
        let line_start = offset;
        offset += line.len();
        if line.trim().is_empty() {
            if let Some(s) = start.take() { raw.push((s, end)); }
        } else {
            if start.is_none() { start = Some(line_start); }
            end = offset;
        }
    }
    if let Some(s) = start { raw.push((s, end)); }
    raw.into_iter()
        .map(|(s, e)| {
            let slice = &content[s..e];
            let lead = slice.len() - slice.trim_start().len();
            (s + lead, s + lead + slice.trim().len())
        })
        .filter(|(s, e)| s < e)
        .collect()
}

fn word_spans(text: &str, base: usize) -> Vec<(usize, usize)> {
    let mut spans = Vec::new();
    let mut start = None;
    for (i, c) in text.char_indices() {
        if c.is_whitespace() {
            if let Some(s) = start.take() { spans.push((base + s, base + i)); }
        } else if start.is_none() {
            start = Some(i);
        }
    }
    if let Some(s) = start { spans.push((base + s, base + text.len())); }
    spans
}

fn window_chunks(content: &str, window_chars: usize, overlap_chars: usize) -> Vec<(usize, usize)> {
    let bounds: Vec<usize> = content.char_indices().map(|(i, _)| i).chain(std::iter::once(content.len())).collect();
    let n_chars = bounds.len() - 1;
    let window = window_chars.max(1);
    let step = window.saturating_sub(overlap_chars).max(1);
    let mut out = Vec::new();
    let mut first = 0;
    while first < n_chars {
        let last = (first + window).min(n_chars);
        let (s, e) = (bounds[first], bounds[last]);
        if !content[s..e].trim().is_empty() { out.push((s, e)); }
        if last == n_chars { break; }
        first += step;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paragraphs_become_chunks_with_offsets() {
        let content = "First paragraph here.\n\n  Second one.  \n\n\nThird\nspans lines.\n";
        let chunks = ChunkingPolicy::default().chunk(content);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[1].text, "Second one.");
        assert_eq!(&content[chunks[1].start..chunks[1].end], "Second one.");
        assert_eq!(chunks[2].text, "Third\nspans lines.");
        assert_eq!(chunks.iter().map(|c| c.index).collect::<Vec<_>>(), vec![0, 1, 2]);
    }

    #[test]
    fn long_paragraph_is_split_with_overlap() {
        let words: Vec<String> = (0..39).map(|i| format!("w{}", i)).collect();
        let content = words.join(" ");
        let policy = ChunkingPolicy::Paragraph { max_tokens: 20, overlap_percent: 0.2 };
        let chunks = policy.chunk(&content);
        // 15 words per chunk, 3 words of overlap
        assert_eq!(chunks.len(), 3);
        assert!(chunks[0].text.starts_with("w0 ") && chunks[0].text.ends_with("w14"));
        assert!(chunks[1].text.starts_with("w12 "));
        assert!(chunks[2].text.starts_with("w24 ") && chunks[2].text.ends_with("w38"));
    }

    #[test]
    fn sliding_window_respects_char_boundaries() {
        let content = "héllo wörld ünïcode text";
        let policy = ChunkingPolicy::SlidingWindow { window_chars: 10, overlap_chars: 3 };
        let chunks = policy.chunk(content);
        assert!(!chunks.is_empty());
        for c in &chunks { assert!(c.text.chars().count() <= 10); }
        assert_eq!(chunks[0].text, "héllo wörl");
        assert!(chunks.last().map(|c| c.end) == Some(content.len()));
    }

    #[test]
    fn chunking_is_deterministic_and_empty_content_yields_nothing() {
        let policy = ChunkingPolicy::default();
        let content = "alpha\n\nbeta\n\ngamma";
        assert_eq!(policy.chunk(content), policy.chunk(content));
        assert!(policy.chunk("").is_empty());
        assert!(policy.chunk(" \n\n \t").is_empty());
    }
}
