//! Feature extraction for the learned classifier and the recency slot.
//!
//! Text features are hashed unigrams and bigrams (xxh64 into a fixed number
//! of buckets), scaled to unit length. A handful of dense features describe
//! the request context.

use std::hash::{Hash, Hasher};
use std::sync::LazyLock;

use twox_hash::XxHash64;

use scrivener_core::types::RouterContext;

pub const HASH_BUCKETS: usize = 4096;
pub const CONTEXT_FEATURES: usize = 6;

static YEAR_RE: LazyLock<regex::Regex> = LazyLock::new(|| regex::Regex::new(r"\b(19|20)\d{2}\b").expect("year regex is valid"));

const TEMPORAL: &[&str] = &[
    "latest", "recent", "recently", "today", "tonight", "yesterday", "tomorrow", "current", "currently", "now", "news",
    "this week", "this month", "this year", "last week", "last month", "last year", "right now", "up-to-date",
];

/// Total width of a feature vector: hashed text buckets followed by context features.
pub fn feature_dim() -> usize { HASH_BUCKETS + CONTEXT_FEATURES }

pub fn tokens(text: &str) -> Vec<String> {
    text.split(|c: char| !(c.is_alphanumeric() || c == '\''))
        .map(|t| t.trim_matches('\'').to_lowercase())
        .filter(|t| !t.is_empty())
        .collect()
}

fn bucket(kind: &str, token: &str) -> usize {
    let mut hasher = XxHash64::with_seed(7);
    kind.hash(&mut hasher);
    token.hash(&mut hasher);
    (hasher.finish() as usize) % HASH_BUCKETS
}

/// Sparse `(index, value)` features for one request. Indices may repeat; values add up.
pub fn extract(query: &str, context: &RouterContext) -> Vec<(usize, f32)> {
    let toks = tokens(query);
    let mut text: Vec<(usize, f32)> = toks.iter().map(|t| (bucket("u", t), 1.0)).collect();
    text.extend(toks.windows(2).map(|w| (bucket("b", &format!("{} {}", w[0], w[1])), 1.0)));
    let norm = (text.len() as f32).sqrt().max(1.0);
    for f in &mut text { f.1 /= norm; }

    let ctx = [
        if context.has_documents { 1.0 } else { 0.0 },
        if context.has_selection { 1.0 } else { 0.0 },
        ((1.0 + context.selection_length as f32).ln() / 8.0).min(1.0),
        ((1.0 + context.conversation_length as f32).ln() / 4.0).min(1.0),
        if context.recent_tools.is_empty() { 0.0 } else { 1.0 },
        if needs_recency(query) { 1.0 } else { 0.0 },
    ];
    text.extend(ctx.into_iter().enumerate().filter(|(_, v)| *v != 0.0).map(|(i, v)| (HASH_BUCKETS + i, v)));
    text
}

/// Whether the query asks about something time-sensitive: temporal vocabulary or a 4-digit year.
pub fn needs_recency(query: &str) -> bool {
    let lower = query.to_lowercase();
    if YEAR_RE.is_match(&lower) { return true; }
    let toks = tokens(&lower);
    TEMPORAL.iter().any(|p| if p.contains(' ') { lower.contains(p) } else { toks.iter().any(|t| t == p) })
}
