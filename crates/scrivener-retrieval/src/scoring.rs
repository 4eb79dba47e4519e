//! Result merging across stages and the hybrid score blend.

use std::cmp::Ordering;
use std::collections::HashMap;

use scrivener_core::types::SearchResult;

/// `w_s * semantic + w_l * lexical`, with weights normalized to sum to one.
pub fn blend(semantic: f32, lexical: f32, semantic_weight: f32, lexical_weight: f32) -> f32 {
    let total = semantic_weight + lexical_weight;
    if total <= 0.0 { return semantic; }
    (semantic_weight * semantic + lexical_weight * lexical) / total
}

/// Similarity desc, then most recently updated first, then chunk id for a stable order.
pub fn rank_order(a: &SearchResult, b: &SearchResult) -> Ordering {
    b.similarity
        .partial_cmp(&a.similarity)
        .unwrap_or(Ordering::Equal)
        .then_with(|| b.updated_at.cmp(&a.updated_at))
        .then_with(|| a.chunk_id.cmp(&b.chunk_id))
}

/// Deduplicate by `(document_id, chunk_index)` keeping the higher score, rank, truncate.
pub fn merge_results<I>(results: I, limit: usize) -> Vec<SearchResult>
where
    I: IntoIterator<Item = SearchResult>,
{
    let mut best: HashMap<(String, usize), SearchResult> = HashMap::new();
    for r in results {
        let key = (r.document_id.clone(), r.chunk_index);
        match best.get(&key) {
            Some(existing) if existing.similarity >= r.similarity => {}
            _ => {
                best.insert(key, r);
            }
        }
    }
    let mut out: Vec<SearchResult> = best.into_values().collect();
    out.sort_by(rank_order);
    out.truncate(limit);
    out
}

pub fn clears_bar(results: &[SearchResult], bar: f32) -> bool { results.iter().any(|r| r.similarity >= bar) }

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn result(doc: &str, idx: usize, sim: f32, secs: i64) -> SearchResult {
        SearchResult {
            chunk_id: format!("{}:{}", doc, idx),
            document_id: doc.to_string(),
            document_title: doc.to_uppercase(),
            content: format!("chunk {} of {}", idx, doc),
            similarity: sim,
            chunk_index: idx,
            updated_at: Utc.timestamp_opt(secs, 0).single().unwrap_or_default(),
        }
    }

    #[test]
    fn merge_keeps_the_best_score_per_chunk() {
        let merged = merge_results(vec![result("a", 0, 0.4, 0), result("a", 0, 0.9, 0), result("a", 0, 0.6, 0), result("b", 1, 0.5, 0)], 10);
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].chunk_id, "a:0");
        assert!((merged[0].similarity - 0.9).abs() < 1e-6);
    }

    #[test]
    fn ties_prefer_recent_chunks_and_limit_applies() {
        let merged = merge_results(vec![result("old", 0, 0.7, 100), result("new", 0, 0.7, 200), result("low", 0, 0.1, 300)], 2);
        let ids: Vec<&str> = merged.iter().map(|r| r.chunk_id.as_str()).collect();
        assert_eq!(ids, vec!["new:0", "old:0"]);
    }

    #[test]
    fn blend_normalizes_weights() {
        assert!((blend(1.0, 0.0, 0.7, 0.3) - 0.7).abs() < 1e-6);
        assert!((blend(0.5, 1.0, 7.0, 3.0) - 0.65).abs() < 1e-6);
        assert_eq!(blend(0.4, 1.0, 0.0, 0.0), 0.4);
    }
}
