use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::RwLock;

use scrivener_core::math::cosine_similarity;
use scrivener_core::traits::VectorIndex;
use scrivener_core::types::{ChunkId, IndexStats, SearchScope, VectorMatch, VectorQuery, VectorRecord};
use scrivener_core::Result;

/// Brute-force cosine index. The scope filter is applied while scanning,
/// so out-of-scope records never enter the candidate list.
#[derive(Default)]
pub struct InMemoryVectorIndex {
    records: RwLock<HashMap<ChunkId, VectorRecord>>,
    queries: AtomicUsize,
}

impl InMemoryVectorIndex {
    pub fn new() -> Self { Self::default() }

    pub fn len(&self) -> usize { self.records.read().unwrap_or_else(|e| e.into_inner()).len() }

    pub fn is_empty(&self) -> bool { self.len() == 0 }

    pub fn contains(&self, id: &str) -> bool { self.records.read().unwrap_or_else(|e| e.into_inner()).contains_key(id) }

    /// Number of `query` calls served so far.
    pub fn query_count(&self) -> usize { self.queries.load(Ordering::Relaxed) }
}

#[async_trait]
impl VectorIndex for InMemoryVectorIndex {
    async fn upsert(&self, records: Vec<VectorRecord>) -> Result<()> {
        let mut map = self.records.write().unwrap_or_else(|e| e.into_inner());
        for r in records { map.insert(r.id.clone(), r); }
        Ok(())
    }

    async fn query(&self, vector: &[f32], query: &VectorQuery) -> Result<Vec<VectorMatch>> {
        query.filter.validate()?;
        self.queries.fetch_add(1, Ordering::Relaxed);
        let map = self.records.read().unwrap_or_else(|e| e.into_inner());
        let mut hits: Vec<VectorMatch> = map
            .values()
            .filter(|r| query.filter.admits(&r.metadata.user_id, &r.metadata.document_id))
            .map(|r| VectorMatch { id: r.id.clone(), score: cosine_similarity(vector, &r.vector), metadata: r.metadata.clone() })
            .filter(|m| query.threshold.map_or(true, |t| m.score >= t))
            .collect();
        hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal).then_with(|| a.id.cmp(&b.id)));
        hits.truncate(query.top_k);
        Ok(hits)
    }

    async fn delete(&self, ids: &[ChunkId]) -> Result<()> {
        let mut map = self.records.write().unwrap_or_else(|e| e.into_inner());
        for id in ids { map.remove(id); }
        Ok(())
    }

    async fn stats(&self, filter: &SearchScope) -> Result<IndexStats> {
        let map = self.records.read().unwrap_or_else(|e| e.into_inner());
        Ok(IndexStats { count: map.values().filter(|r| filter.admits(&r.metadata.user_id, &r.metadata.document_id)).count() })
    }
}
