use std::collections::{BTreeSet, HashMap};
use std::sync::RwLock;

use scrivener_core::types::{chunk_id, Chunk, ChunkId, DocumentIndexState};

#[derive(Default)]
struct TableInner {
    chunks: HashMap<ChunkId, Chunk>,
    by_document: HashMap<String, BTreeSet<usize>>,
    states: HashMap<String, DocumentIndexState>,
}

/// Chunk table and per-document index state.
///
/// Written only by the vectorization pipeline (under its per-document lock);
/// the retrieval engine reads it to score lexical-only hits.
#[derive(Default)]
pub struct ChunkTable {
    inner: RwLock<TableInner>,
}

impl ChunkTable {
    pub fn new() -> Self { Self::default() }

    pub fn chunk(&self, id: &str) -> Option<Chunk> { self.read(|t| t.chunks.get(id).cloned()) }

    pub fn chunk_at(&self, document_id: &str, index: usize) -> Option<Chunk> { self.chunk(&chunk_id(document_id, index)) }

    pub fn document_indices(&self, document_id: &str) -> Vec<usize> {
        self.read(|t| t.by_document.get(document_id).map(|s| s.iter().copied().collect()).unwrap_or_default())
    }

    pub fn upsert(&self, chunk: Chunk) {
        self.write(|t| {
            t.by_document.entry(chunk.document_id.clone()).or_default().insert(chunk.chunk_index);
            t.chunks.insert(chunk.id.clone(), chunk);
        })
    }

    pub fn remove(&self, document_id: &str, indices: &[usize]) {
        self.write(|t| {
            for i in indices { t.chunks.remove(&chunk_id(document_id, *i)); }
            if let Some(set) = t.by_document.get_mut(document_id) {
                for i in indices { set.remove(i); }
                if set.is_empty() { t.by_document.remove(document_id); }
            }
        })
    }

    pub fn state(&self, document_id: &str) -> Option<DocumentIndexState> { self.read(|t| t.states.get(document_id).cloned()) }

    pub fn put_state(&self, state: DocumentIndexState) { self.write(|t| { t.states.insert(state.document_id.clone(), state); }) }

    pub fn remove_state(&self, document_id: &str) { self.write(|t| { t.states.remove(document_id); }) }

    pub fn states(&self) -> Vec<DocumentIndexState> {
        let mut out: Vec<_> = self.read(|t| t.states.values().cloned().collect());
        out.sort_by(|a: &DocumentIndexState, b| a.document_id.cmp(&b.document_id));
        out
    }

    pub fn len(&self) -> usize { self.read(|t| t.chunks.len()) }

    pub fn is_empty(&self) -> bool { self.len() == 0 }

    fn read<T>(&self, f: impl FnOnce(&TableInner) -> T) -> T { f(&self.inner.read().unwrap_or_else(|e| e.into_inner())) }

    fn write<T>(&self, f: impl FnOnce(&mut TableInner) -> T) -> T { f(&mut self.inner.write().unwrap_or_else(|e| e.into_inner())) }
}
