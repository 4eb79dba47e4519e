//! Content-addressed change detection per document.
//!
//! The tracker re-chunks new content with the pipeline's policy and compares
//! per-index fingerprints with the last successfully indexed map. Matching
//! fingerprints are only a hint: callers re-check `unchanged` chunks against
//! the stored text before skipping them.

use std::collections::HashMap;
use std::hash::Hasher;
use std::sync::RwLock;
use twox_hash::XxHash64;

use scrivener_core::chunking::{ChunkSpan, ChunkingPolicy};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fingerprint {
    pub hash: u64,
    pub len: usize,
}

impl Fingerprint {
    pub fn of(text: &str) -> Self {
        let mut hasher = XxHash64::with_seed(0);
        hasher.write(text.as_bytes());
        Self { hash: hasher.finish(), len: text.len() }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Added,
    Modified,
    Unchanged,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkChange {
    pub kind: ChangeKind,
    pub index: usize,
    pub start: usize,
    pub end: usize,
    pub text: String,
    pub fingerprint: Fingerprint,
}

#[derive(Debug, Clone, Default)]
pub struct ChangeSet {
    pub document_id: String,
    /// One entry per chunk of the new content, in index order.
    pub chunks: Vec<ChunkChange>,
    /// Indices known from the last pass that the new content no longer has.
    pub removed: Vec<usize>,
}

impl ChangeSet {
    pub fn chunk_count(&self) -> usize { self.chunks.len() }
    pub fn is_empty_content(&self) -> bool { self.chunks.is_empty() }
    pub fn count(&self, kind: ChangeKind) -> usize { self.chunks.iter().filter(|c| c.kind == kind).count() }
}

pub struct ChangeTracker {
    policy: ChunkingPolicy,
    known: RwLock<HashMap<String, HashMap<usize, Fingerprint>>>,
}

impl ChangeTracker {
    pub fn new(policy: ChunkingPolicy) -> Self { Self { policy, known: RwLock::new(HashMap::new()) } }

    pub fn policy(&self) -> &ChunkingPolicy { &self.policy }

    pub fn diff(&self, document_id: &str, content: &str) -> ChangeSet {
        let spans = self.policy.chunk(content);
        let known = self.known.read().unwrap_or_else(|e| e.into_inner());
        let previous = known.get(document_id);
        let chunks: Vec<ChunkChange> = spans
            .into_iter()
            .map(|ChunkSpan { index, start, end, text }| {
                let fingerprint = Fingerprint::of(&text);
                let kind = match previous.and_then(|m| m.get(&index)) {
                    None => ChangeKind::Added,
                    Some(fp) if *fp == fingerprint => ChangeKind::Unchanged,
                    Some(_) => ChangeKind::Modified,
                };
                ChunkChange { kind, index, start, end, text, fingerprint }
            })
            .collect();
        let mut removed: Vec<usize> = previous
            .map(|m| m.keys().copied().filter(|i| *i >= chunks.len()).collect())
            .unwrap_or_default();
        removed.sort_unstable();
        ChangeSet { document_id: document_id.to_string(), chunks, removed }
    }

    /// Replace the remembered map with the fingerprints of chunks that are now indexed.
    pub fn commit(&self, document_id: &str, fingerprints: HashMap<usize, Fingerprint>) {
        let mut known = self.known.write().unwrap_or_else(|e| e.into_inner());
        known.insert(document_id.to_string(), fingerprints);
    }

    pub fn forget(&self, document_id: &str) {
        let mut known = self.known.write().unwrap_or_else(|e| e.into_inner());
        known.remove(document_id);
    }

    pub fn known(&self, document_id: &str) -> Option<HashMap<usize, Fingerprint>> {
        self.known.read().unwrap_or_else(|e| e.into_inner()).get(document_id).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn commit_all(tracker: &ChangeTracker, doc: &str, content: &str) {
        let set = tracker.diff(doc, content);
        tracker.commit(doc, set.chunks.iter().map(|c| (c.index, c.fingerprint)).collect());
    }

    #[test]
    fn first_pass_is_all_added() {
        let tracker = ChangeTracker::new(ChunkingPolicy::default());
        let set = tracker.diff("d", "one\n\ntwo\n\nthree");
        assert_eq!(set.count(ChangeKind::Added), 3);
        assert!(set.removed.is_empty());
        assert_eq!(set.chunks[1].text, "two");
        assert_eq!((set.chunks[1].start, set.chunks[1].end), (5, 8));
    }

    #[test]
    fn edits_are_classified_per_index() {
        let tracker = ChangeTracker::new(ChunkingPolicy::default());
        commit_all(&tracker, "d", "one\n\ntwo\n\nthree");
        let set = tracker.diff("d", "one\n\nTWO");
        assert_eq!(set.chunks[0].kind, ChangeKind::Unchanged);
        assert_eq!(set.chunks[1].kind, ChangeKind::Modified);
        assert_eq!(set.removed, vec![2]);
    }

    #[test]
    fn total_rewrite_degrades_to_modified_and_empty_content_removes_all() {
        let tracker = ChangeTracker::new(ChunkingPolicy::default());
        commit_all(&tracker, "d", "a\n\nb");
        let set = tracker.diff("d", "x\n\ny");
        assert_eq!(set.count(ChangeKind::Modified), 2);

        let empty = tracker.diff("d", "");
        assert!(empty.is_empty_content());
        assert_eq!(empty.removed, vec![0, 1]);
    }

    #[test]
    fn forget_resets_to_added() {
        let tracker = ChangeTracker::new(ChunkingPolicy::default());
        commit_all(&tracker, "d", "a");
        tracker.forget("d");
        assert_eq!(tracker.diff("d", "a").chunks[0].kind, ChangeKind::Added);
        assert!(tracker.known("d").is_none());
    }
}
