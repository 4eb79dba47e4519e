//! Incremental vectorization of documents.
//!
//! Per document: re-chunk, diff against the last indexed fingerprints, embed
//! only added/modified chunks (in bounded batches, isolating failures per
//! chunk), then write the vector index, the lexical index and the chunk table
//! and record a fresh `DocumentIndexState`. Jobs for one document are
//! serialized by an async mutex; identical concurrent requests share a result.

use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use scrivener_core::chunking::ChunkingPolicy;
use scrivener_core::config::PipelineSettings;
use scrivener_core::traits::{DocumentStore, Embedder, LexicalIndex, VectorIndex};
use scrivener_core::types::{chunk_id, Chunk, ChunkId, ChunkMetadata, DocumentIndexState, IndexStatus, VectorRecord};
use scrivener_core::{Error, Result};

use crate::retry::RetryPolicy;
use crate::store::ChunkTable;
use crate::tracker::{ChangeKind, ChangeTracker, ChunkChange, Fingerprint};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VectorizeOptions {
    /// Re-embed every chunk regardless of change status (model migrations).
    pub force: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VectorizationResult {
    pub document_id: String,
    pub chunks_added: usize,
    pub chunks_updated: usize,
    pub chunks_deleted: usize,
    pub chunks_unchanged: usize,
    pub chunks_failed: usize,
    pub duration_ms: u64,
    /// The caller awaited an identical in-flight job instead of running one.
    pub joined: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PipelineHealth {
    pub documents: usize,
    pub indexed: usize,
    pub partial: usize,
    pub empty: usize,
    pub chunks: usize,
    pub failing_documents: Vec<String>,
}

type JobOutcome = Option<Result<VectorizationResult>>;

struct InFlight {
    job_id: u64,
    content_hash: String,
    done: watch::Receiver<JobOutcome>,
}

pub struct VectorizationPipeline {
    embedder: Arc<dyn Embedder>,
    vectors: Arc<dyn VectorIndex>,
    lexical: Option<Arc<dyn LexicalIndex>>,
    documents: Arc<dyn DocumentStore>,
    table: Arc<ChunkTable>,
    tracker: ChangeTracker,
    settings: PipelineSettings,
    retry: RetryPolicy,
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
    in_flight: Mutex<HashMap<String, Vec<InFlight>>>,
    job_seq: AtomicU64,
}

enum Registration {
    Join(watch::Receiver<JobOutcome>),
    Run(u64, watch::Sender<JobOutcome>),
}

struct InFlightGuard<'a> {
    pipeline: &'a VectorizationPipeline,
    document_id: &'a str,
    job_id: u64,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        let mut map = self.pipeline.in_flight_jobs();
        if let Some(jobs) = map.get_mut(self.document_id) {
            jobs.retain(|j| j.job_id != self.job_id);
            if jobs.is_empty() { map.remove(self.document_id); }
        }
    }
}

fn content_hash(content: &str) -> String { blake3::hash(content.as_bytes()).to_hex().to_string() }

impl VectorizationPipeline {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        vectors: Arc<dyn VectorIndex>,
        documents: Arc<dyn DocumentStore>,
        policy: ChunkingPolicy,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            embedder,
            vectors,
            lexical: None,
            documents,
            table: Arc::new(ChunkTable::new()),
            tracker: ChangeTracker::new(policy),
            retry: RetryPolicy::from_settings(&settings),
            settings,
            locks: Mutex::new(HashMap::new()),
            in_flight: Mutex::new(HashMap::new()),
            job_seq: AtomicU64::new(0),
        }
    }

    pub fn with_lexical(mut self, lexical: Arc<dyn LexicalIndex>) -> Self { self.lexical = Some(lexical); self }

    pub fn chunk_table(&self) -> Arc<ChunkTable> { Arc::clone(&self.table) }

    pub fn tracker(&self) -> &ChangeTracker { &self.tracker }

    pub fn get_index_state(&self, document_id: &str) -> Option<DocumentIndexState> { self.table.state(document_id) }

    /// State of a document that must be fully indexed.
    pub fn require_indexed(&self, document_id: &str) -> Result<DocumentIndexState> {
        let state = self.table.state(document_id).ok_or_else(|| Error::NotFound(format!("index state for {}", document_id)))?;
        if state.status == IndexStatus::Partial {
            return Err(Error::PartialIndex { document_id: document_id.to_string(), failed: state.failed_chunks.len() });
        }
        Ok(state)
    }

    pub fn health(&self) -> PipelineHealth {
        let states = self.table.states();
        let mut h = PipelineHealth { documents: states.len(), chunks: self.table.len(), ..Default::default() };
        for s in states {
            match s.status {
                IndexStatus::Indexed => h.indexed += 1,
                IndexStatus::Partial => h.partial += 1,
                IndexStatus::Empty => h.empty += 1,
            }
            if !s.failed_chunks.is_empty() { h.failing_documents.push(s.document_id); }
        }
        h
    }

    /// Vectorize the document's current content as held by the document store.
    pub async fn vectorize_document(&self, document_id: &str, options: VectorizeOptions) -> Result<VectorizationResult> {
        let record = self.documents.get(document_id).await?.ok_or_else(|| Error::NotFound(format!("document {}", document_id)))?;
        self.vectorize(document_id, &record.content, options).await
    }

    pub async fn vectorize(&self, document_id: &str, content: &str, options: VectorizeOptions) -> Result<VectorizationResult> {
        if document_id.trim().is_empty() { return Err(Error::validation("document id is empty")); }
        let hash = content_hash(content);

        let (job_id, tx) = match self.join_or_register(document_id, &hash, options.force) {
            Registration::Join(mut done) => {
                tracing::debug!(document_id, "joining in-flight vectorization");
                let outcome = match done.wait_for(|o| o.is_some()).await { Ok(o) => (*o).clone(), Err(_) => None };
                match outcome {
                    Some(outcome) => return outcome.map(|r| VectorizationResult { joined: true, ..r }),
                    // The joined caller was dropped before finishing; run it ourselves.
                    None => {
                        let mut map = self.in_flight_jobs();
                        self.register(&mut map, document_id, &hash)
                    }
                }
            }
            Registration::Run(job_id, tx) => (job_id, tx),
        };
        let _registered = InFlightGuard { pipeline: self, document_id, job_id };

        let lock = self.document_lock(document_id);
        let _held = lock.lock().await;
        let outcome = self.run_job(document_id, content, &hash, options).await;
        let _ = tx.send(Some(outcome.clone()));
        outcome
    }

    /// Remove every chunk of a document from all indexes and drop its state.
    pub async fn delete_document(&self, document_id: &str) -> Result<usize> {
        let lock = self.document_lock(document_id);
        let _held = lock.lock().await;
        let indices = self.table.document_indices(document_id);
        let ids: Vec<ChunkId> = indices.iter().map(|i| chunk_id(document_id, *i)).collect();
        if !ids.is_empty() {
            let doomed = &ids;
            self.retry.run("vector_delete", move || self.vectors.delete(doomed)).await?;
            if let Some(lexical) = &self.lexical { lexical.delete(&ids)?; }
        }
        self.table.remove(document_id, &indices);
        self.table.remove_state(document_id);
        self.tracker.forget(document_id);
        tracing::info!(document_id, chunks = ids.len(), "document removed from index");
        Ok(ids.len())
    }

    fn document_lock(&self, document_id: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        Arc::clone(locks.entry(document_id.to_string()).or_default())
    }

    /// Join the newest registered job when it carries the same content,
    /// otherwise register a new job behind it. An older identical job is never
    /// joined: a different edit queued after it would win.
    fn join_or_register(&self, document_id: &str, hash: &str, force: bool) -> Registration {
        let mut map = self.in_flight_jobs();
        if !force {
            let newest = map.get(document_id).and_then(|jobs| jobs.last()).filter(|j| j.content_hash == hash);
            if let Some(job) = newest { return Registration::Join(job.done.clone()); }
        }
        let (job_id, tx) = self.register(&mut map, document_id, hash);
        Registration::Run(job_id, tx)
    }

    fn register(&self, map: &mut HashMap<String, Vec<InFlight>>, document_id: &str, hash: &str) -> (u64, watch::Sender<JobOutcome>) {
        let job_id = self.job_seq.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = watch::channel(None);
        map.entry(document_id.to_string()).or_default().push(InFlight { job_id, content_hash: hash.to_string(), done: rx });
        (job_id, tx)
    }

    fn in_flight_jobs(&self) -> MutexGuard<'_, HashMap<String, Vec<InFlight>>> {
        self.in_flight.lock().unwrap_or_else(|e| e.into_inner())
    }

    async fn run_job(&self, document_id: &str, content: &str, hash: &str, options: VectorizeOptions) -> Result<VectorizationResult> {
        let started = Instant::now();
        let record = self.documents.get(document_id).await?.ok_or_else(|| Error::NotFound(format!("document {}", document_id)))?;
        let previous = self.table.state(document_id);
        let title_changed = previous.as_ref().is_some_and(|s| s.title != record.title);
        let changes = self.tracker.diff(document_id, content);
        let now = Utc::now();

        let mut result = VectorizationResult { document_id: document_id.to_string(), ..Default::default() };
        let mut indexed: HashMap<usize, Fingerprint> = HashMap::new();
        let mut pending: Vec<(&ChunkChange, bool)> = Vec::new();
        let mut retitled: Vec<Chunk> = Vec::new();

        for change in &changes.chunks {
            match change.kind {
                ChangeKind::Added => pending.push((change, true)),
                ChangeKind::Modified => pending.push((change, false)),
                ChangeKind::Unchanged => match self.table.chunk_at(document_id, change.index) {
                    Some(stored) if !options.force && stored.content == change.text && stored.embedding.is_some() => {
                        indexed.insert(change.index, change.fingerprint);
                        result.chunks_unchanged += 1;
                        if title_changed { retitled.push(Chunk { document_title: record.title.clone(), ..stored }); }
                    }
                    Some(_) => pending.push((change, false)),
                    None => pending.push((change, true)),
                },
            }
        }

        let stale: Vec<usize> = self
            .table
            .document_indices(document_id)
            .into_iter()
            .filter(|i| *i >= changes.chunk_count())
            .chain(changes.removed.iter().copied())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        let texts: Vec<String> = pending.iter().map(|(c, _)| c.text.clone()).collect();
        let (vectors, last_error) = self.embed_isolated(document_id, &texts).await;

        let mut embedded: Vec<Chunk> = Vec::new();
        let mut failed: Vec<Chunk> = Vec::new();
        for ((change, is_new), vector) in pending.iter().zip(vectors) {
            let ok = vector.is_some();
            let chunk = Chunk {
                id: chunk_id(document_id, change.index),
                document_id: document_id.to_string(),
                user_id: record.user_id.clone(),
                document_title: record.title.clone(),
                chunk_index: change.index,
                content: change.text.clone(),
                content_hash: change.fingerprint.hash,
                embedding: vector,
                updated_at: now,
            };
            if ok {
                indexed.insert(change.index, change.fingerprint);
                if *is_new { result.chunks_added += 1 } else { result.chunks_updated += 1 }
                embedded.push(chunk);
            } else {
                failed.push(chunk);
            }
        }
        result.chunks_failed = failed.len();
        result.chunks_deleted = stale.len();

        let records: Vec<VectorRecord> = embedded.iter().chain(retitled.iter()).filter_map(vector_record).collect();
        if !records.is_empty() {
            self.retry.run("vector_upsert", move || self.vectors.upsert(records.clone())).await?;
        }
        let doomed: Vec<ChunkId> = stale.iter().map(|i| chunk_id(document_id, *i)).chain(failed.iter().map(|c| c.id.clone())).collect();
        if !doomed.is_empty() {
            let ids = &doomed;
            self.retry.run("vector_delete", move || self.vectors.delete(ids)).await?;
        }
        if let Some(lexical) = &self.lexical {
            lexical.upsert(&embedded)?;
            lexical.delete(&doomed)?;
        }

        let failed_indices: Vec<usize> = failed.iter().map(|c| c.chunk_index).collect();
        for chunk in embedded.into_iter().chain(retitled).chain(failed) { self.table.upsert(chunk); }
        self.table.remove(document_id, &stale);
        self.tracker.commit(document_id, indexed);

        let status = if changes.is_empty_content() {
            IndexStatus::Empty
        } else if failed_indices.is_empty() {
            IndexStatus::Indexed
        } else {
            IndexStatus::Partial
        };
        let changed = result.chunks_added + result.chunks_updated + result.chunks_deleted + result.chunks_failed > 0
            || title_changed
            || previous.as_ref().map_or(true, |p| p.last_indexed_hash != hash);
        let version = match &previous {
            Some(p) if changed => p.version + 1,
            Some(p) => p.version,
            None => 1,
        };
        if status == IndexStatus::Partial {
            let err = Error::PartialIndex { document_id: document_id.to_string(), failed: failed_indices.len() };
            tracing::warn!(document_id, failed = ?failed_indices, error = %err, "document partially indexed");
        }
        self.table.put_state(DocumentIndexState {
            document_id: document_id.to_string(),
            user_id: record.user_id.clone(),
            title: record.title.clone(),
            version,
            chunk_count: changes.chunk_count(),
            last_indexed_hash: hash.to_string(),
            is_vectorized: status == IndexStatus::Indexed,
            status,
            failed_chunks: failed_indices,
            last_error: if result.chunks_failed > 0 { last_error.map(|e| e.to_string()) } else { None },
            embedder_id: self.embedder.embedder_id().to_string(),
            updated_at: now,
        });

        result.duration_ms = started.elapsed().as_millis() as u64;
        tracing::info!(
            document_id,
            added = result.chunks_added,
            updated = result.chunks_updated,
            deleted = result.chunks_deleted,
            unchanged = result.chunks_unchanged,
            failed = result.chunks_failed,
            ms = result.duration_ms,
            "vectorized"
        );
        Ok(result)
    }

    /// Embed `texts` in batches; a failing batch is retried chunk by chunk so
    /// one bad input cannot fail its batch-mates. `None` marks a failed chunk.
    async fn embed_isolated(&self, document_id: &str, texts: &[String]) -> (Vec<Option<Vec<f32>>>, Option<Error>) {
        let mut out = Vec::with_capacity(texts.len());
        let mut last_error = None;
        for (n, batch) in texts.chunks(self.settings.batch_size.max(1)).enumerate() {
            if n > 0 && self.settings.inter_batch_delay_ms > 0 {
                tokio::time::sleep(Duration::from_millis(self.settings.inter_batch_delay_ms)).await;
            }
            match self.retry.run("embed_batch", move || self.embed_checked(batch)).await {
                Ok(vectors) => out.extend(vectors.into_iter().map(Some)),
                Err(e) => {
                    tracing::warn!(document_id, batch = n, size = batch.len(), error = %e, "batch embedding failed, isolating chunks");
                    for text in batch {
                        let one = std::slice::from_ref(text);
                        match self.retry.run("embed_chunk", move || self.embed_checked(one)).await {
                            Ok(mut v) => out.push(v.pop()),
                            Err(e) => {
                                tracing::warn!(document_id, error = %e, "chunk embedding failed");
                                out.push(None);
                                last_error = Some(e);
                            }
                        }
                    }
                }
            }
        }
        (out, last_error)
    }

    async fn embed_checked(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let limit = Duration::from_millis(self.settings.embed_timeout_ms);
        let vectors = tokio::time::timeout(limit, self.embedder.embed_batch(texts))
            .await
            .map_err(|_| Error::transient("embedding", format!("timed out after {}ms", self.settings.embed_timeout_ms)))??;
        if vectors.len() != texts.len() {
            return Err(Error::operation(format!("embedder returned {} vectors for {} inputs", vectors.len(), texts.len())));
        }
        let dim = self.embedder.dim();
        if let Some(v) = vectors.iter().find(|v| v.len() != dim) {
            return Err(Error::operation(format!("dim mismatch: got {} expected {}", v.len(), dim)));
        }
        Ok(vectors)
    }
}

fn vector_record(chunk: &Chunk) -> Option<VectorRecord> {
    let vector = chunk.embedding.clone()?;
    Some(VectorRecord {
        id: chunk.id.clone(),
        vector,
        metadata: ChunkMetadata {
            user_id: chunk.user_id.clone(),
            document_id: chunk.document_id.clone(),
            document_title: chunk.document_title.clone(),
            chunk_index: chunk.chunk_index,
            content: chunk.content.clone(),
            updated_at: chunk.updated_at,
        },
    })
}
