//! Background vectorization queue.
//!
//! `enqueue` returns immediately. Each document gets at most one worker task;
//! edits that arrive while a job is pending replace the pending content, so a
//! burst of keystrokes costs one job. Concurrency across documents is bounded
//! by a semaphore.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use serde::Serialize;
use tokio::sync::{Notify, Semaphore};

use scrivener_core::{Error, Result};

use crate::pipeline::{VectorizationPipeline, VectorizeOptions};

struct PendingJob {
    content: String,
    options: VectorizeOptions,
}

#[derive(Default)]
struct QueueState {
    pending: HashMap<String, PendingJob>,
    scheduled: HashSet<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct QueueStats {
    pub enqueued: u64,
    pub superseded: u64,
    pub completed: u64,
    pub failed: u64,
}

struct QueueInner {
    pipeline: Arc<VectorizationPipeline>,
    state: Mutex<QueueState>,
    permits: Arc<Semaphore>,
    workers: AtomicUsize,
    idle: Notify,
    closed: AtomicBool,
    enqueued: AtomicU64,
    superseded: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
}

#[derive(Clone)]
pub struct VectorizationQueue {
    inner: Arc<QueueInner>,
}

impl VectorizationQueue {
    pub fn new(pipeline: Arc<VectorizationPipeline>, concurrency: usize) -> Self {
        Self {
            inner: Arc::new(QueueInner {
                pipeline,
                state: Mutex::new(QueueState::default()),
                permits: Arc::new(Semaphore::new(concurrency.max(1))),
                workers: AtomicUsize::new(0),
                idle: Notify::new(),
                closed: AtomicBool::new(false),
                enqueued: AtomicU64::new(0),
                superseded: AtomicU64::new(0),
                completed: AtomicU64::new(0),
                failed: AtomicU64::new(0),
            }),
        }
    }

    /// Schedule a vectorization. Must be called from within a tokio runtime.
    pub fn enqueue(&self, document_id: &str, content: String, options: VectorizeOptions) -> Result<()> {
        if self.inner.closed.load(Ordering::SeqCst) { return Err(Error::operation("vectorization queue is shut down")); }
        let spawn = {
            let mut st = self.inner.state.lock().unwrap_or_else(|e| e.into_inner());
            if st.pending.insert(document_id.to_string(), PendingJob { content, options }).is_some() {
                self.inner.superseded.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(document_id, "pending edit superseded");
            }
            st.scheduled.insert(document_id.to_string())
        };
        self.inner.enqueued.fetch_add(1, Ordering::Relaxed);
        if spawn {
            self.inner.workers.fetch_add(1, Ordering::SeqCst);
            tokio::spawn(run_worker(Arc::clone(&self.inner), document_id.to_string()));
        }
        Ok(())
    }

    pub fn pending(&self) -> usize { self.inner.state.lock().unwrap_or_else(|e| e.into_inner()).pending.len() }

    pub fn stats(&self) -> QueueStats {
        QueueStats {
            enqueued: self.inner.enqueued.load(Ordering::Relaxed),
            superseded: self.inner.superseded.load(Ordering::Relaxed),
            completed: self.inner.completed.load(Ordering::Relaxed),
            failed: self.inner.failed.load(Ordering::Relaxed),
        }
    }

    /// Resolve once every scheduled job has finished.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.inner.idle.notified();
            if self.inner.workers.load(Ordering::SeqCst) == 0 { return; }
            notified.await;
        }
    }

    /// Refuse new work and drain what is already scheduled.
    pub async fn shutdown(&self) {
        self.inner.closed.store(true, Ordering::SeqCst);
        self.wait_idle().await;
        tracing::info!(stats = ?self.stats(), "vectorization queue drained");
    }
}

async fn run_worker(inner: Arc<QueueInner>, document_id: String) {
    loop {
        let permit = match Arc::clone(&inner.permits).acquire_owned().await {
            Ok(p) => p,
            Err(_) => {
                inner.state.lock().unwrap_or_else(|e| e.into_inner()).scheduled.remove(&document_id);
                break;
            }
        };
        let job = {
            let mut st = inner.state.lock().unwrap_or_else(|e| e.into_inner());
            match st.pending.remove(&document_id) {
                Some(job) => job,
                None => {
                    st.scheduled.remove(&document_id);
                    break;
                }
            }
        };
        match inner.pipeline.vectorize(&document_id, &job.content, job.options).await {
            Ok(r) => {
                inner.completed.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(document_id = %document_id, updated = r.chunks_updated, added = r.chunks_added, "queued job done");
            }
            Err(e) => {
                inner.failed.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(document_id = %document_id, error = %e, "queued vectorization failed");
            }
        }
        drop(permit);
    }
    if inner.workers.fetch_sub(1, Ordering::SeqCst) == 1 { inner.idle.notify_waiters(); }
}
