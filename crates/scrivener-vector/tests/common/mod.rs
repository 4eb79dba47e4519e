#![allow(dead_code)]

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use scrivener_core::chunking::ChunkingPolicy;
use scrivener_core::config::PipelineSettings;
use scrivener_core::documents::InMemoryDocumentStore;
use scrivener_core::traits::Embedder;
use scrivener_core::{Error, Result};
use scrivener_embed::FakeEmbedder;
use scrivener_vector::{InMemoryVectorIndex, VectorizationPipeline};

/// FakeEmbedder with call accounting and scripted failures.
pub struct TestEmbedder {
    inner: FakeEmbedder,
    pub calls: AtomicUsize,
    pub texts: AtomicUsize,
    pub transient_failures: AtomicUsize,
    pub poison: Option<&'static str>,
    pub delay: Duration,
}

impl TestEmbedder {
    pub fn new() -> Self {
        Self { inner: FakeEmbedder::new(64), calls: AtomicUsize::new(0), texts: AtomicUsize::new(0), transient_failures: AtomicUsize::new(0), poison: None, delay: Duration::ZERO }
    }

    pub fn poisoned(marker: &'static str) -> Self { Self { poison: Some(marker), ..Self::new() } }

    pub fn flaky(failures: usize) -> Self { Self { transient_failures: AtomicUsize::new(failures), ..Self::new() } }

    pub fn slow(delay: Duration) -> Self { Self { delay, ..Self::new() } }

    pub fn texts(&self) -> usize { self.texts.load(Ordering::SeqCst) }

    pub fn calls(&self) -> usize { self.calls.load(Ordering::SeqCst) }
}

#[async_trait]
impl Embedder for TestEmbedder {
    fn embedder_id(&self) -> &str { self.inner.embedder_id() }
    fn dim(&self) -> usize { self.inner.dim() }
    fn max_len(&self) -> usize { self.inner.max_len() }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() { tokio::time::sleep(self.delay).await; }
        if self.transient_failures.load(Ordering::SeqCst) > 0 {
            self.transient_failures.fetch_sub(1, Ordering::SeqCst);
            return Err(Error::transient("embedding", "429 rate limited"));
        }
        if let Some(marker) = self.poison {
            if texts.iter().any(|t| t.contains(marker)) { return Err(Error::operation("input rejected by model")); }
        }
        self.texts.fetch_add(texts.len(), Ordering::SeqCst);
        self.inner.embed_batch(texts).await
    }
}

pub fn fast_settings() -> PipelineSettings {
    PipelineSettings {
        batch_size: 4,
        inter_batch_delay_ms: 0,
        max_attempts: 3,
        base_backoff_ms: 1,
        max_backoff_ms: 2,
        embed_timeout_ms: 5_000,
        queue_concurrency: 2,
    }
}

pub struct Harness {
    pub pipeline: Arc<VectorizationPipeline>,
    pub docs: Arc<InMemoryDocumentStore>,
    pub vectors: Arc<InMemoryVectorIndex>,
    pub embedder: Arc<TestEmbedder>,
}

pub fn harness(embedder: TestEmbedder) -> Harness {
    let embedder = Arc::new(embedder);
    let docs = Arc::new(InMemoryDocumentStore::new());
    let vectors = Arc::new(InMemoryVectorIndex::new());
    let pipeline = VectorizationPipeline::new(embedder.clone(), vectors.clone(), docs.clone(), ChunkingPolicy::default(), fast_settings());
    Harness { pipeline: Arc::new(pipeline), docs, vectors, embedder }
}

pub fn paragraphs(n: usize) -> String {
    (0..n).map(|i| format!("Paragraph {} discusses topic{} in some detail.", i, i)).collect::<Vec<_>>().join("\n\n")
}
