//! Hybrid intent router.
//!
//! Cascade, cheapest first, stopping at the first accepted signal:
//! embedding matcher, learned classifier, LLM meta-classifier. When the meta
//! step is unavailable the best cheaper signal is returned as a fallback, so
//! every well-formed request gets a classification.

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};

use scrivener_core::config::RouterSettings;
use scrivener_core::traits::{Embedder, LlmService};
use scrivener_core::types::{FeedbackRecord, Intent, IntentExample, Method, RouterClassification, RouterContext, Slots};
use scrivener_core::{Error, Result};

use crate::classifier::IntentClassifier;
use crate::features::needs_recency;
use crate::matcher::{EmbeddingMatcher, MatchOutcome};
use crate::meta::{MetaClassifier, MetaOutcome, SignalHint};
use crate::metrics::{MetricsRecorder, RouterMetrics};

/// Labeled utterance used to seed the matcher.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeedExample {
    pub text: String,
    pub intent: Intent,
    #[serde(default = "full_confidence")]
    pub confidence: f32,
}

fn full_confidence() -> f32 { 1.0 }

pub fn load_seed_examples(path: &Path) -> Result<Vec<SeedExample>> {
    let raw = std::fs::read_to_string(path).map_err(|e| Error::NotFound(format!("intent examples {}: {}", path.display(), e)))?;
    serde_json::from_str(&raw).map_err(|e| Error::Configuration(format!("intent examples {}: {}", path.display(), e)))
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RouterStatus {
    pub classifier_trained: bool,
    pub examples: usize,
    pub example_capacity: usize,
    pub meta_available: bool,
    pub metrics: RouterMetrics,
}

enum FeedbackCommand {
    Record(FeedbackRecord),
    Flush(oneshot::Sender<()>),
}

pub struct HybridRouter {
    embedder: Arc<dyn Embedder>,
    matcher: Arc<EmbeddingMatcher>,
    classifier: IntentClassifier,
    meta: MetaClassifier,
    settings: RouterSettings,
    metrics: Arc<MetricsRecorder>,
    feedback: mpsc::UnboundedSender<FeedbackCommand>,
}

impl HybridRouter {
    /// Starts the feedback worker, so it must run inside a tokio runtime.
    pub fn new(embedder: Arc<dyn Embedder>, settings: RouterSettings) -> Self {
        let matcher = Arc::new(EmbeddingMatcher::new(&settings));
        let metrics = Arc::new(MetricsRecorder::default());
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(feedback_worker(
            rx,
            Arc::clone(&embedder),
            Arc::clone(&matcher),
            settings.feedback_example_confidence,
            Duration::from_millis(settings.embed_timeout_ms),
        ));
        Self { embedder, matcher, classifier: IntentClassifier::untrained(), meta: MetaClassifier::disabled(&settings), settings, metrics, feedback: tx }
    }

    pub fn with_classifier(mut self, classifier: IntentClassifier) -> Self { self.classifier = classifier; self }

    pub fn with_meta(mut self, llm: Arc<dyn LlmService>) -> Self { self.meta = MetaClassifier::new(llm, &self.settings); self }

    /// Embed and store labeled examples. Returns how many were added.
    pub async fn seed(&self, examples: &[SeedExample]) -> Result<usize> {
        if examples.is_empty() { return Ok(0); }
        let texts: Vec<String> = examples.iter().map(|e| e.text.clone()).collect();
        let vectors = self.embed_batch(&texts).await?;
        for (ex, embedding) in examples.iter().zip(vectors) {
            self.matcher.add(IntentExample { text: ex.text.clone(), embedding, intent: ex.intent, confidence: ex.confidence.clamp(0.0, 1.0) });
        }
        tracing::info!(examples = examples.len(), stored = self.matcher.len(), "router seeded");
        Ok(examples.len())
    }

    pub async fn classify_intent(&self, query: &str, context: &RouterContext) -> Result<RouterClassification> {
        let query = query.trim();
        if query.is_empty() { return Err(Error::validation("query is empty")); }
        let started = Instant::now();
        let slots = Slots {
            needs_recency: needs_recency(query),
            has_selection: context.has_selection,
            target_document_id: context.target_document_id.clone(),
        };

        let matched = match self.embed_batch(&[query.to_string()]).await {
            Ok(mut v) => v.pop().map(|e| self.matcher.nearest_intent(&e)).unwrap_or_else(MatchOutcome::empty),
            Err(e) => {
                tracing::warn!(error = %e, "query embedding failed, skipping the matcher");
                MatchOutcome::empty()
            }
        };
        let (intent, confidence, method, reasoning) = self.decide(query, context, &matched).await;

        let classification = RouterClassification { intent, confidence, slots, method, reasoning, latency_ms: started.elapsed().as_millis() as u64 };
        self.metrics.record(&classification);
        tracing::debug!(method = %method, intent = %intent, confidence, latency_ms = classification.latency_ms, "intent classified");
        Ok(classification)
    }

    async fn decide(&self, query: &str, context: &RouterContext, matched: &MatchOutcome) -> (Intent, f32, Method, Option<String>) {
        let embedding_hint = matched.intent.map(|intent| SignalHint { method: Method::Embedding, intent, confidence: matched.confidence });
        if let Some(hint) = embedding_hint {
            if matched.confidence >= self.settings.embedding_accept && matched.agreement >= self.settings.min_agreement {
                return (hint.intent, hint.confidence, Method::Embedding, None);
            }
        }

        let classifier_hint = if self.classifier.is_trained() {
            let out = self.classifier.classify(query, context);
            if out.confidence >= self.settings.classifier_accept { return (out.intent, out.confidence, Method::Classifier, None); }
            Some(SignalHint { method: Method::Classifier, intent: out.intent, confidence: out.confidence })
        } else {
            None
        };

        let hints: Vec<SignalHint> = embedding_hint.into_iter().chain(classifier_hint).collect();
        match self.meta.classify(query, context, &hints).await {
            MetaOutcome::Classified { intent, confidence, reasoning } => (intent, confidence, Method::Meta, reasoning),
            MetaOutcome::Unavailable { reason } => {
                let best = hints
                    .iter()
                    .filter(|h| h.confidence > 0.0)
                    .max_by(|a, b| a.confidence.partial_cmp(&b.confidence).unwrap_or(std::cmp::Ordering::Equal));
                let note = Some(format!("meta-classifier unavailable: {}", reason));
                match best {
                    Some(h) => (h.intent, h.confidence, Method::Fallback, note),
                    None => (self.settings.fallback_intent, 0.0, Method::Fallback, note),
                }
            }
        }
    }

    /// Queue a correction. Labels are checked here; embedding and storage happen in the background.
    pub fn add_feedback(&self, query: &str, correct_intent: Intent, predicted_intent: Intent, confidence: f32) -> Result<()> {
        let query = query.trim();
        if query.is_empty() { return Err(Error::validation("feedback query is empty")); }
        if !(0.0..=1.0).contains(&confidence) { return Err(Error::validation(format!("feedback confidence {} outside [0, 1]", confidence))); }
        let record = FeedbackRecord { query: query.to_string(), correct_intent, predicted_intent, confidence };
        self.feedback.send(FeedbackCommand::Record(record)).map_err(|_| Error::operation("feedback worker stopped"))?;
        self.metrics.record_feedback(correct_intent != predicted_intent);
        Ok(())
    }

    /// Resolve once every feedback record queued so far has been applied.
    pub async fn flush_feedback(&self) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.feedback.send(FeedbackCommand::Flush(tx)).map_err(|_| Error::operation("feedback worker stopped"))?;
        rx.await.map_err(|_| Error::operation("feedback worker stopped"))
    }

    pub fn get_metrics(&self) -> RouterMetrics { self.metrics.snapshot() }

    pub fn get_status(&self) -> RouterStatus {
        RouterStatus {
            classifier_trained: self.classifier.is_trained(),
            examples: self.matcher.len(),
            example_capacity: self.matcher.capacity(),
            meta_available: self.meta.is_available(),
            metrics: self.metrics.snapshot(),
        }
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        embed_with_timeout(self.embedder.as_ref(), texts, Duration::from_millis(self.settings.embed_timeout_ms)).await
    }
}

async fn embed_with_timeout(embedder: &dyn Embedder, texts: &[String], limit: Duration) -> Result<Vec<Vec<f32>>> {
    let vectors = tokio::time::timeout(limit, embedder.embed_batch(texts))
        .await
        .map_err(|_| Error::transient("embedding", format!("timed out after {}ms", limit.as_millis())))??;
    if vectors.len() != texts.len() {
        return Err(Error::operation(format!("embedder returned {} vectors for {} inputs", vectors.len(), texts.len())));
    }
    Ok(vectors)
}

async fn feedback_worker(
    mut rx: mpsc::UnboundedReceiver<FeedbackCommand>,
    embedder: Arc<dyn Embedder>,
    matcher: Arc<EmbeddingMatcher>,
    example_confidence: f32,
    limit: Duration,
) {
    while let Some(cmd) = rx.recv().await {
        match cmd {
            FeedbackCommand::Record(record) => match embed_with_timeout(embedder.as_ref(), std::slice::from_ref(&record.query), limit).await {
                Ok(mut v) => {
                    if let Some(embedding) = v.pop() {
                        matcher.add(IntentExample { text: record.query, embedding, intent: record.correct_intent, confidence: example_confidence });
                    }
                }
                Err(e) => tracing::warn!(error = %e, intent = %record.correct_intent, "feedback example dropped"),
            },
            FeedbackCommand::Flush(done) => {
                let _ = done.send(());
            }
        }
    }
    tracing::debug!("feedback worker stopped");
}
