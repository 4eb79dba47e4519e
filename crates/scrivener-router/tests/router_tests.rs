use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use scrivener_core::config::RouterSettings;
use scrivener_core::traits::LlmService;
use scrivener_core::types::{CompletionOptions, Intent, Method, RouterContext};
use scrivener_core::{Error, Result};
use scrivener_embed::FakeEmbedder;
use scrivener_router::{load_seed_examples, train, HybridRouter, IntentClassifier, SeedExample, TrainOptions, TrainingSample};

struct ScriptedLlm {
    reply: String,
    delay: Duration,
    calls: AtomicUsize,
}

impl ScriptedLlm {
    fn new(reply: &str, delay: Duration) -> Arc<Self> { Arc::new(Self { reply: reply.to_string(), delay, calls: AtomicUsize::new(0) }) }

    fn calls(&self) -> usize { self.calls.load(Ordering::SeqCst) }
}

#[async_trait]
impl LlmService for ScriptedLlm {
    async fn complete(&self, _prompt: &str, _options: &CompletionOptions) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        Ok(self.reply.clone())
    }
}

const WEB_VERDICT: &str = "{\"intent\": \"web_search\", \"confidence\": 0.7, \"reasoning\": \"needs fresh information\"}";

fn settings() -> RouterSettings { RouterSettings { meta_timeout_ms: 50, meta_max_attempts: 2, ..RouterSettings::default() } }

fn router() -> HybridRouter { HybridRouter::new(Arc::new(FakeEmbedder::new(1024)), settings()) }

fn seed(text: &str, intent: Intent, confidence: f32) -> SeedExample { SeedExample { text: text.into(), intent, confidence } }

fn seeds() -> Vec<SeedExample> {
    vec![
        seed("search the web for the latest rust news", Intent::WebSearch, 1.0),
        seed("what does my q3 report say about revenue", Intent::RagQuery, 1.0),
        seed("rewrite this paragraph to be more formal", Intent::EditRequest, 1.0),
        seed("write an intro section for my essay", Intent::EditorWrite, 1.0),
        seed("what is the capital of france", Intent::Ask, 1.0),
    ]
}

#[tokio::test]
async fn cold_start_falls_back_to_the_configured_intent() {
    let r = router();
    let out = r.classify_intent("tell me something", &RouterContext::default()).await.expect("classify");
    assert_eq!(out.method, Method::Fallback);
    assert_eq!(out.intent, Intent::Ask);
    assert_eq!(out.confidence, 0.0);
    assert!(out.reasoning.as_deref().is_some_and(|r| r.contains("unavailable")));
    let m = r.get_metrics();
    assert_eq!(m.total_requests, 1);
    assert_eq!(m.method_count(Method::Fallback), 1);
}

#[tokio::test]
async fn well_covered_queries_stop_at_the_matcher() {
    let llm = ScriptedLlm::new(WEB_VERDICT, Duration::ZERO);
    let r = router().with_meta(llm.clone());
    assert_eq!(r.seed(&seeds()).await.expect("seed"), 5);

    let out = r.classify_intent("What does my Q3 report say about revenue?", &RouterContext::default()).await.expect("classify");
    assert_eq!(out.method, Method::Embedding);
    assert_eq!(out.intent, Intent::RagQuery);
    assert!(out.confidence > 0.99);
    assert_eq!(llm.calls(), 0);
}

#[tokio::test]
async fn disagreeing_neighbors_escalate_to_the_meta_classifier() {
    let llm = ScriptedLlm::new(WEB_VERDICT, Duration::ZERO);
    let r = router().with_meta(llm.clone());
    r.seed(&[seed("find the budget", Intent::RagQuery, 1.0), seed("find the budget", Intent::WebSearch, 1.0)]).await.expect("seed");

    let out = r.classify_intent("find the budget", &RouterContext::default()).await.expect("classify");
    assert_eq!(out.method, Method::Meta);
    assert_eq!(out.intent, Intent::WebSearch);
    assert!((out.confidence - 0.7).abs() < 1e-6);
    assert_eq!(out.reasoning.as_deref(), Some("needs fresh information"));
    assert_eq!(llm.calls(), 1);
}

#[tokio::test]
async fn meta_timeout_falls_back_to_the_best_cheaper_signal() {
    let llm = ScriptedLlm::new(WEB_VERDICT, Duration::from_secs(2));
    let r = router().with_meta(llm.clone());
    r.seed(&[seed("latest rust news", Intent::WebSearch, 0.5)]).await.expect("seed");

    let out = r.classify_intent("latest rust news", &RouterContext::default()).await.expect("classify");
    assert_eq!(out.method, Method::Fallback);
    assert_eq!(out.intent, Intent::WebSearch);
    assert!((out.confidence - 0.5).abs() < 1e-5);
    assert_eq!(llm.calls(), 2, "timeouts are retried up to meta_max_attempts");
}

#[tokio::test]
async fn a_confident_classifier_answers_before_the_meta_step() {
    let samples: Vec<TrainingSample> = [
        ("search the web for rust news", Intent::WebSearch),
        ("look up the weather online", Intent::WebSearch),
        ("what do my notes say about the budget", Intent::RagQuery),
        ("find in my documents the q3 numbers", Intent::RagQuery),
    ]
    .into_iter()
    .map(|(text, intent)| TrainingSample { text: text.into(), intent, context: RouterContext::default() })
    .collect();
    let classifier = IntentClassifier::from_model(train(&samples, TrainOptions::default()).expect("train")).expect("model");
    let llm = ScriptedLlm::new(WEB_VERDICT, Duration::ZERO);
    let r = router().with_classifier(classifier).with_meta(llm.clone());

    let out = r.classify_intent("what do my notes say about the budget", &RouterContext::default()).await.expect("classify");
    assert_eq!(out.method, Method::Classifier);
    assert_eq!(out.intent, Intent::RagQuery);
    assert_eq!(llm.calls(), 0);
    assert!(r.get_status().classifier_trained);
}

#[tokio::test]
async fn feedback_becomes_a_matcher_example() {
    let r = router();
    let query = "summarize the attached contract";
    let before = r.classify_intent(query, &RouterContext::default()).await.expect("classify");
    assert_eq!(before.method, Method::Fallback);

    r.add_feedback(query, Intent::RagQuery, before.intent, before.confidence).expect("feedback");
    r.flush_feedback().await.expect("flush");
    assert_eq!(r.get_status().examples, 1);

    let after = r.classify_intent(query, &RouterContext::default()).await.expect("classify");
    assert_eq!(after.method, Method::Embedding);
    assert_eq!(after.intent, Intent::RagQuery);

    let m = r.get_metrics();
    assert_eq!((m.feedback_count, m.corrections, m.total_requests), (1, 1, 2));

    assert!(matches!(r.add_feedback("  ", Intent::Ask, Intent::Ask, 0.5), Err(Error::Validation(_))));
    assert!(matches!(r.add_feedback(query, Intent::Ask, Intent::Ask, 1.5), Err(Error::Validation(_))));
    assert_eq!(r.get_metrics().feedback_count, 1);
}

#[tokio::test]
async fn slots_describe_the_request_without_changing_the_intent() {
    let r = router();
    let ctx = RouterContext { has_selection: true, selection_length: 80, target_document_id: Some("doc-7".into()), ..Default::default() };
    let out = r.classify_intent("latest news on the 2024 elections", &ctx).await.expect("classify");
    assert!(out.slots.needs_recency);
    assert!(out.slots.has_selection);
    assert_eq!(out.slots.target_document_id.as_deref(), Some("doc-7"));
    assert_eq!(out.intent, Intent::Ask);

    let plain = r.classify_intent("tidy up my outline", &RouterContext::default()).await.expect("classify");
    assert!(!plain.slots.needs_recency);
    assert!(!plain.slots.has_selection);
}

#[tokio::test]
async fn status_and_validation() {
    let r = router();
    let status = r.get_status();
    assert!(!status.classifier_trained);
    assert!(!status.meta_available);
    assert_eq!((status.examples, status.example_capacity), (0, 2_000));
    assert!(matches!(r.classify_intent("   ", &RouterContext::default()).await, Err(Error::Validation(_))));
    assert_eq!(r.get_metrics().total_requests, 0);
}

#[test]
fn models_and_examples_load_from_disk() {
    let dir = tempfile::tempdir().expect("tempdir");
    let samples = vec![
        TrainingSample { text: "search online for flights".into(), intent: Intent::WebSearch, context: RouterContext::default() },
        TrainingSample { text: "fix the typo in this sentence".into(), intent: Intent::EditRequest, context: RouterContext::default() },
    ];
    let trained = IntentClassifier::from_model(train(&samples, TrainOptions::default()).expect("train")).expect("model");
    let model_path = dir.path().join("classifier.json");
    trained.save(&model_path).expect("save");
    let loaded = IntentClassifier::load(&model_path).expect("load");
    assert!(loaded.is_trained());
    let ctx = RouterContext::default();
    let (a, b) = (trained.classify("search online for flights", &ctx), loaded.classify("search online for flights", &ctx));
    assert_eq!(a.intent, b.intent);
    assert!((a.confidence - b.confidence).abs() < 1e-5);
    assert!(matches!(IntentClassifier::load(&dir.path().join("missing.json")), Err(Error::NotFound(_))));

    let examples_path = dir.path().join("examples.json");
    std::fs::write(&examples_path, r#"[{"text": "hi", "intent": "ask"}, {"text": "news today", "intent": "web_search", "confidence": 0.8}]"#).expect("write");
    let examples = load_seed_examples(&examples_path).expect("examples");
    assert_eq!(examples.len(), 2);
    assert_eq!(examples[0].confidence, 1.0);
    assert_eq!(examples[1].intent, Intent::WebSearch);
}
