use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use scrivener_core::chunking::ChunkingPolicy;
use scrivener_core::config::{PipelineSettings, RetrievalSettings};
use scrivener_core::documents::InMemoryDocumentStore;
use scrivener_core::traits::LlmService;
use scrivener_core::types::{CompletionOptions, SearchScope};
use scrivener_core::{Error, Result};
use scrivener_embed::FakeEmbedder;
use scrivener_retrieval::{CancellationToken, RetrievalEngine, SearchOptions, SearchStrategy};
use scrivener_text::TantivyLexicalIndex;
use scrivener_vector::{InMemoryVectorIndex, VectorizationPipeline, VectorizeOptions};

struct ScriptedLlm {
    reply: Result<String>,
    delay: Duration,
    calls: AtomicUsize,
}

impl ScriptedLlm {
    fn replying(text: &str) -> Self { Self { reply: Ok(text.to_string()), delay: Duration::ZERO, calls: AtomicUsize::new(0) } }

    fn failing() -> Self { Self { reply: Err(Error::transient("llm", "503 unavailable")), delay: Duration::ZERO, calls: AtomicUsize::new(0) } }

    fn calls(&self) -> usize { self.calls.load(Ordering::SeqCst) }
}

#[async_trait]
impl LlmService for ScriptedLlm {
    async fn complete(&self, _prompt: &str, _options: &CompletionOptions) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() { tokio::time::sleep(self.delay).await; }
        self.reply.clone()
    }
}

struct Setup {
    pipeline: Arc<VectorizationPipeline>,
    docs: Arc<InMemoryDocumentStore>,
    engine: RetrievalEngine,
}

fn setup(llm: Option<Arc<ScriptedLlm>>, settings: RetrievalSettings) -> Setup {
    let embedder = Arc::new(FakeEmbedder::new(1024));
    let docs = Arc::new(InMemoryDocumentStore::new());
    let vectors = Arc::new(InMemoryVectorIndex::new());
    let lexical = Arc::new(TantivyLexicalIndex::in_memory().expect("tantivy"));
    let pipeline_settings = PipelineSettings { inter_batch_delay_ms: 0, base_backoff_ms: 1, max_backoff_ms: 2, ..PipelineSettings::default() };
    let pipeline = VectorizationPipeline::new(embedder.clone(), vectors.clone(), docs.clone(), ChunkingPolicy::default(), pipeline_settings)
        .with_lexical(lexical.clone());
    let mut engine = RetrievalEngine::new(embedder, vectors, settings).with_lexical(lexical, pipeline.chunk_table());
    if let Some(llm) = llm { engine = engine.with_rewriter(llm); }
    Setup { pipeline: Arc::new(pipeline), docs, engine }
}

async fn index(s: &Setup, id: &str, user: &str, title: &str, content: &str) {
    s.docs.put(id, user, title, content).expect("put");
    s.pipeline.vectorize_document(id, VectorizeOptions::default()).await.expect("vectorize");
}

const Q3_REPORT: &str = "The quarterly report covers company performance across regions.\n\n\
Hiring slowed in the northern offices during summer.\n\n\
Q3 results exceeded expectations with revenue up twelve percent.";

#[tokio::test]
async fn exact_match_is_served_by_the_first_stage() {
    let llm = Arc::new(ScriptedLlm::replying("unused"));
    let s = setup(Some(llm.clone()), RetrievalSettings::default());
    index(&s, "report-q3", "alice", "Q3 Report", Q3_REPORT).await;

    let opts = s.engine.default_options();
    let results = s.engine.search("Hiring slowed in the northern offices during summer.", &SearchScope::user("alice"), &opts).await.expect("search");
    assert_eq!(results[0].chunk_index, 1);
    assert!(results[0].similarity > 0.99);

    let stats = s.engine.stats();
    assert_eq!((stats.searches, stats.stage_a, stats.stage_b, stats.stage_c), (1, 1, 0, 0));
    assert_eq!(stats.lexical_queries, 0);
    assert_eq!(stats.rewrite_calls, 0);
    assert_eq!(llm.calls(), 0);
}

#[tokio::test]
async fn q3_question_finds_the_results_paragraph_until_deleted() {
    let s = setup(None, RetrievalSettings::default());
    index(&s, "report-q3", "alice", "Q3 Report", Q3_REPORT).await;
    let scope = SearchScope::user("alice");

    let results = s.engine.search("What were Q3 results?", &scope, &s.engine.default_options()).await.expect("search");
    assert!(!results.is_empty());
    assert_eq!(results[0].chunk_index, 2);
    assert_eq!(results[0].document_title, "Q3 Report");
    assert!(results[0].content.contains("Q3 results exceeded"));

    let ctx = s.engine.get_context("What were Q3 results?", &scope, None, 3).await.expect("context");
    assert!(ctx.starts_with("[1] Q3 Report\n"));
    assert!(ctx.contains("Q3 results exceeded expectations"));
    assert!(!ctx.contains("report-q3"));

    s.pipeline.delete_document("report-q3").await.expect("delete");
    let after = s.engine.search("What were Q3 results?", &scope, &s.engine.default_options()).await.expect("search");
    assert!(after.iter().all(|r| r.document_id != "report-q3"));
    assert!(s.engine.get_context("What were Q3 results?", &scope, None, 3).await.expect("context").is_empty());
}

#[tokio::test]
async fn results_never_cross_users_or_documents() {
    let s = setup(None, RetrievalSettings::default());
    let text = "Budget planning for the offsite retreat in October.";
    index(&s, "alice-plan", "alice", "Plan", text).await;
    index(&s, "alice-notes", "alice", "Notes", "Offsite retreat budget notes and planning ideas.").await;
    index(&s, "bob-plan", "bob", "Plan", text).await;

    for strategy in [SearchStrategy::Semantic, SearchStrategy::Hybrid, SearchStrategy::Adaptive] {
        let opts = s.engine.default_options().with_strategy(strategy).with_threshold(0.1);
        let mine = s.engine.search("offsite retreat budget", &SearchScope::user("alice"), &opts).await.expect("search");
        assert!(!mine.is_empty(), "{:?} found nothing", strategy);
        assert!(mine.iter().all(|r| r.document_id.starts_with("alice-")), "{:?} leaked {:?}", strategy, mine);

        let one = s.engine.search("offsite retreat budget", &SearchScope::document("alice", "alice-notes"), &opts).await.expect("search");
        assert!(!one.is_empty());
        assert!(one.iter().all(|r| r.document_id == "alice-notes"));
    }

    let ctx = s.engine.get_context("offsite retreat budget", &SearchScope::user("alice"), Some("alice-plan"), 5).await.expect("context");
    assert!(ctx.starts_with("[1] Plan\n"));
    assert!(!ctx.contains("Notes"));
}

#[tokio::test]
async fn rewrites_rescue_queries_with_no_shared_words() {
    let llm = Arc::new(ScriptedLlm::replying("1. photosynthesis converts sunlight into chemical energy\n2. plant biology"));
    let s = setup(Some(llm.clone()), RetrievalSettings::default());
    index(&s, "bio", "alice", "Biology", "Photosynthesis converts sunlight into chemical energy in plants.").await;

    let results = s.engine.search("how do leaves make food", &SearchScope::user("alice"), &s.engine.default_options()).await.expect("search");
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].document_id, "bio");
    assert!(results[0].similarity > 0.5);

    let stats = s.engine.stats();
    assert_eq!((stats.stage_a, stats.stage_b, stats.stage_c), (1, 1, 1));
    assert_eq!(stats.rewrite_calls, 1);
    assert_eq!(llm.calls(), 1);
}

#[tokio::test]
async fn failed_rewrite_falls_back_to_templates() {
    let llm = Arc::new(ScriptedLlm::failing());
    let s = setup(Some(llm.clone()), RetrievalSettings::default());
    index(&s, "bio", "alice", "Biology", "Photosynthesis converts sunlight into chemical energy in plants.").await;

    let results = s.engine.search("What about zebra migration?", &SearchScope::user("alice"), &s.engine.default_options()).await.expect("search");
    assert!(results.is_empty());
    let stats = s.engine.stats();
    assert_eq!(stats.rewrite_failures, 1);
    assert_eq!(stats.stage_c, 1);
    assert_eq!(stats.empty_results, 1);
}

#[tokio::test]
async fn semantic_strategy_never_escalates() {
    let s = setup(Some(Arc::new(ScriptedLlm::replying("unused"))), RetrievalSettings::default());
    index(&s, "bio", "alice", "Biology", "Photosynthesis converts sunlight into chemical energy in plants.").await;

    let opts = SearchOptions::default().with_strategy(SearchStrategy::Semantic);
    let results = s.engine.search("zebra migration", &SearchScope::user("alice"), &opts).await.expect("search");
    assert!(results.is_empty());
    let stats = s.engine.stats();
    assert_eq!((stats.stage_a, stats.stage_b, stats.stage_c, stats.lexical_queries), (1, 0, 0, 0));
}

#[tokio::test]
async fn cancelled_search_returns_partial_results() {
    let s = setup(None, RetrievalSettings::default());
    let token = CancellationToken::new();
    token.cancel();
    let results = s
        .engine
        .search_with_cancel("anything at all", &SearchScope::user("alice"), &s.engine.default_options(), &token)
        .await
        .expect("search");
    assert!(results.is_empty());
    assert_eq!(s.engine.stats().cancelled, 1);
}

#[tokio::test]
async fn cancellation_interrupts_a_slow_rewrite() {
    let llm = Arc::new(ScriptedLlm { reply: Ok("slow answer".into()), delay: Duration::from_secs(30), calls: AtomicUsize::new(0) });
    let settings = RetrievalSettings { rewrite_timeout_ms: 60_000, ..RetrievalSettings::default() };
    let s = setup(Some(llm.clone()), settings);
    index(&s, "bio", "alice", "Biology", "Photosynthesis converts sunlight into chemical energy in plants.").await;

    let token = CancellationToken::new();
    let trigger = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.cancel();
    });
    let started = std::time::Instant::now();
    let results = s
        .engine
        .search_with_cancel("zebra migration", &SearchScope::user("alice"), &s.engine.default_options(), &token)
        .await
        .expect("search");
    assert!(results.is_empty());
    assert!(started.elapsed() < Duration::from_secs(5));
    assert_eq!(llm.calls(), 1);
    assert_eq!(s.engine.stats().cancelled, 1);
}

#[tokio::test]
async fn oversized_limits_are_capped_instead_of_overflowing() {
    let s = setup(None, RetrievalSettings::default());
    index(&s, "report-q3", "alice", "Q3 Report", Q3_REPORT).await;

    for strategy in [SearchStrategy::Hybrid, SearchStrategy::Adaptive] {
        let opts = s.engine.default_options().with_strategy(strategy).with_limit(usize::MAX).with_threshold(0.0);
        let results = s.engine.search("Q3 results", &SearchScope::user("alice"), &opts).await.expect("search");
        assert_eq!(results.len(), 3, "{:?}", strategy);
    }
}

#[tokio::test]
async fn invalid_requests_are_rejected() {
    let s = setup(None, RetrievalSettings::default());
    let opts = s.engine.default_options();
    assert!(matches!(s.engine.search("   ", &SearchScope::user("alice"), &opts).await, Err(Error::Validation(_))));
    assert!(matches!(s.engine.search("q", &SearchScope::user(""), &opts).await, Err(Error::Validation(_))));
    let bad = opts.clone().with_threshold(1.5);
    assert!(matches!(s.engine.search("q", &SearchScope::user("alice"), &bad).await, Err(Error::Validation(_))));
    assert!(s.engine.search("nothing indexed", &SearchScope::user("alice"), &opts).await.expect("search").is_empty());
}
