use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use anyhow::Context;
use indicatif::{ProgressBar, ProgressStyle};
use walkdir::WalkDir;

use scrivener_core::config::{expand_path, Settings};
use scrivener_core::documents::InMemoryDocumentStore;
use scrivener_core::traits::{Embedder, LexicalIndex, VectorIndex};
use scrivener_core::types::{RouterContext, SearchScope};
use scrivener_embed::get_default_embedder;
use scrivener_retrieval::{RetrievalEngine, SearchStrategy};
use scrivener_router::{load_seed_examples, train, HybridRouter, IntentClassifier, TrainOptions, TrainingSample};
use scrivener_text::TantivyLexicalIndex;
use scrivener_vector::{open_vector_index, VectorizationPipeline, VectorizeOptions};

use crate::Args;

const DEFAULT_EXAMPLES: &str = "data/intent_examples.json";

/// Everything one ingest/search run needs, wired from the settings.
struct Workspace {
    embedder: Arc<dyn Embedder>,
    vectors: Arc<dyn VectorIndex>,
    lexical: Arc<dyn LexicalIndex>,
    docs: Arc<InMemoryDocumentStore>,
    pipeline: VectorizationPipeline,
}

async fn open_workspace(settings: &Settings) -> anyhow::Result<Workspace> {
    let embedder = get_default_embedder(&settings.embedding)?;
    let vectors = open_vector_index(&settings.vector, embedder.dim()).await?;
    let lexical: Arc<dyn LexicalIndex> = match &settings.data.tantivy_index_dir {
        Some(dir) => {
            let dir = expand_path(dir);
            std::fs::create_dir_all(&dir).with_context(|| format!("create {}", dir.display()))?;
            Arc::new(TantivyLexicalIndex::open_or_create(&dir)?)
        }
        None => Arc::new(TantivyLexicalIndex::in_memory()?),
    };
    let docs = Arc::new(InMemoryDocumentStore::new());
    let pipeline = VectorizationPipeline::new(
        Arc::clone(&embedder),
        Arc::clone(&vectors),
        docs.clone(),
        settings.chunking.policy(),
        settings.pipeline.clone(),
    )
    .with_lexical(Arc::clone(&lexical));
    Ok(Workspace { embedder, vectors, lexical, docs, pipeline })
}

fn retrieval_engine(settings: &Settings, ws: &Workspace) -> RetrievalEngine {
    RetrievalEngine::new(Arc::clone(&ws.embedder), Arc::clone(&ws.vectors), settings.retrieval.clone())
        .with_lexical(Arc::clone(&ws.lexical), ws.pipeline.chunk_table())
}

fn txt_files(root: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = WalkDir::new(root)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter(|e| e.path().extension().and_then(|s| s.to_str()) == Some("txt"))
        .map(|e| e.into_path())
        .collect();
    files.sort();
    files
}

async fn ingest_dir(ws: &Workspace, dir: &Path, user: &str, show_progress: bool) -> anyhow::Result<usize> {
    let files = txt_files(dir);
    if files.is_empty() { anyhow::bail!("no .txt files under {}", dir.display()); }
    let pb = if show_progress { ProgressBar::new(files.len() as u64) } else { ProgressBar::hidden() };
    pb.set_style(ProgressStyle::default_bar().template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} documents {msg}")?.progress_chars("#>-"));

    let (mut chunks, mut failed) = (0usize, 0usize);
    for path in &files {
        let id = path.strip_prefix(dir).unwrap_or(path).to_string_lossy().replace('\\', "/");
        let title = path.file_stem().map(|s| s.to_string_lossy().to_string()).unwrap_or_else(|| id.clone());
        let content = std::fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
        pb.set_message(title.clone());
        ws.docs.put(&id, user, &title, &content)?;
        let r = ws.pipeline.vectorize_document(&id, VectorizeOptions::default()).await?;
        chunks += r.chunks_added + r.chunks_updated + r.chunks_unchanged;
        failed += r.chunks_failed;
        pb.inc(1);
    }
    pb.finish_with_message("done");
    if failed > 0 { println!("⚠️  {} chunks failed to embed; see `health` below", failed); }
    Ok(chunks)
}

pub async fn ingest(settings: &Settings, args: &Args) -> anyhow::Result<()> {
    let dir = args.positional.first().map(PathBuf::from).unwrap_or_else(|| expand_path(&settings.data.raw_txt_dir));
    let user = args.user();
    println!("Ingesting from {} as user '{}'", dir.display(), user);
    let ws = open_workspace(settings).await?;
    let started = Instant::now();
    let chunks = ingest_dir(&ws, &dir, &user, true).await?;
    let health = ws.pipeline.health();
    println!("\n✅ Ingest complete: {} documents, {} chunks in {:.1?}", health.documents, chunks, started.elapsed());
    println!("📊 indexed {} · partial {} · empty {}", health.indexed, health.partial, health.empty);
    for doc in &health.failing_documents { println!("   ✗ {}", doc); }
    println!("📦 vector index holds {} chunks for '{}'", ws.vectors.stats(&SearchScope::user(user.clone())).await?.count, user);
    Ok(())
}

pub async fn search(settings: &Settings, args: &Args) -> anyhow::Result<()> {
    let (Some(dir), Some(query)) = (args.positional.first(), args.positional.get(1)) else {
        anyhow::bail!("Usage: scrivener search <dir> \"<query>\" [--user <id>] [--strategy <s>] [--limit <n>]");
    };
    let user = args.user();
    let ws = open_workspace(settings).await?;
    ingest_dir(&ws, Path::new(dir), &user, false).await?;

    let engine = retrieval_engine(settings, &ws);
    let mut options = engine.default_options();
    if let Some(s) = args.value("strategy") { options = options.with_strategy(s.parse::<SearchStrategy>()?); }
    if let Some(n) = args.number("limit")? { options = options.with_limit(n); }

    let scope = SearchScope::user(user);
    let started = Instant::now();
    let results = engine.search(query, &scope, &options).await?;
    println!("🔍 '{}' → {} results in {:.1?}", query, results.len(), started.elapsed());
    for (i, r) in results.iter().enumerate() {
        let preview: String = r.content.chars().take(120).collect();
        println!("{:>2}. [{:.3}] {} #{}  {}", i + 1, r.similarity, r.document_title, r.chunk_index, preview.replace('\n', " "));
    }
    let stats = engine.stats();
    println!("\nstages: A={} B={} C={} (lexical queries {})", stats.stage_a, stats.stage_b, stats.stage_c, stats.lexical_queries);

    let context = engine.get_context(query, &scope, None, options.limit).await?;
    if !context.is_empty() { println!("\n--- context ---\n{}", context); }
    Ok(())
}

pub async fn classify(settings: &Settings, args: &Args) -> anyhow::Result<()> {
    let Some(query) = args.positional.first() else {
        anyhow::bail!("Usage: scrivener classify \"<query>\" [--documents] [--selection <chars>] [--dir <dir>]")
    };
    let embedder = get_default_embedder(&settings.embedding)?;
    let mut router = HybridRouter::new(embedder, settings.router.clone());

    if let Some(path) = &settings.router.classifier_model_path {
        let path = expand_path(path);
        match IntentClassifier::load(&path) {
            Ok(c) => router = router.with_classifier(c),
            Err(e) => tracing::warn!(error = %e, "classifier not loaded"),
        }
    }
    let examples_path = settings.router.examples_path.as_deref().map(expand_path).unwrap_or_else(|| PathBuf::from(DEFAULT_EXAMPLES));
    if examples_path.exists() {
        let examples = load_seed_examples(&examples_path)?;
        router.seed(&examples).await?;
    }

    let selection = args.number("selection")?.unwrap_or(0);
    let context = RouterContext {
        has_documents: args.has("documents"),
        has_selection: selection > 0,
        selection_length: selection,
        target_document_id: args.value("target").map(str::to_string),
        ..Default::default()
    };
    let classification = router.classify_intent(query, &context).await?;
    println!("{}", serde_json::to_string_pretty(&classification)?);
    println!("{}", serde_json::to_string_pretty(&router.get_status())?);

    if !classification.intent.needs_documents() { return Ok(()); }
    let Some(dir) = args.value("dir") else {
        println!("\n'{}' needs document context; pass --dir <dir> to retrieve it", classification.intent);
        return Ok(());
    };
    let user = args.user();
    let ws = open_workspace(settings).await?;
    ingest_dir(&ws, Path::new(dir), &user, false).await?;
    let scope = match &context.target_document_id {
        Some(doc) => SearchScope::document(user, doc.as_str()),
        None => SearchScope::user(user),
    };
    let engine = retrieval_engine(settings, &ws);
    let passages = engine.get_context(query, &scope, None, settings.retrieval.default_limit).await?;
    if passages.is_empty() { println!("\nno matching passages under {}", dir); } else { println!("\n--- context ---\n{}", passages); }
    Ok(())
}

pub fn train_router(args: &Args) -> anyhow::Result<()> {
    let (Some(samples_path), Some(out_path)) = (args.positional.first(), args.positional.get(1)) else {
        anyhow::bail!("Usage: scrivener train-router <samples.jsonl> <out.json> [--epochs <n>]");
    };
    let raw = std::fs::read_to_string(samples_path).with_context(|| format!("read {}", samples_path))?;
    let samples: Vec<TrainingSample> = raw
        .lines()
        .enumerate()
        .filter(|(_, l)| !l.trim().is_empty())
        .map(|(n, l)| serde_json::from_str(l).with_context(|| format!("{}:{}", samples_path, n + 1)))
        .collect::<anyhow::Result<_>>()?;
    let mut options = TrainOptions::default();
    if let Some(epochs) = args.number("epochs")? { options.epochs = epochs; }

    println!("Training on {} samples for {} epochs", samples.len(), options.epochs);
    let classifier = IntentClassifier::from_model(train(&samples, options)?)?;
    let correct = samples.iter().filter(|s| classifier.classify(&s.text, &s.context).intent == s.intent).count();
    classifier.save(Path::new(out_path))?;
    println!("✅ Saved model to {} (training accuracy {:.1}%)", out_path, 100.0 * correct as f32 / samples.len() as f32);
    Ok(())
}
