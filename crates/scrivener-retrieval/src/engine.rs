//! Staged, lazily escalating retrieval.
//!
//! - Stage A: semantic search at the caller's threshold.
//! - Stage B: relaxed threshold, semantic candidates blended with lexical hits.
//! - Stage C: paraphrased queries (LLM rewrite, template fallback), each searched semantically.
//!
//! A stage runs only when every earlier stage missed the quality bar. Results
//! of all executed stages are merged, deduplicated and ranked.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use scrivener_core::config::RetrievalSettings;
use scrivener_core::math::cosine_similarity;
use scrivener_core::traits::{Embedder, LexicalIndex, LlmService, VectorIndex};
use scrivener_core::types::{SearchResult, SearchScope, VectorQuery};
use scrivener_core::{Error, Result};
use scrivener_text::term_overlap;
use scrivener_vector::ChunkTable;

use crate::context::format_context;
use crate::expansion::expand_query;
use crate::options::{SearchOptions, SearchStrategy};
use crate::rewrite::QueryRewriter;
use crate::scoring::{blend, clears_bar, merge_results};
use crate::stats::{bump, Counters, SearchStats};

/// Upper bound on rows requested from either index in one query.
const MAX_CANDIDATES: usize = 1_000;

pub struct RetrievalEngine {
    embedder: Arc<dyn Embedder>,
    vectors: Arc<dyn VectorIndex>,
    lexical: Option<Arc<dyn LexicalIndex>>,
    chunks: Option<Arc<ChunkTable>>,
    rewriter: Option<QueryRewriter>,
    settings: RetrievalSettings,
    counters: Counters,
}

impl RetrievalEngine {
    pub fn new(embedder: Arc<dyn Embedder>, vectors: Arc<dyn VectorIndex>, settings: RetrievalSettings) -> Self {
        Self { embedder, vectors, lexical: None, chunks: None, rewriter: None, settings, counters: Counters::default() }
    }

    /// Enable the lexical half of Stage B. The chunk table supplies content
    /// and embeddings for hits the semantic candidate list did not contain.
    pub fn with_lexical(mut self, lexical: Arc<dyn LexicalIndex>, chunks: Arc<ChunkTable>) -> Self {
        self.lexical = Some(lexical);
        self.chunks = Some(chunks);
        self
    }

    pub fn with_rewriter(mut self, llm: Arc<dyn LlmService>) -> Self {
        self.rewriter = Some(QueryRewriter::new(llm, self.settings.rewrite_timeout_ms));
        self
    }

    pub fn default_options(&self) -> SearchOptions { SearchOptions::from_settings(&self.settings) }

    pub fn stats(&self) -> SearchStats { self.counters.snapshot() }

    pub async fn search(&self, query: &str, scope: &SearchScope, options: &SearchOptions) -> Result<Vec<SearchResult>> {
        self.search_with_cancel(query, scope, options, &CancellationToken::new()).await
    }

    /// Like [`search`](Self::search); on cancellation returns whatever earlier
    /// stages already produced.
    pub async fn search_with_cancel(
        &self,
        query: &str,
        scope: &SearchScope,
        options: &SearchOptions,
        cancel: &CancellationToken,
    ) -> Result<Vec<SearchResult>> {
        let query = query.trim();
        if query.is_empty() { return Err(Error::validation("search query is empty")); }
        scope.validate()?;
        if !(0.0..=1.0).contains(&options.threshold) {
            return Err(Error::validation(format!("threshold must be within [0, 1], got {}", options.threshold)));
        }
        bump(&self.counters.searches);
        let limit = options.limit.clamp(1, MAX_CANDIDATES);

        let Some(query_vec) = self.cancellable(cancel, self.embed_query(query)).await else { return Ok(Vec::new()) };
        let query_vec = query_vec?;

        let mut collected: Vec<SearchResult> = Vec::new();
        match options.strategy {
            SearchStrategy::Semantic => {
                if let Some(r) = self.cancellable(cancel, self.stage_a(&query_vec, scope, options.threshold, limit)).await {
                    collected.extend(r?);
                }
            }
            SearchStrategy::Hybrid => {
                if let Some(r) = self.cancellable(cancel, self.stage_b(query, &query_vec, scope, options.threshold, limit)).await {
                    collected.extend(r?);
                }
            }
            SearchStrategy::Adaptive => self.adaptive(query, &query_vec, scope, options, limit, cancel, &mut collected).await?,
        }

        let results = merge_results(collected, limit);
        if results.is_empty() { bump(&self.counters.empty_results); }
        tracing::debug!(query_len = query.len(), results = results.len(), strategy = ?options.strategy, "search done");
        Ok(results)
    }

    #[allow(clippy::too_many_arguments)]
    async fn adaptive(
        &self,
        query: &str,
        query_vec: &[f32],
        scope: &SearchScope,
        options: &SearchOptions,
        limit: usize,
        cancel: &CancellationToken,
        collected: &mut Vec<SearchResult>,
    ) -> Result<()> {
        let bar = self.settings.quality_bar;
        let base = options.threshold;
        let floor = self.settings.min_threshold.min(base);
        let relax = self.settings.threshold_relaxation;

        let Some(a) = self.cancellable(cancel, self.stage_a(query_vec, scope, base, limit)).await else { return Ok(()) };
        collected.extend(a?);
        if clears_bar(collected, bar) { return Ok(()); }

        let relaxed = (base - relax).max(floor);
        let Some(b) = self.cancellable(cancel, self.stage_b(query, query_vec, scope, relaxed, limit)).await else { return Ok(()) };
        match b {
            Ok(b) => collected.extend(b),
            Err(e) => tracing::warn!(error = %e, "hybrid stage failed, continuing with semantic results"),
        }
        if clears_bar(collected, bar) { return Ok(()); }

        let widest = (base - 2.0 * relax).max(floor);
        let Some(c) = self.cancellable(cancel, self.stage_c(query, scope, widest, limit, options)).await else { return Ok(()) };
        match c {
            Ok(c) => collected.extend(c),
            Err(e) => tracing::warn!(error = %e, "expansion stage failed, returning earlier results"),
        }
        Ok(())
    }

    async fn stage_a(&self, query_vec: &[f32], scope: &SearchScope, threshold: f32, limit: usize) -> Result<Vec<SearchResult>> {
        bump(&self.counters.stage_a);
        self.semantic(query_vec, scope, threshold, limit).await
    }

    async fn stage_b(&self, query: &str, query_vec: &[f32], scope: &SearchScope, threshold: f32, limit: usize) -> Result<Vec<SearchResult>> {
        bump(&self.counters.stage_b);
        let pool = limit.saturating_mul(self.settings.candidate_multiplier.max(1)).min(MAX_CANDIDATES);
        let semantic = self.semantic(query_vec, scope, 0.0, pool).await?;
        let mut candidates: HashMap<String, SearchResult> = semantic.into_iter().map(|r| (r.chunk_id.clone(), r)).collect();

        if let (Some(lexical), Some(chunks)) = (&self.lexical, &self.chunks) {
            bump(&self.counters.lexical_queries);
            for hit in lexical.search(query, scope, pool)? {
                if candidates.contains_key(&hit.chunk_id) { continue; }
                let Some(chunk) = chunks.chunk(&hit.chunk_id) else { continue };
                let similarity = chunk.embedding.as_deref().map_or(0.0, |e| cosine_similarity(query_vec, e).max(0.0));
                candidates.insert(hit.chunk_id.clone(), SearchResult {
                    chunk_id: chunk.id,
                    document_id: chunk.document_id,
                    document_title: chunk.document_title,
                    content: chunk.content,
                    similarity,
                    chunk_index: chunk.chunk_index,
                    updated_at: chunk.updated_at,
                });
            }
        }

        let (ws, wl) = (self.settings.semantic_weight, self.settings.lexical_weight);
        Ok(candidates
            .into_values()
            .map(|mut r| {
                r.similarity = blend(r.similarity, term_overlap(query, &r.content), ws, wl);
                r
            })
            .filter(|r| r.similarity >= threshold)
            .collect())
    }

    async fn stage_c(&self, query: &str, scope: &SearchScope, threshold: f32, limit: usize, options: &SearchOptions) -> Result<Vec<SearchResult>> {
        let variants = self.variants(query, options).await;
        if variants.is_empty() { return Ok(Vec::new()); }
        bump(&self.counters.stage_c);
        let vectors = self.embed_with_timeout(&variants).await?;
        let mut out = Vec::new();
        for v in &vectors { out.extend(self.semantic(v, scope, threshold, limit).await?); }
        Ok(out)
    }

    async fn variants(&self, query: &str, options: &SearchOptions) -> Vec<String> {
        let max = self.settings.max_expansions.clamp(1, 3);
        if options.use_query_rewriting {
            if let Some(rewriter) = &self.rewriter {
                bump(&self.counters.rewrite_calls);
                match rewriter.rewrite(query, max).await {
                    Ok(v) => return v,
                    Err(e) => {
                        bump(&self.counters.rewrite_failures);
                        tracing::warn!(error = %e, "query rewrite failed, using template expansion");
                        return expand_query(query, max);
                    }
                }
            }
        }
        if options.use_query_expansion { expand_query(query, max) } else { Vec::new() }
    }

    async fn semantic(&self, query_vec: &[f32], scope: &SearchScope, threshold: f32, top_k: usize) -> Result<Vec<SearchResult>> {
        let q = VectorQuery { top_k, filter: scope.clone(), threshold: Some(threshold) };
        let matches = tokio::time::timeout(self.upstream_timeout(), self.vectors.query(query_vec, &q))
            .await
            .map_err(|_| Error::transient("vector_index", "query timed out"))??;
        Ok(matches.into_iter().map(SearchResult::from).collect())
    }

    async fn embed_query(&self, query: &str) -> Result<Vec<f32>> {
        let mut v = self.embed_with_timeout(&[query.to_string()]).await?;
        v.pop().ok_or_else(|| Error::operation("embedder returned no vector for the query"))
    }

    async fn embed_with_timeout(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let vectors = tokio::time::timeout(self.upstream_timeout(), self.embedder.embed_batch(texts))
            .await
            .map_err(|_| Error::transient("embedding", format!("timed out after {}ms", self.settings.embed_timeout_ms)))??;
        if vectors.len() != texts.len() {
            return Err(Error::operation(format!("embedder returned {} vectors for {} inputs", vectors.len(), texts.len())));
        }
        Ok(vectors)
    }

    fn upstream_timeout(&self) -> Duration { Duration::from_millis(self.settings.embed_timeout_ms) }

    async fn cancellable<T>(&self, cancel: &CancellationToken, fut: impl Future<Output = T>) -> Option<T> {
        if cancel.is_cancelled() {
            bump(&self.counters.cancelled);
            return None;
        }
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                bump(&self.counters.cancelled);
                tracing::debug!("search cancelled");
                None
            }
            out = fut => Some(out),
        }
    }

    /// Search and render the hits as a prompt-ready context block. With a
    /// `document_id` the search is confined to that document.
    pub async fn get_context(&self, query: &str, scope: &SearchScope, document_id: Option<&str>, max_results: usize) -> Result<String> {
        let scope = match document_id {
            Some(doc) => SearchScope::document(scope.user_id.clone(), doc),
            None => scope.clone(),
        };
        let options = self.default_options().with_limit(max_results);
        let results = self.search(query, &scope, &options).await?;
        Ok(format_context(&results, self.settings.context_char_budget))
    }
}
