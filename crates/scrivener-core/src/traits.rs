//! Seams to the external collaborators: embedding model, vector index,
//! lexical index, language model and document store.

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{
    Chunk, ChunkId, CompletionOptions, DocumentRecord, IndexStats, SearchScope, VectorMatch, VectorQuery, VectorRecord,
};

#[async_trait]
pub trait Embedder: Send + Sync {
    /// Stable identifier for the provider/model (e.g. `fake:xxh64:d1024`).
    fn embedder_id(&self) -> &str;
    /// Embedding dimensionality (D).
    fn dim(&self) -> usize;
    /// Maximum token length for this provider.
    fn max_len(&self) -> usize;
    /// Compute L2-normalized embeddings for a batch of input texts.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut out = self.embed_batch(&[text.to_string()]).await?;
        out.pop().ok_or_else(|| crate::error::Error::operation("embedder returned no vector"))
    }
}

/// Approximate nearest-neighbor store. The filter in [`VectorQuery`] must be
/// applied by the implementation itself, never by the caller afterwards.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    async fn upsert(&self, records: Vec<VectorRecord>) -> Result<()>;
    async fn query(&self, vector: &[f32], query: &VectorQuery) -> Result<Vec<VectorMatch>>;
    async fn delete(&self, ids: &[ChunkId]) -> Result<()>;
    async fn stats(&self, filter: &SearchScope) -> Result<IndexStats>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct LexicalHit {
    pub chunk_id: ChunkId,
    pub score: f32,
}

/// Keyword index over chunk content, kept in step with the vector index.
pub trait LexicalIndex: Send + Sync {
    fn upsert(&self, chunks: &[Chunk]) -> Result<()>;
    fn delete(&self, ids: &[ChunkId]) -> Result<()>;
    fn search(&self, query: &str, scope: &SearchScope, k: usize) -> Result<Vec<LexicalHit>>;
}

#[async_trait]
pub trait LlmService: Send + Sync {
    async fn complete(&self, prompt: &str, options: &CompletionOptions) -> Result<String>;
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn get(&self, document_id: &str) -> Result<Option<DocumentRecord>>;
}
