//! Domain types shared by the router, the retrieval engine and the pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

pub type ChunkId = String;

/// Stable chunk identifier: `<document_id>:<chunk_index>`.
pub fn chunk_id(document_id: &str, chunk_index: usize) -> ChunkId { format!("{}:{}", document_id, chunk_index) }

/// Closed set of capabilities a user utterance can be routed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    Ask,
    WebSearch,
    RagQuery,
    EditRequest,
    EditorWrite,
    Other,
}

impl Intent {
    pub const ALL: [Intent; 6] = [
        Intent::Ask,
        Intent::WebSearch,
        Intent::RagQuery,
        Intent::EditRequest,
        Intent::EditorWrite,
        Intent::Other,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Intent::Ask => "ask",
            Intent::WebSearch => "web_search",
            Intent::RagQuery => "rag_query",
            Intent::EditRequest => "edit_request",
            Intent::EditorWrite => "editor_write",
            Intent::Other => "other",
        }
    }

    /// Position in [`Intent::ALL`]; used as the class index of the learned model.
    pub fn index(self) -> usize {
        match self {
            Intent::Ask => 0,
            Intent::WebSearch => 1,
            Intent::RagQuery => 2,
            Intent::EditRequest => 3,
            Intent::EditorWrite => 4,
            Intent::Other => 5,
        }
    }

    pub fn from_index(i: usize) -> Option<Intent> { Intent::ALL.get(i).copied() }

    /// Whether answering needs passages from the user's documents.
    pub fn needs_documents(self) -> bool { matches!(self, Intent::RagQuery | Intent::EditRequest) }
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

impl FromStr for Intent {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let label = s.trim().to_ascii_lowercase();
        Intent::ALL
            .into_iter()
            .find(|i| i.as_str() == label)
            .ok_or_else(|| Error::validation(format!("unknown intent label '{}'", s.trim())))
    }
}

/// A bounded slice of a document, the unit of embedding and retrieval.
///
/// - `content_hash`: xxh64 fingerprint of `content`
/// - `embedding`: `None` until embedded (or when the last attempt failed)
/// - `user_id`/`document_title`: copied from the owning document so that
///   search results never need another lookup
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    pub id: ChunkId,
    pub document_id: String,
    pub user_id: String,
    pub document_title: String,
    pub chunk_index: usize,
    pub content: String,
    pub content_hash: u64,
    pub embedding: Option<Vec<f32>>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexStatus {
    /// Every chunk of the current version carries an embedding.
    Indexed,
    /// At least one chunk exhausted its retries.
    Partial,
    /// Content produced zero chunks; nothing to vectorize.
    Empty,
}

/// Per-document indexing bookkeeping, mutated only by the pipeline.
///
/// `is_vectorized == true` implies `status == Indexed` and an embedding on
/// every chunk of `version`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentIndexState {
    pub document_id: String,
    pub user_id: String,
    pub title: String,
    pub version: u64,
    pub chunk_count: usize,
    pub last_indexed_hash: String,
    pub is_vectorized: bool,
    pub status: IndexStatus,
    pub failed_chunks: Vec<usize>,
    pub last_error: Option<String>,
    pub embedder_id: String,
    pub updated_at: DateTime<Utc>,
}

/// One ranked passage. Ephemeral, produced per query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub chunk_id: ChunkId,
    pub document_id: String,
    pub document_title: String,
    pub content: String,
    pub similarity: f32,
    pub chunk_index: usize,
    pub updated_at: DateTime<Utc>,
}

/// Caller-supplied, already authorized search scope.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SearchScope {
    pub user_id: String,
    pub document_id: Option<String>,
}

impl SearchScope {
    pub fn user(user_id: impl Into<String>) -> Self { Self { user_id: user_id.into(), document_id: None } }

    pub fn document(user_id: impl Into<String>, document_id: impl Into<String>) -> Self {
        Self { user_id: user_id.into(), document_id: Some(document_id.into()) }
    }

    pub fn validate(&self) -> Result<()> {
        if self.user_id.trim().is_empty() { return Err(Error::validation("search scope is missing a user id")); }
        if matches!(&self.document_id, Some(d) if d.trim().is_empty()) {
            return Err(Error::validation("search scope has an empty document id"));
        }
        Ok(())
    }

    /// Whether a chunk owned by `user_id` in `document_id` falls inside this scope.
    pub fn admits(&self, user_id: &str, document_id: &str) -> bool {
        self.user_id == user_id && self.document_id.as_deref().map_or(true, |d| d == document_id)
    }
}

/// Metadata stored next to each vector in the index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    pub user_id: String,
    pub document_id: String,
    pub document_title: String,
    pub chunk_index: usize,
    pub content: String,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorRecord {
    pub id: ChunkId,
    pub vector: Vec<f32>,
    pub metadata: ChunkMetadata,
}

/// Vector query parameters. The scope filter is mandatory.
#[derive(Debug, Clone)]
pub struct VectorQuery {
    pub top_k: usize,
    pub filter: SearchScope,
    pub threshold: Option<f32>,
}

#[derive(Debug, Clone)]
pub struct VectorMatch {
    pub id: ChunkId,
    pub score: f32,
    pub metadata: ChunkMetadata,
}

impl From<VectorMatch> for SearchResult {
    fn from(m: VectorMatch) -> Self {
        SearchResult {
            chunk_id: m.id,
            document_id: m.metadata.document_id,
            document_title: m.metadata.document_title,
            content: m.metadata.content,
            similarity: m.score,
            chunk_index: m.metadata.chunk_index,
            updated_at: m.metadata.updated_at,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexStats {
    pub count: usize,
}

/// Read-only view of a stored document, supplied by the document store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentRecord {
    pub id: String,
    pub user_id: String,
    pub title: String,
    pub content: String,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionOptions {
    pub temperature: f32,
    pub max_tokens: usize,
}

impl Default for CompletionOptions {
    fn default() -> Self { Self { temperature: 0.0, max_tokens: 256 } }
}

/// Labeled example held by the embedding-similarity matcher.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntentExample {
    pub text: String,
    pub embedding: Vec<f32>,
    pub intent: Intent,
    pub confidence: f32,
}

/// Request-shaping features. Passed through, never persisted by the router.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RouterContext {
    pub has_documents: bool,
    pub has_selection: bool,
    pub selection_length: usize,
    pub recent_tools: Vec<String>,
    pub conversation_length: usize,
    pub target_document_id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Method {
    Embedding,
    Classifier,
    Meta,
    Fallback,
}

impl Method {
    pub const ALL: [Method; 4] = [Method::Embedding, Method::Classifier, Method::Meta, Method::Fallback];

    pub fn as_str(self) -> &'static str {
        match self {
            Method::Embedding => "embedding",
            Method::Classifier => "classifier",
            Method::Meta => "meta",
            Method::Fallback => "fallback",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Slots {
    pub needs_recency: bool,
    pub has_selection: bool,
    pub target_document_id: Option<String>,
}

/// Authoritative output of the hybrid router.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouterClassification {
    pub intent: Intent,
    pub confidence: f32,
    pub slots: Slots,
    pub method: Method,
    pub reasoning: Option<String>,
    pub latency_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedbackRecord {
    pub query: String,
    pub correct_intent: Intent,
    pub predicted_intent: Intent,
    pub confidence: f32,
}
