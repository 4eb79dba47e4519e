//! scrivener-retrieval
//!
//! Scoped retrieval over the user's indexed chunks: staged semantic/hybrid/
//! expanded search, cross-stage merging and context formatting.
pub mod context;
pub mod engine;
pub mod expansion;
pub mod options;
pub mod rewrite;
pub mod scoring;
pub mod stats;

pub use context::format_context;
pub use engine::RetrievalEngine;
pub use expansion::{expand_query, keyword_core};
pub use options::{SearchOptions, SearchStrategy};
pub use rewrite::QueryRewriter;
pub use stats::SearchStats;
pub use tokio_util::sync::CancellationToken;
