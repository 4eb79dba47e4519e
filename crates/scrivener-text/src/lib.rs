//! scrivener-text
//!
//! Tantivy-backed keyword index over chunks, used by the hybrid retrieval stage.
pub mod index;
pub mod tantivy_utils;

pub use index::TantivyLexicalIndex;
pub use tantivy_utils::{analyze_terms, term_overlap};
