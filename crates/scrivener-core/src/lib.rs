//! scrivener-core
//!
//! Shared domain types, error taxonomy, configuration and the traits that
//! separate the routing/retrieval core from its external collaborators.

pub mod chunking;
pub mod config;
pub mod documents;
pub mod error;
pub mod logging;
pub mod math;
pub mod traits;
pub mod types;

pub use error::{Error, Result};
