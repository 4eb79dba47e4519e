use serde::{Deserialize, Serialize};

use scrivener_core::config::RetrievalSettings;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchStrategy {
    Semantic,
    Hybrid,
    Adaptive,
}

impl std::str::FromStr for SearchStrategy {
    type Err = scrivener_core::Error;

    fn from_str(s: &str) -> scrivener_core::Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "semantic" => Ok(Self::Semantic),
            "hybrid" => Ok(Self::Hybrid),
            "adaptive" => Ok(Self::Adaptive),
            other => Err(scrivener_core::Error::validation(format!("unknown search strategy '{}'", other))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchOptions {
    pub limit: usize,
    pub threshold: f32,
    pub strategy: SearchStrategy,
    /// Local template paraphrases in Stage C.
    pub use_query_expansion: bool,
    /// LLM paraphrases in Stage C (falls back to templates on failure).
    pub use_query_rewriting: bool,
}

impl Default for SearchOptions {
    fn default() -> Self { Self::from_settings(&RetrievalSettings::default()) }
}

impl SearchOptions {
    pub fn from_settings(s: &RetrievalSettings) -> Self {
        Self {
            limit: s.default_limit,
            threshold: s.default_threshold,
            strategy: SearchStrategy::Adaptive,
            use_query_expansion: true,
            use_query_rewriting: true,
        }
    }

    pub fn with_strategy(mut self, strategy: SearchStrategy) -> Self { self.strategy = strategy; self }

    pub fn with_limit(mut self, limit: usize) -> Self { self.limit = limit; self }

    pub fn with_threshold(mut self, threshold: f32) -> Self { self.threshold = threshold; self }
}
