//! scrivener-router
//!
//! Routes a user utterance to one intent by fusing three signals: nearest
//! labeled examples in embedding space, a small learned classifier and, when
//! those are unsure, an LLM meta-classifier.
pub mod classifier;
pub mod features;
pub mod matcher;
pub mod meta;
pub mod metrics;
pub mod router;

pub use classifier::{train, ClassifierOutcome, IntentClassifier, LinearModel, TrainOptions, TrainingSample};
pub use features::needs_recency;
pub use matcher::{EmbeddingMatcher, MatchOutcome};
pub use meta::{MetaClassifier, MetaOutcome};
pub use metrics::RouterMetrics;
pub use router::{load_seed_examples, HybridRouter, RouterStatus, SeedExample};
