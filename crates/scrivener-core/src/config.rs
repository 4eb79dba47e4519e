//! Lightweight configuration loader, typed settings and path helpers.
//!
//! Uses Figment to merge `config.toml` + `config.<env>.toml` + `APP_*` env vars.
//! Nested keys in env vars are separated by `__` (`APP_RETRIEVAL__QUALITY_BAR`).

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;

use crate::chunking::ChunkingPolicy;
use crate::error::{Error, Result};
use crate::types::Intent;

pub struct Config {
    figment: Figment,
}

impl Config {
    pub fn load() -> Result<Self> {
        let env_name = env::var("RUST_ENV").unwrap_or_else(|_| "dev".to_string());
        Self::load_for_env(&env_name)
    }

    pub fn load_for_env(env_name: &str) -> Result<Self> {
        let mut figment = Figment::from(Serialized::defaults(Settings::default())).merge(Toml::file("config.toml"));
        match env_name {
            "dev" | "development" => figment = figment.merge(Toml::file("config.dev.toml")),
            "prod" | "production" => figment = figment.merge(Toml::file("config.prod.toml")),
            "test" | "testing" => figment = figment.merge(Toml::file("config.test.toml")),
            _ => {}
        }
        figment = figment.merge(Env::prefixed("APP_").split("__"));

        let config = Self { figment };
        config.settings()?.validate()?;
        Ok(config)
    }

    pub fn from_figment(figment: Figment) -> Self { Self { figment } }

    pub fn get<T>(&self, key: &str) -> Result<T>
    where
        T: serde::de::DeserializeOwned,
    {
        self.figment
            .extract_inner(key)
            .map_err(|e| Error::Configuration(format!("Failed to get '{}': {}", key, e)))
    }

    pub fn settings(&self) -> Result<Settings> {
        self.figment
            .extract()
            .map_err(|e| Error::Configuration(format!("Failed to extract settings: {}", e)))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub data: DataSettings,
    pub chunking: ChunkingSettings,
    pub pipeline: PipelineSettings,
    pub retrieval: RetrievalSettings,
    pub router: RouterSettings,
    pub embedding: EmbeddingSettings,
    pub vector: VectorSettings,
}

impl Settings {
    /// Fail fast on values no component can work with.
    pub fn validate(&self) -> Result<()> {
        let r = &self.retrieval;
        for (name, v) in [
            ("retrieval.default_threshold", r.default_threshold),
            ("retrieval.quality_bar", r.quality_bar),
            ("retrieval.min_threshold", r.min_threshold),
            ("router.embedding_accept", self.router.embedding_accept),
            ("router.classifier_accept", self.router.classifier_accept),
            ("router.min_agreement", self.router.min_agreement),
            ("router.feedback_example_confidence", self.router.feedback_example_confidence),
        ] {
            if !(0.0..=1.0).contains(&v) { return Err(Error::Configuration(format!("{} must be within [0, 1], got {}", name, v))); }
        }
        if r.semantic_weight < 0.0 || r.lexical_weight < 0.0 || r.semantic_weight + r.lexical_weight <= 0.0 {
            return Err(Error::Configuration("retrieval weights must be non-negative and sum to a positive value".into()));
        }
        if r.max_expansions == 0 || r.max_expansions > 3 {
            return Err(Error::Configuration(format!("retrieval.max_expansions must be 1..=3, got {}", r.max_expansions)));
        }
        if self.pipeline.batch_size == 0 { return Err(Error::Configuration("pipeline.batch_size must be > 0".into())); }
        if self.pipeline.max_attempts == 0 { return Err(Error::Configuration("pipeline.max_attempts must be > 0".into())); }
        if self.router.example_capacity == 0 { return Err(Error::Configuration("router.example_capacity must be > 0".into())); }
        if self.router.neighbor_k == 0 { return Err(Error::Configuration("router.neighbor_k must be > 0".into())); }
        if self.embedding.dim == 0 { return Err(Error::Configuration("embedding.dim must be > 0".into())); }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DataSettings {
    pub raw_txt_dir: String,
    pub tantivy_index_dir: Option<String>,
}

impl Default for DataSettings {
    fn default() -> Self { Self { raw_txt_dir: "../dev_data/txt".to_string(), tantivy_index_dir: None } }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkingKind {
    Paragraph,
    SlidingWindow,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingSettings {
    pub policy: ChunkingKind,
    pub max_tokens: usize,
    pub overlap_percent: f32,
    pub window_chars: usize,
    pub overlap_chars: usize,
}

impl Default for ChunkingSettings {
    fn default() -> Self {
        Self { policy: ChunkingKind::Paragraph, max_tokens: 500, overlap_percent: 0.2, window_chars: 1200, overlap_chars: 200 }
    }
}

impl ChunkingSettings {
    pub fn policy(&self) -> ChunkingPolicy {
        match self.policy {
            ChunkingKind::Paragraph => ChunkingPolicy::Paragraph { max_tokens: self.max_tokens, overlap_percent: self.overlap_percent },
            ChunkingKind::SlidingWindow => ChunkingPolicy::SlidingWindow { window_chars: self.window_chars, overlap_chars: self.overlap_chars },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineSettings {
    pub batch_size: usize,
    pub inter_batch_delay_ms: u64,
    pub max_attempts: u32,
    pub base_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub embed_timeout_ms: u64,
    pub queue_concurrency: usize,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            batch_size: 16,
            inter_batch_delay_ms: 50,
            max_attempts: 3,
            base_backoff_ms: 200,
            max_backoff_ms: 5_000,
            embed_timeout_ms: 30_000,
            queue_concurrency: 4,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalSettings {
    pub default_limit: usize,
    pub default_threshold: f32,
    /// Top similarity a stage must reach for escalation to stop.
    pub quality_bar: f32,
    /// Subtracted from the threshold at each escalation step.
    pub threshold_relaxation: f32,
    pub min_threshold: f32,
    pub semantic_weight: f32,
    pub lexical_weight: f32,
    pub candidate_multiplier: usize,
    pub max_expansions: usize,
    pub rewrite_timeout_ms: u64,
    pub embed_timeout_ms: u64,
    pub context_char_budget: usize,
}

impl Default for RetrievalSettings {
    fn default() -> Self {
        Self {
            default_limit: 5,
            default_threshold: 0.3,
            quality_bar: 0.5,
            threshold_relaxation: 0.05,
            min_threshold: 0.2,
            semantic_weight: 0.7,
            lexical_weight: 0.3,
            candidate_multiplier: 3,
            max_expansions: 3,
            rewrite_timeout_ms: 3_000,
            embed_timeout_ms: 10_000,
            context_char_budget: 6_000,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvictionPolicy {
    Oldest,
    LowestConfidence,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RouterSettings {
    pub embedding_accept: f32,
    pub neighbor_k: usize,
    /// Neighbors below this similarity do not take part in the agreement vote.
    pub neighbor_min_similarity: f32,
    pub min_agreement: f32,
    pub classifier_accept: f32,
    pub meta_timeout_ms: u64,
    pub meta_max_attempts: u32,
    pub embed_timeout_ms: u64,
    pub example_capacity: usize,
    pub eviction: EvictionPolicy,
    pub feedback_example_confidence: f32,
    pub fallback_intent: Intent,
    pub classifier_model_path: Option<String>,
    pub examples_path: Option<String>,
}

impl Default for RouterSettings {
    fn default() -> Self {
        Self {
            embedding_accept: 0.85,
            neighbor_k: 5,
            neighbor_min_similarity: 0.75,
            min_agreement: 0.6,
            classifier_accept: 0.6,
            meta_timeout_ms: 4_000,
            meta_max_attempts: 2,
            embed_timeout_ms: 5_000,
            example_capacity: 2_000,
            eviction: EvictionPolicy::Oldest,
            feedback_example_confidence: 1.0,
            fallback_intent: Intent::Ask,
            classifier_model_path: None,
            examples_path: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmbeddingProviderKind {
    Fake,
    BgeM3,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingSettings {
    pub provider: EmbeddingProviderKind,
    pub dim: usize,
    pub model_dir: Option<String>,
}

impl Default for EmbeddingSettings {
    fn default() -> Self { Self { provider: EmbeddingProviderKind::Fake, dim: 1024, model_dir: None } }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VectorBackend {
    Memory,
    Lance,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VectorSettings {
    pub backend: VectorBackend,
    pub uri: String,
    pub table: String,
}

impl Default for VectorSettings {
    fn default() -> Self { Self { backend: VectorBackend::Memory, uri: "../dev_data/indexes/lancedb".to_string(), table: "chunks".to_string() } }
}

/// Expand a user-provided path string:
/// - Expands leading '~' to the user's home directory
/// - Expands ${VAR} and $VAR environment variables
/// - Returns a PathBuf without attempting to canonicalize
pub fn expand_path<S: AsRef<str>>(input: S) -> PathBuf {
    let s = input.as_ref();
    // Expand env vars first
    let expanded_env = shellexpand::env(s).unwrap_or(std::borrow::Cow::Borrowed(s));
    // Expand ~ at start
    let expanded = shellexpand::tilde(&expanded_env);
    PathBuf::from(expanded.as_ref())
}
