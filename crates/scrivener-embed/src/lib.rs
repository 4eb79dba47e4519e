//! Embedding providers behind [`scrivener_core::traits::Embedder`].

use std::path::{Path, PathBuf};
use std::sync::Arc;

use scrivener_core::config::{EmbeddingProviderKind, EmbeddingSettings};
use scrivener_core::traits::Embedder;
use scrivener_core::{Error, Result};

mod bge;
mod device;
mod fake;
mod pool;
mod tokenize;

pub use bge::BgeM3Embedder;
pub use fake::FakeEmbedder;
pub use pool::masked_mean_l2;

/// Build the configured embedder. `APP_USE_FAKE_EMBEDDINGS=1` forces the fake one.
pub fn get_default_embedder(settings: &EmbeddingSettings) -> Result<Arc<dyn Embedder>> {
    let use_fake = std::env::var("APP_USE_FAKE_EMBEDDINGS").ok().map(|v| v == "1" || v.eq_ignore_ascii_case("true")).unwrap_or(false);
    if use_fake || settings.provider == EmbeddingProviderKind::Fake {
        tracing::info!(dim = settings.dim, "using FakeEmbedder");
        return Ok(Arc::new(FakeEmbedder::new(settings.dim)));
    }
    let dir = resolve_model_dir(settings.model_dir.as_deref())?;
    Ok(Arc::new(BgeM3Embedder::load(&dir)?))
}

fn resolve_model_dir(configured: Option<&str>) -> Result<PathBuf> {
    for var in ["APP_MODEL_DIR", "MODEL_DIR"] {
        if let Ok(dir) = std::env::var(var) {
            let p = PathBuf::from(&dir);
            if p.exists() { tracing::info!(dir = %p.display(), "using {}", var); return Ok(p); }
        }
    }
    if let Some(dir) = configured {
        let p = scrivener_core::config::expand_path(dir);
        if p.exists() { return Ok(p); }
    }
    for candidate in ["../models/bge-m3", "models/bge-m3"] {
        let p = Path::new(candidate);
        if p.exists() { tracing::info!(dir = %p.display(), "using model dir"); return Ok(p.to_path_buf()); }
    }
    Err(Error::Configuration("Could not locate BGE-M3 model directory".into()))
}
