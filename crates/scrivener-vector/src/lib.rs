//! scrivener-vector
//!
//! Keeps the vector index in step with edited documents: change tracking,
//! incremental vectorization, the background queue and the `VectorIndex`
//! adapters (in-memory and LanceDB).
use std::sync::Arc;

use scrivener_core::config::{VectorBackend, VectorSettings};
use scrivener_core::traits::VectorIndex;
use scrivener_core::Result;

pub mod lance;
pub mod memory;
pub mod pipeline;
pub mod queue;
pub mod retry;
pub mod schema;
pub mod store;
pub mod table;
pub mod tracker;

pub use lance::LanceVectorIndex;
pub use memory::InMemoryVectorIndex;
pub use pipeline::{PipelineHealth, VectorizationPipeline, VectorizationResult, VectorizeOptions};
pub use queue::{QueueStats, VectorizationQueue};
pub use retry::RetryPolicy;
pub use store::ChunkTable;
pub use tracker::{ChangeKind, ChangeSet, ChangeTracker, ChunkChange, Fingerprint};

/// Open the configured vector index backend.
pub async fn open_vector_index(settings: &VectorSettings, dim: usize) -> Result<Arc<dyn VectorIndex>> {
    match settings.backend {
        VectorBackend::Memory => Ok(Arc::new(InMemoryVectorIndex::new())),
        VectorBackend::Lance => {
            let uri = scrivener_core::config::expand_path(&settings.uri);
            Ok(Arc::new(LanceVectorIndex::open(&uri.to_string_lossy(), &settings.table, dim).await?))
        }
    }
}
