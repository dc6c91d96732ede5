//! Semantic search over the employee roster.
//!
//! Profiles are embedded once when the engine is built; each query is
//! embedded on the request path and scored against the stored vectors.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐     ┌────────────────┐
//! │  Employee roster│────▶│    Embedder    │
//! │ (profile texts) │     │ fastembed/hash │
//! └─────────────────┘     └───────┬────────┘
//!                                 │
//!                                 ▼
//!                         ┌──────────────┐
//!                         │  Embedding   │
//!                         │  [f32; dim]  │
//!                         └──────┬───────┘
//!                                │
//!                    ┌───────────┴───────────┐
//!                    ▼                       ▼
//!              ┌──────────┐           ┌─────────────┐
//!              │  Exact   │           │ Partitioned │
//!              │  scan    │           │ (k-means)   │
//!              └────┬─────┘           └──────┬──────┘
//!                   └───────────┬────────────┘
//!                               ▼
//!                      ┌─────────────────┐
//!                      │ RetrievalEngine │
//!                      │ top-k + floor   │
//!                      └─────────────────┘
//! ```

mod embedding;
#[cfg(feature = "fastembed")]
mod fastembed;
mod index;
mod retriever;

pub use embedding::{CachedEmbedder, Embedder, EmbeddingVector, HashEmbedder};
#[cfg(feature = "fastembed")]
pub use self::fastembed::{parse_model, FastEmbedder};
pub use index::{
    build_index, cosine_similarity, ExactIndex, IndexKind, IndexSettings, Metric, Neighbor,
    PartitionedIndex, VectorIndex,
};
pub use retriever::{RetrievalEngine, RetrievalSettings, ScoredEmployee, DEFAULT_TOP_K};

use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::config::{EmbeddingBackend, EmbeddingConfig};
use crate::error::{Error, Result};

/// Default embedding model (all-MiniLM-L6-v2 - 384 dimensions, good balance of speed/quality)
pub const DEFAULT_MODEL: &str = "all-MiniLM-L6-v2";

/// Embedding dimension for the default model
pub const EMBEDDING_DIM: usize = 384;

/// Build the configured embedding backend, wrapped in a query cache when
/// `cache_capacity` is non-zero.
///
/// Loading a fastembed model may download it on first use.
pub async fn create_embedder(config: &EmbeddingConfig) -> Result<Arc<dyn Embedder>> {
    let backend: Arc<dyn Embedder> = match config.backend {
        EmbeddingBackend::Hash => {
            info!(dimension = config.dimension, "Using hashing embedder");
            Arc::new(HashEmbedder::new(config.dimension))
        }
        EmbeddingBackend::FastEmbed => load_fastembed(config).await?,
    };

    if config.cache_capacity == 0 {
        return Ok(backend);
    }

    Ok(Arc::new(CachedEmbedder::new(
        backend,
        config.cache_capacity,
        Duration::from_secs(config.cache_ttl_secs),
    )))
}

#[cfg(feature = "fastembed")]
async fn load_fastembed(config: &EmbeddingConfig) -> Result<Arc<dyn Embedder>> {
    let model = config.model.clone();
    let cache_dir = config.cache_dir.clone();
    let embedder = tokio::task::spawn_blocking(move || FastEmbedder::new(&model, cache_dir))
        .await
        .map_err(|e| Error::Embedding(format!("model loader panicked: {}", e)))??;
    Ok(Arc::new(embedder))
}

#[cfg(not(feature = "fastembed"))]
async fn load_fastembed(_config: &EmbeddingConfig) -> Result<Arc<dyn Embedder>> {
    Err(Error::Config(
        "embedding backend 'fastembed' requires the `fastembed` cargo feature".into(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hash_config(cache_capacity: u64) -> EmbeddingConfig {
        EmbeddingConfig {
            backend: EmbeddingBackend::Hash,
            dimension: 64,
            cache_capacity,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_create_hash_embedder() {
        let embedder = create_embedder(&hash_config(0)).await.unwrap();
        assert_eq!(embedder.name(), "hash");
        assert_eq!(embedder.dimension(), 64);
    }

    #[tokio::test]
    async fn test_cache_wrapper_keeps_backend_identity() {
        let embedder = create_embedder(&hash_config(128)).await.unwrap();
        assert_eq!(embedder.name(), "hash");
        let a = embedder.embed("rust").await.unwrap();
        let b = embedder.embed("rust").await.unwrap();
        assert_eq!(a, b);
    }
}
