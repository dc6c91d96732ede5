//! Text embedding backends.
//!
//! Every backend implements [`Embedder`]. Profiles are embedded in one batch
//! at startup; queries are embedded one at a time on the request path.

use async_trait::async_trait;
use moka::future::Cache;
use siphasher::sip::SipHasher13;
use std::hash::Hasher;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, trace};

use crate::error::{Error, Result};

/// Fixed-length embedding produced by an [`Embedder`].
pub type EmbeddingVector = Vec<f32>;

/// Maps free text to fixed-length vectors.
///
/// Implementations must be deterministic for a fixed model version and must
/// return exactly one vector per input text, in input order.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Backend name ("fastembed", "hash", ...)
    fn name(&self) -> &str;

    /// Length of every vector this backend produces
    fn dimension(&self) -> usize;

    /// Embed a batch of texts, positionally aligned with the input.
    async fn embed_many(&self, texts: &[String]) -> Result<Vec<EmbeddingVector>>;

    /// Whether `text` carries anything this backend can embed. Callers use
    /// it to reject content-free input before it reaches the model.
    fn accepts(&self, text: &str) -> bool {
        !text.trim().is_empty()
    }

    /// Embed a single text.
    async fn embed(&self, text: &str) -> Result<EmbeddingVector> {
        let mut vectors = self.embed_many(&[text.to_string()]).await?;
        match vectors.len() {
            1 => Ok(vectors.remove(0)),
            n => Err(Error::Embedding(format!(
                "backend '{}' returned {} vectors for 1 input",
                self.name(),
                n
            ))),
        }
    }
}

/// Reject empty or whitespace-only inputs before they reach a model.
pub(crate) fn ensure_non_empty(texts: &[String]) -> Result<()> {
    if let Some(position) = texts.iter().position(|t| t.trim().is_empty()) {
        return Err(Error::Embedding(format!(
            "cannot embed empty text (input {})",
            position
        )));
    }
    Ok(())
}

// ============================================================================
// Feature hashing
// ============================================================================

/// Fixed SipHash keys. Changing them changes every vector.
const HASH_SEED_K0: u64 = 0x0123_4567_89ab_cdef;
const HASH_SEED_K1: u64 = 0xfedc_ba98_7654_3210;

const STOP_WORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "by", "for", "from", "in", "is", "it", "of", "on",
    "or", "the", "to", "with",
];

/// Deterministic signed feature-hashing embedder.
///
/// - No model download, no training
/// - Lowercased word tokens hashed into `dimension` buckets with SipHash13
/// - Top hash bit selects the sign, which keeps collisions unbiased
/// - Output is L2-normalized
#[derive(Debug, Clone)]
pub struct HashEmbedder {
    dimension: usize,
}

impl HashEmbedder {
    /// Create a hashing embedder. A zero dimension is bumped to 1.
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(1),
        }
    }

    /// Split text into lowercase tokens, keeping `+` and `#` so "C++" and
    /// "C#" stay distinct from "C".
    pub fn tokenize(text: &str) -> Vec<String> {
        text.split(|c: char| !(c.is_alphanumeric() || c == '+' || c == '#'))
            .filter(|t| !t.is_empty())
            .map(|t| t.to_lowercase())
            .filter(|t| !STOP_WORDS.contains(&t.as_str()))
            .collect()
    }

    fn hash_token(token: &str) -> u64 {
        let mut hasher = SipHasher13::new_with_keys(HASH_SEED_K0, HASH_SEED_K1);
        hasher.write(token.as_bytes());
        hasher.finish()
    }

    /// Embed one text synchronously.
    pub fn embed_text(&self, text: &str) -> Result<EmbeddingVector> {
        let tokens = Self::tokenize(text);
        if tokens.is_empty() {
            return Err(Error::Embedding(
                "text contains no searchable terms".into(),
            ));
        }

        let mut vector = vec![0.0f32; self.dimension];
        for token in &tokens {
            let h = Self::hash_token(token);
            let idx = (h % self.dimension as u64) as usize;
            let sign = if h >> 63 == 0 { 1.0 } else { -1.0 };
            vector[idx] += sign;
        }

        let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm == 0.0 {
            // Every token cancelled out through sign collisions
            return Err(Error::Embedding(
                "text hashed to a zero vector".into(),
            ));
        }
        for v in &mut vector {
            *v /= norm;
        }

        trace!(tokens = tokens.len(), "Hashed text");
        Ok(vector)
    }
}

#[async_trait]
impl Embedder for HashEmbedder {
    fn name(&self) -> &str {
        "hash"
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn accepts(&self, text: &str) -> bool {
        !Self::tokenize(text).is_empty()
    }

    async fn embed_many(&self, texts: &[String]) -> Result<Vec<EmbeddingVector>> {
        ensure_non_empty(texts)?;
        texts.iter().map(|t| self.embed_text(t)).collect()
    }
}

// ============================================================================
// Query cache
// ============================================================================

/// Caches single-text embeddings in memory.
///
/// Only [`Embedder::embed`] is cached; batch embedding goes straight to the
/// inner backend since profiles are embedded once.
pub struct CachedEmbedder {
    inner: Arc<dyn Embedder>,
    cache: Cache<String, EmbeddingVector>,
}

impl CachedEmbedder {
    /// Wrap an embedder with a bounded, time-limited cache.
    pub fn new(inner: Arc<dyn Embedder>, max_entries: u64, ttl: Duration) -> Self {
        let cache = Cache::builder()
            .max_capacity(max_entries)
            .time_to_live(ttl)
            .build();
        Self { inner, cache }
    }

    /// Number of cached entries (approximate until pending tasks run)
    pub fn entry_count(&self) -> u64 {
        self.cache.entry_count()
    }
}

#[async_trait]
impl Embedder for CachedEmbedder {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn dimension(&self) -> usize {
        self.inner.dimension()
    }

    fn accepts(&self, text: &str) -> bool {
        self.inner.accepts(text)
    }

    async fn embed_many(&self, texts: &[String]) -> Result<Vec<EmbeddingVector>> {
        self.inner.embed_many(texts).await
    }

    async fn embed(&self, text: &str) -> Result<EmbeddingVector> {
        if let Some(hit) = self.cache.get(text).await {
            debug!("Query embedding cache hit");
            metrics::counter!("staffing_embedding_cache_hits_total").increment(1);
            return Ok(hit);
        }

        let vector = self.inner.embed(text).await?;
        self.cache.insert(text.to_string(), vector.clone()).await;
        Ok(vector)
    }
}
