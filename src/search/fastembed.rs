//! FastEmbed sentence-embedding backend.
//!
//! The ONNX model is not shared between threads: a single worker thread owns
//! it and serves batches sent over a channel, one at a time. Inference is
//! CPU-bound, so the worker is a plain OS thread rather than a tokio task.

use async_trait::async_trait;
use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use std::path::PathBuf;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info};

use super::embedding::{ensure_non_empty, Embedder, EmbeddingVector};
use crate::error::{Error, Result};

/// Pending requests allowed before callers wait on the channel.
const WORKER_QUEUE_DEPTH: usize = 64;

struct EmbedRequest {
    texts: Vec<String>,
    reply: oneshot::Sender<Result<Vec<EmbeddingVector>>>,
}

/// Resolve a model identifier to a fastembed model and its output dimension.
pub fn parse_model(name: &str) -> Result<(EmbeddingModel, usize)> {
    let model = match name.to_lowercase().as_str() {
        "all-minilm-l6-v2" | "allminilml6v2" => (EmbeddingModel::AllMiniLML6V2, 384),
        "all-minilm-l12-v2" | "allminilml12v2" => (EmbeddingModel::AllMiniLML12V2, 384),
        "bge-small-en" | "bge-small-en-v1.5" => (EmbeddingModel::BGESmallENV15, 384),
        "bge-base-en" | "bge-base-en-v1.5" => (EmbeddingModel::BGEBaseENV15, 768),
        "bge-large-en" | "bge-large-en-v1.5" => (EmbeddingModel::BGELargeENV15, 1024),
        "multilingual-e5-small" => (EmbeddingModel::MultilingualE5Small, 384),
        other => {
            return Err(Error::Config(format!(
                "unsupported embedding model '{}'",
                other
            )))
        }
    };
    Ok(model)
}

/// Sentence-embedding backend backed by a local ONNX model.
pub struct FastEmbedder {
    sender: mpsc::Sender<EmbedRequest>,
    model_name: String,
    dimension: usize,
}

impl FastEmbedder {
    /// Load the model (downloading it on first use) and start the worker.
    ///
    /// Blocking: call from `spawn_blocking` when inside a runtime.
    pub fn new(model_name: &str, cache_dir: Option<PathBuf>) -> Result<Self> {
        let (model, dimension) = parse_model(model_name)?;

        let mut options = InitOptions::new(model).with_show_download_progress(true);
        if let Some(dir) = cache_dir {
            options = options.with_cache_dir(dir);
        }

        info!(model = model_name, dimension, "Loading embedding model");
        let text_embedding = TextEmbedding::try_new(options).map_err(|e| {
            Error::Embedding(format!(
                "failed to initialize model '{}': {}",
                model_name, e
            ))
        })?;

        let (tx, rx) = mpsc::channel(WORKER_QUEUE_DEPTH);
        std::thread::Builder::new()
            .name("fastembed-worker".into())
            .spawn(move || run_worker(rx, text_embedding))?;

        Ok(Self {
            sender: tx,
            model_name: model_name.to_string(),
            dimension,
        })
    }

    /// Model identifier this embedder was built from
    pub fn model(&self) -> &str {
        &self.model_name
    }
}

fn run_worker(mut rx: mpsc::Receiver<EmbedRequest>, mut model: TextEmbedding) {
    debug!("Embedding worker started");
    while let Some(EmbedRequest { texts, reply }) = rx.blocking_recv() {
        let result = model
            .embed(texts, None)
            .map_err(|e| Error::Embedding(format!("inference failed: {}", e)));
        if let Err(e) = &result {
            error!(error = %e, "Embedding batch failed");
        }
        // Caller may have timed out and dropped the receiver.
        let _ = reply.send(result);
    }
    debug!("Embedding worker stopped");
}

#[async_trait]
impl Embedder for FastEmbedder {
    fn name(&self) -> &str {
        "fastembed"
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed_many(&self, texts: &[String]) -> Result<Vec<EmbeddingVector>> {
        ensure_non_empty(texts)?;

        let (reply, rx) = oneshot::channel();
        self.sender
            .send(EmbedRequest {
                texts: texts.to_vec(),
                reply,
            })
            .await
            .map_err(|_| Error::Embedding("embedding worker is not running".into()))?;

        rx.await
            .unwrap_or_else(|_| Err(Error::Embedding("embedding worker stopped".into())))
    }
}
