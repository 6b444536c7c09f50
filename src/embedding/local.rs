//! Local embedding fallback via fastembed.
//!
//! Runs all-MiniLM-L6-v2 on the blocking pool. The 384-dimension output
//! is deliberately different from the primary API's 1536 so that the
//! model tagging in [`super::EmbeddingBatch`] is load-bearing, not
//! decorative.

use super::Embedder;
use crate::error::{Result, SvarError};
use async_trait::async_trait;
use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use std::sync::Arc;
use tracing::{debug, info, instrument};

const MODEL_ID: &str = "all-MiniLM-L6-v2";
const DIMENSIONS: usize = 384;

/// Local embedder backed by fastembed.
pub struct LocalEmbedder {
    model: Arc<TextEmbedding>,
}

impl LocalEmbedder {
    /// Initialize the local model. Downloads weights on first use, which
    /// can take a while; callers should treat failure as "no fallback
    /// available" rather than fatal.
    pub fn new() -> Result<Self> {
        info!("Initializing local embedding model {}", MODEL_ID);
        let model = TextEmbedding::try_new(
            InitOptions::new(EmbeddingModel::AllMiniLML6V2).with_show_download_progress(false),
        )
        .map_err(|e| SvarError::Embedding(format!("Failed to load local model: {}", e)))?;

        Ok(Self {
            model: Arc::new(model),
        })
    }
}

#[async_trait]
impl Embedder for LocalEmbedder {
    #[instrument(skip(self, texts), fields(count = texts.len()))]
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        debug!("Generating {} embeddings with local model", texts.len());

        let model = self.model.clone();
        let texts: Vec<String> = texts.to_vec();
        let embeddings = tokio::task::spawn_blocking(move || model.embed(texts, None))
            .await
            .map_err(|e| SvarError::Embedding(format!("Embedding task panicked: {}", e)))?
            .map_err(|e| SvarError::Embedding(format!("Local embedding failed: {}", e)))?;

        Ok(embeddings)
    }

    fn dimensions(&self) -> usize {
        DIMENSIONS
    }

    fn model_id(&self) -> &str {
        MODEL_ID
    }
}
