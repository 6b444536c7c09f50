//! Embedding generation for semantic search and retrieval.
//!
//! The primary embedder is a remote API; a local fallback with a
//! different vector dimension takes over when the primary is unreachable.
//! Every batch is tagged with the model that produced it so retrieval
//! never mixes incompatible dimensions.

#[cfg(feature = "local-embeddings")]
mod local;
mod openai;
mod provider;

#[cfg(feature = "local-embeddings")]
pub use local::LocalEmbedder;
pub use openai::OpenAIEmbedder;
pub use provider::{EmbeddingProviderStatus, FailoverEmbeddings};

use crate::error::Result;
use async_trait::async_trait;

/// A batch of embeddings tagged with their source model.
///
/// The tag is what keeps a 1536-dimension primary vector from ever being
/// compared against a 384-dimension fallback vector: vector store
/// collections are keyed by `model_id`.
#[derive(Debug, Clone)]
pub struct EmbeddingBatch {
    /// Identifier of the model that produced these vectors.
    pub model_id: String,
    /// Dimension shared by every vector in the batch.
    pub dimension: usize,
    /// One vector per input text, in input order.
    pub vectors: Vec<Vec<f32>>,
}

/// Trait for embedding generation.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Generate embeddings for multiple texts.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Generate an embedding for a single text.
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let embeddings = self.embed_batch(&[text.to_string()]).await?;
        embeddings.into_iter().next().ok_or_else(|| {
            crate::error::SvarError::Embedding("Empty embedding response".to_string())
        })
    }

    /// Get the embedding dimensions.
    fn dimensions(&self) -> usize;

    /// Identifier of the underlying model.
    fn model_id(&self) -> &str;
}
