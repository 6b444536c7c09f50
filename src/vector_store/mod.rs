//! Vector store abstraction for Svar.
//!
//! Provides a trait-based interface for point/collection-oriented vector
//! storage. Collections are keyed by embedding model so vectors of
//! different dimensions never meet in one similarity computation.

mod memory;
mod sqlite;

pub use memory::MemoryVectorStore;
pub use sqlite::SqliteVectorStore;

use crate::chunking::Chunk;
use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A chunk plus its embedding, as stored in a collection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkPoint {
    /// The chunk payload.
    pub chunk: Chunk,
    /// Model that produced the vector; decides the target collection.
    pub model_id: String,
    /// Embedding vector.
    pub vector: Vec<f32>,
    /// When this point was written.
    pub indexed_at: DateTime<Utc>,
}

impl ChunkPoint {
    pub fn new(chunk: Chunk, model_id: impl Into<String>, vector: Vec<f32>) -> Self {
        Self {
            chunk,
            model_id: model_id.into(),
            vector,
            indexed_at: Utc::now(),
        }
    }
}

/// A search match with its similarity score.
#[derive(Debug, Clone)]
pub struct ScoredPoint {
    /// The matched chunk.
    pub chunk: Chunk,
    /// Cosine similarity against the query vector.
    pub score: f32,
}

/// Summary information about an indexed transcript.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexedTranscript {
    pub transcript_id: String,
    pub chunk_count: usize,
    /// Model the chunks were embedded with.
    pub model_id: String,
    pub indexed_at: DateTime<Utc>,
}

/// Trait for vector store implementations.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Create the collection for a model if it does not exist. An existing
    /// collection with a different dimension is a `DimensionMismatch`.
    async fn ensure_collection(&self, model_id: &str, dimension: usize) -> Result<()>;

    /// Bulk upsert points into a model's collection. Point IDs are chunk
    /// IDs, so re-upserting a chunk replaces it in place.
    async fn upsert_batch(&self, model_id: &str, points: &[ChunkPoint]) -> Result<usize>;

    /// Search a model's collection, optionally restricted to a set of
    /// transcript IDs. The query vector must match the collection
    /// dimension exactly.
    async fn search(
        &self,
        model_id: &str,
        query: &[f32],
        limit: usize,
        transcript_filter: Option<&[String]>,
    ) -> Result<Vec<ScoredPoint>>;

    /// Delete all points for a transcript across collections.
    async fn delete_by_transcript(&self, transcript_id: &str) -> Result<usize>;

    /// Delete a transcript's points at or above a sequence index. Used
    /// after reindexing: new points overwrite in place, then the stale
    /// tail of the previous generation is removed.
    async fn delete_stale(&self, transcript_id: &str, keep_below: usize) -> Result<usize>;

    /// All chunks for a transcript, ordered by sequence index.
    async fn chunks_for_transcript(&self, transcript_id: &str) -> Result<Vec<Chunk>>;

    /// All chunks in the store; used to rebuild the lexical index on
    /// startup.
    async fn all_chunks(&self) -> Result<Vec<Chunk>>;

    /// Number of points stored for a transcript.
    async fn chunk_count(&self, transcript_id: &str) -> Result<usize>;

    /// Total number of points in the store.
    async fn total_count(&self) -> Result<usize>;

    /// The model the bulk of a transcript's points were embedded with.
    async fn model_for_transcript(&self, transcript_id: &str) -> Result<Option<String>>;

    /// Models with at least one point, most recently written first.
    async fn active_models(&self) -> Result<Vec<String>>;

    /// Summaries of all indexed transcripts, newest first.
    async fn list_indexed(&self) -> Result<Vec<IndexedTranscript>>;

    /// Cheap reachability check.
    async fn ping(&self) -> Result<()>;
}

/// Compute cosine similarity between two vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot_product / (norm_a * norm_b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cosine_similarity() {
        let a = vec![1.0, 0.0, 0.0];
        let b = vec![1.0, 0.0, 0.0];
        assert!((cosine_similarity(&a, &b) - 1.0).abs() < 0.001);

        let c = vec![0.0, 1.0, 0.0];
        assert!((cosine_similarity(&a, &c)).abs() < 0.001);

        let d = vec![-1.0, 0.0, 0.0];
        assert!((cosine_similarity(&a, &d) + 1.0).abs() < 0.001);
    }

    #[test]
    fn test_cosine_similarity_length_mismatch_is_zero() {
        let a = vec![1.0, 0.0];
        let b = vec![1.0, 0.0, 0.0];
        assert_eq!(cosine_similarity(&a, &b), 0.0);
    }
}
