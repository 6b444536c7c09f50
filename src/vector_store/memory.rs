//! In-memory vector store implementation.
//!
//! Useful for testing and small datasets. Also the store used to exercise
//! degradation paths: tests can flip it into an unavailable state.

use super::{cosine_similarity, ChunkPoint, IndexedTranscript, ScoredPoint, VectorStore};
use crate::chunking::Chunk;
use crate::error::{Result, SvarError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;

struct Collection {
    dimension: usize,
    points: HashMap<String, ChunkPoint>,
}

/// In-memory vector store with model-keyed collections.
#[derive(Default)]
pub struct MemoryVectorStore {
    collections: RwLock<HashMap<String, Collection>>,
    unavailable: AtomicBool,
}

impl MemoryVectorStore {
    /// Create a new in-memory vector store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Force every operation to fail with `UpstreamUnavailable`, to
    /// exercise lexical-only degradation.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::Relaxed);
    }

    fn check_available(&self) -> Result<()> {
        if self.unavailable.load(Ordering::Relaxed) {
            return Err(SvarError::UpstreamUnavailable {
                service: "vector store",
                detail: "forced unavailable".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl VectorStore for MemoryVectorStore {
    async fn ensure_collection(&self, model_id: &str, dimension: usize) -> Result<()> {
        self.check_available()?;
        let mut collections = self.collections.write().unwrap();
        match collections.get(model_id) {
            Some(existing) if existing.dimension != dimension => Err(SvarError::DimensionMismatch {
                expected: existing.dimension,
                actual: dimension,
            }),
            Some(_) => Ok(()),
            None => {
                collections.insert(
                    model_id.to_string(),
                    Collection {
                        dimension,
                        points: HashMap::new(),
                    },
                );
                Ok(())
            }
        }
    }

    async fn upsert_batch(&self, model_id: &str, points: &[ChunkPoint]) -> Result<usize> {
        self.check_available()?;
        let mut collections = self.collections.write().unwrap();

        let dimension = collections
            .get(model_id)
            .map(|c| c.dimension)
            .ok_or_else(|| SvarError::VectorStore(format!("Unknown collection: {}", model_id)))?;

        for point in points {
            if point.vector.len() != dimension {
                return Err(SvarError::DimensionMismatch {
                    expected: dimension,
                    actual: point.vector.len(),
                });
            }
        }

        // A chunk ID lives in exactly one collection; drop it elsewhere
        // first so a model switch cannot leave two copies behind.
        for (name, collection) in collections.iter_mut() {
            if name != model_id {
                for point in points {
                    collection.points.remove(&point.chunk.id);
                }
            }
        }

        let collection = collections.get_mut(model_id).unwrap();
        for point in points {
            collection.points.insert(point.chunk.id.clone(), point.clone());
        }
        Ok(points.len())
    }

    async fn search(
        &self,
        model_id: &str,
        query: &[f32],
        limit: usize,
        transcript_filter: Option<&[String]>,
    ) -> Result<Vec<ScoredPoint>> {
        self.check_available()?;
        let collections = self.collections.read().unwrap();
        let collection = match collections.get(model_id) {
            Some(c) => c,
            None => return Ok(Vec::new()),
        };

        if query.len() != collection.dimension {
            return Err(SvarError::DimensionMismatch {
                expected: collection.dimension,
                actual: query.len(),
            });
        }

        let mut results: Vec<ScoredPoint> = collection
            .points
            .values()
            .filter(|p| match transcript_filter {
                Some(ids) => ids.iter().any(|id| *id == p.chunk.transcript_id),
                None => true,
            })
            .map(|p| ScoredPoint {
                chunk: p.chunk.clone(),
                score: cosine_similarity(query, &p.vector),
            })
            .collect();

        results.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.chunk.sequence_index.cmp(&b.chunk.sequence_index))
        });
        results.truncate(limit);

        Ok(results)
    }

    async fn delete_by_transcript(&self, transcript_id: &str) -> Result<usize> {
        self.check_available()?;
        let mut collections = self.collections.write().unwrap();
        let mut deleted = 0;
        for collection in collections.values_mut() {
            let before = collection.points.len();
            collection
                .points
                .retain(|_, p| p.chunk.transcript_id != transcript_id);
            deleted += before - collection.points.len();
        }
        Ok(deleted)
    }

    async fn delete_stale(&self, transcript_id: &str, keep_below: usize) -> Result<usize> {
        self.check_available()?;
        let mut collections = self.collections.write().unwrap();
        let mut deleted = 0;
        for collection in collections.values_mut() {
            let before = collection.points.len();
            collection.points.retain(|_, p| {
                p.chunk.transcript_id != transcript_id || p.chunk.sequence_index < keep_below
            });
            deleted += before - collection.points.len();
        }
        Ok(deleted)
    }

    async fn chunks_for_transcript(&self, transcript_id: &str) -> Result<Vec<Chunk>> {
        self.check_available()?;
        let collections = self.collections.read().unwrap();
        let mut chunks: Vec<Chunk> = collections
            .values()
            .flat_map(|c| c.points.values())
            .filter(|p| p.chunk.transcript_id == transcript_id)
            .map(|p| p.chunk.clone())
            .collect();
        chunks.sort_by_key(|c| c.sequence_index);
        Ok(chunks)
    }

    async fn all_chunks(&self) -> Result<Vec<Chunk>> {
        self.check_available()?;
        let collections = self.collections.read().unwrap();
        let mut chunks: Vec<Chunk> = collections
            .values()
            .flat_map(|c| c.points.values())
            .map(|p| p.chunk.clone())
            .collect();
        chunks.sort_by(|a, b| {
            a.transcript_id
                .cmp(&b.transcript_id)
                .then_with(|| a.sequence_index.cmp(&b.sequence_index))
        });
        Ok(chunks)
    }

    async fn chunk_count(&self, transcript_id: &str) -> Result<usize> {
        self.check_available()?;
        let collections = self.collections.read().unwrap();
        Ok(collections
            .values()
            .flat_map(|c| c.points.values())
            .filter(|p| p.chunk.transcript_id == transcript_id)
            .count())
    }

    async fn total_count(&self) -> Result<usize> {
        self.check_available()?;
        let collections = self.collections.read().unwrap();
        Ok(collections.values().map(|c| c.points.len()).sum())
    }

    async fn model_for_transcript(&self, transcript_id: &str) -> Result<Option<String>> {
        self.check_available()?;
        let collections = self.collections.read().unwrap();
        let mut counts: HashMap<&str, usize> = HashMap::new();
        for (model, collection) in collections.iter() {
            let n = collection
                .points
                .values()
                .filter(|p| p.chunk.transcript_id == transcript_id)
                .count();
            if n > 0 {
                *counts.entry(model.as_str()).or_insert(0) += n;
            }
        }
        Ok(counts
            .into_iter()
            .max_by_key(|(_, n)| *n)
            .map(|(model, _)| model.to_string()))
    }

    async fn active_models(&self) -> Result<Vec<String>> {
        self.check_available()?;
        let collections = self.collections.read().unwrap();
        let mut models: Vec<(String, DateTime<Utc>)> = collections
            .iter()
            .filter(|(_, c)| !c.points.is_empty())
            .map(|(model, c)| {
                let latest = c
                    .points
                    .values()
                    .map(|p| p.indexed_at)
                    .max()
                    .unwrap_or_else(Utc::now);
                (model.clone(), latest)
            })
            .collect();
        models.sort_by(|a, b| b.1.cmp(&a.1));
        Ok(models.into_iter().map(|(m, _)| m).collect())
    }

    async fn list_indexed(&self) -> Result<Vec<IndexedTranscript>> {
        self.check_available()?;
        let collections = self.collections.read().unwrap();
        let mut map: HashMap<String, IndexedTranscript> = HashMap::new();

        for (model, collection) in collections.iter() {
            for point in collection.points.values() {
                let entry = map
                    .entry(point.chunk.transcript_id.clone())
                    .or_insert_with(|| IndexedTranscript {
                        transcript_id: point.chunk.transcript_id.clone(),
                        chunk_count: 0,
                        model_id: model.clone(),
                        indexed_at: point.indexed_at,
                    });
                entry.chunk_count += 1;
                if point.indexed_at > entry.indexed_at {
                    entry.indexed_at = point.indexed_at;
                    entry.model_id = model.clone();
                }
            }
        }

        let mut list: Vec<IndexedTranscript> = map.into_values().collect();
        list.sort_by(|a, b| b.indexed_at.cmp(&a.indexed_at));
        Ok(list)
    }

    async fn ping(&self) -> Result<()> {
        self.check_available()
    }
}
