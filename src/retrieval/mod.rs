//! Hybrid retrieval: lexical + semantic search with score fusion.

mod hybrid;

pub use hybrid::HybridRetriever;

use crate::chunking::Chunk;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Which ranking produced a retrieved chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RetrievalSource {
    Vector,
    Bm25,
    Hybrid,
}

impl std::fmt::Display for RetrievalSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RetrievalSource::Vector => write!(f, "vector"),
            RetrievalSource::Bm25 => write!(f, "bm25"),
            RetrievalSource::Hybrid => write!(f, "hybrid"),
        }
    }
}

/// A chunk returned from retrieval. Ephemeral: snapshots of these are
/// stored on messages, the live values never persist.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievedChunk {
    pub chunk: Chunk,
    /// Fused (or reranked) score in [0, 1].
    pub score: f32,
    pub source: RetrievalSource,
}

/// Per-question retrieval options.
#[derive(Debug, Clone)]
pub struct RetrievalOptions {
    pub top_k: usize,
    /// Combine BM25 with vector search. When disabled, vector results are
    /// used alone (still falling back to BM25 if the store is down).
    pub hybrid_search: bool,
    pub query_expansion: bool,
    pub multi_hop: bool,
    pub reranking: bool,
    /// Chat model used for expansion, refinement, and reranking.
    pub model: String,
}

impl Default for RetrievalOptions {
    fn default() -> Self {
        Self {
            top_k: 5,
            hybrid_search: true,
            query_expansion: false,
            multi_hop: false,
            reranking: false,
            model: "gpt-4o-mini".to_string(),
        }
    }
}

/// Candidate set for one ranking branch: chunk plus its best raw score.
pub(crate) type CandidateMap = HashMap<String, (Chunk, f32)>;

/// Min-max normalize raw candidate scores to [0, 1].
///
/// A single candidate (or all-equal scores) normalizes to 1.0.
pub(crate) fn normalize_scores(candidates: &CandidateMap) -> HashMap<String, f32> {
    if candidates.is_empty() {
        return HashMap::new();
    }

    let min = candidates
        .values()
        .map(|(_, s)| *s)
        .fold(f32::INFINITY, f32::min);
    let max = candidates
        .values()
        .map(|(_, s)| *s)
        .fold(f32::NEG_INFINITY, f32::max);

    candidates
        .iter()
        .map(|(id, (_, score))| {
            let norm = if (max - min).abs() < f32::EPSILON {
                1.0
            } else {
                (score - min) / (max - min)
            };
            (id.clone(), norm)
        })
        .collect()
}

/// Fuse normalized vector and BM25 candidates with the given weights.
///
/// A chunk present in both rankings receives both weighted terms, so it
/// always places at least as high as it would in either ranking alone.
pub(crate) fn fuse(
    vector: &CandidateMap,
    bm25: &CandidateMap,
    vector_weight: f32,
    bm25_weight: f32,
) -> Vec<RetrievedChunk> {
    let norm_vector = normalize_scores(vector);
    let norm_bm25 = normalize_scores(bm25);
    let weight_sum = (vector_weight + bm25_weight).max(f32::EPSILON);

    let mut fused: HashMap<String, RetrievedChunk> = HashMap::new();

    for (id, (chunk, _)) in vector {
        let v = norm_vector.get(id).copied().unwrap_or(0.0);
        fused.insert(
            id.clone(),
            RetrievedChunk {
                chunk: chunk.clone(),
                score: (vector_weight * v) / weight_sum,
                source: RetrievalSource::Vector,
            },
        );
    }

    for (id, (chunk, _)) in bm25 {
        let b = norm_bm25.get(id).copied().unwrap_or(0.0);
        match fused.get_mut(id) {
            Some(existing) => {
                existing.score += (bm25_weight * b) / weight_sum;
                existing.source = RetrievalSource::Hybrid;
            }
            None => {
                fused.insert(
                    id.clone(),
                    RetrievedChunk {
                        chunk: chunk.clone(),
                        score: (bm25_weight * b) / weight_sum,
                        source: RetrievalSource::Bm25,
                    },
                );
            }
        }
    }

    let mut results: Vec<RetrievedChunk> = fused.into_values().collect();
    results.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.chunk.sequence_index.cmp(&b.chunk.sequence_index))
    });
    results
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(transcript_id: &str, index: usize) -> Chunk {
        Chunk {
            id: Chunk::derive_id(transcript_id, index),
            transcript_id: transcript_id.to_string(),
            text: format!("chunk {}", index),
            start_offset: 0,
            end_offset: 0,
            sequence_index: index,
        }
    }

    fn candidates(entries: &[(&str, usize, f32)]) -> CandidateMap {
        entries
            .iter()
            .map(|(t, i, s)| {
                let c = chunk(t, *i);
                (c.id.clone(), (c, *s))
            })
            .collect()
    }

    #[test]
    fn test_normalize_single_candidate_is_one() {
        let set = candidates(&[("t", 0, 5.0)]);
        let norm = normalize_scores(&set);
        assert!((norm["t#0000"] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_normalize_range() {
        let set = candidates(&[("t", 0, 10.0), ("t", 1, 5.0), ("t", 2, 0.0)]);
        let norm = normalize_scores(&set);
        assert!((norm["t#0000"] - 1.0).abs() < 1e-6);
        assert!((norm["t#0001"] - 0.5).abs() < 1e-6);
        assert!((norm["t#0002"] - 0.0).abs() < 1e-6);
    }

    #[test]
    fn test_fusion_tags_sources() {
        let vector = candidates(&[("t", 0, 0.9), ("t", 1, 0.5)]);
        let bm25 = candidates(&[("t", 0, 7.0), ("t", 2, 3.0)]);

        let fused = fuse(&vector, &bm25, 0.5, 0.5);
        let by_id: HashMap<&str, &RetrievedChunk> =
            fused.iter().map(|r| (r.chunk.id.as_str(), r)).collect();

        assert_eq!(by_id["t#0000"].source, RetrievalSource::Hybrid);
        assert_eq!(by_id["t#0001"].source, RetrievalSource::Vector);
        assert_eq!(by_id["t#0002"].source, RetrievalSource::Bm25);
    }

    #[test]
    fn test_fusion_scores_stay_in_unit_interval() {
        let vector = candidates(&[("t", 0, 0.99), ("t", 1, -0.2)]);
        let bm25 = candidates(&[("t", 0, 12.0), ("t", 3, 1.0)]);
        for r in fuse(&vector, &bm25, 0.7, 0.3) {
            assert!(r.score >= 0.0 && r.score <= 1.0, "score {}", r.score);
        }
    }

    #[test]
    fn test_fusion_monotonicity() {
        // A chunk in the top of both rankings must rank at least as high
        // in the fused result as in either ranking alone.
        let vector = candidates(&[("t", 0, 0.9), ("t", 1, 0.8), ("t", 2, 0.1)]);
        let bm25 = candidates(&[("t", 0, 9.0), ("t", 3, 4.0), ("t", 4, 2.0)]);

        let fused = fuse(&vector, &bm25, 0.5, 0.5);
        // t#0000 is rank 1 in both branches; it must be rank 1 fused.
        assert_eq!(fused[0].chunk.id, "t#0000");
        assert_eq!(fused[0].source, RetrievalSource::Hybrid);

        // And its fused score dominates every single-source chunk.
        for r in &fused[1..] {
            assert!(fused[0].score >= r.score);
        }
    }

    #[test]
    fn test_equal_scores_break_by_sequence_index() {
        let vector = candidates(&[("t", 3, 0.5), ("t", 1, 0.5)]);
        let fused = fuse(&vector, &HashMap::new(), 1.0, 0.0);
        assert_eq!(fused[0].chunk.sequence_index, 1);
        assert_eq!(fused[1].chunk.sequence_index, 3);
    }

    #[test]
    fn test_bm25_only_fusion() {
        let bm25 = candidates(&[("t", 0, 5.0), ("t", 1, 2.0)]);
        let fused = fuse(&HashMap::new(), &bm25, 0.5, 0.5);
        assert_eq!(fused.len(), 2);
        assert!(fused.iter().all(|r| r.source == RetrievalSource::Bm25));
    }
}
