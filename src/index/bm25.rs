//! Okapi BM25 index over transcript chunks.
//!
//! Pure in-process term ranking with no network dependency; this is the
//! retrieval path that survives when the vector store is down. Documents
//! are added per transcript and removed per transcript so reindexing can
//! swap a transcript's postings atomically under the write lock.

use crate::chunking::Chunk;
use std::collections::HashMap;
use std::sync::RwLock;

const K1: f32 = 1.5;
const B: f32 = 0.75;

/// A ranked BM25 match.
#[derive(Debug, Clone)]
pub struct Bm25Hit {
    pub chunk: Chunk,
    /// Raw BM25 score; unbounded above, positive for any term match.
    pub score: f32,
}

struct IndexedDoc {
    chunk: Chunk,
    term_counts: HashMap<String, u32>,
    length: f32,
}

#[derive(Default)]
struct Inner {
    docs: Vec<IndexedDoc>,
    /// Document frequency per term.
    term_docs: HashMap<String, usize>,
    total_length: f64,
}

/// In-memory Okapi BM25 index.
#[derive(Default)]
pub struct Bm25Index {
    inner: RwLock<Inner>,
}

impl Bm25Index {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lowercase alphanumeric tokenization shared by documents and queries.
    fn tokenize(text: &str) -> Vec<String> {
        text.to_lowercase()
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
            .map(|t| t.to_string())
            .collect()
    }

    /// Add chunks to the index. Existing postings for the same transcript
    /// are not touched; use [`replace_transcript`] when reindexing.
    ///
    /// [`replace_transcript`]: Bm25Index::replace_transcript
    pub fn add_chunks(&self, chunks: &[Chunk]) {
        let mut guard = self.inner.write().unwrap();
        Self::add_locked(&mut guard, chunks);
    }

    /// Remove all postings for a transcript. Returns how many documents
    /// were dropped.
    pub fn remove_transcript(&self, transcript_id: &str) -> usize {
        let mut guard = self.inner.write().unwrap();
        Self::remove_locked(&mut guard, transcript_id)
    }

    /// Replace a transcript's postings in one write-lock critical section,
    /// so a concurrent search sees either the old set or the new set.
    pub fn replace_transcript(&self, transcript_id: &str, chunks: &[Chunk]) {
        let mut guard = self.inner.write().unwrap();
        Self::remove_locked(&mut guard, transcript_id);
        Self::add_locked(&mut guard, chunks);
    }

    fn add_locked(inner: &mut Inner, chunks: &[Chunk]) {
        for chunk in chunks {
            let tokens = Self::tokenize(&chunk.text);
            if tokens.is_empty() {
                continue;
            }

            let mut term_counts: HashMap<String, u32> = HashMap::new();
            for token in &tokens {
                *term_counts.entry(token.clone()).or_insert(0) += 1;
            }
            for term in term_counts.keys() {
                *inner.term_docs.entry(term.clone()).or_insert(0) += 1;
            }
            inner.total_length += tokens.len() as f64;
            inner.docs.push(IndexedDoc {
                chunk: chunk.clone(),
                length: tokens.len() as f32,
                term_counts,
            });
        }
    }

    fn remove_locked(inner: &mut Inner, transcript_id: &str) -> usize {
        let before = inner.docs.len();

        let mut kept = Vec::with_capacity(before);
        for doc in inner.docs.drain(..) {
            if doc.chunk.transcript_id == transcript_id {
                for term in doc.term_counts.keys() {
                    if let Some(df) = inner.term_docs.get_mut(term) {
                        *df -= 1;
                        if *df == 0 {
                            inner.term_docs.remove(term);
                        }
                    }
                }
                inner.total_length -= doc.length as f64;
            } else {
                kept.push(doc);
            }
        }
        inner.docs = kept;

        before - inner.docs.len()
    }

    /// Number of indexed documents.
    pub fn len(&self) -> usize {
        self.inner.read().unwrap().docs.len()
    }

    /// Whether the index holds no documents.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Rank chunks for a query, optionally restricted to a set of
    /// transcript IDs. Only positive-scoring documents are returned.
    pub fn search(
        &self,
        query: &str,
        top_k: usize,
        transcript_filter: Option<&[String]>,
    ) -> Vec<Bm25Hit> {
        let query_terms = Self::tokenize(query);
        if query_terms.is_empty() || top_k == 0 {
            return Vec::new();
        }

        let inner = self.inner.read().unwrap();
        let n = inner.docs.len();
        if n == 0 {
            return Vec::new();
        }
        let avgdl = (inner.total_length / n as f64) as f32;

        let mut hits: Vec<Bm25Hit> = inner
            .docs
            .iter()
            .filter(|doc| match transcript_filter {
                Some(ids) => ids.iter().any(|id| *id == doc.chunk.transcript_id),
                None => true,
            })
            .filter_map(|doc| {
                let mut score = 0.0f32;
                for term in &query_terms {
                    let tf = *doc.term_counts.get(term).unwrap_or(&0) as f32;
                    if tf == 0.0 {
                        continue;
                    }
                    let df = *inner.term_docs.get(term).unwrap_or(&0) as f32;
                    let idf = ((n as f32 - df + 0.5) / (df + 0.5) + 1.0).ln();
                    let norm = tf * (K1 + 1.0) / (tf + K1 * (1.0 - B + B * doc.length / avgdl));
                    score += idf * norm;
                }
                (score > 0.0).then(|| Bm25Hit {
                    chunk: doc.chunk.clone(),
                    score,
                })
            })
            .collect();

        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.chunk.sequence_index.cmp(&b.chunk.sequence_index))
        });
        hits.truncate(top_k);
        hits
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(transcript_id: &str, index: usize, text: &str) -> Chunk {
        Chunk {
            id: Chunk::derive_id(transcript_id, index),
            transcript_id: transcript_id.to_string(),
            text: text.to_string(),
            start_offset: 0,
            end_offset: text.len(),
            sequence_index: index,
        }
    }

    fn sample_index() -> Bm25Index {
        let index = Bm25Index::new();
        index.add_chunks(&[
            chunk("t1", 0, "Alice proposed deadline March 5. Bob agreed."),
            chunk("t1", 1, "The budget discussion covered hiring plans."),
            chunk("t2", 0, "Unrelated notes about the deployment pipeline."),
        ]);
        index
    }

    #[test]
    fn test_exact_term_ranks_first() {
        let index = sample_index();
        let hits = index.search("when is the deadline", 3, None);
        assert!(!hits.is_empty());
        assert_eq!(hits[0].chunk.id, "t1#0000");
        assert!(hits[0].score > 0.0);
    }

    #[test]
    fn test_no_match_returns_empty() {
        let index = sample_index();
        assert!(index.search("quantum entanglement", 3, None).is_empty());
        assert!(index.search("", 3, None).is_empty());
    }

    #[test]
    fn test_transcript_filter_restricts_candidates() {
        let index = sample_index();
        let filter = vec!["t2".to_string()];
        let hits = index.search("deadline deployment", 5, Some(&filter));
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].chunk.transcript_id, "t2");
    }

    #[test]
    fn test_remove_transcript_drops_postings() {
        let index = sample_index();
        assert_eq!(index.len(), 3);
        assert_eq!(index.remove_transcript("t1"), 2);
        assert_eq!(index.len(), 1);
        assert!(index.search("deadline", 3, None).is_empty());
    }

    #[test]
    fn test_replace_transcript_is_idempotent() {
        let index = sample_index();
        let chunks = vec![chunk("t1", 0, "Replacement text about deadlines.")];
        index.replace_transcript("t1", &chunks);
        index.replace_transcript("t1", &chunks);
        assert_eq!(index.len(), 2);
        let hits = index.search("deadlines", 5, None);
        assert_eq!(hits.len(), 1);
    }

    #[test]
    fn test_top_k_larger_than_corpus() {
        let index = sample_index();
        let hits = index.search("the", 50, None);
        assert!(hits.len() <= 3);
    }

    #[test]
    fn test_shorter_document_scores_higher_for_same_tf() {
        let index = Bm25Index::new();
        index.add_chunks(&[
            chunk("t1", 0, "deadline"),
            chunk(
                "t1",
                1,
                "deadline mentioned in a much longer passage with many extra words around it",
            ),
        ]);
        let hits = index.search("deadline", 2, None);
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].chunk.sequence_index, 0);
        assert!(hits[0].score > hits[1].score);
    }
}
