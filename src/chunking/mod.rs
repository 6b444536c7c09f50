//! Splitting transcript text into overlapping, size-bounded passages.
//!
//! Chunks are the unit of indexing and retrieval. Boundaries prefer
//! sentence breaks, then word breaks, and only fall back to hard cuts for
//! pathological text with no usable break points.

use serde::{Deserialize, Serialize};

/// A bounded passage of transcript text.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Chunk {
    /// Deterministic chunk ID, derived from the transcript ID and the
    /// sequence index so reindexing overwrites instead of duplicating.
    pub id: String,
    /// Transcript this chunk belongs to.
    pub transcript_id: String,
    /// Chunk text, an exact slice of the transcript.
    pub text: String,
    /// Byte offset of the chunk start in the transcript text.
    pub start_offset: usize,
    /// Byte offset one past the chunk end.
    pub end_offset: usize,
    /// Position of this chunk in the transcript.
    pub sequence_index: usize,
}

impl Chunk {
    /// Derive the deterministic chunk ID for a transcript/sequence pair.
    pub fn derive_id(transcript_id: &str, sequence_index: usize) -> String {
        format!("{}#{:04}", transcript_id, sequence_index)
    }
}

/// Configuration for the chunker.
#[derive(Debug, Clone, Copy)]
pub struct ChunkingConfig {
    /// Target chunk size in characters.
    pub target_size: usize,
    /// Overlap between neighboring chunks in characters.
    pub overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            target_size: 1000,
            overlap: 200,
        }
    }
}

/// Character-budget chunker with overlap and sentence-break preference.
pub struct TextChunker {
    config: ChunkingConfig,
}

impl TextChunker {
    pub fn new(config: ChunkingConfig) -> Self {
        Self { config }
    }

    /// Split transcript text into chunks.
    ///
    /// Empty or whitespace-only text yields zero chunks; text shorter than
    /// the target size yields exactly one chunk.
    pub fn chunk(&self, transcript_id: &str, text: &str) -> Vec<Chunk> {
        if text.trim().is_empty() {
            return Vec::new();
        }

        let target = self.config.target_size.max(1);
        let overlap = self.config.overlap.min(target.saturating_sub(1));

        if text.len() <= target {
            return vec![Chunk {
                id: Chunk::derive_id(transcript_id, 0),
                transcript_id: transcript_id.to_string(),
                text: text.to_string(),
                start_offset: 0,
                end_offset: text.len(),
                sequence_index: 0,
            }];
        }

        let bytes = text.as_bytes();
        let mut chunks = Vec::new();
        let mut start = 0usize;
        let mut sequence_index = 0usize;

        while start < text.len() {
            let hard_end = floor_char_boundary(text, (start + target).min(text.len()));
            let end = if hard_end < text.len() {
                // Prefer a sentence break, then a word break, in the back
                // half of the budget; otherwise take the hard cut.
                let min_end = start + target / 2;
                find_sentence_break(bytes, min_end, hard_end)
                    .or_else(|| find_word_break(bytes, min_end, hard_end))
                    .unwrap_or(hard_end)
            } else {
                hard_end
            };

            chunks.push(Chunk {
                id: Chunk::derive_id(transcript_id, sequence_index),
                transcript_id: transcript_id.to_string(),
                text: text[start..end].to_string(),
                start_offset: start,
                end_offset: end,
                sequence_index,
            });
            sequence_index += 1;

            if end >= text.len() {
                break;
            }

            // Step back by the overlap, but always make forward progress.
            let next = floor_char_boundary(text, end.saturating_sub(overlap));
            start = next.max(start + 1);
            start = ceil_char_boundary(text, start);
        }

        chunks
    }
}

/// Find the last sentence break in `(min_end, max_end]`: a `.`, `!`, `?`,
/// or newline followed by whitespace. Returns the offset just past the
/// terminator so the punctuation stays with its sentence.
fn find_sentence_break(bytes: &[u8], min_end: usize, max_end: usize) -> Option<usize> {
    let mut pos = max_end;
    while pos > min_end {
        let b = bytes[pos - 1];
        if (b == b'.' || b == b'!' || b == b'?' || b == b'\n')
            && (pos == bytes.len() || bytes[pos].is_ascii_whitespace())
        {
            return Some(pos);
        }
        pos -= 1;
    }
    None
}

/// Find the last whitespace in `(min_end, max_end]`, cutting before it.
fn find_word_break(bytes: &[u8], min_end: usize, max_end: usize) -> Option<usize> {
    let mut pos = max_end;
    while pos > min_end {
        if bytes[pos - 1].is_ascii_whitespace() {
            return Some(pos);
        }
        pos -= 1;
    }
    None
}

fn floor_char_boundary(text: &str, mut index: usize) -> usize {
    index = index.min(text.len());
    while index > 0 && !text.is_char_boundary(index) {
        index -= 1;
    }
    index
}

fn ceil_char_boundary(text: &str, mut index: usize) -> usize {
    while index < text.len() && !text.is_char_boundary(index) {
        index += 1;
    }
    index
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunker(target_size: usize, overlap: usize) -> TextChunker {
        TextChunker::new(ChunkingConfig {
            target_size,
            overlap,
        })
    }

    #[test]
    fn test_empty_text_yields_no_chunks() {
        assert!(chunker(100, 20).chunk("t", "").is_empty());
        assert!(chunker(100, 20).chunk("t", "   \n\t  ").is_empty());
    }

    #[test]
    fn test_short_text_yields_single_chunk() {
        let chunks = chunker(1000, 200).chunk("t", "Alice proposed deadline March 5. Bob agreed.");
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].id, "t#0000");
        assert_eq!(chunks[0].sequence_index, 0);
        assert_eq!(chunks[0].text, "Alice proposed deadline March 5. Bob agreed.");
    }

    #[test]
    fn test_chunk_ids_are_deterministic() {
        assert_eq!(Chunk::derive_id("abc", 3), "abc#0003");
        let text = "word ".repeat(200);
        let a = chunker(100, 20).chunk("t", &text);
        let b = chunker(100, 20).chunk("t", &text);
        assert_eq!(a, b);
    }

    #[test]
    fn test_coverage_no_character_dropped() {
        let text =
            "The quick brown fox jumps over the lazy dog. Pack my box with five dozen liquor jugs. "
                .repeat(20);
        let chunks = chunker(120, 30).chunk("t", &text);
        assert!(chunks.len() > 1);

        // Each chunk is an exact slice at its offsets.
        for chunk in &chunks {
            assert_eq!(&text[chunk.start_offset..chunk.end_offset], chunk.text);
        }

        // Consecutive chunks overlap or touch: no gap anywhere.
        assert_eq!(chunks[0].start_offset, 0);
        for pair in chunks.windows(2) {
            assert!(pair[1].start_offset <= pair[0].end_offset);
            assert!(pair[1].start_offset > pair[0].start_offset);
        }
        assert_eq!(chunks.last().unwrap().end_offset, text.len());
    }

    #[test]
    fn test_prefers_sentence_boundaries() {
        let text = "First sentence ends here. Second sentence is a bit longer and ends here. Third one follows after that.";
        let chunks = chunker(30, 5).chunk("t", text);
        // The first cut lands after a sentence terminator, not mid-word.
        assert_eq!(chunks[0].text, "First sentence ends here.");
    }

    #[test]
    fn test_hard_cut_for_unbreakable_text() {
        let text = "x".repeat(350);
        let chunks = chunker(100, 20).chunk("t", &text);
        assert!(chunks.len() >= 4);
        assert_eq!(chunks[0].text.len(), 100);
        assert_eq!(chunks.last().unwrap().end_offset, 350);
    }

    #[test]
    fn test_overlap_duplicates_boundary_text() {
        let text = "alpha beta gamma delta epsilon zeta eta theta iota kappa ".repeat(10);
        let chunks = chunker(100, 30).chunk("t", &text);
        for pair in chunks.windows(2) {
            let overlap_len = pair[0].end_offset - pair[1].start_offset;
            assert!(overlap_len > 0, "neighboring chunks should overlap");
            assert!(overlap_len <= 30);
        }
    }

    #[test]
    fn test_multibyte_text_respects_char_boundaries() {
        let text = "æøå ".repeat(100);
        let chunks = chunker(50, 10).chunk("t", &text);
        for chunk in &chunks {
            // Slicing would have panicked on a bad boundary; also verify
            // the text round-trips.
            assert_eq!(&text[chunk.start_offset..chunk.end_offset], chunk.text);
        }
    }
}
