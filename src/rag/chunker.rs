//! Word-window chunker.

use crate::config::ChunkingSettings;
use crate::types::{AppError, Chunk, Result};

/// Splits text into overlapping windows of whitespace-delimited words.
///
/// Pure and deterministic: the same input always yields the same chunk
/// sequence in the same order, which is what makes re-ingestion idempotent.
pub struct TextChunker {
    chunk_size: usize,
    overlap: usize,
}

impl TextChunker {
    /// Create a chunker.
    ///
    /// `overlap` must be strictly smaller than `chunk_size`; anything else
    /// would make the window step zero or negative and loop forever, so it is
    /// rejected up front as a caller error.
    pub fn new(chunk_size: usize, overlap: usize) -> Result<Self> {
        if chunk_size == 0 {
            return Err(AppError::InvalidInput(
                "chunk_size must be greater than zero".to_string(),
            ));
        }
        if overlap >= chunk_size {
            return Err(AppError::InvalidInput(format!(
                "overlap ({}) must be smaller than chunk_size ({})",
                overlap, chunk_size
            )));
        }

        Ok(Self {
            chunk_size,
            overlap,
        })
    }

    /// Create a chunker from settings.
    pub fn from_settings(settings: &ChunkingSettings) -> Result<Self> {
        Self::new(settings.chunk_size, settings.overlap)
    }

    /// Split `text` into chunks attributed to `source`.
    ///
    /// The window start advances by `chunk_size - overlap` words per step;
    /// the last window may be shorter than `chunk_size`. Whitespace-only
    /// input yields no chunks.
    pub fn chunk(&self, text: &str, source: &str) -> Vec<Chunk> {
        let words: Vec<&str> = text.split_whitespace().collect();
        if words.is_empty() {
            return Vec::new();
        }

        let step = self.chunk_size - self.overlap;
        let mut chunks = Vec::new();
        let mut start = 0;
        let mut sequence_index = 0;

        while start < words.len() {
            let end = (start + self.chunk_size).min(words.len());
            chunks.push(Chunk {
                text: words[start..end].join(" "),
                source: source.to_string(),
                sequence_index,
            });
            sequence_index += 1;
            start += step;
        }

        chunks
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn words(n: usize) -> String {
        (0..n).map(|i| format!("w{}", i)).collect::<Vec<_>>().join(" ")
    }

    #[test]
    fn overlap_must_be_smaller_than_chunk_size() {
        assert!(TextChunker::new(50, 50).is_err());
        assert!(TextChunker::new(50, 60).is_err());
        assert!(TextChunker::new(0, 0).is_err());
        assert!(TextChunker::new(50, 49).is_ok());
    }

    #[test]
    fn short_text_is_one_chunk() {
        let chunker = TextChunker::new(300, 50).unwrap();
        let chunks = chunker.chunk("Hello world, this is a test.", "a.txt");

        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, "Hello world, this is a test.");
        assert_eq!(chunks[0].source, "a.txt");
        assert_eq!(chunks[0].sequence_index, 0);
    }

    #[test]
    fn empty_text_yields_no_chunks() {
        let chunker = TextChunker::new(300, 50).unwrap();
        assert!(chunker.chunk("", "a.txt").is_empty());
        assert!(chunker.chunk("   \n\t ", "a.txt").is_empty());
    }

    #[test]
    fn windows_overlap_and_cover_every_word() {
        let chunker = TextChunker::new(10, 3).unwrap();
        let text = words(25);
        let chunks = chunker.chunk(&text, "a.txt");

        // Step of 7: starts at 0, 7, 14, 21.
        assert_eq!(chunks.len(), 4);

        // Every word appears in at least one chunk.
        let all: String = chunks
            .iter()
            .map(|c| c.text.clone())
            .collect::<Vec<_>>()
            .join(" ");
        for i in 0..25 {
            assert!(all.split_whitespace().any(|w| w == format!("w{}", i)));
        }

        // Consecutive windows share the overlap region.
        let first: Vec<&str> = chunks[0].text.split_whitespace().collect();
        let second: Vec<&str> = chunks[1].text.split_whitespace().collect();
        assert_eq!(&first[7..], &second[..3]);
    }

    // Window starts are 0, step, 2*step, ... < n, so the chunk count is
    // ceil(n / step) with step = chunk_size - overlap = 7.
    #[rstest]
    #[case(1, 1)]
    #[case(9, 2)]
    #[case(10, 2)]
    #[case(11, 2)]
    #[case(24, 4)]
    #[case(70, 10)]
    #[case(100, 15)]
    fn chunk_count_matches_window_arithmetic(#[case] word_count: usize, #[case] expected: usize) {
        let chunker = TextChunker::new(10, 3).unwrap();
        let chunks = chunker.chunk(&words(word_count), "a.txt");
        assert_eq!(chunks.len(), expected);
    }

    #[test]
    fn last_window_may_be_short() {
        let chunker = TextChunker::new(10, 3).unwrap();
        let chunks = chunker.chunk(&words(12), "a.txt");

        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].text.split_whitespace().count(), 10);
        assert_eq!(chunks[1].text.split_whitespace().count(), 5);
    }

    #[test]
    fn deterministic_output() {
        let chunker = TextChunker::new(10, 3).unwrap();
        let text = words(40);
        assert_eq!(chunker.chunk(&text, "a.txt"), chunker.chunk(&text, "a.txt"));
    }

    #[test]
    fn sequence_indices_are_consecutive() {
        let chunker = TextChunker::new(10, 3).unwrap();
        let chunks = chunker.chunk(&words(40), "a.txt");
        for (i, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.sequence_index, i);
        }
    }
}
