//! Document chunking.
//!
//! This module provides the [`Chunker`] trait and [`FixedSizeChunker`], which
//! splits text into fixed-size character windows with a configurable overlap.

use tracing::debug;

use crate::document::Chunk;
use crate::error::{RagError, Result};

/// Largest accepted chunk size, in characters.
pub const MAX_CHUNK_SIZE: usize = 8192;

/// A strategy for splitting document text into chunks.
///
/// Implementations produce [`Chunk`]s carrying offsets and content only.
/// Embeddings are attached later by the pipeline.
pub trait Chunker: Send + Sync {
    /// Split `content` into chunks belonging to `document_id`.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Validation`] if `content` is empty or whitespace only.
    fn chunk(&self, document_id: &str, content: &str) -> Result<Vec<Chunk>>;
}

/// Splits text into fixed-size windows by character count with overlap.
///
/// Each window spans `[cursor, min(cursor + chunk_size, len))`; the cursor
/// then moves to `end - chunk_overlap`. Whitespace-only windows are dropped
/// without consuming an index.
///
/// # Example
///
/// ```rust,ignore
/// use ragline::FixedSizeChunker;
///
/// let chunker = FixedSizeChunker::new(10, 2)?;
/// let chunks = chunker.chunk("doc-1", "AI and ML content")?;
/// ```
#[derive(Debug, Clone)]
pub struct FixedSizeChunker {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl FixedSizeChunker {
    /// Create a new `FixedSizeChunker`.
    ///
    /// # Arguments
    ///
    /// * `chunk_size`: maximum number of characters per chunk
    /// * `chunk_overlap`: number of overlapping characters between consecutive chunks
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Validation`] unless
    /// `0 < chunk_size <= MAX_CHUNK_SIZE` and `chunk_overlap < chunk_size`.
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self> {
        if chunk_size == 0 || chunk_size > MAX_CHUNK_SIZE {
            return Err(RagError::Validation(format!(
                "chunk_size must be between 1 and {MAX_CHUNK_SIZE}, got {chunk_size}"
            )));
        }
        if chunk_overlap >= chunk_size {
            return Err(RagError::Validation(format!(
                "chunk_overlap ({chunk_overlap}) must be less than chunk_size ({chunk_size})"
            )));
        }
        Ok(Self { chunk_size, chunk_overlap })
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn chunk_overlap(&self) -> usize {
        self.chunk_overlap
    }
}

impl Chunker for FixedSizeChunker {
    fn chunk(&self, document_id: &str, content: &str) -> Result<Vec<Chunk>> {
        if content.trim().is_empty() {
            return Err(RagError::Validation(format!(
                "document '{document_id}' has no content to chunk"
            )));
        }

        // Byte offset of every char boundary; offsets[len] == content.len().
        let offsets: Vec<usize> =
            content.char_indices().map(|(i, _)| i).chain(std::iter::once(content.len())).collect();
        let len = offsets.len() - 1;

        let mut chunks = Vec::new();
        let mut cursor = 0;
        let mut index = 0u32;

        loop {
            let end = (cursor + self.chunk_size).min(len);
            let text = &content[offsets[cursor]..offsets[end]];

            if !text.trim().is_empty() {
                chunks.push(Chunk {
                    document_id: document_id.to_string(),
                    index,
                    start: cursor,
                    end,
                    content: text.to_string(),
                });
                index += 1;
            }

            // Moving back by the overlap from the final window would loop forever.
            if end == len {
                break;
            }
            cursor = end - self.chunk_overlap;
        }

        debug!(document_id, chars = len, chunk_count = chunks.len(), "chunked document");
        Ok(chunks)
    }
}

/// Chunk `content` with a one-off [`FixedSizeChunker`].
pub fn chunk_text(
    document_id: &str,
    content: &str,
    chunk_size: usize,
    chunk_overlap: usize,
) -> Result<Vec<Chunk>> {
    FixedSizeChunker::new(chunk_size, chunk_overlap)?.chunk(document_id, content)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spans(chunks: &[Chunk]) -> Vec<(u32, usize, usize)> {
        chunks.iter().map(|c| (c.index, c.start, c.end)).collect()
    }

    #[test]
    fn splits_with_overlap() {
        let chunks = chunk_text("doc", "AI and ML content", 10, 2).unwrap();
        assert_eq!(spans(&chunks), [(0, 0, 10), (1, 8, 17)]);
        assert_eq!(chunks[0].content, "AI and ML ");
        assert_eq!(chunks[1].content, "L content");
    }

    #[test]
    fn short_text_is_a_single_chunk() {
        let chunks = chunk_text("doc", "tiny", 100, 10).unwrap();
        assert_eq!(spans(&chunks), [(0, 0, 4)]);
    }

    #[test]
    fn whitespace_windows_are_dropped_without_gaps() {
        let text = format!("abc{}def", " ".repeat(10));
        let chunks = chunk_text("doc", &text, 4, 0).unwrap();
        let indices: Vec<u32> = chunks.iter().map(|c| c.index).collect();
        assert_eq!(indices, (0..chunks.len() as u32).collect::<Vec<_>>());
        assert!(chunks.iter().all(|c| !c.content.trim().is_empty()));
        assert_eq!(chunks.last().unwrap().end, text.chars().count());
    }

    #[test]
    fn multibyte_text_is_split_by_chars() {
        let chunks = chunk_text("doc", "🦀🦀🦀🦀🦀", 2, 1).unwrap();
        assert_eq!(spans(&chunks), [(0, 0, 2), (1, 1, 3), (2, 2, 4), (3, 3, 5)]);
        assert!(chunks.iter().all(|c| c.content == "🦀🦀"));
    }

    #[test]
    fn rejects_invalid_parameters() {
        assert!(FixedSizeChunker::new(0, 0).is_err());
        assert!(FixedSizeChunker::new(MAX_CHUNK_SIZE + 1, 0).is_err());
        assert!(FixedSizeChunker::new(10, 10).is_err());
        assert!(FixedSizeChunker::new(MAX_CHUNK_SIZE, MAX_CHUNK_SIZE - 1).is_ok());
    }

    #[test]
    fn rejects_blank_content() {
        let chunker = FixedSizeChunker::new(10, 2).unwrap();
        assert!(matches!(chunker.chunk("doc", "  \n\t "), Err(RagError::Validation(_))));
        assert!(matches!(chunker.chunk("doc", ""), Err(RagError::Validation(_))));
    }
}
