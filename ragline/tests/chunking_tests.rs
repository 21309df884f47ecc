//! Property tests for fixed-size chunking.

use proptest::prelude::*;
use ragline::chunking::{Chunker, FixedSizeChunker, MAX_CHUNK_SIZE};
use ragline::error::RagError;

/// Words separated by single spaces: every window of two or more characters
/// holds a letter, so no window is dropped as blank.
fn arb_text() -> impl Strategy<Value = String> {
    "[a-zé]{1,12}( [a-zé]{1,12}){0,60}"
}

/// `(chunk_size, chunk_overlap)` with `2 <= chunk_size` and `overlap < chunk_size`.
fn arb_params() -> impl Strategy<Value = (usize, usize)> {
    (2usize..64).prop_flat_map(|size| (Just(size), 0..size))
}

/// **Property: chunk coverage**
/// Chunks start at 0, end at the text length, follow each other with exactly
/// `chunk_overlap` characters shared, and carry the text they point at.
mod prop_chunk_coverage {
    use super::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(200))]

        #[test]
        fn windows_tile_the_whole_text(text in arb_text(), (size, overlap) in arb_params()) {
            let chunker = FixedSizeChunker::new(size, overlap).unwrap();
            let chunks = chunker.chunk("doc", &text).unwrap();
            let chars: Vec<char> = text.chars().collect();

            prop_assert!(!chunks.is_empty());
            prop_assert_eq!(chunks[0].start, 0);
            prop_assert_eq!(chunks[chunks.len() - 1].end, chars.len());

            for pair in chunks.windows(2) {
                prop_assert_eq!(pair[1].start, pair[0].end - overlap);
            }
            for chunk in &chunks {
                let expected: String = chars[chunk.start..chunk.end].iter().collect();
                prop_assert_eq!(&chunk.content, &expected);
                prop_assert_eq!(chunk.document_id.as_str(), "doc");
            }
        }
    }
}

/// **Property: chunk bounds**
/// Offsets stay in range, no chunk exceeds `chunk_size`, indices run from 0
/// without gaps, and the count stays within `ceil(len / (size - overlap)) + 1`.
mod prop_chunk_bounds {
    use super::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(200))]

        #[test]
        fn offsets_sizes_and_indices_are_bounded(
            text in arb_text(),
            (size, overlap) in arb_params(),
        ) {
            let chunks = FixedSizeChunker::new(size, overlap).unwrap().chunk("doc", &text).unwrap();
            let len = text.chars().count();

            for (i, chunk) in chunks.iter().enumerate() {
                prop_assert_eq!(chunk.index as usize, i);
                prop_assert!(chunk.start < chunk.end);
                prop_assert!(chunk.end <= len);
                prop_assert!(chunk.len() <= size);
            }
            prop_assert!(chunks.len() <= len.div_ceil(size - overlap) + 1);
        }

        #[test]
        fn arbitrary_unicode_never_splits_a_char(
            text in "\\PC{1,200}",
            (size, overlap) in arb_params(),
        ) {
            prop_assume!(!text.trim().is_empty());
            let chunks = FixedSizeChunker::new(size, overlap).unwrap().chunk("doc", &text).unwrap();
            let chars: Vec<char> = text.chars().collect();

            for (i, chunk) in chunks.iter().enumerate() {
                prop_assert_eq!(chunk.index as usize, i);
                prop_assert!(chunk.end <= chars.len());
                let expected: String = chars[chunk.start..chunk.end].iter().collect();
                prop_assert_eq!(&chunk.content, &expected);
                prop_assert!(!chunk.content.trim().is_empty());
            }
        }
    }
}

/// **Property: invalid input rejection**
mod prop_invalid_input {
    use super::*;

    proptest! {
        #[test]
        fn blank_content_is_rejected(blank in "[ \t\n]{0,20}", (size, overlap) in arb_params()) {
            let result = FixedSizeChunker::new(size, overlap).unwrap().chunk("doc", &blank);
            prop_assert!(matches!(result, Err(RagError::Validation(_))));
        }

        #[test]
        fn overlap_not_below_size_is_rejected(size in 1usize..100, extra in 0usize..10) {
            let result = FixedSizeChunker::new(size, size + extra);
            prop_assert!(matches!(result, Err(RagError::Validation(_))));
        }

        #[test]
        fn oversized_chunks_are_rejected(excess in 1usize..1000) {
            let result = FixedSizeChunker::new(MAX_CHUNK_SIZE + excess, 0);
            prop_assert!(matches!(result, Err(RagError::Validation(_))));
        }
    }

    #[test]
    fn zero_chunk_size_is_rejected() {
        assert!(matches!(FixedSizeChunker::new(0, 0), Err(RagError::Validation(_))));
    }
}
