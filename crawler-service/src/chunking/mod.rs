//! Deterministic chunking of extracted document text.
//!
//! Every source except Gmail chunks a word stream into overlapping windows
//! of [`CHUNK_SIZE_WORDS`] with [`CHUNK_OVERLAP_WORDS`] shared words. Gmail
//! bodies have no stable word anatomy after HTML stripping, so they use
//! fixed rune windows with no overlap instead.
//!
//! Each strategy encodes source-native coordinates into the chunk ID and
//! can invert them: re-fetching an unmodified document and slicing by a
//! previously issued chunk ID yields the chunk's text again.

pub mod coords;
pub mod docs;
pub mod gmail;
pub mod notion;
pub mod office;
pub mod slides;

use crate::models::{ChunkMetadata, TextChunk};
use service_core::error::AppError;

/// Words per window for word-based sources.
pub const CHUNK_SIZE_WORDS: usize = 400;

/// Trailing words each window shares with its successor.
pub const CHUNK_OVERLAP_WORDS: usize = 80;

/// Runes per window for Gmail bodies (no overlap).
pub const GMAIL_CHUNK_RUNES: usize = 1000;

/// A chunking strategy over one source's document representation.
pub trait Chunker {
    /// The rebuilt word/rune stream the strategy operates on.
    type Document;

    /// Cut the document into chunks, stamping coordinate chunk IDs into
    /// copies of `meta`.
    fn chunk(&self, document: &Self::Document, meta: &ChunkMetadata) -> Vec<TextChunk>;

    /// Re-slice the document by a previously issued chunk ID.
    fn extract(&self, document: &Self::Document, chunk_id: &str) -> Result<String, AppError>;
}

/// Split text into words. Newlines and carriage returns separate words the
/// same as any other whitespace.
pub fn split_words(text: &str) -> Vec<&str> {
    text.split_whitespace().collect()
}

/// Window boundaries `[start, end)` over `total` items.
///
/// Starts advance by `size - overlap`. A trailing window that begins past
/// zero and holds at most `overlap` items is suppressed: all of its items
/// already appeared at the end of the previous window.
pub fn windows(total: usize, size: usize, overlap: usize) -> Vec<(usize, usize)> {
    assert!(size > overlap, "window size must exceed overlap");
    let stride = size - overlap;
    let mut out = Vec::new();
    let mut start = 0;
    while start < total {
        if start > 0 && total - start <= overlap {
            break;
        }
        out.push((start, (start + size).min(total)));
        start += stride;
    }
    out
}

/// Word windows with the standard 400/80 parameters.
pub fn word_windows(total: usize) -> Vec<(usize, usize)> {
    windows(total, CHUNK_SIZE_WORDS, CHUNK_OVERLAP_WORDS)
}

/// Rune windows with the Gmail parameters (no overlap).
pub fn rune_windows(total: usize) -> Vec<(usize, usize)> {
    windows(total, GMAIL_CHUNK_RUNES, 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_words_collapses_newlines() {
        assert_eq!(
            split_words("alpha beta\ngamma\r\ndelta  epsilon"),
            vec!["alpha", "beta", "gamma", "delta", "epsilon"]
        );
    }

    #[test]
    fn windows_cover_1200_words() {
        // 1,200 words: four windows, the last one short.
        let w = word_windows(1200);
        assert_eq!(w, vec![(0, 400), (320, 720), (640, 1040), (960, 1200)]);
    }

    #[test]
    fn single_short_document_is_one_window() {
        assert_eq!(word_windows(5), vec![(0, 5)]);
        assert_eq!(word_windows(400), vec![(0, 400)]);
    }

    #[test]
    fn trailing_window_inside_previous_is_suppressed() {
        // 400 words fit one window; the would-be second window [320, 400)
        // holds exactly the 80 overlap words and must not be emitted.
        assert_eq!(word_windows(400), vec![(0, 400)]);
        // 399 + 1 = 400 case generalized: anything up to overlap past a
        // stride boundary stays suppressed.
        assert_eq!(word_windows(390), vec![(0, 390)]);
        // One word beyond the overlap region forces a second window.
        assert_eq!(word_windows(401), vec![(0, 400), (320, 401)]);
    }

    #[test]
    fn consecutive_windows_share_exactly_the_overlap() {
        let w = word_windows(1000);
        for pair in w.windows(2) {
            let (prev, next) = (pair[0], pair[1]);
            let shared = prev.1.saturating_sub(next.0);
            assert_eq!(shared, CHUNK_OVERLAP_WORDS);
        }
    }

    #[test]
    fn every_item_is_covered() {
        for total in [1usize, 80, 81, 320, 321, 400, 401, 719, 720, 721, 1200, 5000] {
            let w = word_windows(total);
            let mut covered = vec![false; total];
            for (start, end) in w {
                for flag in covered.iter_mut().take(end).skip(start) {
                    *flag = true;
                }
            }
            assert!(covered.iter().all(|&c| c), "gap with total={}", total);
        }
    }

    #[test]
    fn rune_windows_have_no_overlap() {
        assert_eq!(rune_windows(2500), vec![(0, 1000), (1000, 2000), (2000, 2500)]);
        assert_eq!(rune_windows(1000), vec![(0, 1000)]);
        assert_eq!(rune_windows(999), vec![(0, 999)]);
    }
}
