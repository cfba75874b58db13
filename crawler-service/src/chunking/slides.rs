//! Word-window chunking for Google Slides presentations.
//!
//! Words carry their slide index and byte offset within the slide's
//! concatenated text, using the same length + 1 convention as Docs
//! paragraphs. Windows run across slide boundaries.

use super::coords::SlidesCoords;
use super::{word_windows, Chunker};
use crate::models::{ChunkMetadata, TextChunk};
use service_core::error::AppError;

/// One word of a presentation with its source coordinates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlideWord {
    pub text: String,
    pub slide: usize,
    pub offset: usize,
}

/// Position the words of one slide.
pub fn position_slide(slide: usize, text: &str) -> Vec<SlideWord> {
    let mut offset = 0;
    super::split_words(text)
        .into_iter()
        .map(|w| {
            let word = SlideWord {
                text: w.to_string(),
                slide,
                offset,
            };
            offset += w.len() + 1;
            word
        })
        .collect()
}

/// Position a whole presentation given its slides in deck order.
pub fn position_slides<S: AsRef<str>>(slides: &[S]) -> Vec<SlideWord> {
    slides
        .iter()
        .enumerate()
        .flat_map(|(i, s)| position_slide(i, s.as_ref()))
        .collect()
}

pub struct SlidesChunker;

impl Chunker for SlidesChunker {
    type Document = Vec<SlideWord>;

    fn chunk(&self, document: &Self::Document, meta: &ChunkMetadata) -> Vec<TextChunk> {
        word_windows(document.len())
            .into_iter()
            .map(|(start, end)| {
                let slice = &document[start..end];
                let first = &slice[0];
                let last = &slice[slice.len() - 1];
                let coords = SlidesCoords {
                    start_slide: first.slide,
                    start_offset: first.offset,
                    end_slide: last.slide,
                    end_offset: last.offset + last.text.len(),
                };
                let mut metadata = meta.clone();
                metadata.chunk_id = coords.encode();
                TextChunk {
                    metadata,
                    content: slice
                        .iter()
                        .map(|w| w.text.as_str())
                        .collect::<Vec<_>>()
                        .join(" "),
                }
            })
            .collect()
    }

    fn extract(&self, document: &Self::Document, chunk_id: &str) -> Result<String, AppError> {
        let coords = SlidesCoords::parse(chunk_id)?;
        let words: Vec<&str> = document
            .iter()
            .filter(|w| {
                let after_start = w.slide > coords.start_slide
                    || (w.slide == coords.start_slide && w.offset >= coords.start_offset);
                let before_end = w.slide < coords.end_slide
                    || (w.slide == coords.end_slide
                        && w.offset + w.text.len() <= coords.end_offset);
                after_start && before_end
            })
            .map(|w| w.text.as_str())
            .collect();

        if words.is_empty() {
            return Err(AppError::Malformed(anyhow::anyhow!(
                "chunk coordinates out of range: {}",
                chunk_id
            )));
        }
        Ok(words.join(" "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Platform, Service};

    fn meta() -> ChunkMetadata {
        ChunkMetadata {
            user_id: uuid::Uuid::nil(),
            platform: Platform::Google,
            service: Service::GoogleDrive,
            resource_id: "deck-1".to_string(),
            resource_type: "application/vnd.google-apps.presentation".to_string(),
            title: "Deck".to_string(),
            file_url: String::new(),
            file_path: "/Deck".to_string(),
            date_created: None,
            date_last_modified: None,
            chunk_id: String::new(),
        }
    }

    #[test]
    fn words_carry_slide_and_offset() {
        let document = position_slides(&["one two", "three"]);
        assert_eq!(document.len(), 3);
        assert_eq!((document[0].slide, document[0].offset), (0, 0));
        assert_eq!((document[1].slide, document[1].offset), (0, 4));
        assert_eq!((document[2].slide, document[2].offset), (1, 0));
    }

    #[test]
    fn chunks_span_slides_and_round_trip() {
        // 30 slides x 20 words = 600 words -> windows (0, 400), (320, 600).
        let slides: Vec<String> = (0..30)
            .map(|s| {
                (0..20)
                    .map(|w| format!("s{}w{}", s, w))
                    .collect::<Vec<_>>()
                    .join(" ")
            })
            .collect();
        let document = position_slides(&slides);
        let chunks = SlidesChunker.chunk(&document, &meta());
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].content.split(' ').count(), 400);
        assert_eq!(chunks[1].content.split(' ').count(), 280);
        assert!(chunks[0].content.starts_with("s0w0 "));
        assert!(chunks[1].content.starts_with("s16w0 "));

        for chunk in &chunks {
            let extracted = SlidesChunker
                .extract(&document, &chunk.metadata.chunk_id)
                .unwrap();
            assert_eq!(extracted, chunk.content);
        }
    }

    #[test]
    fn bad_coordinates_are_malformed() {
        let document = position_slides(&["a b c"]);
        assert!(matches!(
            SlidesChunker.extract(&document, "9-0-9-50"),
            Err(AppError::Malformed(_))
        ));
        assert!(matches!(
            SlidesChunker.extract(&document, "gibberish"),
            Err(AppError::Malformed(_))
        ));
    }
}
