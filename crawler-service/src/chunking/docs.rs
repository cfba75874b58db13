//! Word-window chunking for Google Docs bodies.
//!
//! The document is rebuilt as a positioned word stream: paragraph index
//! within the body plus byte offset within the paragraph, where each word
//! contributes its length + 1 (the separating space). The same walk order
//! on a re-fetch reproduces identical coordinates.

use super::coords::DocsCoords;
use super::{word_windows, Chunker};
use crate::models::{ChunkMetadata, TextChunk};
use service_core::error::AppError;

/// One word of a Docs body with its source coordinates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocWord {
    pub text: String,
    pub paragraph: usize,
    pub offset: usize,
}

/// Position the words of one paragraph.
pub fn position_paragraph(paragraph: usize, text: &str) -> Vec<DocWord> {
    let mut offset = 0;
    super::split_words(text)
        .into_iter()
        .map(|w| {
            let word = DocWord {
                text: w.to_string(),
                paragraph,
                offset,
            };
            offset += w.len() + 1;
            word
        })
        .collect()
}

/// Position a whole body given its paragraphs in document order.
pub fn position_paragraphs<S: AsRef<str>>(paragraphs: &[S]) -> Vec<DocWord> {
    paragraphs
        .iter()
        .enumerate()
        .flat_map(|(i, p)| position_paragraph(i, p.as_ref()))
        .collect()
}

pub struct DocsChunker;

impl Chunker for DocsChunker {
    type Document = Vec<DocWord>;

    fn chunk(&self, document: &Self::Document, meta: &ChunkMetadata) -> Vec<TextChunk> {
        word_windows(document.len())
            .into_iter()
            .map(|(start, end)| {
                let slice = &document[start..end];
                let first = &slice[0];
                let last = &slice[slice.len() - 1];
                let coords = DocsCoords {
                    start_paragraph: first.paragraph,
                    start_offset: first.offset,
                    end_paragraph: last.paragraph,
                    end_offset: last.offset + last.text.len(),
                };
                let mut metadata = meta.clone();
                metadata.chunk_id = coords.encode();
                TextChunk {
                    metadata,
                    content: join(slice),
                }
            })
            .collect()
    }

    fn extract(&self, document: &Self::Document, chunk_id: &str) -> Result<String, AppError> {
        let coords = DocsCoords::parse(chunk_id)?;
        let words: Vec<&DocWord> = document
            .iter()
            .filter(|w| {
                let after_start = w.paragraph > coords.start_paragraph
                    || (w.paragraph == coords.start_paragraph && w.offset >= coords.start_offset);
                let before_end = w.paragraph < coords.end_paragraph
                    || (w.paragraph == coords.end_paragraph
                        && w.offset + w.text.len() <= coords.end_offset);
                after_start && before_end
            })
            .collect();

        if words.is_empty() {
            return Err(AppError::Malformed(anyhow::anyhow!(
                "chunk coordinates out of range: {}",
                chunk_id
            )));
        }
        Ok(words
            .into_iter()
            .map(|w| w.text.as_str())
            .collect::<Vec<_>>()
            .join(" "))
    }
}

fn join(words: &[DocWord]) -> String {
    words
        .iter()
        .map(|w| w.text.as_str())
        .collect::<Vec<_>>()
        .join(" ")
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
            resource_id: "doc-1".to_string(),
            resource_type: "application/vnd.google-apps.document".to_string(),
            title: "Plan".to_string(),
            file_url: String::new(),
            file_path: "/Plan".to_string(),
            date_created: None,
            date_last_modified: None,
            chunk_id: String::new(),
        }
    }

    fn numbered_words(n: usize, per_paragraph: usize) -> Vec<DocWord> {
        let paragraphs: Vec<String> = (0..n)
            .collect::<Vec<_>>()
            .chunks(per_paragraph)
            .map(|chunk| {
                chunk
                    .iter()
                    .map(|i| format!("w{}", i))
                    .collect::<Vec<_>>()
                    .join(" ")
            })
            .collect();
        position_paragraphs(&paragraphs)
    }

    #[test]
    fn paragraph_offsets_count_len_plus_one() {
        let words = position_paragraph(3, "ab cde f");
        assert_eq!(words[0].offset, 0);
        assert_eq!(words[1].offset, 3); // "ab" + space
        assert_eq!(words[2].offset, 7); // + "cde" + space
        assert!(words.iter().all(|w| w.paragraph == 3));
    }

    #[test]
    fn twelve_hundred_words_make_four_chunks() {
        let document = numbered_words(1200, 90);
        let chunks = DocsChunker.chunk(&document, &meta());
        assert_eq!(chunks.len(), 4);
        assert_eq!(chunks[0].content.split(' ').count(), 400);
        assert_eq!(chunks[1].content.split(' ').count(), 400);
        assert_eq!(chunks[2].content.split(' ').count(), 400);
        assert_eq!(chunks[3].content.split(' ').count(), 240);

        // Second chunk spans words 320..719.
        assert!(chunks[1].content.starts_with("w320 "));
        assert!(chunks[1].content.ends_with(" w719"));
        assert!(chunks[1].metadata.chunk_id.starts_with("StartParagraph:"));
    }

    #[test]
    fn chunk_ids_round_trip_through_extract() {
        let document = numbered_words(1200, 90);
        let chunks = DocsChunker.chunk(&document, &meta());
        for chunk in &chunks {
            let extracted = DocsChunker
                .extract(&document, &chunk.metadata.chunk_id)
                .unwrap();
            assert_eq!(extracted, chunk.content);
        }
    }

    #[test]
    fn overlap_is_shared_verbatim() {
        let document = numbered_words(1000, 100);
        let chunks = DocsChunker.chunk(&document, &meta());
        for pair in chunks.windows(2) {
            let prev: Vec<&str> = pair[0].content.split(' ').collect();
            let next: Vec<&str> = pair[1].content.split(' ').collect();
            assert_eq!(&prev[prev.len() - 80..], &next[..80]);
        }
    }

    #[test]
    fn out_of_range_coordinates_are_malformed() {
        let document = numbered_words(10, 5);
        let err = DocsChunker
            .extract(
                &document,
                "StartParagraph:99-StartOffset:0-EndParagraph:99-EndOffset:10",
            )
            .unwrap_err();
        assert!(matches!(err, AppError::Malformed(_)));
    }

    #[test]
    fn garbage_chunk_id_is_malformed() {
        let document = numbered_words(10, 5);
        assert!(matches!(
            DocsChunker.extract(&document, "not-a-chunk-id"),
            Err(AppError::Malformed(_))
        ));
    }
}
