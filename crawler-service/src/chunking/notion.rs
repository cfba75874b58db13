//! Word-window chunking for Notion pages and databases.
//!
//! The connector flattens a page into ordered blocks of plain text (the
//! synthetic properties block first, then content blocks; databases add
//! synthetic title/description and per-row blocks). Chunk coordinates are
//! the first/last block IDs plus word indices within those blocks.

use super::coords::NotionCoords;
use super::{word_windows, Chunker};
use crate::models::{ChunkMetadata, TextChunk};
use service_core::error::AppError;

/// A block's stable ID and its projected plain text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextBlock {
    pub id: String,
    pub text: String,
}

impl TextBlock {
    pub fn new(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
        }
    }
}

/// One word with its containing block and index within that block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotionWord {
    pub text: String,
    pub block_id: String,
    pub word_index: usize,
}

/// Flatten blocks into the positioned word stream the chunker consumes.
pub fn position_blocks(blocks: &[TextBlock]) -> Vec<NotionWord> {
    blocks
        .iter()
        .flat_map(|block| {
            super::split_words(&block.text)
                .into_iter()
                .enumerate()
                .map(|(i, w)| NotionWord {
                    text: w.to_string(),
                    block_id: block.id.clone(),
                    word_index: i,
                })
                .collect::<Vec<_>>()
        })
        .collect()
}

pub struct NotionChunker;

impl Chunker for NotionChunker {
    type Document = Vec<NotionWord>;

    fn chunk(&self, document: &Self::Document, meta: &ChunkMetadata) -> Vec<TextChunk> {
        word_windows(document.len())
            .into_iter()
            .map(|(start, end)| {
                let slice = &document[start..end];
                let first = &slice[0];
                let last = &slice[slice.len() - 1];
                let coords = NotionCoords {
                    start_block: first.block_id.clone(),
                    start_offset: first.word_index,
                    end_block: last.block_id.clone(),
                    end_offset: last.word_index,
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
        let coords = NotionCoords::parse(chunk_id)?;

        let start = document.iter().position(|w| {
            w.block_id == coords.start_block && w.word_index == coords.start_offset
        });
        let end = document.iter().position(|w| {
            w.block_id == coords.end_block && w.word_index == coords.end_offset
        });

        match (start, end) {
            (Some(start), Some(end)) if start <= end => Ok(document[start..=end]
                .iter()
                .map(|w| w.text.as_str())
                .collect::<Vec<_>>()
                .join(" ")),
            _ => Err(AppError::Malformed(anyhow::anyhow!(
                "chunk coordinates out of range: {}",
                chunk_id
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Platform, Service};

    fn meta() -> ChunkMetadata {
        ChunkMetadata {
            user_id: uuid::Uuid::nil(),
            platform: Platform::Notion,
            service: Service::Notion,
            resource_id: "page-1".to_string(),
            resource_type: "page".to_string(),
            title: "Alpha".to_string(),
            file_url: String::new(),
            file_path: "Alpha".to_string(),
            date_created: None,
            date_last_modified: None,
            chunk_id: String::new(),
        }
    }

    #[test]
    fn properties_block_leads_the_stream() {
        let blocks = vec![
            TextBlock::new("page-1_properties", "Name: Alpha"),
            TextBlock::new("b1", "X Y Z"),
            TextBlock::new("b2", "P Q"),
        ];
        let document = position_blocks(&blocks);
        let chunks = NotionChunker.chunk(&document, &meta());
        assert_eq!(chunks.len(), 1);
        assert!(chunks[0]
            .metadata
            .chunk_id
            .starts_with("start_block=page-1_properties;start_offset=0"));
        assert_eq!(chunks[0].content, "Name: Alpha X Y Z P Q");
    }

    #[test]
    fn word_indices_restart_per_block() {
        let blocks = vec![
            TextBlock::new("b1", "one two"),
            TextBlock::new("b2", "three"),
        ];
        let document = position_blocks(&blocks);
        assert_eq!(document[1].word_index, 1);
        assert_eq!(document[2].word_index, 0);
        assert_eq!(document[2].block_id, "b2");
    }

    #[test]
    fn long_pages_round_trip() {
        let blocks: Vec<TextBlock> = (0..60)
            .map(|b| {
                TextBlock::new(
                    format!("block-{}", b),
                    (0..15)
                        .map(|w| format!("b{}w{}", b, w))
                        .collect::<Vec<_>>()
                        .join(" "),
                )
            })
            .collect();
        let document = position_blocks(&blocks);
        assert_eq!(document.len(), 900);

        let chunks = NotionChunker.chunk(&document, &meta());
        assert_eq!(chunks.len(), 3);
        for chunk in &chunks {
            let extracted = NotionChunker
                .extract(&document, &chunk.metadata.chunk_id)
                .unwrap();
            assert_eq!(extracted, chunk.content);
        }
    }

    #[test]
    fn unknown_block_is_malformed() {
        let document = position_blocks(&[TextBlock::new("b1", "alpha beta")]);
        let err = NotionChunker
            .extract(
                &document,
                "start_block=missing;start_offset=0;end_block=b1;end_offset=1",
            )
            .unwrap_err();
        assert!(matches!(err, AppError::Malformed(_)));
    }
}
