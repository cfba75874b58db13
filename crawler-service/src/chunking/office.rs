//! Word-window chunking for Microsoft Word and PowerPoint documents.
//!
//! OOXML extraction flattens the whole document into a single word list;
//! chunk IDs carry inclusive start/end indices into that list.

use super::coords::OfficeCoords;
use super::{word_windows, Chunker};
use crate::models::{ChunkMetadata, TextChunk};
use service_core::error::AppError;

pub struct OfficeChunker;

impl Chunker for OfficeChunker {
    type Document = Vec<String>;

    fn chunk(&self, document: &Self::Document, meta: &ChunkMetadata) -> Vec<TextChunk> {
        word_windows(document.len())
            .into_iter()
            .map(|(start, end)| {
                let coords = OfficeCoords {
                    start,
                    end: end - 1,
                };
                let mut metadata = meta.clone();
                metadata.chunk_id = coords.encode();
                TextChunk {
                    metadata,
                    content: document[start..end].join(" "),
                }
            })
            .collect()
    }

    fn extract(&self, document: &Self::Document, chunk_id: &str) -> Result<String, AppError> {
        let coords = OfficeCoords::parse(chunk_id)?;
        if coords.start > coords.end || coords.end >= document.len() {
            return Err(AppError::Malformed(anyhow::anyhow!(
                "word range out of bounds: {} (document has {} words)",
                chunk_id,
                document.len()
            )));
        }
        Ok(document[coords.start..=coords.end].join(" "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Platform, Service};

    fn meta() -> ChunkMetadata {
        ChunkMetadata {
            user_id: uuid::Uuid::nil(),
            platform: Platform::Microsoft,
            service: Service::MicrosoftDrive,
            resource_id: "item-1".to_string(),
            resource_type:
                "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
                    .to_string(),
            title: "report.docx".to_string(),
            file_url: String::new(),
            file_path: "/Documents/report.docx".to_string(),
            date_created: None,
            date_last_modified: None,
            chunk_id: String::new(),
        }
    }

    fn words(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("w{}", i)).collect()
    }

    #[test]
    fn indices_are_inclusive() {
        let document = words(500);
        let chunks = OfficeChunker.chunk(&document, &meta());
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].metadata.chunk_id, "startoffset:0-endoffset:399");
        assert_eq!(chunks[1].metadata.chunk_id, "startoffset:320-endoffset:499");
    }

    #[test]
    fn extract_round_trips() {
        let document = words(1200);
        let chunks = OfficeChunker.chunk(&document, &meta());
        assert_eq!(chunks.len(), 4);
        for chunk in &chunks {
            let extracted = OfficeChunker
                .extract(&document, &chunk.metadata.chunk_id)
                .unwrap();
            assert_eq!(extracted, chunk.content);
        }
    }

    #[test]
    fn stale_coordinates_are_malformed() {
        let document = words(10);
        assert!(matches!(
            OfficeChunker.extract(&document, "startoffset:0-endoffset:399"),
            Err(AppError::Malformed(_))
        ));
    }
}
