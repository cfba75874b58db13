//! Rune-window chunking for Gmail message bodies.
//!
//! Bodies are chunked as fixed windows of Unicode codepoints with no
//! overlap: after HTML stripping and base64 decoding there is no stable
//! word or paragraph anatomy to anchor coordinates to, but rune offsets
//! survive re-fetches verbatim.

use super::coords::GmailCoords;
use super::{rune_windows, Chunker};
use crate::models::{ChunkMetadata, TextChunk};
use service_core::error::AppError;

pub struct GmailChunker;

impl Chunker for GmailChunker {
    type Document = String;

    fn chunk(&self, document: &Self::Document, meta: &ChunkMetadata) -> Vec<TextChunk> {
        let runes: Vec<char> = document.chars().collect();
        rune_windows(runes.len())
            .into_iter()
            .map(|(start, end)| {
                let coords = GmailCoords { start, end };
                let mut metadata = meta.clone();
                metadata.chunk_id = coords.encode();
                TextChunk {
                    metadata,
                    content: runes[start..end].iter().collect(),
                }
            })
            .collect()
    }

    fn extract(&self, document: &Self::Document, chunk_id: &str) -> Result<String, AppError> {
        let coords = GmailCoords::parse(chunk_id)?;
        let runes: Vec<char> = document.chars().collect();
        if coords.start >= coords.end || coords.end > runes.len() {
            return Err(AppError::Malformed(anyhow::anyhow!(
                "rune range out of bounds: {} (body has {} runes)",
                chunk_id,
                runes.len()
            )));
        }
        Ok(runes[coords.start..coords.end].iter().collect())
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
            service: Service::GoogleGmail,
            resource_id: "msg-1".to_string(),
            resource_type: "message".to_string(),
            title: "Re: plans".to_string(),
            file_url: String::new(),
            file_path: "Re: plans".to_string(),
            date_created: None,
            date_last_modified: None,
            chunk_id: String::new(),
        }
    }

    #[test]
    fn body_of_2500_runes_makes_three_chunks() {
        let body: String = std::iter::repeat('x').take(2500).collect();
        let chunks = GmailChunker.chunk(&body, &meta());
        assert_eq!(chunks.len(), 3);
        let ids: Vec<&str> = chunks.iter().map(|c| c.metadata.chunk_id.as_str()).collect();
        assert_eq!(
            ids,
            vec![
                "start:0-end:1000",
                "start:1000-end:2000",
                "start:2000-end:2500"
            ]
        );
        assert_eq!(chunks[2].content.chars().count(), 500);
    }

    #[test]
    fn multibyte_runes_count_as_one() {
        let body: String = "héllo wörld ".repeat(100); // 1,200 runes
        let chunks = GmailChunker.chunk(&body, &meta());
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].content.chars().count(), 1000);
        for chunk in &chunks {
            let extracted = GmailChunker
                .extract(&body, &chunk.metadata.chunk_id)
                .unwrap();
            assert_eq!(extracted, chunk.content);
        }
    }

    #[test]
    fn out_of_bounds_range_is_malformed() {
        let body = "short body".to_string();
        assert!(matches!(
            GmailChunker.extract(&body, "start:0-end:1000"),
            Err(AppError::Malformed(_))
        ));
        assert!(matches!(
            GmailChunker.extract(&body, "start:5-end:3"),
            Err(AppError::Malformed(_))
        ));
    }
}
