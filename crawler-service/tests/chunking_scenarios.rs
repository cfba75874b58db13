//! End-to-end chunking scenarios over the library surface: window
//! arithmetic, coordinate round trips and cross-source invariants, with no
//! external services involved.

use crawler_service::chunking::docs::{position_paragraphs, DocsChunker};
use crawler_service::chunking::gmail::GmailChunker;
use crawler_service::chunking::notion::{position_blocks, NotionChunker, TextBlock};
use crawler_service::chunking::office::OfficeChunker;
use crawler_service::chunking::Chunker;
use crawler_service::models::{ChunkMetadata, Platform, Service};
use uuid::Uuid;

fn metadata(platform: Platform, service: Service, resource_id: &str) -> ChunkMetadata {
    ChunkMetadata {
        user_id: Uuid::new_v4(),
        platform,
        service,
        resource_id: resource_id.to_string(),
        resource_type: String::new(),
        title: resource_id.to_string(),
        file_url: String::new(),
        file_path: format!("/{}", resource_id),
        date_created: None,
        date_last_modified: None,
        chunk_id: String::new(),
    }
}

/// A 1,200-word Google Doc chunks into four windows with an 80-word
/// overlap, and slicing by the second chunk's ID recovers words 320..719.
#[test]
fn google_doc_with_1200_words() {
    let paragraphs: Vec<String> = (0..1200)
        .map(|i| format!("w{}", i))
        .collect::<Vec<_>>()
        .chunks(60)
        .map(|c| c.join(" "))
        .collect();
    let document = position_paragraphs(&paragraphs);
    let meta = metadata(Platform::Google, Service::GoogleDrive, "doc-s1");

    let chunks = DocsChunker.chunk(&document, &meta);
    assert_eq!(chunks.len(), 4);

    let sizes: Vec<usize> = chunks
        .iter()
        .map(|c| c.content.split(' ').count())
        .collect();
    assert_eq!(sizes, vec![400, 400, 400, 240]);

    let second = DocsChunker
        .extract(&document, &chunks[1].metadata.chunk_id)
        .unwrap();
    assert!(second.starts_with("w320 "));
    assert!(second.ends_with(" w719"));
    assert_eq!(second, chunks[1].content);
}

/// A 2,500-rune Gmail body becomes exactly three no-overlap chunks with
/// the documented IDs.
#[test]
fn gmail_body_with_2500_runes() {
    let body: String = (0..2500u32)
        .map(|i| char::from_u32('a' as u32 + (i % 26)).unwrap())
        .collect();
    let meta = metadata(Platform::Google, Service::GoogleGmail, "msg-s2");

    let chunks = GmailChunker.chunk(&body, &meta);
    let ids: Vec<&str> = chunks
        .iter()
        .map(|c| c.metadata.chunk_id.as_str())
        .collect();
    assert_eq!(
        ids,
        vec![
            "start:0-end:1000",
            "start:1000-end:2000",
            "start:2000-end:2500"
        ]
    );

    // Deduplicated concatenation reconstructs the body (no overlap).
    let rebuilt: String = chunks.iter().map(|c| c.content.as_str()).collect();
    assert_eq!(rebuilt, body);

    for chunk in &chunks {
        assert_eq!(
            GmailChunker
                .extract(&body, &chunk.metadata.chunk_id)
                .unwrap(),
            chunk.content
        );
    }
}

/// A Notion page with a Name property and two paragraph blocks: the first
/// chunk starts at the synthetic properties block.
#[test]
fn notion_page_with_properties_and_blocks() {
    let blocks = vec![
        TextBlock::new("page-s3_properties", "Name: Alpha"),
        TextBlock::new("b1", "X Y Z"),
        TextBlock::new("b2", "P Q"),
    ];
    let document = position_blocks(&blocks);
    let meta = metadata(Platform::Notion, Service::Notion, "page-s3");

    let chunks = NotionChunker.chunk(&document, &meta);
    assert_eq!(chunks.len(), 1);
    assert!(chunks[0]
        .metadata
        .chunk_id
        .starts_with("start_block=page-s3_properties;start_offset=0"));

    let extracted = NotionChunker
        .extract(&document, &chunks[0].metadata.chunk_id)
        .unwrap();
    assert_eq!(extracted, "Name: Alpha X Y Z P Q");
}

/// Word-based sources share the coverage and overlap invariants: every
/// word lands in at least one chunk and consecutive chunks share exactly
/// the trailing 80 words of the predecessor.
#[test]
fn coverage_and_overlap_invariants() {
    for total in [1usize, 79, 80, 81, 400, 401, 720, 1200, 3210] {
        let words: Vec<String> = (0..total).map(|i| format!("w{}", i)).collect();
        let meta = metadata(Platform::Microsoft, Service::MicrosoftDrive, "item");
        let chunks = OfficeChunker.chunk(&words, &meta);

        // Coverage: dedup consecutive overlap and compare to the stream.
        let mut rebuilt: Vec<&str> = Vec::new();
        for chunk in &chunks {
            for word in chunk.content.split(' ') {
                if !rebuilt.contains(&word) {
                    rebuilt.push(word);
                }
            }
        }
        assert_eq!(rebuilt.len(), total, "coverage failed for {}", total);

        // Overlap: exactly min(80, |prev|) trailing words are shared.
        for pair in chunks.windows(2) {
            let prev: Vec<&str> = pair[0].content.split(' ').collect();
            let next: Vec<&str> = pair[1].content.split(' ').collect();
            let expected = 80.min(prev.len());
            assert_eq!(&prev[prev.len() - expected..], &next[..expected]);
        }

        // Round trip every chunk.
        for chunk in &chunks {
            assert_eq!(
                OfficeChunker
                    .extract(&words, &chunk.metadata.chunk_id)
                    .unwrap(),
                chunk.content
            );
        }
    }
}

/// Chunk IDs from one source are rejected by another source's decoder
/// instead of mis-slicing.
#[test]
fn cross_source_ids_do_not_decode() {
    let words: Vec<String> = (0..10).map(|i| format!("w{}", i)).collect();
    let body = "plain text body".to_string();

    assert!(OfficeChunker.extract(&words, "start:0-end:10").is_err());
    assert!(GmailChunker
        .extract(&body, "startoffset:0-endoffset:9")
        .is_err());
    assert!(GmailChunker
        .extract(&body, "StartParagraph:0-StartOffset:0-EndParagraph:0-EndOffset:5")
        .is_err());
}
