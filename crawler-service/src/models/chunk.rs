use super::platform::{Platform, Service};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Sentinel content marking the end of a file's chunk stream.
pub const FILE_DONE_MARKER: &str = "<file_done>";

/// Sentinel content marking the end of a platform's crawl for a user.
pub const CRAWL_DONE_MARKER: &str = "<crawl_done>";

/// Metadata attached to every chunk. The `chunk_id` starts as the
/// connector's coordinate encoding and is replaced by a short key before
/// the chunk leaves the service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkMetadata {
    pub user_id: Uuid,
    pub platform: Platform,
    pub service: Service,
    pub resource_id: String,
    pub resource_type: String,
    pub title: String,
    pub file_url: String,
    pub file_path: String,
    pub date_created: Option<DateTime<Utc>>,
    pub date_last_modified: Option<DateTime<Utc>>,
    pub chunk_id: String,
}

/// One bounded text window of a document, or a sentinel marker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextChunk {
    pub metadata: ChunkMetadata,
    pub content: String,
}

impl TextChunk {
    pub fn is_file_done(&self) -> bool {
        self.content == FILE_DONE_MARKER
    }

    pub fn is_crawl_done(&self) -> bool {
        self.content == CRAWL_DONE_MARKER
    }
}

/// A document discovered by a connector listing or change feed.
///
/// `exists = false` records an upstream deletion (trashed/removed) so the
/// caller can drop chunk mappings instead of processing content.
#[derive(Debug, Clone)]
pub struct FileEntry {
    pub resource_id: String,
    pub name: String,
    pub mime_type: String,
    pub url: String,
    /// Logical folder path including the filename, e.g. `/Projects/Q3/plan`.
    pub path: String,
    pub date_created: Option<DateTime<Utc>>,
    pub date_last_modified: Option<DateTime<Utc>>,
    pub exists: bool,
}

impl FileEntry {
    /// Entry for a resource deleted upstream.
    pub fn deleted(resource_id: String) -> Self {
        Self {
            resource_id,
            name: String::new(),
            mime_type: String::new(),
            url: String::new(),
            path: String::new(),
            date_created: None,
            date_last_modified: None,
            exists: false,
        }
    }
}
