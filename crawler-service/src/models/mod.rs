pub mod chunk;
pub mod mapping;
pub mod platform;
pub mod status;
pub mod token;

pub use chunk::{ChunkMetadata, FileEntry, TextChunk, CRAWL_DONE_MARKER, FILE_DONE_MARKER};
pub use mapping::{ChunkMapping, ChunkMappingDocument};
pub use platform::{Platform, Service};
pub use status::ProcessingStatus;
pub use token::RetrievalToken;
