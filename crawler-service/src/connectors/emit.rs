//! Shared chunk emission pipeline.
//!
//! Every connector finishes a file the same way: drop stale chunk mappings
//! for the resource, publish each chunk under a freshly minted short key,
//! publish the `<file_done>` marker, then record the resource as processed.

use crate::bus::ChunkPublisher;
use crate::models::{ChunkMetadata, Platform, TextChunk};
use crate::services::{ChunkMapStore, Database};
use service_core::error::AppError;
use uuid::Uuid;

#[derive(Clone)]
pub struct Emitter {
    publisher: ChunkPublisher,
    chunk_map: ChunkMapStore,
    db: Database,
}

impl Emitter {
    pub fn new(publisher: ChunkPublisher, chunk_map: ChunkMapStore, db: Database) -> Self {
        Self {
            publisher,
            chunk_map,
            db,
        }
    }

    /// Publish a fully chunked file.
    ///
    /// Mappings for the resource are deleted first so the map never points
    /// at coordinates from a previous version of the document. Chunks go
    /// out in window order; the file-done marker follows the last chunk.
    pub async fn emit_file(
        &self,
        meta: &ChunkMetadata,
        chunks: Vec<TextChunk>,
    ) -> Result<(), AppError> {
        self.chunk_map
            .delete_mappings_for_file(meta.user_id, meta.platform, &meta.resource_id)
            .await?;

        let chunk_count = chunks.len();
        for mut chunk in chunks {
            let short_key = self
                .chunk_map
                .add_mapping(
                    meta.user_id,
                    meta.platform,
                    &chunk.metadata.chunk_id,
                    &meta.resource_id,
                    meta.service,
                )
                .await?;
            chunk.metadata.chunk_id = short_key;
            self.publisher.publish(&chunk).await?;
        }

        self.publisher.publish_file_done(meta).await?;

        self.db
            .upsert_processing_status(meta.user_id, &meta.resource_id, meta.platform.as_str(), true)
            .await?;

        metrics::counter!("crawler_files_emitted_total", "service" => meta.service.as_str())
            .increment(1);
        metrics::counter!("crawler_chunks_emitted_total", "service" => meta.service.as_str())
            .increment(chunk_count as u64);

        tracing::info!(
            user_id = %meta.user_id,
            resource_id = %meta.resource_id,
            chunks = chunk_count,
            "File emitted"
        );

        Ok(())
    }

    /// A resource was removed upstream: drop its mappings so retrieval can
    /// never resolve into stale coordinates.
    pub async fn handle_deleted(
        &self,
        user_id: Uuid,
        platform: Platform,
        resource_id: &str,
    ) -> Result<(), AppError> {
        self.chunk_map
            .delete_mappings_for_file(user_id, platform, resource_id)
            .await?;
        tracing::info!(
            user_id = %user_id,
            resource_id = resource_id,
            "Upstream deletion applied"
        );
        Ok(())
    }

    /// Publish the `<crawl_done>` marker for (user, platform).
    pub async fn emit_crawl_done(&self, meta: &ChunkMetadata) -> Result<(), AppError> {
        self.publisher.publish_crawl_done(meta).await
    }
}
