//! Chunk-ID map store: per-(user, platform) MongoDB documents mapping
//! compact short keys back to full coordinate chunk IDs.
//!
//! Vector-store metadata carries only the short key. That keeps the indexed
//! payload small and lets the internal chunk-ID format change without
//! rewriting the vector index.
//!
//! The document store is eventually consistent for this collection: every
//! write is followed by a read-back verification and retried until the
//! written state is visible.

use crate::models::{ChunkMapping, ChunkMappingDocument, Platform, Service};
use crate::services::keyed_lock::KeyedMutex;
use chrono::Utc;
use mongodb::{bson::doc, Client as MongoClient, Collection, Database as MongoDatabase};
use service_core::error::AppError;
use std::sync::Arc;
use std::time::Duration;
use tracing::instrument;
use uuid::Uuid;

const MAX_ATTEMPTS: u32 = 3;
const RETRY_BASE: Duration = Duration::from_millis(100);

#[derive(Clone)]
pub struct ChunkMapStore {
    client: MongoClient,
    db: MongoDatabase,
    locks: Arc<KeyedMutex>,
}

impl ChunkMapStore {
    pub async fn connect(uri: &str, database: &str) -> Result<Self, AppError> {
        tracing::info!(uri = %uri, "Connecting to MongoDB");
        let client = MongoClient::with_uri_str(uri).await.map_err(|e| {
            tracing::error!("Failed to connect to MongoDB at {}: {}", uri, e);
            AppError::from(e)
        })?;
        let db = client.database(database);
        tracing::info!(database = %database, "Successfully connected to MongoDB database");
        Ok(Self {
            client,
            db,
            locks: Arc::new(KeyedMutex::new()),
        })
    }

    pub async fn health_check(&self) -> Result<(), AppError> {
        self.client
            .database("admin")
            .run_command(doc! { "ping": 1 }, None)
            .await
            .map_err(|e| {
                tracing::error!("MongoDB health check failed: {}", e);
                AppError::from(e)
            })?;
        Ok(())
    }

    fn collection(&self) -> Collection<ChunkMappingDocument> {
        self.db.collection("chunk_ids")
    }

    /// Generate a short key, append the mapping to the per-(user, platform)
    /// document under optimistic concurrency, and verify the write landed.
    ///
    /// Returns the short key to stamp into the outgoing chunk metadata.
    #[instrument(skip(self, chunk_id), fields(user_id = %user_id, platform = %platform, resource_id = resource_id))]
    pub async fn add_mapping(
        &self,
        user_id: Uuid,
        platform: Platform,
        chunk_id: &str,
        resource_id: &str,
        service: Service,
    ) -> Result<String, AppError> {
        let doc_id = ChunkMappingDocument::document_id(&user_id, platform.as_str());
        let short_key = generate_short_key(&user_id, service);
        let mapping = ChunkMapping {
            short_key: short_key.clone(),
            chunk_id: chunk_id.to_string(),
            service: service.as_str().to_string(),
            resource_id: resource_id.to_string(),
            created_at: Utc::now(),
            last_used: Utc::now(),
        };

        let mut last_err: Option<AppError> = None;
        for attempt in 1..=MAX_ATTEMPTS {
            match self.append_mapping(&doc_id, &mapping).await {
                Ok(()) => {
                    if self.verify_present(&doc_id, &short_key, resource_id).await? {
                        metrics::counter!("crawler_chunk_mappings_added_total").increment(1);
                        return Ok(short_key);
                    }
                    last_err = Some(AppError::DatabaseError(anyhow::anyhow!(
                        "mapping write not visible on read-back"
                    )));
                }
                Err(e) => last_err = Some(e),
            }

            tracing::warn!(
                attempt = attempt,
                doc_id = %doc_id,
                "Chunk mapping write did not verify, retrying"
            );
            metrics::counter!("crawler_chunk_map_retries_total", "operation" => "add")
                .increment(1);
            tokio::time::sleep(RETRY_BASE * attempt).await;
        }

        Err(last_err.unwrap_or_else(|| {
            AppError::DatabaseError(anyhow::anyhow!("chunk mapping write failed"))
        }))
    }

    /// Remove every mapping for the resource, verifying none survive.
    /// A missing document counts as success: there is nothing to delete.
    #[instrument(skip(self), fields(user_id = %user_id, platform = %platform, resource_id = resource_id))]
    pub async fn delete_mappings_for_file(
        &self,
        user_id: Uuid,
        platform: Platform,
        resource_id: &str,
    ) -> Result<(), AppError> {
        let doc_id = ChunkMappingDocument::document_id(&user_id, platform.as_str());

        let mut last_err: Option<AppError> = None;
        for attempt in 1..=MAX_ATTEMPTS {
            match self.remove_resource(&doc_id, resource_id).await {
                Ok(()) => {
                    if self.verify_absent(&doc_id, resource_id).await? {
                        return Ok(());
                    }
                    last_err = Some(AppError::DatabaseError(anyhow::anyhow!(
                        "mapping delete not visible on read-back"
                    )));
                }
                Err(e) => last_err = Some(e),
            }

            tracing::warn!(
                attempt = attempt,
                doc_id = %doc_id,
                "Chunk mapping delete did not verify, retrying"
            );
            metrics::counter!("crawler_chunk_map_retries_total", "operation" => "delete")
                .increment(1);
            tokio::time::sleep(RETRY_BASE * attempt).await;
        }

        Err(last_err.unwrap_or_else(|| {
            AppError::DatabaseError(anyhow::anyhow!("chunk mapping delete failed"))
        }))
    }

    /// Load the whole mapping document for (user, platform).
    pub async fn get_document(
        &self,
        user_id: Uuid,
        platform: Platform,
    ) -> Result<Option<ChunkMappingDocument>, AppError> {
        let doc_id = ChunkMappingDocument::document_id(&user_id, platform.as_str());
        Ok(self.collection().find_one(doc! { "_id": &doc_id }, None).await?)
    }

    /// Resolve a short key back to its stored mapping, refreshing its
    /// `last_used` stamp on the way out (best effort).
    pub async fn resolve_short_key(
        &self,
        user_id: Uuid,
        platform: Platform,
        short_key: &str,
    ) -> Result<Option<ChunkMapping>, AppError> {
        let document = self.get_document(user_id, platform).await?;
        let Some(document) = document else {
            return Ok(None);
        };
        let Some(mapping) = document.find_short_key(short_key).cloned() else {
            return Ok(None);
        };

        let touch = self
            .collection()
            .update_one(
                doc! { "_id": &document.id, "chunkMappings.shortKey": short_key },
                doc! { "$set": { "chunkMappings.$.lastUsed": Utc::now().to_rfc3339() } },
                None,
            )
            .await;
        if let Err(e) = touch {
            tracing::debug!(error = %e, short_key = short_key, "Failed to touch last_used");
        }

        Ok(Some(mapping))
    }

    /// Drop the whole mapping document for (user, platform).
    pub async fn delete_document(
        &self,
        user_id: Uuid,
        platform: Platform,
    ) -> Result<(), AppError> {
        let doc_id = ChunkMappingDocument::document_id(&user_id, platform.as_str());
        let _guard = self.locks.lock(&doc_id).await;
        self.collection()
            .delete_one(doc! { "_id": &doc_id }, None)
            .await?;
        Ok(())
    }

    /// One optimistic-concurrency append pass: read the document, append,
    /// rewrite guarded by the version that was read.
    async fn append_mapping(
        &self,
        doc_id: &str,
        mapping: &ChunkMapping,
    ) -> Result<(), AppError> {
        let _guard = self.locks.lock(doc_id).await;
        let collection = self.collection();

        match collection.find_one(doc! { "_id": doc_id }, None).await? {
            None => {
                let document = ChunkMappingDocument {
                    id: doc_id.to_string(),
                    chunk_mappings: vec![mapping.clone()],
                    version: 1,
                    updated_at: Utc::now(),
                };
                // A concurrent insert loses the race with a duplicate-key
                // error; the caller's retry loop re-reads and appends.
                collection.insert_one(&document, None).await?;
                Ok(())
            }
            Some(mut document) => {
                let read_version = document.version;
                document.chunk_mappings.push(mapping.clone());
                document.version += 1;
                document.updated_at = Utc::now();

                let result = collection
                    .replace_one(
                        doc! { "_id": doc_id, "version": read_version },
                        &document,
                        None,
                    )
                    .await?;
                if result.modified_count == 0 {
                    return Err(AppError::DatabaseError(anyhow::anyhow!(
                        "version conflict rewriting chunk mapping document"
                    )));
                }
                Ok(())
            }
        }
    }

    /// One optimistic-concurrency delete pass for a resource's mappings.
    async fn remove_resource(&self, doc_id: &str, resource_id: &str) -> Result<(), AppError> {
        let _guard = self.locks.lock(doc_id).await;
        let collection = self.collection();

        match collection.find_one(doc! { "_id": doc_id }, None).await? {
            // Nothing stored for this user/platform: idempotent success.
            None => Ok(()),
            Some(mut document) => {
                let before = document.chunk_mappings.len();
                document
                    .chunk_mappings
                    .retain(|m| m.resource_id != resource_id);
                if document.chunk_mappings.len() == before {
                    return Ok(());
                }

                let read_version = document.version;
                document.version += 1;
                document.updated_at = Utc::now();

                let result = collection
                    .replace_one(
                        doc! { "_id": doc_id, "version": read_version },
                        &document,
                        None,
                    )
                    .await?;
                if result.modified_count == 0 {
                    return Err(AppError::DatabaseError(anyhow::anyhow!(
                        "version conflict rewriting chunk mapping document"
                    )));
                }
                Ok(())
            }
        }
    }

    async fn verify_present(
        &self,
        doc_id: &str,
        short_key: &str,
        resource_id: &str,
    ) -> Result<bool, AppError> {
        let document = self.collection().find_one(doc! { "_id": doc_id }, None).await?;
        Ok(document
            .map(|d| d.contains(short_key, resource_id))
            .unwrap_or(false))
    }

    async fn verify_absent(&self, doc_id: &str, resource_id: &str) -> Result<bool, AppError> {
        let document = self.collection().find_one(doc! { "_id": doc_id }, None).await?;
        Ok(document
            .map(|d| !d.chunk_mappings.iter().any(|m| m.resource_id == resource_id))
            .unwrap_or(true))
    }
}

/// Short keys are `{user}_{service}_{hex nanos}`: unique within a document
/// (nanosecond stamps under the per-document lock) and cheap to index.
fn generate_short_key(user_id: &Uuid, service: Service) -> String {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    format!("{}_{}_{:x}", user_id, service.as_str(), nanos)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_keys_are_unique_and_prefixed() {
        let user = Uuid::new_v4();
        let mut keys = std::collections::HashSet::new();
        for _ in 0..100 {
            let key = generate_short_key(&user, Service::Notion);
            assert!(key.starts_with(&format!("{}_NOTION_", user)));
            // Spin until the clock ticks so consecutive stamps differ.
            std::thread::sleep(std::time::Duration::from_nanos(1));
            assert!(keys.insert(key));
        }
    }
}
