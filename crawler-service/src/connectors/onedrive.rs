//! OneDrive connector: Graph delta sync over Office documents.
//!
//! One walk serves both modes: the initial crawl starts from the root
//! delta URL, incremental passes resume from the stored `@odata.deltaLink`.
//! `nextLink` pages are followed without touching the stored cursor, so an
//! interrupted walk resumes from the previous cursor instead of a
//! half-advanced one.

use crate::chunking::office::OfficeChunker;
use crate::chunking::Chunker;
use crate::connectors::http::error_for_status;
use crate::connectors::{extract_office_words, is_fatal, Connector, ConnectorContext, CrawlOutcome};
use crate::models::{ChunkMetadata, FileEntry, Platform, Service};
use crate::services::GovernedApi;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::StreamExt;
use serde::Deserialize;
use service_core::error::AppError;
use uuid::Uuid;

const GRAPH_API: &str = "https://graph.microsoft.com/v1.0";
const PAGE_SIZE: usize = 1000;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DriveItem {
    id: String,
    #[serde(default)]
    name: String,
    file: Option<FileFacet>,
    /// Non-null when the item was deleted since the last delta call.
    deleted: Option<serde_json::Value>,
    parent_reference: Option<ParentReference>,
    web_url: Option<String>,
    created_date_time: Option<DateTime<Utc>>,
    last_modified_date_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileFacet {
    mime_type: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ParentReference {
    /// OneDrive path, e.g. `/drive/root:/Documents/Reports`.
    path: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DeltaPage {
    #[serde(default, rename = "value")]
    items: Vec<DriveItem>,
    #[serde(rename = "@odata.nextLink")]
    next_link: Option<String>,
    #[serde(rename = "@odata.deltaLink")]
    delta_link: Option<String>,
}

/// Turn a Graph parent path plus item name into the logical folder path.
fn logical_path(parent: Option<&ParentReference>, name: &str) -> String {
    let folder = parent
        .and_then(|p| p.path.as_deref())
        .and_then(|path| path.split_once(':').map(|(_, rest)| rest))
        .unwrap_or("");
    format!("{}/{}", folder, name)
}

fn to_entry(item: &DriveItem) -> FileEntry {
    FileEntry {
        resource_id: item.id.clone(),
        name: item.name.clone(),
        mime_type: item
            .file
            .as_ref()
            .and_then(|f| f.mime_type.clone())
            .unwrap_or_default(),
        url: item.web_url.clone().unwrap_or_default(),
        path: logical_path(item.parent_reference.as_ref(), &item.name),
        date_created: item.created_date_time,
        date_last_modified: item.last_modified_date_time,
        exists: item.deleted.is_none(),
    }
}

pub struct OneDriveConnector;

impl OneDriveConnector {
    async fn delta_page(&self, ctx: &ConnectorContext, url: &str) -> Result<DeltaPage, AppError> {
        ctx.ensure_live()?;
        ctx.governor
            .wait(
                GovernedApi::MicrosoftDrive,
                &ctx.user_id.to_string(),
                &ctx.cancel,
            )
            .await?;

        let response = ctx.http.get(url).send().await?;
        let response = error_for_status(response, "graph.drive.delta").await?;
        response
            .json()
            .await
            .map_err(|e| AppError::Transport(anyhow::anyhow!("Undecodable delta page: {}", e)))
    }

    async fn download(&self, ctx: &ConnectorContext, item_id: &str) -> Result<Vec<u8>, AppError> {
        ctx.ensure_live()?;
        ctx.governor
            .wait(
                GovernedApi::MicrosoftDrive,
                &ctx.user_id.to_string(),
                &ctx.cancel,
            )
            .await?;

        let response = ctx
            .http
            .get(format!("{}/me/drive/items/{}/content", GRAPH_API, item_id))
            .send()
            .await?;
        let response = error_for_status(response, "graph.drive.content").await?;
        Ok(response.bytes().await?.to_vec())
    }

    /// Download to scratch space, extract the word list, clean up.
    async fn fetch_words(
        &self,
        ctx: &ConnectorContext,
        item_id: &str,
        mime_type: &str,
    ) -> Result<Vec<String>, AppError> {
        let bytes = self.download(ctx, item_id).await?;

        tokio::fs::create_dir_all(&ctx.temp_dir).await?;
        let temp_file = ctx.temp_dir.join(format!("{}_{}", item_id, Uuid::new_v4()));
        tokio::fs::write(&temp_file, &bytes).await?;

        let result = extract_office_words(&temp_file, mime_type).await;

        let _ = tokio::fs::remove_file(&temp_file).await;
        result
    }

    /// Fetch, chunk and emit one Office document.
    async fn process_item(&self, ctx: &ConnectorContext, entry: &FileEntry) -> Result<(), AppError> {
        let words = self
            .fetch_words(ctx, &entry.resource_id, &entry.mime_type)
            .await?;

        let meta = ChunkMetadata {
            user_id: ctx.user_id,
            platform: Platform::Microsoft,
            service: Service::MicrosoftDrive,
            resource_id: entry.resource_id.clone(),
            resource_type: entry.mime_type.clone(),
            title: entry.name.clone(),
            file_url: entry.url.clone(),
            file_path: entry.path.clone(),
            date_created: entry.date_created,
            date_last_modified: entry.date_last_modified,
            chunk_id: String::new(),
        };

        let chunks = OfficeChunker.chunk(&words, &meta);
        ctx.emitter.emit_file(&meta, chunks).await
    }

    /// Walk the delta feed from `start_url` until the terminal page.
    async fn walk(&self, ctx: &ConnectorContext, start_url: String) -> Result<CrawlOutcome, AppError> {
        let mut file_errors = Vec::new();
        let mut url = start_url.clone();
        let mut delta_link = None;

        loop {
            ctx.ensure_live()?;
            let page = self.delta_page(ctx, &url).await?;

            // Deletions first so a same-page re-add cannot race its cleanup.
            let mut entries = Vec::new();
            for item in &page.items {
                if item.deleted.is_some() {
                    ctx.emitter
                        .handle_deleted(ctx.user_id, Platform::Microsoft, &item.id)
                        .await?;
                    continue;
                }
                let entry = to_entry(item);
                if crate::extract::is_supported_office_mime(&entry.mime_type) {
                    entries.push(entry);
                }
            }

            let results: Vec<(String, Result<(), AppError>)> =
                futures::stream::iter(entries.iter().cloned())
                    .map(|entry| async move {
                        let outcome = self.process_item(ctx, &entry).await;
                        (entry.resource_id.clone(), outcome)
                    })
                    .buffer_unordered(ctx.fetch_workers.max(1))
                    .collect()
                    .await;

            for (id, outcome) in results {
                if let Err(e) = outcome {
                    if is_fatal(&e) {
                        return Err(e);
                    }
                    tracing::warn!(
                        user_id = %ctx.user_id,
                        resource_id = %id,
                        error = %e,
                        "Skipping drive item after processing error"
                    );
                    file_errors.push(format!("{}: {}", id, e));
                }
            }

            if let Some(next) = page.next_link {
                url = next;
            } else {
                // Only the terminal page carries the next cursor.
                delta_link = page.delta_link;
                break;
            }
        }

        let token = delta_link.unwrap_or(start_url);
        Ok(CrawlOutcome {
            token,
            file_errors,
        })
    }
}

#[async_trait]
impl Connector for OneDriveConnector {
    fn service(&self) -> Service {
        Service::MicrosoftDrive
    }

    async fn initial(&self, ctx: &ConnectorContext) -> Result<CrawlOutcome, AppError> {
        let start = format!("{}/me/drive/root/delta?$top={}", GRAPH_API, PAGE_SIZE);
        self.walk(ctx, start).await
    }

    async fn incremental(
        &self,
        ctx: &ConnectorContext,
        cursor: &str,
    ) -> Result<CrawlOutcome, AppError> {
        self.walk(ctx, cursor.to_string()).await
    }

    async fn retrieve_chunk(
        &self,
        ctx: &ConnectorContext,
        resource_id: &str,
        chunk_id: &str,
    ) -> Result<String, AppError> {
        ctx.governor
            .wait(
                GovernedApi::MicrosoftDrive,
                &ctx.user_id.to_string(),
                &ctx.cancel,
            )
            .await?;
        let response = ctx
            .http
            .get(format!("{}/me/drive/items/{}", GRAPH_API, resource_id))
            .query(&[("$select", "id,name,file")])
            .send()
            .await?;
        let response = error_for_status(response, "graph.drive.item").await?;
        let item: DriveItem = response
            .json()
            .await
            .map_err(|e| AppError::Transport(anyhow::anyhow!("Undecodable drive item: {}", e)))?;

        let mime_type = item
            .file
            .as_ref()
            .and_then(|f| f.mime_type.clone())
            .unwrap_or_default();
        let words = self.fetch_words(ctx, resource_id, &mime_type).await?;
        OfficeChunker.extract(&words, chunk_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delta_page_deserializes_odata_links() {
        let raw = serde_json::json!({
            "value": [
                {
                    "id": "item-1",
                    "name": "report.docx",
                    "file": { "mimeType": "application/vnd.openxmlformats-officedocument.wordprocessingml.document" },
                    "parentReference": { "path": "/drive/root:/Documents" },
                    "webUrl": "https://contoso-my.sharepoint.com/item-1",
                    "createdDateTime": "2024-01-05T10:00:00Z",
                    "lastModifiedDateTime": "2024-02-01T12:00:00Z"
                },
                { "id": "item-2", "name": "gone.pptx", "deleted": {} }
            ],
            "@odata.deltaLink": "https://graph.microsoft.com/v1.0/me/drive/root/delta?token=abc"
        });
        let page: DeltaPage = serde_json::from_value(raw).unwrap();
        assert_eq!(page.items.len(), 2);
        assert!(page.next_link.is_none());
        assert!(page.delta_link.as_deref().unwrap().contains("token=abc"));
        assert!(page.items[1].deleted.is_some());

        let entry = to_entry(&page.items[0]);
        assert_eq!(entry.path, "/Documents/report.docx");
        assert!(entry.exists);
        assert!(crate::extract::is_supported_office_mime(&entry.mime_type));
    }

    #[test]
    fn root_items_have_plain_paths() {
        let item = DriveItem {
            id: "item-3".to_string(),
            name: "notes.docx".to_string(),
            file: None,
            deleted: None,
            parent_reference: Some(ParentReference {
                path: Some("/drive/root:".to_string()),
            }),
            web_url: None,
            created_date_time: None,
            last_modified_date_time: None,
        };
        assert_eq!(to_entry(&item).path, "/notes.docx");
    }
}
