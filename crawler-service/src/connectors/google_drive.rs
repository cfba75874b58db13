//! Google Drive connector: discovery and change tracking for Docs and
//! Slides documents.
//!
//! Drive owns the listing, the change feed and the folder-path
//! reconstruction; the per-type fetch/chunk/retrieve work is routed to the
//! Docs and Slides modules based on MIME type.

use crate::chunking::coords::{DocsCoords, SlidesCoords};
use crate::connectors::http::error_for_status;
use crate::connectors::{
    google_docs, google_slides, is_fatal, Connector, ConnectorContext, CrawlOutcome,
};
use crate::models::{FileEntry, Platform, Service};
use crate::services::GovernedApi;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use service_core::error::AppError;
use std::collections::HashMap;

const DRIVE_API: &str = "https://www.googleapis.com/drive/v3";
const PAGE_SIZE: usize = 1000;
const MAX_FOLDER_DEPTH: usize = 20;

const FILE_FIELDS: &str = "id,name,mimeType,parents,webViewLink,createdTime,modifiedTime,trashed";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DriveFile {
    id: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    mime_type: String,
    #[serde(default)]
    parents: Vec<String>,
    web_view_link: Option<String>,
    created_time: Option<DateTime<Utc>>,
    modified_time: Option<DateTime<Utc>>,
    #[serde(default)]
    trashed: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileList {
    #[serde(default)]
    files: Vec<DriveFile>,
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StartPageToken {
    start_page_token: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChangeList {
    #[serde(default)]
    changes: Vec<Change>,
    next_page_token: Option<String>,
    new_start_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Change {
    file_id: Option<String>,
    #[serde(default)]
    removed: bool,
    file: Option<DriveFile>,
}

/// Folder-chain resolver with a per-crawl cache: one `files.get` per
/// unseen folder, shared by every file under it.
struct PathResolver {
    cache: HashMap<String, (String, Option<String>)>,
}

impl PathResolver {
    fn new() -> Self {
        Self {
            cache: HashMap::new(),
        }
    }

    async fn folder_path(
        &mut self,
        ctx: &ConnectorContext,
        folder_id: &str,
    ) -> Result<String, AppError> {
        let mut segments = Vec::new();
        let mut current = Some(folder_id.to_string());

        for _ in 0..MAX_FOLDER_DEPTH {
            let Some(id) = current else { break };
            let (name, parent) = match self.cache.get(&id) {
                Some(entry) => entry.clone(),
                None => {
                    let entry = self.fetch_folder(ctx, &id).await?;
                    self.cache.insert(id.clone(), entry.clone());
                    entry
                }
            };
            // "My Drive" root reports no parent and is not part of the path.
            if parent.is_none() && name.is_empty() {
                break;
            }
            segments.push(name);
            current = parent;
        }

        segments.reverse();
        Ok(segments
            .into_iter()
            .map(|s| format!("/{}", s))
            .collect::<String>())
    }

    async fn fetch_folder(
        &self,
        ctx: &ConnectorContext,
        folder_id: &str,
    ) -> Result<(String, Option<String>), AppError> {
        ctx.governor
            .wait(GovernedApi::Drive, &ctx.user_id.to_string(), &ctx.cancel)
            .await?;

        let response = ctx
            .http
            .get(format!("{}/files/{}", DRIVE_API, folder_id))
            .query(&[("fields", "id,name,parents")])
            .send()
            .await?;

        match error_for_status(response, "drive.files.get").await {
            Ok(response) => {
                let folder: DriveFile = response.json().await.map_err(|e| {
                    AppError::Transport(anyhow::anyhow!("Undecodable folder: {}", e))
                })?;
                Ok((folder.name, folder.parents.first().cloned()))
            }
            // Shared items can have unreadable ancestors; root the path there.
            Err(AppError::NotFound(_)) => Ok((String::new(), None)),
            Err(e) => Err(e),
        }
    }
}

pub struct GoogleDriveConnector;

impl GoogleDriveConnector {
    async fn list_page(
        &self,
        ctx: &ConnectorContext,
        page_token: Option<&str>,
    ) -> Result<FileList, AppError> {
        ctx.governor
            .wait(GovernedApi::Drive, &ctx.user_id.to_string(), &ctx.cancel)
            .await?;

        let query = format!(
            "(mimeType='{}' or mimeType='{}') and trashed=false",
            google_docs::GOOGLE_DOC_MIME,
            google_slides::GOOGLE_SLIDES_MIME
        );
        let fields = format!("nextPageToken,files({})", FILE_FIELDS);

        let mut request = ctx
            .http
            .get(format!("{}/files", DRIVE_API))
            .query(&[
                ("pageSize", PAGE_SIZE.to_string().as_str()),
                ("q", query.as_str()),
                ("fields", fields.as_str()),
            ]);
        if let Some(token) = page_token {
            request = request.query(&[("pageToken", token)]);
        }

        let response = error_for_status(request.send().await?, "drive.files.list").await?;
        response
            .json()
            .await
            .map_err(|e| AppError::Transport(anyhow::anyhow!("Undecodable file list: {}", e)))
    }

    async fn changes_page(
        &self,
        ctx: &ConnectorContext,
        page_token: &str,
    ) -> Result<ChangeList, AppError> {
        ctx.governor
            .wait(GovernedApi::Drive, &ctx.user_id.to_string(), &ctx.cancel)
            .await?;

        let fields = format!(
            "nextPageToken,newStartPageToken,changes(fileId,removed,file({}))",
            FILE_FIELDS
        );
        let response = ctx
            .http
            .get(format!("{}/changes", DRIVE_API))
            .query(&[
                ("pageToken", page_token),
                ("pageSize", PAGE_SIZE.to_string().as_str()),
                ("fields", fields.as_str()),
            ])
            .send()
            .await?;

        let response = error_for_status(response, "drive.changes.list").await?;
        response
            .json()
            .await
            .map_err(|e| AppError::Transport(anyhow::anyhow!("Undecodable change list: {}", e)))
    }

    async fn start_page_token(&self, ctx: &ConnectorContext) -> Result<String, AppError> {
        ctx.governor
            .wait(GovernedApi::Drive, &ctx.user_id.to_string(), &ctx.cancel)
            .await?;

        let response = ctx
            .http
            .get(format!("{}/changes/startPageToken", DRIVE_API))
            .send()
            .await?;
        let response = error_for_status(response, "drive.changes.getStartPageToken").await?;
        let token: StartPageToken = response
            .json()
            .await
            .map_err(|e| AppError::Transport(anyhow::anyhow!("Undecodable token: {}", e)))?;
        Ok(token.start_page_token)
    }

    async fn to_entry(
        &self,
        ctx: &ConnectorContext,
        resolver: &mut PathResolver,
        file: &DriveFile,
    ) -> Result<FileEntry, AppError> {
        let folder = match file.parents.first() {
            Some(parent) => resolver.folder_path(ctx, parent).await?,
            None => String::new(),
        };
        Ok(FileEntry {
            resource_id: file.id.clone(),
            name: file.name.clone(),
            mime_type: file.mime_type.clone(),
            url: file.web_view_link.clone().unwrap_or_default(),
            path: format!("{}/{}", folder, file.name),
            date_created: file.created_time,
            date_last_modified: file.modified_time,
            exists: !file.trashed,
        })
    }

    /// Fetch, chunk and emit one document, routed by MIME type.
    async fn process_file(
        &self,
        ctx: &ConnectorContext,
        entry: &FileEntry,
    ) -> Result<(), AppError> {
        let (meta, chunks) = if entry.mime_type == google_docs::GOOGLE_DOC_MIME {
            google_docs::process(ctx, entry).await?
        } else if entry.mime_type == google_slides::GOOGLE_SLIDES_MIME {
            google_slides::process(ctx, entry).await?
        } else {
            // files.list is already MIME-filtered; changes.list is not.
            return Ok(());
        };
        ctx.emitter.emit_file(&meta, chunks).await
    }
}

#[async_trait]
impl Connector for GoogleDriveConnector {
    fn service(&self) -> Service {
        Service::GoogleDrive
    }

    async fn initial(&self, ctx: &ConnectorContext) -> Result<CrawlOutcome, AppError> {
        let mut resolver = PathResolver::new();
        let mut file_errors = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            ctx.ensure_live()?;
            let page = self.list_page(ctx, page_token.as_deref()).await?;

            for file in &page.files {
                ctx.ensure_live()?;
                let entry = self.to_entry(ctx, &mut resolver, file).await?;
                if let Err(e) = self.process_file(ctx, &entry).await {
                    if is_fatal(&e) {
                        return Err(e);
                    }
                    tracing::warn!(
                        user_id = %ctx.user_id,
                        resource_id = %entry.resource_id,
                        error = %e,
                        "Skipping file after processing error"
                    );
                    file_errors.push(format!("{}: {}", entry.resource_id, e));
                }
            }

            match page.next_page_token {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        let token = self.start_page_token(ctx).await?;
        Ok(CrawlOutcome {
            token,
            file_errors,
        })
    }

    async fn incremental(
        &self,
        ctx: &ConnectorContext,
        cursor: &str,
    ) -> Result<CrawlOutcome, AppError> {
        let mut resolver = PathResolver::new();
        let mut file_errors = Vec::new();
        let mut page_token = cursor.to_string();

        let new_cursor = loop {
            ctx.ensure_live()?;
            let page = self.changes_page(ctx, &page_token).await?;

            for change in &page.changes {
                ctx.ensure_live()?;
                let trashed = change.file.as_ref().map(|f| f.trashed).unwrap_or(false);

                if change.removed || trashed {
                    let Some(resource_id) = change
                        .file_id
                        .clone()
                        .or_else(|| change.file.as_ref().map(|f| f.id.clone()))
                    else {
                        continue;
                    };
                    let entry = FileEntry::deleted(resource_id);
                    ctx.emitter
                        .handle_deleted(ctx.user_id, Platform::Google, &entry.resource_id)
                        .await?;
                    continue;
                }

                let Some(file) = change.file.as_ref() else {
                    continue;
                };
                let entry = self.to_entry(ctx, &mut resolver, file).await?;
                if let Err(e) = self.process_file(ctx, &entry).await {
                    if is_fatal(&e) {
                        return Err(e);
                    }
                    tracing::warn!(
                        user_id = %ctx.user_id,
                        resource_id = %entry.resource_id,
                        error = %e,
                        "Skipping changed file after processing error"
                    );
                    file_errors.push(format!("{}: {}", entry.resource_id, e));
                }
            }

            match (page.next_page_token, page.new_start_page_token) {
                (Some(next), _) => page_token = next,
                // Terminal page: the feed hands back the next start token.
                (None, Some(new_start)) => break new_start,
                (None, None) => break cursor.to_string(),
            }
        };

        Ok(CrawlOutcome {
            token: new_cursor,
            file_errors,
        })
    }

    async fn retrieve_chunk(
        &self,
        ctx: &ConnectorContext,
        resource_id: &str,
        chunk_id: &str,
    ) -> Result<String, AppError> {
        if DocsCoords::parse(chunk_id).is_ok() {
            return google_docs::retrieve(ctx, resource_id, chunk_id).await;
        }
        if SlidesCoords::parse(chunk_id).is_ok() {
            return google_slides::retrieve(ctx, resource_id, chunk_id).await;
        }
        Err(AppError::Malformed(anyhow::anyhow!(
            "unrecognized drive chunk id: {}",
            chunk_id
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn change_feed_models_deserialize() {
        let raw = serde_json::json!({
            "newStartPageToken": "3044",
            "changes": [
                { "fileId": "gone-1", "removed": true },
                { "fileId": "doc-1", "removed": false, "file": {
                    "id": "doc-1",
                    "name": "Plan",
                    "mimeType": "application/vnd.google-apps.document",
                    "parents": ["folder-1"],
                    "webViewLink": "https://docs.google.com/document/d/doc-1",
                    "createdTime": "2024-01-10T08:00:00Z",
                    "modifiedTime": "2024-02-01T09:30:00Z",
                    "trashed": false
                }},
                { "fileId": "deck-1", "file": {
                    "id": "deck-1",
                    "name": "Old deck",
                    "mimeType": "application/vnd.google-apps.presentation",
                    "trashed": true
                }}
            ]
        });
        let list: ChangeList = serde_json::from_value(raw).unwrap();
        assert_eq!(list.new_start_page_token.as_deref(), Some("3044"));
        assert_eq!(list.changes.len(), 3);
        assert!(list.changes[0].removed);
        assert!(!list.changes[1].removed);
        assert!(list.changes[2].file.as_ref().unwrap().trashed);
    }

    #[test]
    fn file_list_models_deserialize() {
        let raw = serde_json::json!({
            "nextPageToken": "page-2",
            "files": [{
                "id": "doc-1",
                "name": "Notes",
                "mimeType": "application/vnd.google-apps.document"
            }]
        });
        let list: FileList = serde_json::from_value(raw).unwrap();
        assert_eq!(list.next_page_token.as_deref(), Some("page-2"));
        assert_eq!(list.files[0].name, "Notes");
        assert!(list.files[0].parents.is_empty());
    }
}
