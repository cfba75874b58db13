//! Per-service connectors.
//!
//! Each connector implements the same three operations (initial listing,
//! incremental changes from a cursor, single-chunk retrieval) so the
//! orchestrator stays connector-agnostic. Connectors share bearer-client
//! construction, rate-governor admission and the chunk emission pipeline.

pub mod emit;
pub mod gmail;
pub mod google_docs;
pub mod google_drive;
pub mod google_slides;
pub mod http;
pub mod notion;
pub mod onedrive;

pub use emit::Emitter;

use crate::models::Service;
use crate::services::RateGovernor;
use async_trait::async_trait;
use service_core::error::AppError;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Everything a connector run needs: identity, credentials, shared
/// infrastructure handles and the cancellation token it must honor at
/// every request boundary.
#[derive(Clone)]
pub struct ConnectorContext {
    pub user_id: Uuid,
    pub access_token: String,
    pub http: reqwest::Client,
    pub governor: Arc<RateGovernor>,
    pub emitter: Emitter,
    pub cancel: CancellationToken,
    /// Concurrent per-item fetchers inside Gmail/OneDrive crawls.
    pub fetch_workers: usize,
    /// Scratch directory for downloads that need extraction.
    pub temp_dir: PathBuf,
}

impl ConnectorContext {
    /// Bail out promptly between pages and items when cancelled.
    pub fn ensure_live(&self) -> Result<(), AppError> {
        if self.cancel.is_cancelled() {
            return Err(AppError::Cancelled);
        }
        Ok(())
    }
}

/// What a completed crawl pass hands back to the orchestrator.
#[derive(Debug, Clone)]
pub struct CrawlOutcome {
    /// Retrieval token to store for the next incremental pass.
    pub token: String,
    /// Per-file failures that were logged and skipped. The crawl itself
    /// succeeded; these surface in the partial-failure report.
    pub file_errors: Vec<String>,
}

/// Whether a per-file error may be skipped, or must abort the whole pass.
pub(crate) fn is_fatal(err: &AppError) -> bool {
    matches!(err, AppError::Cancelled | AppError::AuthInvalid(_))
}

/// The three-operation strategy every service implements.
#[async_trait]
pub trait Connector: Send + Sync {
    fn service(&self) -> Service;

    /// Full listing + processing of everything visible to the user.
    async fn initial(&self, ctx: &ConnectorContext) -> Result<CrawlOutcome, AppError>;

    /// Process changes since `cursor`, returning the replacement cursor.
    async fn incremental(
        &self,
        ctx: &ConnectorContext,
        cursor: &str,
    ) -> Result<CrawlOutcome, AppError>;

    /// Re-fetch one document and slice out the chunk a previously issued
    /// coordinate chunk ID describes.
    async fn retrieve_chunk(
        &self,
        ctx: &ConnectorContext,
        resource_id: &str,
        chunk_id: &str,
    ) -> Result<String, AppError>;
}

/// Read a downloaded Office file and extract its word list by MIME type.
/// Legacy binary formats fail extraction and are skipped per-file.
pub(crate) async fn extract_office_words(
    path: &std::path::Path,
    mime_type: &str,
) -> Result<Vec<String>, AppError> {
    let bytes = tokio::fs::read(path).await?;
    if crate::extract::is_word_mime(mime_type) {
        crate::extract::docx_words(&bytes)
    } else {
        crate::extract::pptx_words(&bytes)
    }
}

/// Resolve the connector for a service.
pub fn connector_for(service: Service) -> Arc<dyn Connector> {
    match service {
        Service::GoogleDrive => Arc::new(google_drive::GoogleDriveConnector),
        Service::GoogleGmail => Arc::new(gmail::GmailConnector),
        Service::MicrosoftDrive => Arc::new(onedrive::OneDriveConnector),
        Service::Notion => Arc::new(notion::NotionConnector),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_service_resolves_to_its_connector() {
        for service in [
            Service::GoogleDrive,
            Service::GoogleGmail,
            Service::MicrosoftDrive,
            Service::Notion,
        ] {
            assert_eq!(connector_for(service).service(), service);
        }
    }

    #[tokio::test]
    async fn office_extraction_routes_by_mime() {
        use docx_rs::{Docx, Paragraph, Run};

        let mut buf = std::io::Cursor::new(Vec::new());
        Docx::new()
            .add_paragraph(Paragraph::new().add_run(Run::new().add_text("alpha beta")))
            .build()
            .pack(&mut buf)
            .unwrap();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("doc.docx");
        tokio::fs::write(&path, buf.into_inner()).await.unwrap();

        let words = extract_office_words(&path, crate::extract::DOCX_MIME)
            .await
            .unwrap();
        assert_eq!(words, vec!["alpha", "beta"]);

        // A Word file routed through the presentation extractor finds no
        // slide parts and yields nothing, but must not error.
        let as_pptx = extract_office_words(&path, crate::extract::PPTX_MIME)
            .await
            .unwrap();
        assert!(as_pptx.is_empty());
    }
}
