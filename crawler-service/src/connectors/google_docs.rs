//! Google Docs document fetch + chunking.
//!
//! Not listed directly: Drive discovers the documents and routes them here
//! for fetch, extraction, chunking and retrieval.

use crate::chunking::docs::{position_paragraphs, DocWord, DocsChunker};
use crate::chunking::Chunker;
use crate::connectors::http::error_for_status;
use crate::connectors::ConnectorContext;
use crate::models::{ChunkMetadata, FileEntry, Platform, Service, TextChunk};
use crate::services::GovernedApi;
use serde::Deserialize;
use service_core::error::AppError;

const DOCS_API: &str = "https://docs.googleapis.com/v1/documents";

pub const GOOGLE_DOC_MIME: &str = "application/vnd.google-apps.document";

#[derive(Debug, Deserialize)]
struct Document {
    #[serde(default)]
    title: String,
    body: Option<Body>,
}

#[derive(Debug, Deserialize)]
struct Body {
    #[serde(default)]
    content: Vec<StructuralElement>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StructuralElement {
    paragraph: Option<Paragraph>,
}

#[derive(Debug, Deserialize)]
struct Paragraph {
    #[serde(default)]
    elements: Vec<ParagraphElement>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ParagraphElement {
    text_run: Option<TextRun>,
}

#[derive(Debug, Deserialize)]
struct TextRun {
    #[serde(default)]
    content: String,
}

/// Paragraph texts in body order. Every paragraph element occupies an
/// index, including empty ones, so indices are stable across re-fetches.
fn paragraph_texts(document: &Document) -> Vec<String> {
    document
        .body
        .as_ref()
        .map(|body| {
            body.content
                .iter()
                .filter_map(|element| element.paragraph.as_ref())
                .map(|paragraph| {
                    paragraph
                        .elements
                        .iter()
                        .filter_map(|e| e.text_run.as_ref())
                        .map(|run| run.content.as_str())
                        .collect::<String>()
                })
                .collect()
        })
        .unwrap_or_default()
}

/// Fetch the document and rebuild its positioned word stream.
pub async fn fetch_words(
    ctx: &ConnectorContext,
    document_id: &str,
) -> Result<Vec<DocWord>, AppError> {
    ctx.ensure_live()?;
    ctx.governor
        .wait(GovernedApi::Docs, &ctx.user_id.to_string(), &ctx.cancel)
        .await?;

    let response = ctx
        .http
        .get(format!("{}/{}", DOCS_API, document_id))
        .send()
        .await?;
    let response = error_for_status(response, "docs.documents.get").await?;
    let document: Document = response
        .json()
        .await
        .map_err(|e| AppError::Transport(anyhow::anyhow!("Undecodable document: {}", e)))?;

    Ok(position_paragraphs(&paragraph_texts(&document)))
}

/// Fetch, chunk and build the emission-ready chunk list for one document.
pub async fn process(
    ctx: &ConnectorContext,
    file: &FileEntry,
) -> Result<(ChunkMetadata, Vec<TextChunk>), AppError> {
    let words = fetch_words(ctx, &file.resource_id).await?;
    let meta = metadata_for(ctx, file);
    let chunks = DocsChunker.chunk(&words, &meta);
    Ok((meta, chunks))
}

/// Re-fetch the document and slice by a coordinate chunk ID.
pub async fn retrieve(
    ctx: &ConnectorContext,
    document_id: &str,
    chunk_id: &str,
) -> Result<String, AppError> {
    let words = fetch_words(ctx, document_id).await?;
    DocsChunker.extract(&words, chunk_id)
}

fn metadata_for(ctx: &ConnectorContext, file: &FileEntry) -> ChunkMetadata {
    ChunkMetadata {
        user_id: ctx.user_id,
        platform: Platform::Google,
        service: Service::GoogleDrive,
        resource_id: file.resource_id.clone(),
        resource_type: file.mime_type.clone(),
        title: file.name.clone(),
        file_url: file.url.clone(),
        file_path: file.path.clone(),
        date_created: file.date_created,
        date_last_modified: file.date_last_modified,
        chunk_id: String::new(),
    }
}
