//! Google Slides presentation fetch + chunking.
//!
//! Drive discovers presentations and routes them here. Words carry their
//! slide index and in-slide offset so windows can span deck boundaries.

use crate::chunking::slides::{position_slides, SlideWord, SlidesChunker};
use crate::chunking::Chunker;
use crate::connectors::http::error_for_status;
use crate::connectors::ConnectorContext;
use crate::models::{ChunkMetadata, FileEntry, Platform, Service, TextChunk};
use crate::services::GovernedApi;
use serde::Deserialize;
use service_core::error::AppError;

const SLIDES_API: &str = "https://slides.googleapis.com/v1/presentations";

pub const GOOGLE_SLIDES_MIME: &str = "application/vnd.google-apps.presentation";

#[derive(Debug, Deserialize)]
struct Presentation {
    #[serde(default)]
    slides: Vec<Slide>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Slide {
    #[serde(default)]
    page_elements: Vec<PageElement>,
}

#[derive(Debug, Deserialize)]
struct PageElement {
    shape: Option<Shape>,
}

#[derive(Debug, Deserialize)]
struct Shape {
    text: Option<TextContent>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TextContent {
    #[serde(default)]
    text_elements: Vec<TextElement>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TextElement {
    text_run: Option<TextRun>,
}

#[derive(Debug, Deserialize)]
struct TextRun {
    #[serde(default)]
    content: String,
}

/// One text string per slide, shapes and runs in presentation order.
fn slide_texts(presentation: &Presentation) -> Vec<String> {
    presentation
        .slides
        .iter()
        .map(|slide| {
            slide
                .page_elements
                .iter()
                .filter_map(|e| e.shape.as_ref())
                .filter_map(|s| s.text.as_ref())
                .flat_map(|t| t.text_elements.iter())
                .filter_map(|e| e.text_run.as_ref())
                .map(|run| run.content.as_str())
                .collect::<Vec<_>>()
                .join(" ")
        })
        .collect()
}

/// Fetch the presentation and rebuild its positioned word stream.
pub async fn fetch_words(
    ctx: &ConnectorContext,
    presentation_id: &str,
) -> Result<Vec<SlideWord>, AppError> {
    ctx.ensure_live()?;
    ctx.governor
        .wait(GovernedApi::Slides, &ctx.user_id.to_string(), &ctx.cancel)
        .await?;

    let response = ctx
        .http
        .get(format!("{}/{}", SLIDES_API, presentation_id))
        .send()
        .await?;
    let response = error_for_status(response, "slides.presentations.get").await?;
    let presentation: Presentation = response
        .json()
        .await
        .map_err(|e| AppError::Transport(anyhow::anyhow!("Undecodable presentation: {}", e)))?;

    Ok(position_slides(&slide_texts(&presentation)))
}

/// Fetch, chunk and build the emission-ready chunk list for one deck.
pub async fn process(
    ctx: &ConnectorContext,
    file: &FileEntry,
) -> Result<(ChunkMetadata, Vec<TextChunk>), AppError> {
    let words = fetch_words(ctx, &file.resource_id).await?;
    let meta = metadata_for(ctx, file);
    let chunks = SlidesChunker.chunk(&words, &meta);
    Ok((meta, chunks))
}

/// Re-fetch the presentation and slice by a coordinate chunk ID.
pub async fn retrieve(
    ctx: &ConnectorContext,
    presentation_id: &str,
    chunk_id: &str,
) -> Result<String, AppError> {
    let words = fetch_words(ctx, presentation_id).await?;
    SlidesChunker.extract(&words, chunk_id)
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slide_text_walks_shapes_in_order() {
        let raw = serde_json::json!({
            "slides": [
                { "pageElements": [
                    { "shape": { "text": { "textElements": [
                        { "textRun": { "content": "Roadmap" } },
                        { "paragraphMarker": {} },
                        { "textRun": { "content": "2024" } }
                    ]}}},
                    { "line": {} }
                ]},
                { "pageElements": [
                    { "shape": { "text": { "textElements": [
                        { "textRun": { "content": "Ship it" } }
                    ]}}}
                ]}
            ]
        });
        let presentation: Presentation = serde_json::from_value(raw).unwrap();
        assert_eq!(
            slide_texts(&presentation),
            vec!["Roadmap 2024".to_string(), "Ship it".to_string()]
        );
    }

    #[test]
    fn empty_deck_has_no_slides() {
        let presentation: Presentation = serde_json::from_value(serde_json::json!({})).unwrap();
        assert!(slide_texts(&presentation).is_empty());
    }
}
