//! Notion connector: workspace search, page/database materialization and
//! word-window chunking over block streams.
//!
//! Pages become a synthetic `{pageId}_properties` block followed by their
//! content blocks. Databases become `{dbId}_title` / `{dbId}_description`
//! blocks followed by one `{dbId}_row_{n}` block per row. Every block kind
//! is reduced to the same plain-text projection before chunking.

use crate::chunking::notion::{position_blocks, NotionChunker, TextBlock};
use crate::chunking::Chunker;
use crate::connectors::http::error_for_status;
use crate::connectors::{is_fatal, Connector, ConnectorContext, CrawlOutcome};
use crate::models::{ChunkMetadata, Platform, Service};
use crate::services::GovernedApi;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;
use service_core::error::AppError;

const NOTION_API: &str = "https://api.notion.com/v1";
const NOTION_VERSION: &str = "2022-06-28";
const PAGE_SIZE: usize = 100;

/// Block kinds that carry a `rich_text` payload worth indexing.
const RICH_TEXT_KINDS: &[&str] = &[
    "paragraph",
    "heading_1",
    "heading_2",
    "heading_3",
    "bulleted_list_item",
    "numbered_list_item",
    "to_do",
    "toggle",
    "quote",
    "callout",
    "code",
];

#[derive(Debug, Deserialize)]
struct Cursored {
    #[serde(default)]
    results: Vec<Value>,
    next_cursor: Option<String>,
    #[serde(default)]
    has_more: bool,
}

/// Concatenate the `plain_text` of a rich-text array.
fn rich_text_to_string(value: &Value) -> String {
    value
        .as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(|item| item.get("plain_text").and_then(Value::as_str))
                .collect::<Vec<_>>()
                .join("")
        })
        .unwrap_or_default()
}

/// Render one property value by its declared type. Unrenderable types
/// (files, relations, rollups) yield nothing.
fn property_value_text(value: &Value) -> Option<String> {
    let kind = value.get("type")?.as_str()?;
    match kind {
        "title" | "rich_text" => {
            let text = rich_text_to_string(value.get(kind)?);
            (!text.is_empty()).then_some(text)
        }
        "number" => value
            .get("number")?
            .as_f64()
            .map(|n| format!("{:.2}", n)),
        "select" => value
            .get("select")?
            .get("name")?
            .as_str()
            .map(|s| s.to_string()),
        "multi_select" => {
            let names: Vec<&str> = value
                .get("multi_select")?
                .as_array()?
                .iter()
                .filter_map(|o| o.get("name").and_then(Value::as_str))
                .collect();
            (!names.is_empty()).then(|| names.join(", "))
        }
        "date" => {
            let date = value.get("date")?;
            let start = date.get("start").and_then(Value::as_str)?;
            match date.get("end").and_then(Value::as_str) {
                Some(end) => Some(format!("{} to {}", start, end)),
                None => Some(start.to_string()),
            }
        }
        "checkbox" => value.get("checkbox")?.as_bool().map(|b| b.to_string()),
        _ => None,
    }
}

/// Materialize a properties object into `name: value` lines.
fn properties_text(properties: &Value) -> String {
    let Some(map) = properties.as_object() else {
        return String::new();
    };
    map.iter()
        .filter_map(|(name, value)| {
            property_value_text(value).map(|text| format!("{}: {}", name, text))
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Title of a page: the single property whose type is `title`.
fn page_title(properties: &Value) -> String {
    properties
        .as_object()
        .and_then(|map| {
            map.values()
                .find(|v| v.get("type").and_then(Value::as_str) == Some("title"))
        })
        .map(|v| rich_text_to_string(v.get("title").unwrap_or(&Value::Null)))
        .unwrap_or_default()
}

/// Project one block onto (id, plain text). Blocks without a rich-text
/// payload are skipped; their IDs never appear in chunk coordinates.
fn project_block(block: &Value) -> Option<TextBlock> {
    let id = block.get("id")?.as_str()?;
    let kind = block.get("type")?.as_str()?;
    if !RICH_TEXT_KINDS.contains(&kind) {
        return None;
    }
    let text = rich_text_to_string(block.get(kind)?.get("rich_text")?);
    Some(TextBlock::new(id, text))
}

fn last_edited(value: &Value) -> Option<DateTime<Utc>> {
    value
        .get("last_edited_time")
        .and_then(Value::as_str)
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc))
}

fn created(value: &Value) -> Option<DateTime<Utc>> {
    value
        .get("created_time")
        .and_then(Value::as_str)
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc))
}

fn object_id(value: &Value) -> Option<&str> {
    value.get("id").and_then(Value::as_str)
}

pub struct NotionConnector;

impl NotionConnector {
    async fn post_json(
        &self,
        ctx: &ConnectorContext,
        url: String,
        body: Value,
        context: &str,
    ) -> Result<Cursored, AppError> {
        ctx.ensure_live()?;
        ctx.governor
            .wait(GovernedApi::Notion, &ctx.user_id.to_string(), &ctx.cancel)
            .await?;

        let response = ctx
            .http
            .post(url)
            .header("Notion-Version", NOTION_VERSION)
            .json(&body)
            .send()
            .await?;
        let response = error_for_status(response, context).await?;
        response
            .json()
            .await
            .map_err(|e| AppError::Transport(anyhow::anyhow!("Undecodable {}: {}", context, e)))
    }

    async fn get_json(
        &self,
        ctx: &ConnectorContext,
        url: String,
        query: &[(&str, String)],
        context: &str,
    ) -> Result<Value, AppError> {
        ctx.ensure_live()?;
        ctx.governor
            .wait(GovernedApi::Notion, &ctx.user_id.to_string(), &ctx.cancel)
            .await?;

        let response = ctx
            .http
            .get(url)
            .header("Notion-Version", NOTION_VERSION)
            .query(query)
            .send()
            .await?;
        let response = error_for_status(response, context).await?;
        response
            .json()
            .await
            .map_err(|e| AppError::Transport(anyhow::anyhow!("Undecodable {}: {}", context, e)))
    }

    async fn search_page(
        &self,
        ctx: &ConnectorContext,
        start_cursor: Option<&str>,
    ) -> Result<Cursored, AppError> {
        let mut body = serde_json::json!({
            "sort": { "direction": "ascending", "timestamp": "last_edited_time" },
            "page_size": PAGE_SIZE,
        });
        if let Some(cursor) = start_cursor {
            body["start_cursor"] = Value::String(cursor.to_string());
        }
        self.post_json(ctx, format!("{}/search", NOTION_API), body, "notion.search")
            .await
    }

    /// All content blocks of a page, in reading order.
    async fn fetch_blocks(
        &self,
        ctx: &ConnectorContext,
        page_id: &str,
    ) -> Result<Vec<TextBlock>, AppError> {
        let mut blocks = Vec::new();
        let mut cursor: Option<String> = None;

        loop {
            let mut query = vec![("page_size", PAGE_SIZE.to_string())];
            if let Some(c) = &cursor {
                query.push(("start_cursor", c.clone()));
            }
            let page: Cursored = serde_json::from_value(
                self.get_json(
                    ctx,
                    format!("{}/blocks/{}/children", NOTION_API, page_id),
                    &query,
                    "notion.blocks.children",
                )
                .await?,
            )
            .map_err(|e| AppError::Transport(anyhow::anyhow!("Undecodable blocks: {}", e)))?;

            blocks.extend(page.results.iter().filter_map(project_block));

            if page.has_more {
                cursor = page.next_cursor;
            } else {
                break;
            }
        }

        Ok(blocks)
    }

    /// Block stream for a page: synthetic properties block first.
    async fn page_blocks(
        &self,
        ctx: &ConnectorContext,
        page: &Value,
    ) -> Result<Vec<TextBlock>, AppError> {
        let page_id = object_id(page)
            .ok_or_else(|| AppError::Malformed(anyhow::anyhow!("page without id")))?;
        let properties = page.get("properties").cloned().unwrap_or(Value::Null);

        let mut blocks = vec![TextBlock::new(
            format!("{}_properties", page_id),
            properties_text(&properties),
        )];
        blocks.extend(self.fetch_blocks(ctx, page_id).await?);
        Ok(blocks)
    }

    /// Block stream for a database: synthetic title/description blocks,
    /// then one block per row.
    async fn database_blocks(
        &self,
        ctx: &ConnectorContext,
        database: &Value,
    ) -> Result<Vec<TextBlock>, AppError> {
        let db_id = object_id(database)
            .ok_or_else(|| AppError::Malformed(anyhow::anyhow!("database without id")))?;

        let title = rich_text_to_string(database.get("title").unwrap_or(&Value::Null));
        let description =
            rich_text_to_string(database.get("description").unwrap_or(&Value::Null));

        let mut blocks = vec![
            TextBlock::new(format!("{}_title", db_id), title),
            TextBlock::new(format!("{}_description", db_id), description),
        ];

        let mut row_index = 0;
        let mut cursor: Option<String> = None;
        loop {
            let mut body = serde_json::json!({ "page_size": PAGE_SIZE });
            if let Some(c) = &cursor {
                body["start_cursor"] = Value::String(c.clone());
            }
            let page = self
                .post_json(
                    ctx,
                    format!("{}/databases/{}/query", NOTION_API, db_id),
                    body,
                    "notion.databases.query",
                )
                .await?;

            for row in &page.results {
                let properties = row.get("properties").cloned().unwrap_or(Value::Null);
                blocks.push(TextBlock::new(
                    format!("{}_row_{}", db_id, row_index),
                    properties_text(&properties),
                ));
                row_index += 1;
            }

            if page.has_more {
                cursor = page.next_cursor;
            } else {
                break;
            }
        }

        Ok(blocks)
    }

    fn metadata_for(
        &self,
        ctx: &ConnectorContext,
        object: &Value,
        resource_type: &str,
        title: String,
    ) -> Result<ChunkMetadata, AppError> {
        let id = object_id(object)
            .ok_or_else(|| AppError::Malformed(anyhow::anyhow!("object without id")))?;
        Ok(ChunkMetadata {
            user_id: ctx.user_id,
            platform: Platform::Notion,
            service: Service::Notion,
            resource_id: id.to_string(),
            resource_type: resource_type.to_string(),
            title: title.clone(),
            file_url: object
                .get("url")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            file_path: title,
            date_created: created(object),
            date_last_modified: last_edited(object),
            chunk_id: String::new(),
        })
    }

    /// Materialize, chunk and emit one search result.
    async fn process_result(&self, ctx: &ConnectorContext, result: &Value) -> Result<(), AppError> {
        let object = result.get("object").and_then(Value::as_str).unwrap_or("");
        let (meta, blocks) = match object {
            "page" => {
                let properties = result.get("properties").cloned().unwrap_or(Value::Null);
                let meta = self.metadata_for(ctx, result, "page", page_title(&properties))?;
                (meta, self.page_blocks(ctx, result).await?)
            }
            "database" => {
                let title = rich_text_to_string(result.get("title").unwrap_or(&Value::Null));
                let meta = self.metadata_for(ctx, result, "database", title)?;
                (meta, self.database_blocks(ctx, result).await?)
            }
            _ => return Ok(()),
        };

        let document = position_blocks(&blocks);
        let chunks = NotionChunker.chunk(&document, &meta);
        ctx.emitter.emit_file(&meta, chunks).await
    }

    async fn crawl(
        &self,
        ctx: &ConnectorContext,
        watermark: Option<DateTime<Utc>>,
    ) -> Result<CrawlOutcome, AppError> {
        let mut file_errors = Vec::new();
        let mut newest = watermark;
        let mut cursor: Option<String> = None;

        loop {
            ctx.ensure_live()?;
            let page = self.search_page(ctx, cursor.as_deref()).await?;

            for result in &page.results {
                ctx.ensure_live()?;
                let edited = last_edited(result);

                // Incremental passes skip anything at or before the stored
                // watermark; search is sorted ascending by edit time.
                if let (Some(watermark), Some(edited)) = (watermark, edited) {
                    if edited <= watermark {
                        continue;
                    }
                }

                if let Err(e) = self.process_result(ctx, result).await {
                    if is_fatal(&e) {
                        return Err(e);
                    }
                    let id = object_id(result).unwrap_or("unknown");
                    tracing::warn!(
                        user_id = %ctx.user_id,
                        resource_id = id,
                        error = %e,
                        "Skipping Notion object after processing error"
                    );
                    file_errors.push(format!("{}: {}", id, e));
                }

                if let Some(edited) = edited {
                    newest = Some(newest.map_or(edited, |n| n.max(edited)));
                }
            }

            if page.has_more {
                cursor = page.next_cursor;
            } else {
                break;
            }
        }

        let token = newest.map(|n| n.to_rfc3339()).unwrap_or_default();
        Ok(CrawlOutcome {
            token,
            file_errors,
        })
    }
}

#[async_trait]
impl Connector for NotionConnector {
    fn service(&self) -> Service {
        Service::Notion
    }

    async fn initial(&self, ctx: &ConnectorContext) -> Result<CrawlOutcome, AppError> {
        self.crawl(ctx, None).await
    }

    async fn incremental(
        &self,
        ctx: &ConnectorContext,
        cursor: &str,
    ) -> Result<CrawlOutcome, AppError> {
        // An empty cursor means the first crawl saw an empty workspace.
        if cursor.is_empty() {
            return self.crawl(ctx, None).await;
        }
        let watermark = DateTime::parse_from_rfc3339(cursor)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|_| {
                AppError::Malformed(anyhow::anyhow!("invalid notion cursor: {}", cursor))
            })?;
        self.crawl(ctx, Some(watermark)).await
    }

    async fn retrieve_chunk(
        &self,
        ctx: &ConnectorContext,
        resource_id: &str,
        chunk_id: &str,
    ) -> Result<String, AppError> {
        // Pages and databases share the ID space; try the page surface
        // first and fall back to the database surface on 404.
        let blocks = match self
            .get_json(
                ctx,
                format!("{}/pages/{}", NOTION_API, resource_id),
                &[],
                "notion.pages.get",
            )
            .await
        {
            Ok(page) => self.page_blocks(ctx, &page).await?,
            Err(AppError::NotFound(_)) => {
                let database = self
                    .get_json(
                        ctx,
                        format!("{}/databases/{}", NOTION_API, resource_id),
                        &[],
                        "notion.databases.get",
                    )
                    .await?;
                self.database_blocks(ctx, &database).await?
            }
            Err(e) => return Err(e),
        };

        let document = position_blocks(&blocks);
        NotionChunker.extract(&document, chunk_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn title_prop(text: &str) -> Value {
        serde_json::json!({
            "type": "title",
            "title": [ { "plain_text": text } ]
        })
    }

    #[test]
    fn property_rendering_is_type_aware() {
        assert_eq!(
            property_value_text(&title_prop("Alpha")).as_deref(),
            Some("Alpha")
        );
        assert_eq!(
            property_value_text(&serde_json::json!({
                "type": "rich_text",
                "rich_text": [ { "plain_text": "a " }, { "plain_text": "b" } ]
            }))
            .as_deref(),
            Some("a b")
        );
        assert_eq!(
            property_value_text(&serde_json::json!({ "type": "number", "number": 3.14159 }))
                .as_deref(),
            Some("3.14")
        );
        assert_eq!(
            property_value_text(&serde_json::json!({
                "type": "select", "select": { "name": "In progress" }
            }))
            .as_deref(),
            Some("In progress")
        );
        assert_eq!(
            property_value_text(&serde_json::json!({
                "type": "multi_select",
                "multi_select": [ { "name": "a" }, { "name": "b" } ]
            }))
            .as_deref(),
            Some("a, b")
        );
        assert_eq!(
            property_value_text(&serde_json::json!({
                "type": "date", "date": { "start": "2024-01-01" }
            }))
            .as_deref(),
            Some("2024-01-01")
        );
        assert_eq!(
            property_value_text(&serde_json::json!({
                "type": "date", "date": { "start": "2024-01-01", "end": "2024-01-05" }
            }))
            .as_deref(),
            Some("2024-01-01 to 2024-01-05")
        );
        assert_eq!(
            property_value_text(&serde_json::json!({ "type": "checkbox", "checkbox": true }))
                .as_deref(),
            Some("true")
        );
        assert_eq!(
            property_value_text(&serde_json::json!({ "type": "relation", "relation": [] })),
            None
        );
    }

    #[test]
    fn properties_become_name_value_lines() {
        let properties = serde_json::json!({
            "Name": title_prop("Alpha"),
            "Done": { "type": "checkbox", "checkbox": false }
        });
        let text = properties_text(&properties);
        assert!(text.contains("Name: Alpha"));
        assert!(text.contains("Done: false"));
        assert_eq!(page_title(&properties), "Alpha");
    }

    #[test]
    fn blocks_project_to_plain_text() {
        let block = serde_json::json!({
            "id": "b1",
            "type": "paragraph",
            "paragraph": { "rich_text": [ { "plain_text": "X Y Z" } ] }
        });
        assert_eq!(
            project_block(&block),
            Some(TextBlock::new("b1", "X Y Z"))
        );

        let divider = serde_json::json!({ "id": "b2", "type": "divider", "divider": {} });
        assert_eq!(project_block(&divider), None);

        let heading = serde_json::json!({
            "id": "b3",
            "type": "heading_2",
            "heading_2": { "rich_text": [ { "plain_text": "Section" } ] }
        });
        assert_eq!(
            project_block(&heading),
            Some(TextBlock::new("b3", "Section"))
        );
    }

    #[test]
    fn watermark_parsing_matches_emitted_tokens() {
        let now = Utc::now();
        let token = now.to_rfc3339();
        let parsed = DateTime::parse_from_rfc3339(&token)
            .unwrap()
            .with_timezone(&Utc);
        assert_eq!(parsed.timestamp(), now.timestamp());
    }
}
