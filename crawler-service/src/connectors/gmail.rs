//! Gmail connector: message listing, history-based incremental sync and
//! rune-window chunking of decoded bodies.

use crate::chunking::gmail::GmailChunker;
use crate::chunking::Chunker;
use crate::connectors::http::error_for_status;
use crate::connectors::{is_fatal, Connector, ConnectorContext, CrawlOutcome};
use crate::models::{ChunkMetadata, Platform, Service};
use crate::services::GovernedApi;
use async_trait::async_trait;
use base64::Engine;
use chrono::{DateTime, Utc};
use futures::StreamExt;
use serde::Deserialize;
use service_core::error::AppError;

const GMAIL_API: &str = "https://gmail.googleapis.com/gmail/v1/users/me";
const PAGE_SIZE: usize = 1000;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MessageList {
    #[serde(default)]
    messages: Vec<MessageRef>,
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MessageRef {
    id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Message {
    id: String,
    #[serde(default)]
    history_id: String,
    internal_date: Option<String>,
    payload: Option<MessagePart>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MessagePart {
    #[serde(default)]
    mime_type: String,
    #[serde(default)]
    headers: Vec<Header>,
    body: Option<PartBody>,
    #[serde(default)]
    parts: Vec<MessagePart>,
}

#[derive(Debug, Deserialize)]
struct Header {
    name: String,
    value: String,
}

#[derive(Debug, Deserialize)]
struct PartBody {
    data: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct HistoryList {
    #[serde(default)]
    history: Vec<HistoryRecord>,
    next_page_token: Option<String>,
    history_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct HistoryRecord {
    #[serde(default)]
    id: String,
    #[serde(default)]
    messages_added: Vec<MessageAdded>,
}

#[derive(Debug, Deserialize)]
struct MessageAdded {
    message: MessageRef,
}

/// Decode a base64url body segment. Gmail pads inconsistently, so both
/// alphabet variants are tried.
fn decode_body_data(data: &str) -> Option<String> {
    let bytes = base64::engine::general_purpose::URL_SAFE
        .decode(data)
        .or_else(|_| base64::engine::general_purpose::URL_SAFE_NO_PAD.decode(data))
        .ok()?;
    String::from_utf8(bytes).ok()
}

/// Depth-first search for a body part of the wanted MIME type.
fn find_part<'a>(part: &'a MessagePart, mime: &str) -> Option<&'a str> {
    if part.mime_type == mime {
        if let Some(data) = part.body.as_ref().and_then(|b| b.data.as_deref()) {
            return Some(data);
        }
    }
    part.parts.iter().find_map(|p| find_part(p, mime))
}

/// Pull the plain-text body out of a message: the text/plain part when
/// present, otherwise the text/html part with tags stripped.
fn extract_body(message: &Message) -> Option<String> {
    let payload = message.payload.as_ref()?;

    if let Some(data) = find_part(payload, "text/plain") {
        return decode_body_data(data);
    }
    if let Some(data) = find_part(payload, "text/html") {
        return decode_body_data(data).map(|html| strip_html(&html));
    }
    // Single-part messages carry the body directly on the payload.
    payload
        .body
        .as_ref()
        .and_then(|b| b.data.as_deref())
        .and_then(decode_body_data)
}

/// Minimal tag stripper for html-only messages. Content fidelity beyond
/// plain text is out of scope; this only keeps the visible text runs.
fn strip_html(html: &str) -> String {
    let mut out = String::with_capacity(html.len());
    let mut in_tag = false;
    for c in html.chars() {
        match c {
            '<' => in_tag = true,
            '>' => in_tag = false,
            c if !in_tag => out.push(c),
            _ => {}
        }
    }
    out.replace("&nbsp;", " ")
        .replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
}

fn header_value<'a>(message: &'a Message, name: &str) -> Option<&'a str> {
    message
        .payload
        .as_ref()?
        .headers
        .iter()
        .find(|h| h.name.eq_ignore_ascii_case(name))
        .map(|h| h.value.as_str())
}

fn internal_date(message: &Message) -> Option<DateTime<Utc>> {
    let millis: i64 = message.internal_date.as_deref()?.parse().ok()?;
    DateTime::from_timestamp_millis(millis)
}

pub struct GmailConnector;

impl GmailConnector {
    async fn list_page(
        &self,
        ctx: &ConnectorContext,
        page_token: Option<&str>,
    ) -> Result<MessageList, AppError> {
        ctx.governor
            .wait(GovernedApi::Gmail, &ctx.user_id.to_string(), &ctx.cancel)
            .await?;

        let mut request = ctx
            .http
            .get(format!("{}/messages", GMAIL_API))
            .query(&[("maxResults", PAGE_SIZE.to_string().as_str())]);
        if let Some(token) = page_token {
            request = request.query(&[("pageToken", token)]);
        }

        let response = error_for_status(request.send().await?, "gmail.messages.list").await?;
        response
            .json()
            .await
            .map_err(|e| AppError::Transport(anyhow::anyhow!("Undecodable message list: {}", e)))
    }

    async fn fetch_message(
        &self,
        ctx: &ConnectorContext,
        message_id: &str,
    ) -> Result<Message, AppError> {
        ctx.ensure_live()?;
        ctx.governor
            .wait(GovernedApi::Gmail, &ctx.user_id.to_string(), &ctx.cancel)
            .await?;

        let response = ctx
            .http
            .get(format!("{}/messages/{}", GMAIL_API, message_id))
            .query(&[("format", "full")])
            .send()
            .await?;
        let response = error_for_status(response, "gmail.messages.get").await?;
        response
            .json()
            .await
            .map_err(|e| AppError::Transport(anyhow::anyhow!("Undecodable message: {}", e)))
    }

    /// Fetch, chunk and emit one message. Returns its history ID for the
    /// cursor high-water mark.
    async fn process_message(
        &self,
        ctx: &ConnectorContext,
        message_id: &str,
    ) -> Result<u64, AppError> {
        let message = self.fetch_message(ctx, message_id).await?;
        let history_id = message.history_id.parse().unwrap_or(0);

        let Some(body) = extract_body(&message) else {
            tracing::debug!(message_id = message_id, "Message has no text body");
            return Ok(history_id);
        };

        let subject = header_value(&message, "Subject").unwrap_or("(no subject)");
        let meta = ChunkMetadata {
            user_id: ctx.user_id,
            platform: Platform::Google,
            service: Service::GoogleGmail,
            resource_id: message.id.clone(),
            resource_type: "message".to_string(),
            title: subject.to_string(),
            file_url: format!("https://mail.google.com/mail/u/0/#all/{}", message.id),
            file_path: subject.to_string(),
            date_created: internal_date(&message),
            date_last_modified: internal_date(&message),
            chunk_id: String::new(),
        };

        let chunks = GmailChunker.chunk(&body, &meta);
        ctx.emitter.emit_file(&meta, chunks).await?;
        Ok(history_id)
    }

    /// Fetch and process a batch of messages with the configured worker
    /// pool. Returns the highest history ID seen plus per-message errors.
    async fn process_batch(
        &self,
        ctx: &ConnectorContext,
        ids: Vec<String>,
    ) -> Result<(u64, Vec<String>), AppError> {
        let results: Vec<(String, Result<u64, AppError>)> = futures::stream::iter(ids)
            .map(|id| async move {
                let outcome = self.process_message(ctx, &id).await;
                (id, outcome)
            })
            .buffer_unordered(ctx.fetch_workers.max(1))
            .collect()
            .await;

        let mut max_history = 0;
        let mut errors = Vec::new();
        for (id, outcome) in results {
            match outcome {
                Ok(history_id) => max_history = max_history.max(history_id),
                Err(e) if is_fatal(&e) => return Err(e),
                Err(e) => {
                    tracing::warn!(
                        user_id = %ctx.user_id,
                        message_id = %id,
                        error = %e,
                        "Skipping message after processing error"
                    );
                    errors.push(format!("{}: {}", id, e));
                }
            }
        }
        Ok((max_history, errors))
    }

    async fn history_page(
        &self,
        ctx: &ConnectorContext,
        start_history_id: &str,
        page_token: Option<&str>,
    ) -> Result<HistoryList, AppError> {
        ctx.governor
            .wait(GovernedApi::Gmail, &ctx.user_id.to_string(), &ctx.cancel)
            .await?;

        let mut request = ctx
            .http
            .get(format!("{}/history", GMAIL_API))
            .query(&[
                ("startHistoryId", start_history_id),
                ("maxResults", PAGE_SIZE.to_string().as_str()),
            ]);
        if let Some(token) = page_token {
            request = request.query(&[("pageToken", token)]);
        }

        let response = error_for_status(request.send().await?, "gmail.history.list").await?;
        response
            .json()
            .await
            .map_err(|e| AppError::Transport(anyhow::anyhow!("Undecodable history list: {}", e)))
    }
}

#[async_trait]
impl Connector for GmailConnector {
    fn service(&self) -> Service {
        Service::GoogleGmail
    }

    async fn initial(&self, ctx: &ConnectorContext) -> Result<CrawlOutcome, AppError> {
        let mut file_errors = Vec::new();
        let mut max_history: u64 = 0;
        let mut page_token: Option<String> = None;

        loop {
            ctx.ensure_live()?;
            let page = self.list_page(ctx, page_token.as_deref()).await?;
            let ids: Vec<String> = page.messages.iter().map(|m| m.id.clone()).collect();

            let (batch_max, batch_errors) = self.process_batch(ctx, ids).await?;
            max_history = max_history.max(batch_max);
            file_errors.extend(batch_errors);

            match page.next_page_token {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        Ok(CrawlOutcome {
            token: max_history.to_string(),
            file_errors,
        })
    }

    async fn incremental(
        &self,
        ctx: &ConnectorContext,
        cursor: &str,
    ) -> Result<CrawlOutcome, AppError> {
        let mut file_errors = Vec::new();
        let mut max_history: u64 = cursor.parse().unwrap_or(0);
        let mut page_token: Option<String> = None;

        loop {
            ctx.ensure_live()?;
            let page = match self.history_page(ctx, cursor, page_token.as_deref()).await {
                Ok(page) => page,
                // An expired or unknown history ID comes back as 404: the
                // only safe recovery is a full listing.
                Err(AppError::NotFound(_)) => {
                    tracing::info!(
                        user_id = %ctx.user_id,
                        "History cursor expired, falling back to full listing"
                    );
                    return self.initial(ctx).await;
                }
                Err(e) => return Err(e),
            };

            if let Some(history_id) = page.history_id.as_deref() {
                max_history = max_history.max(history_id.parse().unwrap_or(0));
            }

            let mut ids = Vec::new();
            let mut seen = std::collections::HashSet::new();
            for record in &page.history {
                max_history = max_history.max(record.id.parse().unwrap_or(0));
                for added in &record.messages_added {
                    if seen.insert(added.message.id.clone()) {
                        ids.push(added.message.id.clone());
                    }
                }
            }

            let (batch_max, batch_errors) = self.process_batch(ctx, ids).await?;
            max_history = max_history.max(batch_max);
            file_errors.extend(batch_errors);

            match page.next_page_token {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        Ok(CrawlOutcome {
            token: max_history.to_string(),
            file_errors,
        })
    }

    async fn retrieve_chunk(
        &self,
        ctx: &ConnectorContext,
        resource_id: &str,
        chunk_id: &str,
    ) -> Result<String, AppError> {
        let message = self.fetch_message(ctx, resource_id).await?;
        let body = extract_body(&message).ok_or_else(|| {
            AppError::NotFound(anyhow::anyhow!("message {} has no text body", resource_id))
        })?;
        GmailChunker.extract(&body, chunk_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn b64(text: &str) -> String {
        base64::engine::general_purpose::URL_SAFE.encode(text)
    }

    fn message_json(body_b64: &str, mime: &str) -> Message {
        serde_json::from_value(serde_json::json!({
            "id": "msg-1",
            "historyId": "48211",
            "internalDate": "1706788800000",
            "payload": {
                "mimeType": "multipart/alternative",
                "headers": [
                    { "name": "Subject", "value": "Quarterly sync" },
                    { "name": "From", "value": "a@example.com" }
                ],
                "parts": [
                    { "mimeType": mime, "body": { "data": body_b64 } }
                ]
            }
        }))
        .unwrap()
    }

    #[test]
    fn plain_part_is_decoded() {
        let message = message_json(&b64("hello gmail body"), "text/plain");
        assert_eq!(extract_body(&message).unwrap(), "hello gmail body");
        assert_eq!(header_value(&message, "subject"), Some("Quarterly sync"));
        assert!(internal_date(&message).is_some());
    }

    #[test]
    fn html_part_is_stripped() {
        let message = message_json(
            &b64("<html><body><p>Hello &amp; welcome</p></body></html>"),
            "text/html",
        );
        assert_eq!(extract_body(&message).unwrap(), "Hello & welcome");
    }

    #[test]
    fn nested_parts_are_searched_depth_first() {
        let message: Message = serde_json::from_value(serde_json::json!({
            "id": "msg-2",
            "historyId": "1",
            "payload": {
                "mimeType": "multipart/mixed",
                "parts": [
                    { "mimeType": "multipart/alternative", "parts": [
                        { "mimeType": "text/plain", "body": { "data": b64("nested body") } }
                    ]}
                ]
            }
        }))
        .unwrap();
        assert_eq!(extract_body(&message).unwrap(), "nested body");
    }

    #[test]
    fn unpadded_base64url_decodes() {
        let unpadded = base64::engine::general_purpose::URL_SAFE_NO_PAD.encode("abc?~");
        assert_eq!(decode_body_data(&unpadded).unwrap(), "abc?~");
    }

    #[test]
    fn history_list_deserializes() {
        let raw = serde_json::json!({
            "historyId": "48300",
            "history": [
                { "id": "48250", "messagesAdded": [
                    { "message": { "id": "new-1" } },
                    { "message": { "id": "new-2" } }
                ]},
                { "id": "48260" }
            ],
            "nextPageToken": "pg2"
        });
        let list: HistoryList = serde_json::from_value(raw).unwrap();
        assert_eq!(list.history_id.as_deref(), Some("48300"));
        assert_eq!(list.history[0].messages_added.len(), 2);
        assert!(list.history[1].messages_added.is_empty());
    }
}
