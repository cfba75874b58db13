use crate::grpc::convert;
use crate::models::{ChunkMetadata, TextChunk, CRAWL_DONE_MARKER, FILE_DONE_MARKER};
use prost::Message;
use rdkafka::config::ClientConfig;
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::util::Timeout;
use service_core::error::AppError;
use std::time::Duration;

/// Publisher for the outbound chunk topic.
#[derive(Clone)]
pub struct ChunkPublisher {
    producer: FutureProducer,
    topic: String,
}

impl ChunkPublisher {
    pub fn new(brokers: &str, topic: &str) -> Result<Self, AppError> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", brokers)
            .set("message.timeout.ms", "30000")
            .set("compression.type", "lz4")
            .create()
            .map_err(|e| {
                AppError::Transport(anyhow::anyhow!("Failed to create Kafka producer: {}", e))
            })?;

        tracing::info!(brokers = brokers, topic = topic, "Kafka producer created");

        Ok(Self {
            producer,
            topic: topic.to_string(),
        })
    }

    /// Publish one chunk (or marker). Awaits broker acknowledgement so the
    /// caller's publish order is the partition order.
    pub async fn publish(&self, chunk: &TextChunk) -> Result<(), AppError> {
        let record = convert::chunk_to_proto(chunk);
        let mut payload = Vec::with_capacity(record.encoded_len() + 4);
        record.encode_length_delimited(&mut payload).map_err(|e| {
            AppError::InternalError(anyhow::anyhow!("Failed to encode chunk: {}", e))
        })?;

        // All messages of a (user, resource) share a key and therefore a
        // partition, preserving chunk ordering and file-done placement.
        let key = format!(
            "{}_{}",
            chunk.metadata.user_id, chunk.metadata.resource_id
        );

        self.producer
            .send(
                FutureRecord::to(&self.topic).key(&key).payload(&payload),
                Timeout::After(Duration::from_secs(30)),
            )
            .await
            .map_err(|(e, _)| {
                AppError::Transport(anyhow::anyhow!("Failed to publish chunk: {}", e))
            })?;

        metrics::counter!(
            "crawler_bus_messages_total",
            "kind" => message_kind(&chunk.content)
        )
        .increment(1);

        Ok(())
    }

    /// Publish the terminal marker for one file.
    pub async fn publish_file_done(&self, meta: &ChunkMetadata) -> Result<(), AppError> {
        let mut metadata = meta.clone();
        metadata.chunk_id = String::new();
        self.publish(&TextChunk {
            metadata,
            content: FILE_DONE_MARKER.to_string(),
        })
        .await
    }

    /// Publish the terminal marker for one (user, platform) crawl.
    pub async fn publish_crawl_done(&self, meta: &ChunkMetadata) -> Result<(), AppError> {
        let mut metadata = meta.clone();
        metadata.chunk_id = String::new();
        self.publish(&TextChunk {
            metadata,
            content: CRAWL_DONE_MARKER.to_string(),
        })
        .await
    }
}

fn message_kind(content: &str) -> &'static str {
    match content {
        FILE_DONE_MARKER => "file_done",
        CRAWL_DONE_MARKER => "crawl_done",
        _ => "chunk",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grpc::proto;
    use crate::models::{Platform, Service};

    #[test]
    fn message_kinds() {
        assert_eq!(message_kind("some text"), "chunk");
        assert_eq!(message_kind(FILE_DONE_MARKER), "file_done");
        assert_eq!(message_kind(CRAWL_DONE_MARKER), "crawl_done");
    }

    #[test]
    fn payload_is_length_delimited_proto() {
        let chunk = TextChunk {
            metadata: ChunkMetadata {
                user_id: uuid::Uuid::new_v4(),
                platform: Platform::Google,
                service: Service::GoogleDrive,
                resource_id: "doc".to_string(),
                resource_type: "application/vnd.google-apps.document".to_string(),
                title: "T".to_string(),
                file_url: String::new(),
                file_path: "/T".to_string(),
                date_created: None,
                date_last_modified: None,
                chunk_id: "short-key".to_string(),
            },
            content: "hello world".to_string(),
        };

        let record = convert::chunk_to_proto(&chunk);
        let mut payload = Vec::new();
        record.encode_length_delimited(&mut payload).unwrap();

        let decoded = proto::TextChunk::decode_length_delimited(payload.as_slice()).unwrap();
        assert_eq!(decoded.content, "hello world");
        assert_eq!(decoded.metadata.unwrap().chunk_id, "short-key");
    }
}
