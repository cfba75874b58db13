use crate::config::KafkaConfig;
use crate::grpc::proto;
use crate::services::Database;
use prost::Message;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{Consumer, StreamConsumer};
use rdkafka::message::Message as KafkaMessage;
use service_core::error::AppError;
use std::str::FromStr;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Spawn one consumer task per inbound signal topic. Each task runs until
/// the shutdown token fires.
pub fn spawn_signal_consumers(
    config: &KafkaConfig,
    db: Database,
    shutdown: CancellationToken,
) -> Result<(), AppError> {
    for topic in config.signal_topics() {
        let consumer = build_consumer(&config.brokers, &config.consumer_group, topic)?;
        let db = db.clone();
        let shutdown = shutdown.clone();
        let topic = topic.to_string();

        tokio::spawn(async move {
            tracing::info!(topic = %topic, "Signal consumer started");
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => {
                        tracing::info!(topic = %topic, "Signal consumer shutting down");
                        break;
                    }
                    received = consumer.recv() => {
                        match received {
                            Ok(message) => {
                                if let Some(payload) = message.payload() {
                                    if let Err(e) = handle_signal(&db, payload).await {
                                        tracing::error!(
                                            topic = %topic,
                                            error = %e,
                                            "Failed to apply crawl signal"
                                        );
                                    }
                                }
                            }
                            Err(e) => {
                                tracing::error!(topic = %topic, error = %e, "Kafka receive error");
                            }
                        }
                    }
                }
            }
        });
    }

    Ok(())
}

fn build_consumer(
    brokers: &str,
    group: &str,
    topic: &str,
) -> Result<StreamConsumer, AppError> {
    let consumer: StreamConsumer = ClientConfig::new()
        .set("bootstrap.servers", brokers)
        .set("group.id", group)
        .set("enable.auto.commit", "true")
        .set("auto.offset.reset", "earliest")
        .create()
        .map_err(|e| {
            AppError::Transport(anyhow::anyhow!("Failed to create Kafka consumer: {}", e))
        })?;

    consumer.subscribe(&[topic]).map_err(|e| {
        AppError::Transport(anyhow::anyhow!("Failed to subscribe to {}: {}", topic, e))
    })?;

    Ok(consumer)
}

/// Apply one downstream acknowledgement: either the vector index finished a
/// file (mark the resource processed) or a whole platform crawl (flip the
/// crawl-done flag).
async fn handle_signal(db: &Database, payload: &[u8]) -> Result<(), AppError> {
    let signal = proto::CrawlSignal::decode_length_delimited(payload)
        .map_err(|e| AppError::Malformed(anyhow::anyhow!("Undecodable crawl signal: {}", e)))?;

    let user_id = Uuid::parse_str(&signal.user_id).map_err(|_| {
        AppError::Malformed(anyhow::anyhow!("invalid user id in signal: {}", signal.user_id))
    })?;
    let platform = match proto::Platform::try_from(signal.platform) {
        Ok(proto::Platform::Google) => "GOOGLE",
        Ok(proto::Platform::Microsoft) => "MICROSOFT",
        Ok(proto::Platform::Notion) => "NOTION",
        Ok(proto::Platform::Local) => "LOCAL",
        _ => {
            return Err(AppError::Malformed(anyhow::anyhow!(
                "unknown platform in signal: {}",
                signal.platform
            )))
        }
    };

    if signal.crawling_done {
        let platform = crate::models::Platform::from_str(platform)
            .map_err(|e| AppError::Malformed(anyhow::anyhow!(e)))?;
        db.set_crawling_done(user_id, platform, true).await?;
        tracing::info!(user_id = %user_id, platform = %platform, "Crawl acknowledged complete");
    } else {
        db.upsert_processing_status(user_id, &signal.resource_id, platform, true)
            .await?;
        tracing::debug!(
            user_id = %user_id,
            resource_id = %signal.resource_id,
            "File acknowledged processed"
        );
    }

    metrics::counter!("crawler_signals_consumed_total").increment(1);
    Ok(())
}
