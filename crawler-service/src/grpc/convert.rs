//! Conversions between domain models and generated proto types.

use crate::grpc::proto;
use crate::models::{ChunkMetadata, Platform, Service, TextChunk};
use prost_types::Timestamp;
use service_core::error::AppError;
use uuid::Uuid;

pub fn platform_to_proto(platform: Platform) -> i32 {
    match platform {
        Platform::Google => proto::Platform::Google as i32,
        Platform::Microsoft => proto::Platform::Microsoft as i32,
        Platform::Notion => proto::Platform::Notion as i32,
        Platform::Local => proto::Platform::Local as i32,
    }
}

pub fn proto_to_platform(value: i32) -> Result<Platform, AppError> {
    match proto::Platform::try_from(value) {
        Ok(proto::Platform::Google) => Ok(Platform::Google),
        Ok(proto::Platform::Microsoft) => Ok(Platform::Microsoft),
        Ok(proto::Platform::Notion) => Ok(Platform::Notion),
        Ok(proto::Platform::Local) => Ok(Platform::Local),
        _ => Err(AppError::Malformed(anyhow::anyhow!(
            "unknown platform value: {}",
            value
        ))),
    }
}

pub fn service_to_proto(service: Service) -> i32 {
    match service {
        Service::GoogleDrive => proto::Service::GoogleDrive as i32,
        Service::GoogleGmail => proto::Service::GoogleGmail as i32,
        Service::MicrosoftDrive => proto::Service::MicrosoftDrive as i32,
        Service::Notion => proto::Service::Notion as i32,
    }
}

pub fn proto_to_service(value: i32) -> Result<Service, AppError> {
    match proto::Service::try_from(value) {
        Ok(proto::Service::GoogleDrive) => Ok(Service::GoogleDrive),
        Ok(proto::Service::GoogleGmail) => Ok(Service::GoogleGmail),
        Ok(proto::Service::MicrosoftDrive) => Ok(Service::MicrosoftDrive),
        Ok(proto::Service::Notion) => Ok(Service::Notion),
        _ => Err(AppError::Malformed(anyhow::anyhow!(
            "unknown service value: {}",
            value
        ))),
    }
}

fn datetime_to_timestamp(dt: chrono::DateTime<chrono::Utc>) -> Timestamp {
    Timestamp {
        seconds: dt.timestamp(),
        nanos: dt.timestamp_subsec_nanos() as i32,
    }
}

fn timestamp_to_datetime(ts: &Timestamp) -> Option<chrono::DateTime<chrono::Utc>> {
    chrono::DateTime::from_timestamp(ts.seconds, ts.nanos.max(0) as u32)
}

pub fn metadata_to_proto(meta: &ChunkMetadata) -> proto::ChunkMetadata {
    proto::ChunkMetadata {
        user_id: meta.user_id.to_string(),
        platform: platform_to_proto(meta.platform),
        service: service_to_proto(meta.service),
        resource_id: meta.resource_id.clone(),
        resource_type: meta.resource_type.clone(),
        title: meta.title.clone(),
        file_url: meta.file_url.clone(),
        file_path: meta.file_path.clone(),
        date_created: meta.date_created.map(datetime_to_timestamp),
        date_last_modified: meta.date_last_modified.map(datetime_to_timestamp),
        chunk_id: meta.chunk_id.clone(),
    }
}

pub fn proto_to_metadata(meta: &proto::ChunkMetadata) -> Result<ChunkMetadata, AppError> {
    let user_id = Uuid::parse_str(&meta.user_id)
        .map_err(|_| AppError::Malformed(anyhow::anyhow!("invalid user id: {}", meta.user_id)))?;

    Ok(ChunkMetadata {
        user_id,
        platform: proto_to_platform(meta.platform)?,
        service: proto_to_service(meta.service)?,
        resource_id: meta.resource_id.clone(),
        resource_type: meta.resource_type.clone(),
        title: meta.title.clone(),
        file_url: meta.file_url.clone(),
        file_path: meta.file_path.clone(),
        date_created: meta.date_created.as_ref().and_then(timestamp_to_datetime),
        date_last_modified: meta
            .date_last_modified
            .as_ref()
            .and_then(timestamp_to_datetime),
        chunk_id: meta.chunk_id.clone(),
    })
}

pub fn chunk_to_proto(chunk: &TextChunk) -> proto::TextChunk {
    proto::TextChunk {
        metadata: Some(metadata_to_proto(&chunk.metadata)),
        content: chunk.content.clone(),
    }
}

pub fn proto_to_chunk(chunk: &proto::TextChunk) -> Result<TextChunk, AppError> {
    let metadata = chunk
        .metadata
        .as_ref()
        .ok_or_else(|| AppError::Malformed(anyhow::anyhow!("chunk without metadata")))?;
    Ok(TextChunk {
        metadata: proto_to_metadata(metadata)?,
        content: chunk.content.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_metadata() -> ChunkMetadata {
        ChunkMetadata {
            user_id: Uuid::new_v4(),
            platform: Platform::Notion,
            service: Service::Notion,
            resource_id: "page-9".to_string(),
            resource_type: "page".to_string(),
            title: "Notes".to_string(),
            file_url: "https://notion.so/page-9".to_string(),
            file_path: "Notes".to_string(),
            date_created: Some(chrono::Utc::now()),
            date_last_modified: Some(chrono::Utc::now()),
            chunk_id: "start_block=b;start_offset=0;end_block=b;end_offset=4".to_string(),
        }
    }

    #[test]
    fn metadata_round_trips() {
        let meta = sample_metadata();
        let restored = proto_to_metadata(&metadata_to_proto(&meta)).unwrap();
        assert_eq!(restored.user_id, meta.user_id);
        assert_eq!(restored.platform, meta.platform);
        assert_eq!(restored.service, meta.service);
        assert_eq!(restored.chunk_id, meta.chunk_id);
        assert_eq!(
            restored.date_created.map(|d| d.timestamp()),
            meta.date_created.map(|d| d.timestamp())
        );
    }

    #[test]
    fn bad_user_id_is_malformed() {
        let mut meta = metadata_to_proto(&sample_metadata());
        meta.user_id = "not-a-uuid".to_string();
        assert!(matches!(
            proto_to_metadata(&meta),
            Err(AppError::Malformed(_))
        ));
    }

    #[test]
    fn chunk_without_metadata_is_malformed() {
        let chunk = proto::TextChunk {
            metadata: None,
            content: "text".to_string(),
        };
        assert!(matches!(
            proto_to_chunk(&chunk),
            Err(AppError::Malformed(_))
        ));
    }
}
