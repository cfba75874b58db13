//! CrawlerService gRPC implementation.

use crate::crawler::CrawlOrchestrator;
use crate::grpc::convert;
use crate::grpc::proto::crawler_service_server::CrawlerService;
use crate::grpc::proto::{
    CrawlerResponse, DeleteCrawlerDataRequest, GetChunksRequest, GetChunksResponse,
    ManualCrawlerRequest, StartInitialCrawlerRequest, UpdateCrawlerRequest,
};
use crate::models::{ChunkMetadata, Platform};
use service_core::error::AppError;
use service_core::grpc::IntoStatus;
use std::sync::Arc;
use std::time::Instant;
use tonic::{Request, Response, Status};
use uuid::Uuid;

pub struct CrawlerGrpcService {
    orchestrator: Arc<CrawlOrchestrator>,
}

impl CrawlerGrpcService {
    pub fn new(orchestrator: Arc<CrawlOrchestrator>) -> Self {
        Self { orchestrator }
    }

    async fn get_chunks(
        &self,
        platform: Platform,
        request: Request<GetChunksRequest>,
    ) -> Result<Response<GetChunksResponse>, Status> {
        let started = Instant::now();
        let request = request.into_inner();
        let user_id = parse_uuid(&request.user_id)?;

        let metadatas: Vec<ChunkMetadata> = request
            .metadatas
            .iter()
            .map(convert::proto_to_metadata)
            .collect::<Result<_, _>>()
            .map_err(IntoStatus::into_status)?;

        let chunks = self
            .orchestrator
            .retrieve_chunks(user_id, platform, metadatas)
            .await
            .map_err(IntoStatus::into_status)?;

        record_rpc("get_chunks", platform.as_str(), started);
        Ok(Response::new(GetChunksResponse {
            chunks: chunks.iter().map(convert::chunk_to_proto).collect(),
        }))
    }
}

#[allow(clippy::result_large_err)]
fn parse_uuid(s: &str) -> Result<Uuid, Status> {
    Uuid::parse_str(s).map_err(|_| Status::invalid_argument(format!("Invalid UUID: {}", s)))
}

#[allow(clippy::result_large_err)]
fn parse_platform(value: i32) -> Result<Platform, Status> {
    convert::proto_to_platform(value).map_err(IntoStatus::into_status)
}

fn record_rpc(method: &'static str, platform: &'static str, started: Instant) {
    metrics::counter!("crawler_grpc_requests_total", "method" => method, "platform" => platform)
        .increment(1);
    metrics::histogram!("crawler_grpc_request_duration_seconds", "method" => method)
        .record(started.elapsed().as_secs_f64());
}

/// Fold a crawl result into the `{success, message}` response shape.
/// Partial failure is a response, not a transport error: some workers may
/// have delivered and their cursors are already stored.
#[allow(clippy::result_large_err)]
fn crawl_response(result: Result<Vec<String>, AppError>) -> Result<CrawlerResponse, Status> {
    match result {
        Ok(report) if report.is_empty() => Ok(CrawlerResponse {
            success: true,
            message: "crawl complete".to_string(),
        }),
        Ok(report) => Ok(CrawlerResponse {
            success: true,
            message: format!("crawl complete, {} file(s) skipped: {}", report.len(), report.join("; ")),
        }),
        Err(AppError::PartialFailure(errors)) => Ok(CrawlerResponse {
            success: false,
            message: format!("all workers failed: {}", errors.join("; ")),
        }),
        Err(e) => Err(e.into_status()),
    }
}

#[tonic::async_trait]
impl CrawlerService for CrawlerGrpcService {
    async fn start_initial_crawler(
        &self,
        request: Request<StartInitialCrawlerRequest>,
    ) -> Result<Response<CrawlerResponse>, Status> {
        let started = Instant::now();
        let request = request.into_inner();
        let user_id = parse_uuid(&request.user_id)?;
        let platform = parse_platform(request.platform)?;

        let result = self
            .orchestrator
            .start_initial_crawl(user_id, &request.access_token, platform)
            .await;

        record_rpc("start_initial_crawler", platform.as_str(), started);
        Ok(Response::new(crawl_response(result)?))
    }

    async fn manual_crawler(
        &self,
        request: Request<ManualCrawlerRequest>,
    ) -> Result<Response<CrawlerResponse>, Status> {
        let started = Instant::now();
        let request = request.into_inner();
        let user_id = parse_uuid(&request.user_id)?;

        let result = self.orchestrator.manual_refresh(user_id).await;

        record_rpc("manual_crawler", "all", started);
        Ok(Response::new(crawl_response(result)?))
    }

    async fn update_crawler(
        &self,
        request: Request<UpdateCrawlerRequest>,
    ) -> Result<Response<CrawlerResponse>, Status> {
        let started = Instant::now();
        let request = request.into_inner();
        let user_id = parse_uuid(&request.user_id)?;
        let platform = parse_platform(request.platform)?;

        let result = self
            .orchestrator
            .update_platform(user_id, &request.access_token, platform)
            .await;

        record_rpc("update_crawler", platform.as_str(), started);
        Ok(Response::new(crawl_response(result)?))
    }

    async fn delete_crawler_data(
        &self,
        request: Request<DeleteCrawlerDataRequest>,
    ) -> Result<Response<CrawlerResponse>, Status> {
        let started = Instant::now();
        let request = request.into_inner();
        let user_id = parse_uuid(&request.user_id)?;
        let platform = parse_platform(request.platform)?;

        self.orchestrator
            .delete_user_data(user_id, platform)
            .await
            .map_err(IntoStatus::into_status)?;

        record_rpc("delete_crawler_data", platform.as_str(), started);
        Ok(Response::new(CrawlerResponse {
            success: true,
            message: "crawler data deleted".to_string(),
        }))
    }

    async fn get_chunks_from_google(
        &self,
        request: Request<GetChunksRequest>,
    ) -> Result<Response<GetChunksResponse>, Status> {
        self.get_chunks(Platform::Google, request).await
    }

    async fn get_chunks_from_microsoft(
        &self,
        request: Request<GetChunksRequest>,
    ) -> Result<Response<GetChunksResponse>, Status> {
        self.get_chunks(Platform::Microsoft, request).await
    }

    async fn get_chunks_from_notion(
        &self,
        request: Request<GetChunksRequest>,
    ) -> Result<Response<GetChunksResponse>, Status> {
        self.get_chunks(Platform::Notion, request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_report_is_clean_success() {
        let response = crawl_response(Ok(Vec::new())).unwrap();
        assert!(response.success);
        assert_eq!(response.message, "crawl complete");
    }

    #[test]
    fn skipped_files_stay_successful_but_reported() {
        let response =
            crawl_response(Ok(vec!["GOOGLE_GMAIL: msg-1: transport".to_string()])).unwrap();
        assert!(response.success);
        assert!(response.message.contains("1 file(s) skipped"));
        assert!(response.message.contains("msg-1"));
    }

    #[test]
    fn total_failure_is_reported_not_thrown() {
        let response = crawl_response(Err(AppError::PartialFailure(vec![
            "GOOGLE_DRIVE: 500".to_string(),
        ])))
        .unwrap();
        assert!(!response.success);
        assert!(response.message.contains("GOOGLE_DRIVE"));
    }

    #[test]
    fn auth_failures_surface_as_status() {
        let err = crawl_response(Err(AppError::AuthInvalid(anyhow::anyhow!("rejected"))))
            .unwrap_err();
        assert_eq!(err.code(), tonic::Code::Unauthenticated);
    }
}
