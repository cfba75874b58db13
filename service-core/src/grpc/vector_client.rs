//! Vector service gRPC client for service-to-service communication.
//!
//! The vector index ingests chunks from the outbound topic on its own; the
//! only RPC the crawler makes against it is file deletion when a user
//! disconnects an integration.

use std::time::Duration;
use tonic::transport::{Channel, Endpoint};
use tonic::Request;

use super::interceptors::inject_trace_context;
use super::proto::vector::vector_service_client::VectorServiceClient;
use super::proto::vector::{DeleteFilesRequest, DeleteFilesResponse};

/// Configuration for the vector service client.
#[derive(Clone, Debug)]
pub struct VectorClientConfig {
    /// The gRPC endpoint of the vector service (e.g., "http://vector-service:9091").
    pub endpoint: String,
    /// Connection timeout.
    pub connect_timeout: Duration,
    /// Request timeout. Deletions sweep whole platforms, so this is generous.
    pub request_timeout: Duration,
}

impl Default for VectorClientConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:9091".to_string(),
            connect_timeout: Duration::from_secs(5),
            request_timeout: Duration::from_secs(30),
        }
    }
}

/// Vector service client for calling the vector index via gRPC.
#[derive(Clone)]
pub struct VectorClient {
    client: VectorServiceClient<Channel>,
}

impl VectorClient {
    /// Create a new vector client with the given configuration.
    pub async fn new(config: VectorClientConfig) -> Result<Self, tonic::transport::Error> {
        let channel = Endpoint::from_shared(config.endpoint)?
            .connect_timeout(config.connect_timeout)
            .timeout(config.request_timeout)
            .connect()
            .await?;

        Ok(Self {
            client: VectorServiceClient::new(channel),
        })
    }

    /// Create a new vector client connecting to the specified endpoint.
    pub async fn connect(endpoint: &str) -> Result<Self, tonic::transport::Error> {
        Self::new(VectorClientConfig {
            endpoint: endpoint.to_string(),
            ..Default::default()
        })
        .await
    }

    /// Delete every indexed file the user has on the platform.
    pub async fn delete_files(
        &mut self,
        user_id: &str,
        platform: &str,
        exclusive: bool,
    ) -> Result<DeleteFilesResponse, tonic::Status> {
        let mut request = Request::new(DeleteFilesRequest {
            user_id: user_id.to_string(),
            platform: platform.to_string(),
            exclusive,
            file_paths: Vec::new(),
        });
        inject_trace_context(&mut request);

        let response = self.client.delete_files(request).await?;
        Ok(response.into_inner())
    }
}
