//! Integration service gRPC client for service-to-service communication.
//!
//! The integration service owns OAuth credential storage and refresh. The
//! crawler never sees refresh tokens; it asks for a currently valid access
//! token whenever a background or manual refresh needs one.

use std::time::Duration;
use tonic::transport::{Channel, Endpoint};
use tonic::Request;

use super::interceptors::inject_trace_context;
use super::proto::integration::integration_service_client::IntegrationServiceClient;
use super::proto::integration::{GetAccessTokenRequest, GetAccessTokenResponse};

/// Configuration for the integration service client.
#[derive(Clone, Debug)]
pub struct IntegrationClientConfig {
    /// The gRPC endpoint of the integration service.
    pub endpoint: String,
    /// Connection timeout.
    pub connect_timeout: Duration,
    /// Request timeout.
    pub request_timeout: Duration,
}

impl Default for IntegrationClientConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:9092".to_string(),
            connect_timeout: Duration::from_secs(5),
            request_timeout: Duration::from_secs(10),
        }
    }
}

/// Integration service client for fetching provider access tokens.
#[derive(Clone)]
pub struct IntegrationClient {
    client: IntegrationServiceClient<Channel>,
}

impl IntegrationClient {
    /// Create a new integration client with the given configuration.
    pub async fn new(config: IntegrationClientConfig) -> Result<Self, tonic::transport::Error> {
        let channel = Endpoint::from_shared(config.endpoint)?
            .connect_timeout(config.connect_timeout)
            .timeout(config.request_timeout)
            .connect()
            .await?;

        Ok(Self {
            client: IntegrationServiceClient::new(channel),
        })
    }

    /// Create a new integration client connecting to the specified endpoint.
    pub async fn connect(endpoint: &str) -> Result<Self, tonic::transport::Error> {
        Self::new(IntegrationClientConfig {
            endpoint: endpoint.to_string(),
            ..Default::default()
        })
        .await
    }

    /// Fetch a valid access token and its granted scopes for (user, provider).
    pub async fn get_access_token(
        &mut self,
        user_id: &str,
        provider: &str,
    ) -> Result<GetAccessTokenResponse, tonic::Status> {
        let mut request = Request::new(GetAccessTokenRequest {
            user_id: user_id.to_string(),
            provider: provider.to_string(),
        });
        inject_trace_context(&mut request);

        let response = self.client.get_access_token(request).await?;
        Ok(response.into_inner())
    }
}
