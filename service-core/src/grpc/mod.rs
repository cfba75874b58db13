//! gRPC utilities for the pipeline services.
//!
//! This module provides shared gRPC infrastructure including:
//! - Error conversion between `AppError` and `tonic::Status`
//! - Interceptors for trace context propagation
//! - Retry helpers for service-to-service calls
//! - Vector service client (index deletions)
//! - Integration service client (access token brokering)

pub mod error;
pub mod integration_client;
pub mod interceptors;
pub mod retry;
pub mod vector_client;

// Include the generated proto code for clients
pub mod proto {
    pub mod vector {
        tonic::include_proto!("pipeline.vector.v1");
    }
    pub mod integration {
        tonic::include_proto!("pipeline.integration.v1");
    }
}

pub use error::{GrpcResult, IntoStatus};
pub use integration_client::{IntegrationClient, IntegrationClientConfig};
pub use interceptors::{
    extract_request_id, inject_trace_context, inject_trace_context_with_request_id,
    trace_context_interceptor,
};
pub use retry::{retry_grpc_call, RetryConfig};
pub use vector_client::{VectorClient, VectorClientConfig};

// Re-export commonly used tonic types
pub use tonic::{Code, Request, Response, Status};
