//! service-core: Shared infrastructure for the crawling pipeline services.
pub mod config;
pub mod error;
pub mod grpc;
pub mod observability;

pub use async_trait;
pub use axum;
pub use mongodb;
pub use prost;
pub use serde;
pub use serde_json;
pub use sqlx;
pub use tokio;
pub use tonic;
pub use tower;
pub use tower_http;
pub use tracing;
