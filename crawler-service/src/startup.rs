//! Application startup and lifecycle management.
//!
//! Builds every store, bus and client handle, spawns the signal consumers
//! and the background refresh ticker, then runs the minimal HTTP server
//! (health/metrics) and the gRPC server. All business logic is exposed via
//! gRPC.

use crate::bus::{spawn_signal_consumers, ChunkPublisher};
use crate::config::CrawlerConfig;
use crate::crawler::refresh::spawn_background_refresher;
use crate::crawler::CrawlOrchestrator;
use crate::grpc::{
    proto::{crawler_service_server::CrawlerServiceServer, FILE_DESCRIPTOR_SET},
    CrawlerGrpcService,
};
use crate::services::{get_metrics, ChunkMapStore, Database, RateGovernor};
use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Json, Router};
use serde_json::json;
use service_core::error::AppError;
use service_core::grpc::interceptors::trace_context_interceptor;
use service_core::grpc::{IntegrationClient, VectorClient};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use service_core::tower::ServiceBuilder;
use tokio_util::sync::CancellationToken;
use tonic::transport::Server as GrpcServer;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: CrawlerConfig,
    pub db: Database,
    pub chunk_map: ChunkMapStore,
    pub orchestrator: Arc<CrawlOrchestrator>,
    pub shutdown: CancellationToken,
}

/// State for health check endpoints.
#[derive(Clone)]
struct HealthState {
    db: Database,
    chunk_map: ChunkMapStore,
}

/// Health check endpoint for Docker/K8s liveness probes.
async fn health_check(State(state): State<HealthState>) -> impl IntoResponse {
    let postgres = state.db.health_check().await;
    let mongo = state.chunk_map.health_check().await;
    match (postgres, mongo) {
        (Ok(()), Ok(())) => (
            StatusCode::OK,
            Json(json!({
                "status": "ok",
                "service": "crawler-service",
                "version": env!("CARGO_PKG_VERSION")
            })),
        ),
        (pg, mg) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({
                "status": "unhealthy",
                "service": "crawler-service",
                "postgres": pg.err().map(|e| e.to_string()),
                "mongodb": mg.err().map(|e| e.to_string()),
            })),
        ),
    }
}

/// Readiness check endpoint for K8s readiness probes.
async fn readiness_check(State(state): State<HealthState>) -> impl IntoResponse {
    match state.db.health_check().await {
        Ok(_) => StatusCode::OK,
        Err(_) => StatusCode::SERVICE_UNAVAILABLE,
    }
}

/// Prometheus metrics endpoint.
async fn metrics_endpoint() -> impl IntoResponse {
    (
        StatusCode::OK,
        [("content-type", "text/plain; charset=utf-8")],
        get_metrics(),
    )
}

async fn shutdown_signal(token: CancellationToken) {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
    token.cancel();
}

/// Application container for managing server lifecycle.
pub struct Application {
    http_port: u16,
    grpc_port: u16,
    http_listener: TcpListener,
    grpc_listener: TcpListener,
    state: AppState,
}

impl Application {
    /// Build the application with the given configuration.
    pub async fn build(config: CrawlerConfig) -> Result<Self, AppError> {
        let shutdown = CancellationToken::new();

        // Connect to PostgreSQL and apply migrations
        let db = Database::new(
            &config.database.url,
            config.database.max_connections,
            config.database.min_connections,
        )
        .await
        .map_err(|e| {
            tracing::error!("Failed to connect to PostgreSQL: {}", e);
            e
        })?;
        db.run_migrations().await?;

        // Connect to the chunk-ID document store
        let chunk_map = ChunkMapStore::connect(&config.mongodb.uri, &config.mongodb.database)
            .await
            .map_err(|e| {
                tracing::error!("Failed to connect to MongoDB: {}", e);
                e
            })?;

        // Outbound chunk topic
        let publisher = ChunkPublisher::new(&config.kafka.brokers, &config.kafka.chunk_topic)?;

        // Inbound acknowledgement topics
        spawn_signal_consumers(&config.kafka, db.clone(), shutdown.clone())?;

        // External service clients
        let integration = IntegrationClient::connect(&config.integration.endpoint)
            .await
            .map_err(|e| {
                tracing::error!("Failed to connect to integration service: {}", e);
                AppError::Transport(anyhow::anyhow!("integration service unavailable: {}", e))
            })?;
        let vector = VectorClient::connect(&config.vector.endpoint)
            .await
            .map_err(|e| {
                tracing::error!("Failed to connect to vector service: {}", e);
                AppError::Transport(anyhow::anyhow!("vector service unavailable: {}", e))
            })?;

        let governor = Arc::new(RateGovernor::new(&config.microsoft_rate_limit));

        let orchestrator = Arc::new(CrawlOrchestrator::new(
            db.clone(),
            chunk_map.clone(),
            publisher,
            governor,
            integration,
            vector,
            config.crawler.clone(),
            shutdown.clone(),
        ));

        // Periodic incremental refresh over overdue tokens
        spawn_background_refresher(orchestrator.clone(), shutdown.clone());

        let state = AppState {
            config: config.clone(),
            db,
            chunk_map,
            orchestrator,
            shutdown,
        };

        // Bind HTTP listener (port 0 = random port for testing)
        let http_addr = SocketAddr::from(([0, 0, 0, 0], config.common.port));
        let http_listener = TcpListener::bind(http_addr).await.map_err(|e| {
            tracing::error!("Failed to bind HTTP listener to {}: {}", http_addr, e);
            AppError::from(e)
        })?;
        let http_port = http_listener.local_addr()?.port();

        // Bind gRPC listener on port + 1 (or random when testing on port 0)
        let grpc_addr: SocketAddr = if config.common.port == 0 {
            SocketAddr::from(([0, 0, 0, 0], 0))
        } else {
            SocketAddr::from(([0, 0, 0, 0], config.common.port + 1))
        };
        let grpc_listener = TcpListener::bind(grpc_addr).await.map_err(|e| {
            tracing::error!("Failed to bind gRPC listener to {}: {}", grpc_addr, e);
            AppError::from(e)
        })?;
        let grpc_port = grpc_listener.local_addr()?.port();

        tracing::info!(
            "Crawler service: HTTP on port {}, gRPC on port {}",
            http_port,
            grpc_port
        );

        Ok(Self {
            http_port,
            grpc_port,
            http_listener,
            grpc_listener,
            state,
        })
    }

    /// Get the HTTP port the server is listening on.
    pub fn http_port(&self) -> u16 {
        self.http_port
    }

    /// Get the gRPC port the server is listening on.
    pub fn grpc_port(&self) -> u16 {
        self.grpc_port
    }

    /// Get a reference to the database.
    pub fn db(&self) -> &Database {
        &self.state.db
    }

    /// Run the application until a shutdown signal arrives.
    pub async fn run_until_stopped(self) -> std::io::Result<()> {
        let health_state = HealthState {
            db: self.state.db.clone(),
            chunk_map: self.state.chunk_map.clone(),
        };

        let http_router = Router::new()
            .route("/health", get(health_check))
            .route("/ready", get(readiness_check))
            .route("/metrics", get(metrics_endpoint))
            .with_state(health_state);

        // Build gRPC server
        let crawler_service = CrawlerGrpcService::new(self.state.orchestrator.clone());

        // gRPC health service
        let (mut health_reporter, grpc_health_service) = tonic_health::server::health_reporter();
        health_reporter
            .set_serving::<CrawlerServiceServer<CrawlerGrpcService>>()
            .await;

        // Reflection service for debugging
        let reflection_service = tonic_reflection::server::Builder::configure()
            .register_encoded_file_descriptor_set(FILE_DESCRIPTOR_SET)
            .build_v1()
            .map_err(|e| {
                std::io::Error::other(format!("Failed to build reflection service: {}", e))
            })?;

        let layer = ServiceBuilder::new()
            .layer(tonic::service::interceptor(trace_context_interceptor))
            .into_inner();

        let shutdown = self.state.shutdown.clone();
        let incoming = tokio_stream::wrappers::TcpListenerStream::new(self.grpc_listener);
        let grpc_server = GrpcServer::builder()
            .layer(layer)
            .add_service(grpc_health_service)
            .add_service(reflection_service)
            .add_service(CrawlerServiceServer::new(crawler_service))
            .serve_with_incoming_shutdown(incoming, shutdown_signal(shutdown.clone()));

        // Run both servers concurrently
        let result = tokio::select! {
            result = axum::serve(self.http_listener, http_router) => {
                result.map_err(|e| std::io::Error::other(format!("HTTP server error: {}", e)))
            }
            result = grpc_server => {
                result.map_err(|e| std::io::Error::other(format!("gRPC server error: {}", e)))
            }
        };

        // Stop consumers and the refresh ticker with the servers.
        shutdown.cancel();
        result
    }
}
