//! Multi-tenant content ingestion and retrieval pipeline: crawls connected
//! document accounts, chunks extracted text, publishes chunks to the
//! vector-indexing bus and reconstructs chunk text on demand.

pub mod bus;
pub mod chunking;
pub mod config;
pub mod connectors;
pub mod crawler;
pub mod extract;
pub mod grpc;
pub mod models;
pub mod services;
pub mod startup;
