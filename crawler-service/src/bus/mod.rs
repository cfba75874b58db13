//! Signal bus adapter (Kafka).
//!
//! Outbound: one topic carrying chunk, `<file_done>` and `<crawl_done>`
//! messages as length-delimited proto records, keyed by (user, resource) so
//! a file's stream stays on one partition in publish order.
//!
//! Inbound: one acknowledgement topic per platform; each message marks a
//! resource processed or flags the platform crawl complete.

pub mod consumer;
pub mod producer;

pub use consumer::spawn_signal_consumers;
pub use producer::ChunkPublisher;
