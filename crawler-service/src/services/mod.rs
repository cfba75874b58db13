pub mod chunk_map;
pub mod database;
pub mod keyed_lock;
pub mod metrics;
pub mod rate_governor;

pub use chunk_map::ChunkMapStore;
pub use database::Database;
pub use keyed_lock::KeyedMutex;
pub use metrics::{get_metrics, init_metrics};
pub use rate_governor::{GovernedApi, RateGovernor, ServiceLimits};
