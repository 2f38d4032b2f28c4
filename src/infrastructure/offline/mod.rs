mod mappers;
pub mod metrics;
mod rows;
pub mod sqlite_store;

pub use metrics::{PassMetadata, PassOutcomeStatus, SyncMetrics, SyncMetricsSnapshot};
pub use sqlite_store::SqliteOfflineStore;
