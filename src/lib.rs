// モジュール定義
pub mod application;
pub mod domain;
pub mod infrastructure;
pub mod presentation;
pub mod shared;
pub mod state;

pub use application::services::{OfflineQueueService, SyncService, SyncTrigger};
pub use infrastructure::database::ConnectionPool;
pub use infrastructure::offline::SqliteOfflineStore;
pub use shared::{AppConfig, AppError};
pub use state::AppState;

/// Install the global tracing subscriber. `RUST_LOG` overrides the default filter.
pub fn init_logging() {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "inspection_sync=debug,offline=debug,info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}
