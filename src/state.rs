use crate::application::ports::offline_store::OfflineStore;
use crate::application::ports::remote_data_api::RemoteDataApi;
use crate::application::services::{
    AttachmentPolicy, OfflineQueueService, PendingCountsProjection, SyncService, SyncSettings,
};
use crate::infrastructure::cache::MemoryQueryCache;
use crate::infrastructure::database::ConnectionPool;
use crate::infrastructure::network::{ConnectivityMonitor, HttpReachabilityProbe, spawn_probe_loop};
use crate::infrastructure::offline::SqliteOfflineStore;
use crate::infrastructure::remote::RestDataClient;
use crate::presentation::handlers::OfflineHandler;
use crate::shared::config::AppConfig;
use crate::shared::error::AppError;
use std::sync::Arc;
use tokio::task::JoinHandle;

/// Everything the offline subsystem needs, wired once at startup and shared by handle.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub pool: ConnectionPool,
    pub store: Arc<dyn OfflineStore>,
    pub counts: Arc<PendingCountsProjection>,
    pub queue: Arc<OfflineQueueService>,
    pub connectivity: Arc<ConnectivityMonitor>,
    pub sync: Arc<SyncService>,
    pub query_cache: Arc<MemoryQueryCache>,
    pub offline_handler: Arc<OfflineHandler>,
}

impl AppState {
    /// Build the state against the configured REST backend.
    pub async fn initialize(config: AppConfig) -> Result<Self, AppError> {
        config.validate().map_err(AppError::ConfigurationError)?;
        let remote = Arc::new(RestDataClient::new(&config.remote)?);
        Self::build(config, remote).await
    }

    /// Wire the services around an arbitrary remote API.
    ///
    /// The database is opened lazily, so a device without usable storage still gets a
    /// working state; offline writes fail with `StorageUnavailable` instead.
    pub async fn build(
        config: AppConfig,
        remote: Arc<dyn RemoteDataApi>,
    ) -> Result<Self, AppError> {
        let settings = SyncSettings::from_config(&config)?;

        // オフラインストアとキュー
        let pool = ConnectionPool::lazy(&config.database);
        let store: Arc<dyn OfflineStore> = Arc::new(SqliteOfflineStore::new(pool.clone()));
        let counts = Arc::new(PendingCountsProjection::new(Arc::clone(&store)));
        let queue = Arc::new(OfflineQueueService::new(
            Arc::clone(&store),
            Arc::clone(&counts),
            AttachmentPolicy::from_config(&config.attachments),
        ));

        // 接続監視と同期サービス
        let connectivity = Arc::new(ConnectivityMonitor::new(
            config.connectivity.assume_online,
            config.connectivity.debounce(),
        ));
        let query_cache = Arc::new(MemoryQueryCache::default());

        let sync = Arc::new(
            SyncService::new(
                Arc::clone(&queue),
                remote,
                connectivity.clone(),
                settings.clone(),
            )
            .with_cache(query_cache.clone()),
        );

        let offline_handler = Arc::new(OfflineHandler::new(
            queue.clone(),
            Arc::clone(&sync),
            connectivity.clone(),
            settings.entity_table,
        ));

        let initial = queue.refresh_counts().await;
        tracing::info!(
            target: "offline::queue",
            mutations = initial.mutations,
            attachments = initial.attachments,
            held = initial.held_mutations,
            "offline queue loaded"
        );

        Ok(Self {
            config: Arc::new(config),
            pool,
            store,
            counts,
            queue,
            connectivity,
            sync,
            query_cache,
            offline_handler,
        })
    }

    /// Start the reachability probe and, when enabled, the auto-sync task.
    pub fn start_background(&self) -> Result<Vec<JoinHandle<()>>, AppError> {
        let mut handles = Vec::new();

        let probe = HttpReachabilityProbe::new(
            self.config.remote.base_url.clone(),
            self.config.connectivity.probe_timeout(),
        )
        .map_err(|e| AppError::ConfigurationError(format!("Failed to build probe client: {e}")))?;
        handles.push(spawn_probe_loop(
            Arc::new(probe),
            Arc::clone(&self.connectivity),
            self.config.connectivity.probe_interval(),
        ));

        if self.config.sync.auto_sync {
            handles.push(self.sync.start());
        } else {
            tracing::info!(target: "offline::sync", "auto-sync disabled");
        }

        Ok(handles)
    }

    pub async fn shutdown(&self) {
        self.pool.close().await;
    }
}
