#![allow(dead_code)]

pub mod fake_remote;

use fake_remote::FakeRemote;
use inspection_sync_lib::application::ports::connectivity::ConnectivityStatus;
use inspection_sync_lib::application::ports::offline_store::OfflineStore;
use inspection_sync_lib::application::services::{
    AttachmentPolicy, OfflineQueueService, OfflineQueueServiceTrait, PendingCountsProjection,
    SyncService, SyncSettings,
};
use inspection_sync_lib::domain::entities::offline::MutationDraft;
use inspection_sync_lib::domain::value_objects::offline::{
    AttachmentFile, EntityId, EntityPayload, EntityTable, MutationAction, RecordKey,
};
use inspection_sync_lib::infrastructure::cache::MemoryQueryCache;
use inspection_sync_lib::infrastructure::database::ConnectionPool;
use inspection_sync_lib::infrastructure::offline::SqliteOfflineStore;
use inspection_sync_lib::shared::config::AppConfig;
use serde_json::Value;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use std::io::Write;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use tokio::sync::watch;
use tracing::subscriber::DefaultGuard;
use tracing_subscriber::fmt::MakeWriter;

/// Connectivity flipped by hand instead of probed.
pub struct ManualConnectivity {
    sender: watch::Sender<bool>,
}

impl ManualConnectivity {
    pub fn new(online: bool) -> Arc<Self> {
        let (sender, _) = watch::channel(online);
        Arc::new(Self { sender })
    }

    pub fn set_online(&self, online: bool) {
        self.sender.send_replace(online);
    }
}

impl ConnectivityStatus for ManualConnectivity {
    fn is_online(&self) -> bool {
        *self.sender.borrow()
    }

    fn subscribe(&self) -> watch::Receiver<bool> {
        self.sender.subscribe()
    }
}

pub struct SyncHarness {
    pub queue: Arc<OfflineQueueService>,
    pub sync: Arc<SyncService>,
    pub remote: Arc<FakeRemote>,
    pub connectivity: Arc<ManualConnectivity>,
    pub cache: Arc<MemoryQueryCache>,
}

pub async fn setup_sync(online: bool) -> SyncHarness {
    setup_sync_with(online, SyncSettings::default()).await
}

/// Single-connection in-memory database with the schema applied.
pub async fn memory_pool() -> SqlitePool {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("in-memory sqlite");
    ConnectionPool::migrate(&pool).await.expect("migrations");
    pool
}

pub fn queue_over(pool: SqlitePool) -> Arc<OfflineQueueService> {
    let store: Arc<dyn OfflineStore> = Arc::new(SqliteOfflineStore::from_pool(pool));
    let counts = Arc::new(PendingCountsProjection::new(Arc::clone(&store)));
    Arc::new(OfflineQueueService::new(
        store,
        counts,
        AttachmentPolicy::default(),
    ))
}

pub async fn setup_sync_with(online: bool, settings: SyncSettings) -> SyncHarness {
    let queue = queue_over(memory_pool().await);

    let remote = FakeRemote::new();
    let connectivity = ManualConnectivity::new(online);
    let cache = Arc::new(MemoryQueryCache::default());
    let sync = Arc::new(
        SyncService::new(
            Arc::clone(&queue),
            remote.clone(),
            connectivity.clone(),
            settings,
        )
        .with_cache(cache.clone()),
    );

    SyncHarness {
        queue,
        sync,
        remote,
        connectivity,
        cache,
    }
}

/// Config pointing at a file-backed database inside `dir`.
pub fn file_config(dir: &TempDir) -> AppConfig {
    let mut config = AppConfig::default();
    config.database.url = format!("sqlite://{}", dir.path().join("offline.db").display());
    config.remote.base_url = "http://127.0.0.1:9".to_string();
    config.remote.api_key = "test-key".to_string();
    config.connectivity.assume_online = true;
    config.sync.auto_sync = false;
    config
}

pub fn key(id: &str) -> RecordKey {
    RecordKey::parse(id).expect("record key")
}

pub fn payload(value: Value) -> EntityPayload {
    EntityPayload::new(value).expect("object payload")
}

pub fn report_draft(id: &str, fields: Value) -> MutationDraft {
    MutationDraft {
        id: Some(key(id)),
        table: EntityTable::reports(),
        action: MutationAction::Create,
        payload: payload(fields),
    }
}

pub async fn enqueue_report(queue: &OfflineQueueService, id: &str, fields: Value) -> EntityId {
    queue
        .enqueue_mutation(report_draft(id, fields))
        .await
        .expect("enqueue report")
}

pub fn photo(name: &str) -> AttachmentFile {
    AttachmentFile::new(
        name.to_string(),
        Some("image/jpeg".to_string()),
        vec![0xFF, 0xD8, 0xFF, 0xE0],
    )
    .expect("photo")
}

pub async fn enqueue_photo(queue: &OfflineQueueService, owner: &EntityId, name: &str) -> RecordKey {
    queue
        .enqueue_attachment(owner, photo(name))
        .await
        .expect("enqueue photo")
}

/// Formatted log output collected for assertions.
#[derive(Clone, Default)]
pub struct LogBuffer {
    buffer: Arc<Mutex<Vec<u8>>>,
}

pub struct LogBufferWriter {
    buffer: Arc<Mutex<Vec<u8>>>,
}

impl<'a> MakeWriter<'a> for LogBuffer {
    type Writer = LogBufferWriter;

    fn make_writer(&'a self) -> Self::Writer {
        LogBufferWriter {
            buffer: Arc::clone(&self.buffer),
        }
    }
}

impl Write for LogBufferWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.buffer
            .lock()
            .expect("log buffer")
            .extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl LogBuffer {
    pub fn contents(&self) -> String {
        String::from_utf8(self.buffer.lock().expect("log buffer").clone()).expect("utf8 logs")
    }

    pub fn count(&self, needle: &str) -> usize {
        self.contents().matches(needle).count()
    }
}

/// Route this thread's events into a buffer until the guard drops. Tests using it must stay on
/// the current-thread runtime.
pub fn capture_logs() -> (DefaultGuard, LogBuffer) {
    let logs = LogBuffer::default();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(logs.clone())
        .with_max_level(tracing::Level::DEBUG)
        .with_ansi(false)
        .finish();
    (tracing::subscriber::set_default(subscriber), logs)
}
