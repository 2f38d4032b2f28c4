pub mod offline_queue_service;
pub mod pending_counts;
pub mod sync_service;

pub use offline_queue_service::{AttachmentPolicy, OfflineQueueService, OfflineQueueServiceTrait};
pub use pending_counts::PendingCountsProjection;
pub use sync_service::{SyncService, SyncSettings, SyncStatus, SyncTrigger};
