use crate::domain::entities::offline::{PendingAttachment, PendingCounts, PendingMutation};
use crate::domain::value_objects::offline::{QueueItemStatus, RecordKey};
use crate::shared::error::AppError;
use async_trait::async_trait;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Collection {
    Mutations,
    Attachments,
}

impl Collection {
    pub fn table_name(&self) -> &'static str {
        match self {
            Collection::Mutations => "pending_mutations",
            Collection::Attachments => "pending_attachments",
        }
    }
}

/// Result of closing out a mutation after its remote call succeeded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettleOutcome {
    Removed,
    /// The record was edited while the call was in flight and stays queued.
    Superseded,
    Missing,
}

#[async_trait]
pub trait OfflineStore: Send + Sync {
    async fn put_mutation(&self, mutation: &PendingMutation) -> Result<(), AppError>;
    async fn get_mutation(&self, id: &RecordKey) -> Result<Option<PendingMutation>, AppError>;
    async fn list_mutations(&self) -> Result<Vec<PendingMutation>, AppError>;

    async fn put_attachment(&self, attachment: &PendingAttachment) -> Result<(), AppError>;
    async fn list_attachments(&self) -> Result<Vec<PendingAttachment>, AppError>;
    async fn list_attachments_by_owner(
        &self,
        owner: &RecordKey,
    ) -> Result<Vec<PendingAttachment>, AppError>;
    async fn delete_attachments_by_owner(&self, owner: &RecordKey) -> Result<u64, AppError>;
    /// Point `from`'s attachments at the confirmed owner `to`.
    async fn confirm_attachment_owner(
        &self,
        from: &RecordKey,
        to: &RecordKey,
    ) -> Result<u64, AppError>;

    async fn assign_storage_path(&self, id: &RecordKey, path: &str) -> Result<bool, AppError>;

    async fn delete(&self, collection: Collection, id: &RecordKey) -> Result<bool, AppError>;
    async fn clear(&self, collection: Collection) -> Result<u64, AppError>;

    async fn settle_mutation(
        &self,
        id: &RecordKey,
        revision: u32,
    ) -> Result<SettleOutcome, AppError>;
    async fn record_mutation_attempt(
        &self,
        id: &RecordKey,
        error: &str,
        attempted_at: i64,
    ) -> Result<(), AppError>;
    async fn record_attachment_attempt(&self, id: &RecordKey, error: &str) -> Result<(), AppError>;
    async fn set_mutation_status(
        &self,
        id: &RecordKey,
        status: QueueItemStatus,
        error: Option<&str>,
    ) -> Result<bool, AppError>;

    async fn pending_counts(&self) -> Result<PendingCounts, AppError>;
}
