use super::pending_counts::PendingCountsProjection;
use crate::application::ports::offline_store::{Collection, OfflineStore, SettleOutcome};
use crate::domain::entities::offline::{
    MutationDraft, PendingAttachment, PendingCounts, PendingMutation,
};
use crate::domain::value_objects::offline::{
    AttachmentFile, EntityId, MutationAction, QueueItemStatus, RecordKey,
};
use crate::shared::config::AttachmentConfig;
use crate::shared::error::AppError;
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Mutex;

#[derive(Debug, Clone)]
pub struct AttachmentPolicy {
    pub max_bytes: u64,
    pub max_per_entity: u32,
    pub content_type_prefix: String,
}

impl AttachmentPolicy {
    pub fn from_config(config: &AttachmentConfig) -> Self {
        Self {
            max_bytes: config.max_bytes,
            max_per_entity: config.max_per_entity,
            content_type_prefix: config.content_type_prefix.clone(),
        }
    }

    fn check(&self, file: &AttachmentFile, already_queued: usize) -> Result<(), AppError> {
        if let Some(content_type) = &file.content_type {
            if !self.content_type_prefix.is_empty()
                && !content_type.starts_with(&self.content_type_prefix)
            {
                return Err(AppError::ValidationError(format!(
                    "{} is not an accepted file type",
                    file.file_name
                )));
            }
        }
        if file.len() as u64 > self.max_bytes {
            return Err(AppError::ValidationError(format!(
                "{} exceeds the {} MB limit",
                file.file_name,
                self.max_bytes / (1024 * 1024)
            )));
        }
        if already_queued >= self.max_per_entity as usize {
            return Err(AppError::ValidationError(format!(
                "At most {} photos can be attached",
                self.max_per_entity
            )));
        }
        Ok(())
    }
}

impl Default for AttachmentPolicy {
    fn default() -> Self {
        Self::from_config(&AttachmentConfig::default())
    }
}

#[async_trait]
pub trait OfflineQueueServiceTrait: Send + Sync {
    async fn enqueue_mutation(&self, draft: MutationDraft) -> Result<EntityId, AppError>;
    async fn enqueue_attachment(
        &self,
        owner: &EntityId,
        file: AttachmentFile,
    ) -> Result<RecordKey, AppError>;
    async fn list_pending_mutations(&self) -> Result<Vec<PendingMutation>, AppError>;
    async fn list_pending_attachments(
        &self,
        owner: Option<&RecordKey>,
    ) -> Result<Vec<PendingAttachment>, AppError>;
    async fn dequeue_mutation(&self, id: &RecordKey) -> Result<bool, AppError>;
    async fn dequeue_attachment(&self, id: &RecordKey) -> Result<bool, AppError>;
    async fn release_held(&self, id: &RecordKey) -> Result<(), AppError>;
    async fn discard_mutation(&self, id: &RecordKey) -> Result<bool, AppError>;
    async fn clear_all(&self) -> Result<(), AppError>;
    async fn pending_counts(&self) -> Result<PendingCounts, AppError>;
}

/// Storage-side half of the offline subsystem. Nothing here talks to the remote store.
pub struct OfflineQueueService {
    store: Arc<dyn OfflineStore>,
    counts: Arc<PendingCountsProjection>,
    policy: AttachmentPolicy,
    // Serializes read-modify-write cycles (coalescing, settling) on the store.
    gate: Mutex<()>,
    storage_reported: AtomicBool,
}

impl OfflineQueueService {
    pub fn new(
        store: Arc<dyn OfflineStore>,
        counts: Arc<PendingCountsProjection>,
        policy: AttachmentPolicy,
    ) -> Self {
        Self {
            store,
            counts,
            policy,
            gate: Mutex::new(()),
            storage_reported: AtomicBool::new(false),
        }
    }

    pub fn counts(&self) -> Arc<PendingCountsProjection> {
        Arc::clone(&self.counts)
    }

    pub async fn get_mutation(&self, id: &RecordKey) -> Result<Option<PendingMutation>, AppError> {
        self.observe(self.store.get_mutation(id).await)
    }

    /// Close out a mutation whose remote call succeeded.
    pub async fn settle_mutation(
        &self,
        id: &RecordKey,
        revision: u32,
    ) -> Result<SettleOutcome, AppError> {
        let outcome = {
            let _guard = self.gate.lock().await;
            self.observe(self.store.settle_mutation(id, revision).await)?
        };

        if outcome == SettleOutcome::Superseded {
            tracing::debug!(
                target: "offline::queue",
                id = %id,
                revision,
                "mutation edited during sync; kept for the next pass"
            );
        }
        self.refresh_counts().await;
        Ok(outcome)
    }

    /// Record a failed replay. Rejections are held when `hold` is set; everything else stays queued.
    pub async fn record_mutation_failure(
        &self,
        id: &RecordKey,
        error: &str,
        hold: bool,
    ) -> Result<(), AppError> {
        let _guard = self.gate.lock().await;
        self.observe(
            self.store
                .record_mutation_attempt(id, error, Utc::now().timestamp_millis())
                .await,
        )?;
        if hold {
            self.observe(
                self.store
                    .set_mutation_status(id, QueueItemStatus::Held, Some(error))
                    .await,
            )?;
        }
        drop(_guard);

        if hold {
            self.refresh_counts().await;
        }
        Ok(())
    }

    /// Re-point an owner's queued attachments once the owner exists remotely.
    pub async fn confirm_attachment_owner(
        &self,
        local: &RecordKey,
        confirmed: &RecordKey,
    ) -> Result<u64, AppError> {
        let _guard = self.gate.lock().await;
        self.observe(self.store.confirm_attachment_owner(local, confirmed).await)
    }

    /// Remember where an attachment is uploaded before the first attempt.
    pub async fn assign_storage_path(&self, id: &RecordKey, path: &str) -> Result<(), AppError> {
        let assigned = self.observe(self.store.assign_storage_path(id, path).await)?;
        if !assigned {
            return Err(AppError::NotFound(format!("Attachment {id} is no longer queued")));
        }
        Ok(())
    }

    pub async fn record_attachment_failure(
        &self,
        id: &RecordKey,
        error: &str,
    ) -> Result<(), AppError> {
        self.observe(self.store.record_attachment_attempt(id, error).await)
    }

    pub async fn refresh_counts(&self) -> PendingCounts {
        match self.counts.refresh().await {
            Ok(counts) => counts,
            Err(err) => {
                let _ = self.observe::<()>(Err(err));
                self.counts.current()
            }
        }
    }

    fn observe<T>(&self, result: Result<T, AppError>) -> Result<T, AppError> {
        if let Err(AppError::StorageUnavailable(reason)) = &result {
            if !self.storage_reported.swap(true, Ordering::SeqCst) {
                tracing::error!(
                    target: "offline::queue",
                    reason = %reason,
                    "offline storage unavailable; offline writes are disabled"
                );
            }
        }
        result
    }

    async fn store_mutation(&self, draft: MutationDraft) -> Result<PendingMutation, AppError> {
        let MutationDraft {
            id,
            table,
            action,
            payload,
        } = draft;

        let key = match (id, action) {
            (Some(key), _) => key,
            (None, MutationAction::Create) => RecordKey::generate(),
            (None, other) => {
                return Err(AppError::ValidationError(format!(
                    "An id is required to queue a {other} mutation"
                )));
            }
        };

        let _guard = self.gate.lock().await;

        let record = match self.observe(self.store.get_mutation(&key).await)? {
            Some(mut existing) => {
                if existing.table != table {
                    return Err(AppError::ValidationError(format!(
                        "Entity {key} is already queued for table {}",
                        existing.table
                    )));
                }
                existing
                    .absorb(action, payload)
                    .map_err(AppError::ValidationError)?;
                existing
            }
            None => PendingMutation::new(
                key.clone(),
                table,
                action,
                payload,
                Utc::now().timestamp_millis(),
            ),
        };

        if record.action == MutationAction::Delete {
            let dropped = self.observe(self.store.delete_attachments_by_owner(&key).await)?;
            if dropped > 0 {
                tracing::debug!(
                    target: "offline::queue",
                    id = %key,
                    dropped,
                    "dropped queued attachments of deleted entity"
                );
            }
        }

        self.observe(self.store.put_mutation(&record).await)?;
        Ok(record)
    }
}

#[async_trait]
impl OfflineQueueServiceTrait for OfflineQueueService {
    async fn enqueue_mutation(&self, draft: MutationDraft) -> Result<EntityId, AppError> {
        let record = self.store_mutation(draft).await?;

        tracing::debug!(
            target: "offline::queue",
            id = %record.id,
            action = record.action.as_str(),
            revision = record.revision,
            "mutation queued"
        );
        self.refresh_counts().await;
        Ok(EntityId::ClientProvisional(record.id))
    }

    async fn enqueue_attachment(
        &self,
        owner: &EntityId,
        file: AttachmentFile,
    ) -> Result<RecordKey, AppError> {
        let owner_key = owner.key().clone();
        let attachment = {
            let _guard = self.gate.lock().await;

            if let Some(pending) = self.observe(self.store.get_mutation(&owner_key).await)? {
                if pending.action == MutationAction::Delete {
                    return Err(AppError::ValidationError(format!(
                        "Entity {owner_key} is queued for deletion"
                    )));
                }
            }

            let queued = self
                .observe(self.store.list_attachments_by_owner(&owner_key).await)?
                .len();
            self.policy.check(&file, queued)?;

            let attachment = PendingAttachment::new(
                RecordKey::generate(),
                owner_key,
                owner.is_confirmed(),
                file,
                Utc::now().timestamp_millis(),
            );
            self.observe(self.store.put_attachment(&attachment).await)?;
            attachment
        };

        tracing::debug!(
            target: "offline::queue",
            id = %attachment.id,
            owner = %attachment.owner_entity_id,
            bytes = attachment.file.len(),
            "attachment queued"
        );
        self.refresh_counts().await;
        Ok(attachment.id)
    }

    async fn list_pending_mutations(&self) -> Result<Vec<PendingMutation>, AppError> {
        self.observe(self.store.list_mutations().await)
    }

    async fn list_pending_attachments(
        &self,
        owner: Option<&RecordKey>,
    ) -> Result<Vec<PendingAttachment>, AppError> {
        match owner {
            Some(owner) => self.observe(self.store.list_attachments_by_owner(owner).await),
            None => self.observe(self.store.list_attachments().await),
        }
    }

    async fn dequeue_mutation(&self, id: &RecordKey) -> Result<bool, AppError> {
        let removed = {
            let _guard = self.gate.lock().await;
            self.observe(self.store.delete(Collection::Mutations, id).await)?
        };
        self.refresh_counts().await;
        Ok(removed)
    }

    async fn dequeue_attachment(&self, id: &RecordKey) -> Result<bool, AppError> {
        let removed = self.observe(self.store.delete(Collection::Attachments, id).await)?;
        self.refresh_counts().await;
        Ok(removed)
    }

    async fn release_held(&self, id: &RecordKey) -> Result<(), AppError> {
        {
            let _guard = self.gate.lock().await;
            let mutation = self
                .observe(self.store.get_mutation(id).await)?
                .ok_or_else(|| AppError::NotFound(format!("No pending mutation {id}")))?;
            if !mutation.is_held() {
                return Err(AppError::InvalidInput(format!(
                    "Mutation {id} is not waiting for a retry"
                )));
            }
            self.observe(
                self.store
                    .set_mutation_status(id, QueueItemStatus::Queued, None)
                    .await,
            )?;
        }

        tracing::info!(target: "offline::queue", id = %id, "held mutation released for retry");
        self.refresh_counts().await;
        Ok(())
    }

    async fn discard_mutation(&self, id: &RecordKey) -> Result<bool, AppError> {
        let (removed, attachments) = {
            let _guard = self.gate.lock().await;
            let removed = self.observe(self.store.delete(Collection::Mutations, id).await)?;
            let attachments = self.observe(self.store.delete_attachments_by_owner(id).await)?;
            (removed, attachments)
        };

        if removed || attachments > 0 {
            tracing::info!(
                target: "offline::queue",
                id = %id,
                attachments,
                "pending mutation discarded"
            );
        }
        self.refresh_counts().await;
        Ok(removed || attachments > 0)
    }

    async fn clear_all(&self) -> Result<(), AppError> {
        {
            let _guard = self.gate.lock().await;
            self.observe(self.store.clear(Collection::Mutations).await)?;
            self.observe(self.store.clear(Collection::Attachments).await)?;
        }
        tracing::info!(target: "offline::queue", "pending queues cleared");
        self.refresh_counts().await;
        Ok(())
    }

    async fn pending_counts(&self) -> Result<PendingCounts, AppError> {
        let counts = self.observe(self.counts.refresh().await)?;
        Ok(counts)
    }
}
