use crate::application::ports::connectivity::ConnectivityStatus;
use crate::application::services::offline_queue_service::OfflineQueueServiceTrait;
use crate::application::services::sync_service::SyncService;
use crate::domain::entities::offline::{MutationDraft, PendingMutation, SyncOutcome};
use crate::domain::value_objects::offline::{
    AttachmentFile, EntityId, EntityPayload, EntityTable, MutationAction, RecordKey,
};
use crate::presentation::dto::Validate;
use crate::presentation::dto::offline::{
    EnqueueAttachmentRequest, EnqueueMutationRequest, EnqueueResponse, OfflineStatusResponse,
    PendingMutationDto, SyncFailureDto, SyncResultResponse,
};
use crate::shared::AppError;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// UI-facing entry points. Everything goes through the services; the store is never touched here.
pub struct OfflineHandler {
    queue: Arc<dyn OfflineQueueServiceTrait>,
    sync: Arc<SyncService>,
    connectivity: Arc<dyn ConnectivityStatus>,
    default_table: EntityTable,
}

impl OfflineHandler {
    pub fn new(
        queue: Arc<dyn OfflineQueueServiceTrait>,
        sync: Arc<SyncService>,
        connectivity: Arc<dyn ConnectivityStatus>,
        default_table: EntityTable,
    ) -> Self {
        Self {
            queue,
            sync,
            connectivity,
            default_table,
        }
    }

    pub async fn status(&self) -> Result<OfflineStatusResponse, AppError> {
        let counts = self.queue.pending_counts().await?;
        let status = self.sync.status().await;

        Ok(OfflineStatusResponse {
            is_online: self.connectivity.is_online(),
            has_pending_changes: counts.has_pending_changes(),
            pending_mutation_count: counts.mutations,
            pending_attachment_count: counts.attachments,
            held_mutation_count: counts.held_mutations,
            sync_in_progress: status.is_syncing,
            sync_state: status.state.as_str().to_string(),
            last_sync_at: status.last_sync.map(|at| at.timestamp_millis()),
        })
    }

    pub async fn trigger_sync(&self) -> Result<SyncResultResponse, AppError> {
        let outcome = self.sync.trigger_sync().await?;
        Ok(map_sync_outcome(outcome))
    }

    pub async fn enqueue_mutation(
        &self,
        request: EnqueueMutationRequest,
    ) -> Result<EnqueueResponse, AppError> {
        request.validate().map_err(AppError::ValidationError)?;

        let action = request
            .action
            .parse::<MutationAction>()
            .map_err(AppError::InvalidInput)?;
        let table = match request.table.as_deref() {
            Some(table) => EntityTable::new(table.to_string()).map_err(AppError::InvalidInput)?,
            None => self.default_table.clone(),
        };
        let id = request
            .entity_id
            .as_deref()
            .map(parse_record_key)
            .transpose()?;
        let payload = match (action, request.payload) {
            (MutationAction::Delete, _) => EntityPayload::empty(),
            (_, value) => EntityPayload::new(value).map_err(AppError::ValidationError)?,
        };

        let entity_id = self
            .queue
            .enqueue_mutation(MutationDraft {
                id,
                table,
                action,
                payload,
            })
            .await?;

        Ok(EnqueueResponse {
            id: entity_id.key().to_string(),
            provisional: !entity_id.is_confirmed(),
        })
    }

    pub async fn enqueue_attachment(
        &self,
        request: EnqueueAttachmentRequest,
    ) -> Result<EnqueueResponse, AppError> {
        request.validate().map_err(AppError::ValidationError)?;

        let owner_key = parse_record_key(&request.owner_id)?;
        let owner = if request.owner_confirmed {
            EntityId::ServerConfirmed(owner_key)
        } else {
            EntityId::ClientProvisional(owner_key)
        };
        let bytes = BASE64_STANDARD
            .decode(request.data.as_bytes())
            .map_err(|e| AppError::InvalidInput(format!("Attachment data is not base64: {e}")))?;
        let file = AttachmentFile::new(request.file_name, request.content_type, bytes)
            .map_err(AppError::ValidationError)?;

        let id = self.queue.enqueue_attachment(&owner, file).await?;
        Ok(EnqueueResponse {
            id: id.to_string(),
            provisional: true,
        })
    }

    pub async fn list_pending_mutations(&self) -> Result<Vec<PendingMutationDto>, AppError> {
        let mutations = self.queue.list_pending_mutations().await?;
        let attachments = self.queue.list_pending_attachments(None).await?;

        let mut per_owner: HashMap<&str, usize> = HashMap::new();
        for attachment in &attachments {
            *per_owner
                .entry(attachment.owner_entity_id.as_str())
                .or_default() += 1;
        }

        Ok(mutations
            .into_iter()
            .map(|mutation| {
                let count = per_owner.get(mutation.id.as_str()).copied().unwrap_or(0);
                map_pending_mutation(mutation, count)
            })
            .collect())
    }

    pub async fn retry_held(&self, id: String) -> Result<(), AppError> {
        let key = parse_record_key(&id)?;
        self.queue.release_held(&key).await
    }

    pub async fn discard(&self, id: String) -> Result<bool, AppError> {
        let key = parse_record_key(&id)?;
        self.queue.discard_mutation(&key).await
    }
}

fn parse_record_key(value: &str) -> Result<RecordKey, AppError> {
    RecordKey::parse(value.trim()).map_err(AppError::InvalidInput)
}

fn map_pending_mutation(mutation: PendingMutation, pending_attachments: usize) -> PendingMutationDto {
    PendingMutationDto {
        id: mutation.id.to_string(),
        table: mutation.table.to_string(),
        action: mutation.action.as_str().to_string(),
        payload: Value::Object(mutation.payload.as_map().clone()),
        enqueued_at: mutation.enqueued_at,
        revision: mutation.revision,
        status: mutation.status.as_str().to_string(),
        attempt_count: mutation.attempt_count,
        last_error: mutation.last_error,
        pending_attachments,
    }
}

fn map_sync_outcome(outcome: SyncOutcome) -> SyncResultResponse {
    let (label, report) = match outcome {
        SyncOutcome::Skipped(reason) => {
            return SyncResultResponse {
                outcome: "skipped".to_string(),
                skip_reason: Some(reason.as_str().to_string()),
                confirmed_ids: Vec::new(),
                uploaded_attachments: 0,
                skipped_attachments: 0,
                failures: Vec::new(),
                remaining_mutations: 0,
                remaining_attachments: 0,
            };
        }
        SyncOutcome::Completed(report) => ("completed", report),
        SyncOutcome::Partial(report) => ("partial", report),
    };

    SyncResultResponse {
        outcome: label.to_string(),
        skip_reason: None,
        confirmed_ids: report
            .confirmed
            .iter()
            .map(|id| id.key().to_string())
            .collect(),
        uploaded_attachments: report.uploaded_attachments,
        skipped_attachments: report.skipped_attachments,
        failures: report
            .failures
            .into_iter()
            .map(|failure| SyncFailureDto {
                item_id: failure.item_id.to_string(),
                kind: failure.kind.as_str().to_string(),
                message: failure.message,
            })
            .collect(),
        remaining_mutations: report.remaining.mutations,
        remaining_attachments: report.remaining.attachments,
    }
}
