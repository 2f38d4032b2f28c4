use super::rows::{PendingAttachmentRow, PendingMutationRow};
use crate::domain::entities::offline::{PendingAttachment, PendingMutation};
use crate::domain::value_objects::offline::{
    AttachmentFile, EntityPayload, EntityTable, MutationAction, QueueItemStatus, RecordKey,
};
use crate::shared::error::AppError;

pub fn pending_mutation_from_row(row: PendingMutationRow) -> Result<PendingMutation, AppError> {
    let id = RecordKey::new(row.id).map_err(AppError::DeserializationError)?;
    let table = EntityTable::new(row.entity_table).map_err(AppError::DeserializationError)?;
    let action = row
        .action
        .parse::<MutationAction>()
        .map_err(AppError::DeserializationError)?;
    let payload = EntityPayload::from_json_str(&row.payload).map_err(|err| {
        AppError::DeserializationError(format!("Queued payload for {id} is corrupt: {err}"))
    })?;

    Ok(PendingMutation {
        id,
        table,
        action,
        payload,
        enqueued_at: row.enqueued_at,
        revision: to_u32(row.revision, "revision")?,
        status: QueueItemStatus::from(row.status.as_str()),
        attempt_count: to_u32(row.attempt_count, "attempt_count")?,
        last_error: row.last_error,
        last_attempt_at: row.last_attempt_at,
    })
}

pub fn pending_attachment_from_row(
    row: PendingAttachmentRow,
) -> Result<PendingAttachment, AppError> {
    let id = RecordKey::new(row.id).map_err(AppError::DeserializationError)?;
    let owner_entity_id =
        RecordKey::new(row.owner_entity_id).map_err(AppError::DeserializationError)?;
    let file = AttachmentFile::new(row.file_name, row.content_type, row.content)
        .map_err(AppError::DeserializationError)?;

    Ok(PendingAttachment {
        id,
        owner_entity_id,
        owner_confirmed: row.owner_confirmed,
        file,
        enqueued_at: row.enqueued_at,
        attempt_count: to_u32(row.attempt_count, "attempt_count")?,
        last_error: row.last_error,
        storage_path: row.storage_path,
    })
}

fn to_u32(value: i64, column: &str) -> Result<u32, AppError> {
    u32::try_from(value)
        .map_err(|_| AppError::DeserializationError(format!("{column} out of range: {value}")))
}
