use crate::domain::value_objects::offline::{AttachmentFile, RecordKey};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PendingAttachment {
    pub id: RecordKey,
    pub owner_entity_id: RecordKey,
    pub owner_confirmed: bool,
    pub file: AttachmentFile,
    pub enqueued_at: i64,
    pub attempt_count: u32,
    pub last_error: Option<String>,
    /// Set before the first upload so a retry reuses the same object.
    pub storage_path: Option<String>,
}

impl PendingAttachment {
    pub fn new(
        id: RecordKey,
        owner_entity_id: RecordKey,
        owner_confirmed: bool,
        file: AttachmentFile,
        enqueued_at: i64,
    ) -> Self {
        Self {
            id,
            owner_entity_id,
            owner_confirmed,
            file,
            enqueued_at,
            attempt_count: 0,
            last_error: None,
            storage_path: None,
        }
    }

    /// Object storage path, `{owner}/{timestamp}.{ext}`.
    pub fn object_path(&self, timestamp_ms: i64) -> String {
        format!(
            "{}/{}.{}",
            self.owner_entity_id,
            timestamp_ms,
            self.file.extension()
        )
    }

    /// Timestamp embedded in the persisted storage path, if any.
    pub fn path_stamp(&self) -> Option<i64> {
        let file = self.storage_path.as_deref()?.rsplit('/').next()?;
        file.split('.').next()?.parse().ok()
    }
}
