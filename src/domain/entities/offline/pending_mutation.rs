use crate::domain::value_objects::offline::{
    EntityPayload, EntityTable, MutationAction, QueueItemStatus, RecordKey,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Write requested by feature code, before it is keyed and queued.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MutationDraft {
    pub id: Option<RecordKey>,
    pub table: EntityTable,
    pub action: MutationAction,
    pub payload: EntityPayload,
}

impl MutationDraft {
    pub fn create(table: EntityTable, payload: EntityPayload) -> Self {
        Self {
            id: None,
            table,
            action: MutationAction::Create,
            payload,
        }
    }

    pub fn update(table: EntityTable, id: RecordKey, payload: EntityPayload) -> Self {
        Self {
            id: Some(id),
            table,
            action: MutationAction::Update,
            payload,
        }
    }

    pub fn delete(table: EntityTable, id: RecordKey) -> Self {
        Self {
            id: Some(id),
            table,
            action: MutationAction::Delete,
            payload: EntityPayload::empty(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PendingMutation {
    pub id: RecordKey,
    pub table: EntityTable,
    pub action: MutationAction,
    pub payload: EntityPayload,
    pub enqueued_at: i64,
    pub revision: u32,
    pub status: QueueItemStatus,
    pub attempt_count: u32,
    pub last_error: Option<String>,
    pub last_attempt_at: Option<i64>,
}

impl PendingMutation {
    pub fn new(
        id: RecordKey,
        table: EntityTable,
        action: MutationAction,
        mut payload: EntityPayload,
        enqueued_at: i64,
    ) -> Self {
        if action == MutationAction::Create {
            payload.insert("id", Value::String(id.to_string()));
        }
        Self {
            id,
            table,
            action,
            payload,
            enqueued_at,
            revision: 1,
            status: QueueItemStatus::Queued,
            attempt_count: 0,
            last_error: None,
            last_attempt_at: None,
        }
    }

    pub fn is_held(&self) -> bool {
        self.status == QueueItemStatus::Held
    }

    /// Fold a later write for the same id into this record.
    ///
    /// Returns the action the record ends up with. A write after a queued delete
    /// is refused because the entity no longer exists.
    pub fn absorb(
        &mut self,
        action: MutationAction,
        payload: EntityPayload,
    ) -> Result<MutationAction, String> {
        let next = match (self.action, action) {
            (MutationAction::Delete, MutationAction::Delete) => MutationAction::Delete,
            (MutationAction::Delete, _) => {
                return Err(format!(
                    "Entity {} has a pending delete; no further writes are accepted",
                    self.id
                ));
            }
            (_, MutationAction::Delete) => MutationAction::Delete,
            (MutationAction::Create, _) => MutationAction::Create,
            (MutationAction::Update, _) => MutationAction::Update,
        };

        if next == MutationAction::Delete {
            self.payload = EntityPayload::empty();
        } else {
            self.payload.merge(payload);
            if next == MutationAction::Create {
                self.payload.insert("id", Value::String(self.id.to_string()));
            }
        }

        self.action = next;
        self.revision = self.revision.saturating_add(1);
        self.status = QueueItemStatus::Queued;
        self.last_error = None;
        Ok(next)
    }
}
