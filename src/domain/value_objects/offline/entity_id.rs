use super::RecordKey;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identity of an entity as far as this device knows it.
///
/// Ids handed out by the offline queue are `ClientProvisional` until a sync pass
/// confirms the row on the server; only the synchronizer produces `ServerConfirmed`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "key", rename_all = "snake_case")]
pub enum EntityId {
    ClientProvisional(RecordKey),
    ServerConfirmed(RecordKey),
}

impl EntityId {
    pub fn key(&self) -> &RecordKey {
        match self {
            EntityId::ClientProvisional(key) | EntityId::ServerConfirmed(key) => key,
        }
    }

    pub fn into_key(self) -> RecordKey {
        match self {
            EntityId::ClientProvisional(key) | EntityId::ServerConfirmed(key) => key,
        }
    }

    pub fn is_confirmed(&self) -> bool {
        matches!(self, EntityId::ServerConfirmed(_))
    }

    /// Promote to a confirmed id, preferring the key the server echoed back.
    pub fn confirm(self, server_key: Option<RecordKey>) -> EntityId {
        EntityId::ServerConfirmed(server_key.unwrap_or_else(|| self.into_key()))
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.key())
    }
}
