use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum QueueItemStatus {
    Queued,
    /// Rejected by the server; waits for the user to retry or discard it.
    Held,
    Unknown(String),
}

impl QueueItemStatus {
    pub fn as_str(&self) -> &str {
        match self {
            QueueItemStatus::Queued => "queued",
            QueueItemStatus::Held => "held",
            QueueItemStatus::Unknown(value) => value.as_str(),
        }
    }

    pub fn is_replayable(&self) -> bool {
        matches!(self, QueueItemStatus::Queued)
    }
}

impl From<&str> for QueueItemStatus {
    fn from(value: &str) -> Self {
        match value {
            "queued" => QueueItemStatus::Queued,
            "held" => QueueItemStatus::Held,
            other => QueueItemStatus::Unknown(other.to_string()),
        }
    }
}
