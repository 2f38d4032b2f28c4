use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingCounts {
    pub mutations: u64,
    pub attachments: u64,
    /// Subset of `mutations` waiting on the user after a rejection.
    pub held_mutations: u64,
}

impl PendingCounts {
    pub fn new(mutations: u64, attachments: u64, held_mutations: u64) -> Self {
        Self {
            mutations,
            attachments,
            held_mutations,
        }
    }

    pub fn has_pending_changes(&self) -> bool {
        self.mutations + self.attachments > 0
    }

    pub fn total(&self) -> u64 {
        self.mutations + self.attachments
    }
}
