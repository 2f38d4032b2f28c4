pub mod pending_attachment;
pub mod pending_counts;
pub mod pending_mutation;
pub mod sync_report;
pub mod sync_state;

pub use pending_attachment::PendingAttachment;
pub use pending_counts::PendingCounts;
pub use pending_mutation::{MutationDraft, PendingMutation};
pub use sync_report::{FailureKind, SkipReason, SyncFailure, SyncOutcome, SyncReport};
pub use sync_state::SyncState;
