pub mod offline;

pub use offline::{
    FailureKind, MutationDraft, PendingAttachment, PendingCounts, PendingMutation, SkipReason,
    SyncFailure, SyncOutcome, SyncReport, SyncState,
};
