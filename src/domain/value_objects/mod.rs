pub mod offline;

pub use offline::{
    AttachmentFile, EntityId, EntityPayload, EntityTable, MutationAction, QueueItemStatus,
    RecordKey,
};
