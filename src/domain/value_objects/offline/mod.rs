pub mod attachment_file;
pub mod entity_id;
pub mod entity_table;
pub mod mutation_action;
pub mod payload;
pub mod queue_item_status;
pub mod record_key;

pub use attachment_file::AttachmentFile;
pub use entity_id::EntityId;
pub use entity_table::EntityTable;
pub use mutation_action::MutationAction;
pub use payload::EntityPayload;
pub use queue_item_status::QueueItemStatus;
pub use record_key::RecordKey;
