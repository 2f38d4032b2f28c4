use sqlx::FromRow;

#[derive(Debug, Clone, FromRow)]
pub struct PendingMutationRow {
    pub id: String,
    pub entity_table: String,
    pub action: String,
    pub payload: String,
    pub enqueued_at: i64,
    pub status: String,
    pub revision: i64,
    pub attempt_count: i64,
    pub last_error: Option<String>,
    pub last_attempt_at: Option<i64>,
}

#[derive(Debug, Clone, FromRow)]
pub struct PendingAttachmentRow {
    pub id: String,
    pub owner_entity_id: String,
    pub owner_confirmed: bool,
    pub file_name: String,
    pub content_type: Option<String>,
    pub content: Vec<u8>,
    pub enqueued_at: i64,
    pub attempt_count: i64,
    pub last_error: Option<String>,
    pub storage_path: Option<String>,
}
