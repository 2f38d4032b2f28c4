use crate::presentation::dto::Validate;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OfflineStatusResponse {
    pub is_online: bool,
    pub has_pending_changes: bool,
    pub pending_mutation_count: u64,
    pub pending_attachment_count: u64,
    pub held_mutation_count: u64,
    pub sync_in_progress: bool,
    pub sync_state: String,
    pub last_sync_at: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncFailureDto {
    pub item_id: String,
    pub kind: String,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncResultResponse {
    /// `completed`, `partial` or `skipped`.
    pub outcome: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skip_reason: Option<String>,
    pub confirmed_ids: Vec<String>,
    pub uploaded_attachments: u64,
    pub skipped_attachments: u64,
    pub failures: Vec<SyncFailureDto>,
    pub remaining_mutations: u64,
    pub remaining_attachments: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnqueueMutationRequest {
    pub entity_id: Option<String>,
    pub table: Option<String>,
    pub action: String,
    #[serde(default)]
    pub payload: Value,
}

impl Validate for EnqueueMutationRequest {
    fn validate(&self) -> Result<(), String> {
        if self.action.trim().is_empty() {
            return Err("Action is required".to_string());
        }
        let is_delete = self.action.trim().eq_ignore_ascii_case("delete");
        if !is_delete && !self.payload.is_object() {
            return Err("Payload must be a JSON object".to_string());
        }
        if !self.action.trim().eq_ignore_ascii_case("create")
            && self.entity_id.as_deref().is_none_or(|id| id.trim().is_empty())
        {
            return Err("Entity ID is required for update and delete".to_string());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnqueueResponse {
    pub id: String,
    pub provisional: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnqueueAttachmentRequest {
    pub owner_id: String,
    #[serde(default)]
    pub owner_confirmed: bool,
    pub file_name: String,
    pub content_type: Option<String>,
    /// Base64 encoded file content.
    pub data: String,
}

impl Validate for EnqueueAttachmentRequest {
    fn validate(&self) -> Result<(), String> {
        if self.owner_id.trim().is_empty() {
            return Err("Owner ID is required".to_string());
        }
        if self.file_name.trim().is_empty() {
            return Err("File name is required".to_string());
        }
        if self.data.is_empty() {
            return Err("Data is required".to_string());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingMutationDto {
    pub id: String,
    pub table: String,
    pub action: String,
    pub payload: Value,
    pub enqueued_at: i64,
    pub revision: u32,
    pub status: String,
    pub attempt_count: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    pub pending_attachments: usize,
}
