use crate::domain::value_objects::offline::{EntityPayload, EntityTable, RecordKey};
use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RemoteError {
    /// The server understood the request and refused it. Replaying it unchanged will not help.
    #[error("Request rejected with status {status}: {message}")]
    Rejected { status: u16, message: String },

    #[error("Remote store unreachable: {0}")]
    Unreachable(String),

    #[error("Invalid response from remote store: {0}")]
    InvalidResponse(String),
}

impl RemoteError {
    /// Anything but an explicit refusal may succeed on a later attempt.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, RemoteError::Rejected { .. })
    }
}

/// Row returned by a create or update call.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteRecord {
    pub id: Option<RecordKey>,
    pub fields: Value,
}

impl RemoteRecord {
    pub fn from_value(fields: Value) -> Self {
        let id = fields
            .get("id")
            .and_then(|id| match id {
                Value::String(s) => RecordKey::parse(s).ok(),
                Value::Number(n) => RecordKey::parse(&n.to_string()).ok(),
                _ => None,
            });
        Self { id, fields }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectRef {
    pub bucket: String,
    pub path: String,
}

#[async_trait]
pub trait RemoteDataApi: Send + Sync {
    /// Insert a row. A payload carrying an `id` must behave as an upsert on that key.
    async fn create_entity(
        &self,
        table: &EntityTable,
        payload: &EntityPayload,
    ) -> Result<RemoteRecord, RemoteError>;

    async fn update_entity(
        &self,
        table: &EntityTable,
        id: &RecordKey,
        payload: &EntityPayload,
    ) -> Result<RemoteRecord, RemoteError>;

    async fn delete_entity(&self, table: &EntityTable, id: &RecordKey) -> Result<(), RemoteError>;

    /// Store an object, overwriting whatever is already at `path`.
    async fn upload_binary(
        &self,
        bucket: &str,
        path: &str,
        bytes: Vec<u8>,
        content_type: Option<&str>,
    ) -> Result<ObjectRef, RemoteError>;

    async fn public_reference(&self, bucket: &str, path: &str) -> Result<String, RemoteError>;
}
