use async_trait::async_trait;
use inspection_sync_lib::application::ports::remote_data_api::{
    ObjectRef, RemoteDataApi, RemoteError, RemoteRecord,
};
use inspection_sync_lib::domain::value_objects::offline::{EntityPayload, EntityTable, RecordKey};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;
use tokio::sync::Notify;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteCall {
    Create { table: String, id: Option<String> },
    Update { table: String, id: String },
    Delete { table: String, id: String },
    Upload { bucket: String, path: String },
    PublicReference { path: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    Create,
    Update,
    Delete,
}

struct Pause {
    id: String,
    entered: Arc<Notify>,
    release: Arc<Notify>,
}

/// In-memory stand-in for the hosted tables and object storage. Keyed creates merge into an
/// existing row and uploads overwrite the object at their path, like the REST backend.
#[derive(Default)]
pub struct FakeRemote {
    calls: Mutex<Vec<RemoteCall>>,
    rows: Mutex<HashMap<String, Vec<Map<String, Value>>>>,
    objects: Mutex<Vec<ObjectRef>>,
    failures: Mutex<HashMap<(Op, String), RemoteError>>,
    upload_failure: Mutex<Option<RemoteError>>,
    pause: Mutex<Option<Pause>>,
    next_row: Mutex<u64>,
}

#[allow(dead_code)]
impl FakeRemote {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn fail(&self, op: Op, id: &str, error: RemoteError) {
        self.failures
            .lock()
            .unwrap()
            .insert((op, id.to_string()), error);
    }

    pub fn fail_uploads(&self, error: RemoteError) {
        *self.upload_failure.lock().unwrap() = Some(error);
    }

    pub fn heal(&self) {
        self.failures.lock().unwrap().clear();
        *self.upload_failure.lock().unwrap() = None;
    }

    /// Block the next create for `id` until `release` is notified. `entered` fires once the
    /// call is in flight.
    pub fn pause_create(&self, id: &str) -> (Arc<Notify>, Arc<Notify>) {
        let entered = Arc::new(Notify::new());
        let release = Arc::new(Notify::new());
        *self.pause.lock().unwrap() = Some(Pause {
            id: id.to_string(),
            entered: Arc::clone(&entered),
            release: Arc::clone(&release),
        });
        (entered, release)
    }

    pub fn calls(&self) -> Vec<RemoteCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().unwrap().clear();
    }

    pub fn rows(&self, table: &str) -> Vec<Map<String, Value>> {
        self.rows
            .lock()
            .unwrap()
            .get(table)
            .cloned()
            .unwrap_or_default()
    }

    pub fn row(&self, table: &str, id: &str) -> Option<Map<String, Value>> {
        self.rows(table)
            .into_iter()
            .find(|row| row.get("id").and_then(Value::as_str) == Some(id))
    }

    pub fn insert_row(&self, table: &str, row: Value) {
        if let Value::Object(map) = row {
            self.rows
                .lock()
                .unwrap()
                .entry(table.to_string())
                .or_default()
                .push(map);
        }
    }

    pub fn objects(&self) -> Vec<ObjectRef> {
        self.objects.lock().unwrap().clone()
    }

    fn record(&self, call: RemoteCall) {
        self.calls.lock().unwrap().push(call);
    }

    fn failure(&self, op: Op, id: Option<&str>) -> Option<RemoteError> {
        let id = id?;
        self.failures
            .lock()
            .unwrap()
            .get(&(op, id.to_string()))
            .cloned()
    }

    fn take_pause(&self, id: &str) -> Option<(Arc<Notify>, Arc<Notify>)> {
        let mut pause = self.pause.lock().unwrap();
        if pause.as_ref().is_some_and(|p| p.id == id) {
            pause.take().map(|p| (p.entered, p.release))
        } else {
            None
        }
    }
}

#[async_trait]
impl RemoteDataApi for FakeRemote {
    async fn create_entity(
        &self,
        table: &EntityTable,
        payload: &EntityPayload,
    ) -> Result<RemoteRecord, RemoteError> {
        let id = payload
            .get("id")
            .and_then(Value::as_str)
            .map(str::to_string);
        self.record(RemoteCall::Create {
            table: table.to_string(),
            id: id.clone(),
        });

        if let Some((entered, release)) = id.as_deref().and_then(|id| self.take_pause(id)) {
            entered.notify_one();
            release.notified().await;
        }
        if let Some(err) = self.failure(Op::Create, id.as_deref()) {
            return Err(err);
        }

        let mut row = payload.as_map().clone();
        let id = match id {
            Some(id) => id,
            None => {
                let mut next = self.next_row.lock().unwrap();
                *next += 1;
                format!("{}-{}", table, *next)
            }
        };
        row.insert("id".to_string(), Value::String(id.clone()));

        let mut rows = self.rows.lock().unwrap();
        let table_rows = rows.entry(table.to_string()).or_default();
        if let Some(existing) = table_rows
            .iter_mut()
            .find(|existing| existing.get("id").and_then(Value::as_str) == Some(id.as_str()))
        {
            for (field, value) in row {
                existing.insert(field, value);
            }
            return Ok(RemoteRecord::from_value(Value::Object(existing.clone())));
        }
        table_rows.push(row.clone());
        Ok(RemoteRecord::from_value(Value::Object(row)))
    }

    async fn update_entity(
        &self,
        table: &EntityTable,
        id: &RecordKey,
        payload: &EntityPayload,
    ) -> Result<RemoteRecord, RemoteError> {
        self.record(RemoteCall::Update {
            table: table.to_string(),
            id: id.to_string(),
        });
        if let Some(err) = self.failure(Op::Update, Some(id.as_str())) {
            return Err(err);
        }

        let mut rows = self.rows.lock().unwrap();
        let row = rows
            .get_mut(table.as_str())
            .and_then(|rows| {
                rows.iter_mut()
                    .find(|row| row.get("id").and_then(Value::as_str) == Some(id.as_str()))
            })
            .ok_or_else(|| RemoteError::Rejected {
                status: 404,
                message: format!("no row matched id {id}"),
            })?;
        for (field, value) in payload.as_map() {
            row.insert(field.clone(), value.clone());
        }
        Ok(RemoteRecord::from_value(Value::Object(row.clone())))
    }

    async fn delete_entity(&self, table: &EntityTable, id: &RecordKey) -> Result<(), RemoteError> {
        self.record(RemoteCall::Delete {
            table: table.to_string(),
            id: id.to_string(),
        });
        if let Some(err) = self.failure(Op::Delete, Some(id.as_str())) {
            return Err(err);
        }

        if let Some(rows) = self.rows.lock().unwrap().get_mut(table.as_str()) {
            rows.retain(|row| row.get("id").and_then(Value::as_str) != Some(id.as_str()));
        }
        Ok(())
    }

    async fn upload_binary(
        &self,
        bucket: &str,
        path: &str,
        _bytes: Vec<u8>,
        _content_type: Option<&str>,
    ) -> Result<ObjectRef, RemoteError> {
        self.record(RemoteCall::Upload {
            bucket: bucket.to_string(),
            path: path.to_string(),
        });
        if let Some(err) = self.upload_failure.lock().unwrap().clone() {
            return Err(err);
        }

        let object = ObjectRef {
            bucket: bucket.to_string(),
            path: path.to_string(),
        };
        let mut objects = self.objects.lock().unwrap();
        objects.retain(|existing| existing != &object);
        objects.push(object.clone());
        Ok(object)
    }

    async fn public_reference(&self, bucket: &str, path: &str) -> Result<String, RemoteError> {
        self.record(RemoteCall::PublicReference {
            path: path.to_string(),
        });
        Ok(format!("https://storage.test/{bucket}/{path}"))
    }
}
