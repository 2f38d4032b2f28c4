use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Field map sent as the body of a create or update call.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct EntityPayload(Map<String, Value>);

impl EntityPayload {
    pub fn new(value: Value) -> Result<Self, String> {
        match value {
            Value::Object(map) => Ok(Self(map)),
            Value::Null => Err("Entity payload cannot be null".to_string()),
            _ => Err("Entity payload must be a JSON object".to_string()),
        }
    }

    pub fn from_json_str(json: &str) -> Result<Self, String> {
        let value: Value =
            serde_json::from_str(json).map_err(|e| format!("Invalid JSON payload: {e}"))?;
        Self::new(value)
    }

    pub fn empty() -> Self {
        Self(Map::new())
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    pub fn insert(&mut self, field: impl Into<String>, value: Value) -> Option<Value> {
        self.0.insert(field.into(), value)
    }

    /// Overlay `other` onto this payload; fields in `other` win.
    pub fn merge(&mut self, other: EntityPayload) {
        for (field, value) in other.0 {
            self.0.insert(field, value);
        }
    }

    pub fn to_json_string(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(&self.0)
    }
}

impl From<Map<String, Value>> for EntityPayload {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}
