use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntityTable(String);

impl EntityTable {
    pub const REPORTS: &'static str = "reports";
    pub const PHOTOS: &'static str = "photos";

    pub fn new(value: String) -> Result<Self, String> {
        Self::validate(&value)?;
        Ok(Self(value))
    }

    pub fn reports() -> Self {
        Self(Self::REPORTS.to_string())
    }

    pub fn photos() -> Self {
        Self(Self::PHOTOS.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn validate(value: &str) -> Result<(), String> {
        if value.trim().is_empty() {
            return Err("Entity table cannot be empty".to_string());
        }
        if !value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
        {
            return Err(format!("Entity table '{value}' contains invalid characters"));
        }
        Ok(())
    }
}

impl fmt::Display for EntityTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<EntityTable> for String {
    fn from(value: EntityTable) -> Self {
        value.0
    }
}
