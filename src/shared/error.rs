use crate::application::ports::remote_data_api::RemoteError;
use std::fmt;

#[derive(Debug)]
pub enum AppError {
    Database(String),
    StorageUnavailable(String),
    RemoteRejected(String),
    RemoteUnreachable(String),
    OrderingViolation(String),
    NotFound(String),
    InvalidInput(String),
    ValidationError(String),
    ConfigurationError(String),
    SerializationError(String),
    DeserializationError(String),
    Internal(String),
}

impl AppError {
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Database(_) => "DATABASE_ERROR",
            AppError::StorageUnavailable(_) => "STORAGE_UNAVAILABLE",
            AppError::RemoteRejected(_) => "REMOTE_REJECTED",
            AppError::RemoteUnreachable(_) => "REMOTE_UNREACHABLE",
            AppError::OrderingViolation(_) => "ORDERING_VIOLATION",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::InvalidInput(_) => "INVALID_INPUT",
            AppError::ValidationError(_) => "VALIDATION_ERROR",
            AppError::ConfigurationError(_) => "CONFIGURATION_ERROR",
            AppError::SerializationError(_) => "SERIALIZATION_ERROR",
            AppError::DeserializationError(_) => "DESERIALIZATION_ERROR",
            AppError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Message safe to show in the UI.
    pub fn user_message(&self) -> String {
        match self {
            AppError::StorageUnavailable(_) => {
                "Offline writes are not supported on this device".to_string()
            }
            AppError::RemoteUnreachable(_) => {
                "The server could not be reached. Changes stay queued.".to_string()
            }
            AppError::RemoteRejected(msg) => format!("The server rejected the change: {msg}"),
            AppError::NotFound(msg)
            | AppError::InvalidInput(msg)
            | AppError::ValidationError(msg) => msg.clone(),
            _ => "An unexpected error occurred".to_string(),
        }
    }

    pub fn storage_unavailable(err: impl fmt::Display) -> Self {
        AppError::StorageUnavailable(err.to_string())
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Database(msg) => write!(f, "Database error: {}", msg),
            AppError::StorageUnavailable(msg) => write!(f, "Storage unavailable: {}", msg),
            AppError::RemoteRejected(msg) => write!(f, "Remote rejected: {}", msg),
            AppError::RemoteUnreachable(msg) => write!(f, "Remote unreachable: {}", msg),
            AppError::OrderingViolation(msg) => write!(f, "Ordering violation: {}", msg),
            AppError::NotFound(msg) => write!(f, "Not found: {}", msg),
            AppError::InvalidInput(msg) => write!(f, "Invalid input: {}", msg),
            AppError::ValidationError(msg) => write!(f, "Validation error: {}", msg),
            AppError::ConfigurationError(msg) => write!(f, "Configuration error: {}", msg),
            AppError::SerializationError(msg) => write!(f, "Serialization error: {}", msg),
            AppError::DeserializationError(msg) => write!(f, "Deserialization error: {}", msg),
            AppError::Internal(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl std::error::Error for AppError {}

// SQLite primary result codes: READONLY, IOERR, FULL, CANTOPEN.
const SQLITE_STORAGE_CODES: [i32; 4] = [8, 10, 13, 14];

/// Extended codes carry the primary code in the low byte.
fn is_storage_failure_code(code: Option<&str>) -> bool {
    code.and_then(|code| code.parse::<i32>().ok())
        .map(|code| SQLITE_STORAGE_CODES.contains(&(code & 0xff)))
        .unwrap_or(false)
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        let storage_failure = match &err {
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => true,
            sqlx::Error::Database(db) => is_storage_failure_code(db.code().as_deref()),
            _ => false,
        };

        if storage_failure {
            AppError::StorageUnavailable(err.to_string())
        } else {
            AppError::Database(err.to_string())
        }
    }
}

impl From<sqlx::migrate::MigrateError> for AppError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        AppError::StorageUnavailable(err.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::SerializationError(err.to_string())
    }
}

impl From<RemoteError> for AppError {
    fn from(err: RemoteError) -> Self {
        match err {
            RemoteError::Rejected { .. } => AppError::RemoteRejected(err.to_string()),
            RemoteError::Unreachable(_) => AppError::RemoteUnreachable(err.to_string()),
            RemoteError::InvalidResponse(msg) => AppError::DeserializationError(msg),
        }
    }
}

impl From<String> for AppError {
    fn from(err: String) -> Self {
        AppError::Internal(err)
    }
}

impl From<&str> for AppError {
    fn from(err: &str) -> Self {
        AppError::Internal(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
