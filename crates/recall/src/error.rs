//! Error types for Recall

use std::time::Duration;

use thiserror::Error;

use crate::memory::types::MemoryType;

/// Main error type for engine operations
#[derive(Error, Debug)]
pub enum MemoryError {
    /// Caller-supplied data failed validation; never retried
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Storage backend failure
    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),

    /// Caller deadline expired before the operation finished
    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for engine operations
pub type Result<T> = std::result::Result<T, MemoryError>;

/// Rejections raised by the memory model and query construction.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("title must not be empty")]
    EmptyTitle,

    #[error("{0} must not be empty")]
    EmptyField(&'static str),

    #[error("expires_at is only allowed on Working memory, not {0}")]
    ExpiryNotAllowed(MemoryType),

    #[error("expires_at must be in the future")]
    ExpiryInPast,

    #[error("importance {0} is outside 0-10")]
    ImportanceOutOfRange(u8),

    #[error("limit {0} is outside 1-1000")]
    LimitOutOfRange(usize),

    #[error("time range start is after its end")]
    InvertedTimeRange,

    #[error("token budget must be at least 1")]
    ZeroTokenBudget,

    #[error("metadata key '{0}' is reserved")]
    ReservedMetadataKey(String),

    #[error("relevance score {0} is outside 0.0-1.0")]
    RelevanceOutOfRange(f32),

    #[error("invalid relationship: {0}")]
    InvalidRelationship(String),
}

/// Failures surfaced by a storage backend.
#[derive(Error, Debug, Clone)]
pub enum BackendError {
    /// Transient condition (locked database, interrupted I/O); safe to retry
    #[error("storage unavailable: {0}")]
    Unavailable(String),

    #[error("storage failure: {0}")]
    Storage(String),

    #[error("schema error: {0}")]
    Schema(String),

    #[error("corrupt record: {0}")]
    Corrupt(String),

    /// Operation needs a capability this backend does not have
    #[error("operation not supported by {backend} backend: {operation}")]
    Unsupported {
        backend: &'static str,
        operation: &'static str,
    },
}

impl BackendError {
    pub fn is_transient(&self) -> bool {
        matches!(self, BackendError::Unavailable(_))
    }
}

impl From<rusqlite::Error> for BackendError {
    fn from(e: rusqlite::Error) -> Self {
        use rusqlite::ErrorCode;

        match e.sqlite_error_code() {
            Some(ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked) => {
                BackendError::Unavailable(e.to_string())
            }
            Some(ErrorCode::SystemIoFailure) => BackendError::Unavailable(e.to_string()),
            _ => BackendError::Storage(e.to_string()),
        }
    }
}

impl From<tokio::task::JoinError> for BackendError {
    fn from(e: tokio::task::JoinError) -> Self {
        BackendError::Storage(format!("storage task failed: {e}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_error_display() {
        let err = ValidationError::LimitOutOfRange(5000);
        assert_eq!(err.to_string(), "limit 5000 is outside 1-1000");

        let err = ValidationError::ExpiryNotAllowed(MemoryType::Semantic);
        assert_eq!(
            err.to_string(),
            "expires_at is only allowed on Working memory, not Semantic"
        );
    }

    #[test]
    fn test_transient_classification() {
        assert!(BackendError::Unavailable("busy".into()).is_transient());
        assert!(!BackendError::Storage("disk full".into()).is_transient());
        assert!(
            !BackendError::Unsupported {
                backend: "relational",
                operation: "code_context"
            }
            .is_transient()
        );
    }

    #[test]
    fn test_memory_error_wraps_sources() {
        let err: MemoryError = ValidationError::EmptyTitle.into();
        assert!(matches!(err, MemoryError::Validation(ValidationError::EmptyTitle)));
        assert_eq!(err.to_string(), "Validation error: title must not be empty");

        let err: MemoryError = BackendError::Schema("v9".into()).into();
        assert!(err.to_string().contains("schema error: v9"));
    }
}
