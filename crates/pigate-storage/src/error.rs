use thiserror::Error;

/// Storage-specific error types for the PiGate credential cache.
///
/// These errors represent failures of the local store. The access evaluator
/// turns every one of them into a deny decision.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Database connection or query execution failed
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Migration execution failed
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A stored row could not be converted into a domain value
    #[error("Corrupt {entity} row: {message}")]
    CorruptRow { entity: &'static str, message: String },

    /// Data validation failed
    #[error("Validation error: {0}")]
    Validation(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A store call did not finish within its deadline
    #[error("Store operation {operation} timed out after {timeout_ms}ms")]
    Timeout {
        operation: &'static str,
        timeout_ms: u64,
    },

    /// The backend is not reachable
    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

impl StorageError {
    pub(crate) fn corrupt(entity: &'static str, message: impl Into<String>) -> Self {
        Self::CorruptRow {
            entity,
            message: message.into(),
        }
    }
}

impl From<pigate_core::Error> for StorageError {
    fn from(error: pigate_core::Error) -> Self {
        Self::Validation(error.to_string())
    }
}

/// Specialized result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;
