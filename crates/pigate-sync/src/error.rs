use crate::engine::SyncReport;
use pigate_network::MessagingError;
use pigate_storage::StorageError;
use thiserror::Error;

/// Result type alias for sync operations.
pub type Result<T> = std::result::Result<T, SyncError>;

/// Errors raised while ingesting the tabular credential feed.
#[derive(Debug, Error)]
pub enum FeedError {
    #[error("Feed has no header row")]
    Empty,

    #[error("Feed is missing required column {0:?}")]
    MissingColumn(&'static str),

    #[error("Malformed feed at line {line}: {message}")]
    Malformed { line: usize, message: String },

    #[error("Failed to read feed: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised by reconciliation and its upstream sources.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The upstream source could not produce a credential set.
    #[error("Upstream {source_name} failed: {message}")]
    Upstream {
        source_name: String,
        message: String,
    },

    #[error("Object {key:?} not found")]
    ObjectNotFound { key: String },

    #[error("Invalid object key {0:?}")]
    InvalidKey(String),

    #[error("Snapshot decode error: {0}")]
    Decode(#[from] serde_json::Error),

    #[error(transparent)]
    Feed(#[from] FeedError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Messaging(#[from] MessagingError),

    #[error("{operation} timed out after {timeout_ms}ms")]
    Timeout {
        operation: &'static str,
        timeout_ms: u64,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Some records could not be applied; the rest were committed.
    #[error("Sync partially applied, {} record(s) failed", failed_codes.len())]
    Partial {
        failed_codes: Vec<String>,
        report: SyncReport,
    },
}

impl SyncError {
    pub fn upstream(source_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Upstream {
            source_name: source_name.into(),
            message: message.into(),
        }
    }

    pub(crate) fn timeout(operation: &'static str, timeout: std::time::Duration) -> Self {
        Self::Timeout {
            operation,
            timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
        }
    }
}
