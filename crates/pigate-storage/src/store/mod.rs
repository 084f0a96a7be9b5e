//! The credential store capability and its backends.
//!
//! One trait, interchangeable backends chosen at construction:
//!
//! - [`SqliteCredentialStore`]: the on-device cache (sqlx, embedded migrations)
//! - [`MemoryCredentialStore`]: in-process, with failure injection for tests
//! - [`AnyCredentialStore`]: enum dispatch over the two
//!
//! Batch operations apply each record on its own. A failing record is
//! reported in the [`BatchOutcome`] and never rolls back the others.

mod any;
mod memory;
mod sqlite;

pub use any::AnyCredentialStore;
pub use memory::MemoryCredentialStore;
pub use sqlite::SqliteCredentialStore;

use crate::error::{StorageError, StorageResult};
use pigate_core::{AccessTime, Credential, GateLog};
use std::future::Future;
use std::time::Duration;

/// Persistent credential, access window and audit log storage.
///
/// Futures are `Send` so a generic store can be shared with spawned tasks.
/// Missing records are `Ok(None)` from getters and silently ignored by
/// deletes.
pub trait CredentialStore: Send + Sync {
    /// Insert or overwrite the credential keyed by its code.
    fn put_credential(
        &self,
        credential: &Credential,
    ) -> impl Future<Output = StorageResult<()>> + Send;

    /// Insert or overwrite each credential independently.
    fn put_credentials(
        &self,
        credentials: &[Credential],
    ) -> impl Future<Output = BatchOutcome> + Send;

    fn get_credential(
        &self,
        code: &str,
    ) -> impl Future<Output = StorageResult<Option<Credential>>> + Send;

    fn get_all_credentials(&self) -> impl Future<Output = StorageResult<Vec<Credential>>> + Send;

    fn delete_credential(&self, code: &str) -> impl Future<Output = StorageResult<()>> + Send;

    /// Delete each code independently.
    fn delete_credentials(&self, codes: &[String]) -> impl Future<Output = BatchOutcome> + Send;

    /// Insert or overwrite the window of an access group.
    fn put_access_time(
        &self,
        access_time: &AccessTime,
    ) -> impl Future<Output = StorageResult<()>> + Send;

    fn get_access_time(
        &self,
        access_group: i64,
    ) -> impl Future<Output = StorageResult<Option<AccessTime>>> + Send;

    fn delete_access_time(&self, access_group: i64)
    -> impl Future<Output = StorageResult<()>> + Send;

    /// Append an audit entry.
    fn put_gate_log(&self, log: &GateLog) -> impl Future<Output = StorageResult<()>> + Send;

    /// All audit entries, oldest first.
    fn get_gate_logs(&self) -> impl Future<Output = StorageResult<Vec<GateLog>>> + Send;
}

/// Per-record failure of a batch operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchFailure {
    pub code: String,
    pub error: String,
}

/// Result of a batch operation: which codes were applied, which were not.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchOutcome {
    pub succeeded: Vec<String>,
    pub failed: Vec<BatchFailure>,
}

impl BatchOutcome {
    pub(crate) fn record(&mut self, code: &str, result: StorageResult<()>) {
        match result {
            Ok(()) => self.succeeded.push(code.to_string()),
            Err(e) => self.failed.push(BatchFailure {
                code: code.to_string(),
                error: e.to_string(),
            }),
        }
    }

    /// Every record was applied.
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn failed_codes(&self) -> Vec<String> {
        self.failed.iter().map(|f| f.code.clone()).collect()
    }
}

/// Run a store call under a deadline.
///
/// # Errors
///
/// Returns `StorageError::Timeout` naming `operation` when the deadline
/// passes, or the call's own error.
pub async fn with_timeout<T, F>(operation: &'static str, timeout: Duration, call: F) -> StorageResult<T>
where
    F: Future<Output = StorageResult<T>>,
{
    match tokio::time::timeout(timeout, call).await {
        Ok(result) => result,
        Err(_) => Err(StorageError::Timeout {
            operation,
            timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
        }),
    }
}
