//! # PiGate Storage
//!
//! Local credential cache for the PiGate edge controller.
//!
//! This crate holds the credentials, per-group access windows and the gate
//! audit trail the controller validates against while the upstream source is
//! out of reach, and the evaluator that turns a presented code into a
//! decision.
//!
//! ## Architecture
//!
//! - **Connection Management**: [`connection`] opens the SQLite pool (WAL
//!   mode) and runs the embedded migrations.
//! - **Store Contract**: [`store::CredentialStore`] with a SQLite backend, an
//!   in-memory backend, and an enum wrapper choosing between them.
//! - **Row Models**: [`models`] maps table rows to domain types, rejecting
//!   corrupt rows.
//! - **Evaluation**: [`evaluator::AccessEvaluator`] applies the locked-out and
//!   time-window policy, failing closed on store errors.
//!
//! ## Database Schema
//!
//! - `credentials`: code (primary key), username, access group, locked-out
//!   and auto-update flags, open mode
//! - `access_times`: one daily window per access group, optional weekdays
//! - `gate_request_log`: append-only audit trail
//!
//! ## Example
//!
//! ```no_run
//! use chrono::NaiveTime;
//! use pigate_core::{AccessTime, Code, Credential};
//! use pigate_storage::{AccessEvaluator, CredentialStore, Database, SqliteCredentialStore};
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let db = Database::in_memory().await?;
//! let store = SqliteCredentialStore::new(&db);
//!
//! store.put_credential(&Credential::new(Code::new("12345")?, "Alice", 1)).await?;
//! store
//!     .put_access_time(&AccessTime::new(
//!         1,
//!         NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
//!         NaiveTime::from_hms_opt(17, 0, 0).unwrap(),
//!     ))
//!     .await?;
//!
//! let evaluator = AccessEvaluator::new(Arc::new(store));
//! let granted = evaluator.validate_now("12345").await.is_granted();
//! # Ok(())
//! # }
//! ```

pub mod connection;
pub mod error;
pub mod evaluator;
pub mod models;
pub mod store;

pub use connection::{Database, DatabaseConfig};
pub use error::{StorageError, StorageResult};
pub use evaluator::{AccessEvaluator, Decision, DenyReason};
pub use store::{
    AnyCredentialStore, BatchFailure, BatchOutcome, CredentialStore, MemoryCredentialStore,
    SqliteCredentialStore, with_timeout,
};
