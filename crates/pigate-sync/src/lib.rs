//! Credential synchronization for the PiGate edge controller.
//!
//! Keeps the local credential cache in line with an upstream source of
//! truth while the controller keeps serving the keypad from whatever it
//! already has.
//!
//! # Components
//!
//! - [`SyncEngine`]: reconciliation (deletes, then flag-gated upserts) with
//!   cooldown and single-pass locking.
//! - [`CredentialSource`]: upstream sets from a JSON snapshot
//!   ([`SnapshotSource`]), a tabular feed file ([`FeedSource`]) or a fixed
//!   list ([`StaticSource`]).
//! - [`SyncScheduler`]: startup, periodic and requested passes on one task.
//! - [`FeedWatcher`]: feed file change detection.
//! - [`feed`]: the tabular feed parser.
//! - [`publish_feed`]: uploader side, feed to snapshot plus notification.
//!
//! # Example
//!
//! ```no_run
//! use pigate_storage::{Database, SqliteCredentialStore};
//! use pigate_sync::{DirectoryObjectStore, SnapshotSource, SyncConfig, SyncEngine, SyncTrigger};
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let db = Database::in_memory().await?;
//! let store = Arc::new(SqliteCredentialStore::new(&db));
//! let source = SnapshotSource::new(DirectoryObjectStore::new("/srv/pigate/objects"));
//!
//! let engine = SyncEngine::new(store, source, SyncConfig::default());
//! let report = engine.sync(SyncTrigger::Manual).await?;
//! println!("{} upserted, {} deleted", report.upserted, report.deleted);
//! # Ok(())
//! # }
//! ```

pub mod engine;
pub mod error;
pub mod feed;
pub mod object_store;
pub mod scheduler;
pub mod source;
pub mod uploader;
pub mod watcher;

pub use engine::{SyncConfig, SyncEngine, SyncReport, SyncTrigger, TriggerOutcome};
pub use error::{FeedError, Result, SyncError};
pub use object_store::{DirectoryObjectStore, ObjectFetcher, ObjectUploader};
pub use scheduler::{SyncHandle, SyncScheduler};
pub use source::{AnySource, CredentialSource, FeedSource, SnapshotSource, StaticSource};
pub use uploader::publish_feed;
pub use watcher::FeedWatcher;
