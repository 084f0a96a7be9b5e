//! Upstream credential sources.
//!
//! A [`CredentialSource`] produces the complete upstream credential set.
//! Reconciliation treats whatever it returns as the truth for feed-owned
//! records.

use crate::error::{Result, SyncError};
use crate::feed::parse_feed_file;
use crate::object_store::{DirectoryObjectStore, ObjectFetcher};
use pigate_core::Credential;
use pigate_core::constants::{DEFAULT_ACCESS_GROUP, DEFAULT_SNAPSHOT_KEY};
use std::future::Future;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;

/// Something that can produce the upstream credential set.
pub trait CredentialSource: Send + Sync {
    fn fetch(&self) -> impl Future<Output = Result<Vec<Credential>>> + Send;

    /// Short name for logs.
    fn name(&self) -> &str;
}

/// Fixed credential set, replaceable at runtime.
///
/// Clones share the same set.
#[derive(Debug, Clone, Default)]
pub struct StaticSource {
    credentials: Arc<Mutex<Vec<Credential>>>,
    failure: Arc<Mutex<Option<String>>>,
    fetches: Arc<AtomicUsize>,
}

impl StaticSource {
    pub fn new(credentials: Vec<Credential>) -> Self {
        Self {
            credentials: Arc::new(Mutex::new(credentials)),
            failure: Arc::default(),
            fetches: Arc::default(),
        }
    }

    pub fn set(&self, credentials: Vec<Credential>) {
        *lock(&self.credentials) = credentials;
    }

    /// Make subsequent fetches fail with `message`, or succeed again with
    /// `None`.
    pub fn set_failure(&self, message: Option<String>) {
        *lock(&self.failure) = message;
    }

    /// Number of fetches so far, failed ones included.
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl CredentialSource for StaticSource {
    async fn fetch(&self) -> Result<Vec<Credential>> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let failure = lock(&self.failure).clone();
        if let Some(message) = failure {
            return Err(SyncError::upstream(self.name(), message));
        }
        Ok(lock(&self.credentials).clone())
    }

    fn name(&self) -> &str {
        "static"
    }
}

/// JSON array of credentials stored under one object key.
#[derive(Debug, Clone)]
pub struct SnapshotSource<F> {
    fetcher: F,
    key: String,
}

impl<F: ObjectFetcher> SnapshotSource<F> {
    pub fn new(fetcher: F) -> Self {
        Self {
            fetcher,
            key: DEFAULT_SNAPSHOT_KEY.to_string(),
        }
    }

    pub fn key(mut self, key: impl Into<String>) -> Self {
        self.key = key.into();
        self
    }
}

impl<F: ObjectFetcher> CredentialSource for SnapshotSource<F> {
    async fn fetch(&self) -> Result<Vec<Credential>> {
        let body = self.fetcher.get_object(&self.key).await?;
        let credentials: Vec<Credential> = serde_json::from_slice(&body)?;
        debug!(key = %self.key, count = credentials.len(), "Decoded credential snapshot");
        Ok(credentials)
    }

    fn name(&self) -> &str {
        "snapshot"
    }
}

/// Tabular feed file read directly.
#[derive(Debug, Clone)]
pub struct FeedSource {
    path: PathBuf,
    access_group: i64,
}

impl FeedSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            access_group: DEFAULT_ACCESS_GROUP,
        }
    }

    /// Access group assigned to every feed record.
    pub fn access_group(mut self, access_group: i64) -> Self {
        self.access_group = access_group;
        self
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }
}

impl CredentialSource for FeedSource {
    async fn fetch(&self) -> Result<Vec<Credential>> {
        Ok(parse_feed_file(&self.path, self.access_group).await?)
    }

    fn name(&self) -> &str {
        "feed"
    }
}

/// Enum dispatch over the built-in sources.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub enum AnySource {
    Static(StaticSource),
    Snapshot(SnapshotSource<DirectoryObjectStore>),
    Feed(FeedSource),
}

impl CredentialSource for AnySource {
    async fn fetch(&self) -> Result<Vec<Credential>> {
        match self {
            Self::Static(source) => source.fetch().await,
            Self::Snapshot(source) => source.fetch().await,
            Self::Feed(source) => source.fetch().await,
        }
    }

    fn name(&self) -> &str {
        match self {
            Self::Static(source) => source.name(),
            Self::Snapshot(source) => source.name(),
            Self::Feed(source) => source.name(),
        }
    }
}
