//! Object storage for credential snapshots.
//!
//! The uploader writes one JSON snapshot under a key, controllers read it
//! back. [`DirectoryObjectStore`] maps keys to files below a root directory,
//! which serves a shared mount or a local test setup.

use crate::error::{Result, SyncError};
use std::future::Future;
use std::path::{Component, Path, PathBuf};
use tracing::debug;

/// Read side of an object store.
pub trait ObjectFetcher: Send + Sync {
    fn get_object(&self, key: &str) -> impl Future<Output = Result<Vec<u8>>> + Send;
}

/// Write side of an object store.
pub trait ObjectUploader: Send + Sync {
    fn put_object(&self, key: &str, body: Vec<u8>) -> impl Future<Output = Result<()>> + Send;
}

/// Objects as files under `root`.
#[derive(Debug, Clone)]
pub struct DirectoryObjectStore {
    root: PathBuf,
}

impl DirectoryObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve `key` below the root. Keys may contain `/` but must stay
    /// inside the root.
    fn path_for(&self, key: &str) -> Result<PathBuf> {
        let relative = Path::new(key);
        let inside = !key.is_empty()
            && relative
                .components()
                .all(|component| matches!(component, Component::Normal(_)));
        if !inside {
            return Err(SyncError::InvalidKey(key.to_string()));
        }
        Ok(self.root.join(relative))
    }
}

impl ObjectFetcher for DirectoryObjectStore {
    async fn get_object(&self, key: &str) -> Result<Vec<u8>> {
        let path = self.path_for(key)?;
        match tokio::fs::read(&path).await {
            Ok(body) => {
                debug!(key, bytes = body.len(), "Fetched object");
                Ok(body)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(SyncError::ObjectNotFound {
                key: key.to_string(),
            }),
            Err(e) => Err(e.into()),
        }
    }
}

impl ObjectUploader for DirectoryObjectStore {
    /// Write to a temporary sibling, then rename over the key, so readers
    /// never see a half-written snapshot.
    async fn put_object(&self, key: &str, body: Vec<u8>) -> Result<()> {
        let path = self.path_for(key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut staging = path.clone().into_os_string();
        staging.push(".partial");
        let staging = PathBuf::from(staging);

        tokio::fs::write(&staging, &body).await?;
        tokio::fs::rename(&staging, &path).await?;
        debug!(key, bytes = body.len(), "Stored object");
        Ok(())
    }
}
