//! Feed file change detection by polling modification times.
//!
//! The watched path is either a single feed file or a drop directory. In a
//! directory only files with the configured extension count. Files present
//! when watching starts are the baseline and are not reported.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);
const DEFAULT_EXTENSION: &str = "txt";

/// Polls a feed path and reports new or modified files.
#[derive(Debug, Clone)]
pub struct FeedWatcher {
    path: PathBuf,
    poll_interval: Duration,
    extension: String,
    seen: HashMap<PathBuf, SystemTime>,
}

impl FeedWatcher {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            extension: DEFAULT_EXTENSION.to_string(),
            seen: HashMap::new(),
        }
    }

    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Extension that marks a feed file in a drop directory.
    pub fn extension(mut self, extension: impl Into<String>) -> Self {
        self.extension = extension.into();
        self
    }

    /// Files that appeared or changed since the previous scan.
    ///
    /// A missing path yields nothing; it may appear later.
    pub async fn scan(&mut self) -> Vec<PathBuf> {
        let current = match self.snapshot().await {
            Ok(current) => current,
            Err(e) => {
                debug!(path = %self.path.display(), error = %e, "Feed path not readable");
                HashMap::new()
            }
        };

        let mut changed: Vec<PathBuf> = current
            .iter()
            .filter(|(path, modified)| self.seen.get(*path) != Some(*modified))
            .map(|(path, _)| path.clone())
            .collect();
        changed.sort();

        self.seen = current;
        changed
    }

    /// Record the current state as the baseline, then send every change to
    /// `changes` until `shutdown` or until the receiver is dropped.
    pub fn spawn(
        mut self,
        changes: mpsc::Sender<PathBuf>,
        shutdown: CancellationToken,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let baseline = self.scan().await;
            info!(
                path = %self.path.display(),
                existing = baseline.len(),
                "Watching feed path"
            );

            let mut ticker = tokio::time::interval(self.poll_interval);
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = ticker.tick() => {
                        for path in self.scan().await {
                            info!(path = %path.display(), "Feed file changed");
                            if changes.send(path).await.is_err() {
                                warn!("Feed change receiver dropped, stopping watcher");
                                return;
                            }
                        }
                    }
                }
            }
        })
    }

    async fn snapshot(&self) -> std::io::Result<HashMap<PathBuf, SystemTime>> {
        let metadata = tokio::fs::metadata(&self.path).await?;
        let mut files = HashMap::new();

        if metadata.is_file() {
            files.insert(self.path.clone(), metadata.modified()?);
            return Ok(files);
        }

        let mut entries = tokio::fs::read_dir(&self.path).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if !self.matches_extension(&path) {
                continue;
            }
            let metadata = entry.metadata().await?;
            if metadata.is_file() {
                files.insert(path, metadata.modified()?);
            }
        }
        Ok(files)
    }

    fn matches_extension(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case(&self.extension))
    }
}
