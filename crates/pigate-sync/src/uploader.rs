//! Uploader side: feed file in, snapshot plus notification out.

use crate::error::{Result, SyncError};
use crate::feed::parse_feed_file;
use crate::object_store::ObjectUploader;
use pigate_network::{Messenger, Transport};
use std::path::Path;
use std::time::Duration;
use tracing::info;

/// Parse the feed at `path`, store it as a JSON snapshot under `key`, and
/// announce it on the credentials topic.
///
/// Nothing is uploaded or announced when parsing fails. Returns the number
/// of credentials published.
///
/// # Errors
///
/// `SyncError::Feed` for an unreadable or malformed feed, `SyncError::Timeout`
/// when the upload exceeds `timeout`, and the uploader's or messenger's own
/// errors.
pub async fn publish_feed<U, T>(
    path: impl AsRef<Path>,
    access_group: i64,
    uploader: &U,
    key: &str,
    messenger: &Messenger<T>,
    timeout: Duration,
) -> Result<usize>
where
    U: ObjectUploader,
    T: Transport,
{
    let path = path.as_ref();
    let credentials = parse_feed_file(path, access_group).await?;
    let body = serde_json::to_vec_pretty(&credentials)?;

    tokio::time::timeout(timeout, uploader.put_object(key, body))
        .await
        .map_err(|_| SyncError::timeout("upload credential snapshot", timeout))??;

    messenger.notify_new_credentials().await?;

    info!(
        path = %path.display(),
        key,
        count = credentials.len(),
        "Published credential snapshot"
    );
    Ok(credentials.len())
}
