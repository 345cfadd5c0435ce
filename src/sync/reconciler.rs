//! Per-pair reconciliation

use std::path::Path;

use super::SyncDirection;
use crate::error::{MirrorError, Result};
use crate::remote::RemoteStore;
use crate::timestamp::Timestamp;
use crate::types::{SyncPair, TransferOutcome};

/// Modification time of a local file
pub async fn local_modification_time(path: &Path) -> Result<Timestamp> {
    let not_found = |source| MirrorError::LocalNotFound {
        path: path.to_path_buf(),
        source,
    };

    let metadata = tokio::fs::metadata(path).await.map_err(not_found)?;
    if !metadata.is_file() {
        return Err(not_found(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            "not a regular file",
        )));
    }
    let modified = metadata.modified().map_err(not_found)?;
    Ok(Timestamp::from_system_time(modified))
}

/// Brings one pair in step: newer side overwrites the older one
pub struct PairReconciler<'a> {
    store: &'a dyn RemoteStore,
}

impl<'a> PairReconciler<'a> {
    pub fn new(store: &'a dyn RemoteStore) -> Self {
        Self { store }
    }

    /// Compare truncated modification times and transfer accordingly.
    ///
    /// On failure nothing has been written locally; a failed upload leaves
    /// the remote as the store left it.
    pub async fn sync(&self, pair: &SyncPair) -> Result<TransferOutcome> {
        let local = local_modification_time(pair.local_path()).await?;
        tracing::debug!(
            "Local modification time of {}: {}",
            pair.local_path().display(),
            local.truncated()
        );

        let remote = self.store.modification_time(pair.remote_id()).await?;
        tracing::debug!(
            "Remote modification time of {}: {}",
            pair.remote_id(),
            remote.truncated()
        );

        match SyncDirection::between(local, remote) {
            SyncDirection::Upload => {
                self.store
                    .upload(pair.local_path(), pair.remote_id(), local)
                    .await?;
                tracing::debug!("Uploaded {}", pair);
                Ok(TransferOutcome::Uploaded)
            }
            SyncDirection::Download => {
                let content = self.store.download(pair.remote_id()).await?;
                write_local(pair.local_path(), &content).await?;
                tracing::debug!("Downloaded {} ({} bytes)", pair, content.len());
                Ok(TransferOutcome::Downloaded)
            }
            SyncDirection::Unchanged => {
                tracing::debug!(
                    "Remote {} and local {} files have the same timestamp, doing nothing",
                    pair.remote_id(),
                    pair.local_path().display()
                );
                Ok(TransferOutcome::NoOp)
            }
        }
    }
}

/// Truncate and rewrite the local file.
///
/// Not crash-safe: an interrupted write leaves a partial file. Callers that
/// need atomic replacement must write to a temp file and rename.
async fn write_local(path: &Path, content: &[u8]) -> Result<()> {
    tokio::fs::write(path, content)
        .await
        .map_err(|source| MirrorError::LocalWrite {
            path: path.to_path_buf(),
            source,
        })
}
