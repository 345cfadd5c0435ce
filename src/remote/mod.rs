//! Remote store adapters
//!
//! The reconciler only sees [`RemoteStore`]: a modification-time lookup, a
//! full-content download and a full-content upload that also stamps the
//! remote modification time. Chunking, resumable sessions and per-chunk
//! retries stay inside each implementation.
//!
//! # Feature Flags
//!
//! The Google Drive backend requires the `drive` feature (on by default).
//! The in-process [`MemoryStore`] is always available.

#[cfg(feature = "drive")]
pub mod auth;
#[cfg(feature = "drive")]
mod drive;
mod memory;

#[cfg(feature = "drive")]
pub use auth::{AccessToken, Credentials, TokenSource};
#[cfg(feature = "drive")]
pub use drive::DriveClient;
pub use memory::{MemoryDocument, MemoryStore};

use std::path::Path;

use async_trait::async_trait;

use crate::error::Result;
use crate::timestamp::Timestamp;

/// Remote storage holding the other half of every pair
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Last-modified time of the remote document.
    ///
    /// Fails with `NotFound`, `MalformedMetadata` or `Transport`.
    async fn modification_time(&self, id: &str) -> Result<Timestamp>;

    /// Full current content of the remote document
    async fn download(&self, id: &str) -> Result<Vec<u8>>;

    /// Replace the remote content with the file at `local_path` and set the
    /// remote modification time to `modified`
    async fn upload(&self, local_path: &Path, id: &str, modified: Timestamp) -> Result<()>;

    /// Backend name for logs
    fn name(&self) -> &'static str;
}
