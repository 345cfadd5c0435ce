//! In-process remote store
//!
//! Keeps documents in a map and reports modification times in the same
//! canonical string form the real service uses, so parsing and truncation
//! are exercised exactly as they are against Drive.

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;

use super::RemoteStore;
use crate::error::{MirrorError, Result};
use crate::timestamp::Timestamp;

/// A stored document
#[derive(Debug, Clone, Default)]
pub struct MemoryDocument {
    pub content: Vec<u8>,
    /// Raw `modifiedTime` field; `None` models a response without it
    pub modified_time: Option<String>,
}

/// Map-backed [`RemoteStore`]
#[derive(Debug, Default)]
pub struct MemoryStore {
    documents: Mutex<HashMap<String, MemoryDocument>>,
    offline: Mutex<HashSet<String>>,
    metadata_reads: AtomicUsize,
    downloads: AtomicUsize,
    uploads: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a document with a well-formed modification time
    pub fn insert(&self, id: impl Into<String>, content: impl Into<Vec<u8>>, modified: Timestamp) {
        self.insert_raw(id, content, modified.to_canonical());
    }

    /// Insert a document whose `modifiedTime` field is stored verbatim
    pub fn insert_raw(
        &self,
        id: impl Into<String>,
        content: impl Into<Vec<u8>>,
        modified_time: Option<String>,
    ) {
        self.documents.lock().insert(
            id.into(),
            MemoryDocument {
                content: content.into(),
                modified_time,
            },
        );
    }

    pub fn remove(&self, id: &str) -> Option<MemoryDocument> {
        self.documents.lock().remove(id)
    }

    pub fn get(&self, id: &str) -> Option<MemoryDocument> {
        self.documents.lock().get(id).cloned()
    }

    /// Make every call for `id` fail with a transport error
    pub fn set_offline(&self, id: &str, offline: bool) {
        let mut set = self.offline.lock();
        if offline {
            set.insert(id.to_string());
        } else {
            set.remove(id);
        }
    }

    pub fn metadata_reads(&self) -> usize {
        self.metadata_reads.load(Ordering::SeqCst)
    }

    pub fn downloads(&self) -> usize {
        self.downloads.load(Ordering::SeqCst)
    }

    pub fn uploads(&self) -> usize {
        self.uploads.load(Ordering::SeqCst)
    }

    fn check_reachable(&self, id: &str) -> Result<()> {
        if self.offline.lock().contains(id) {
            return Err(MirrorError::Transport(format!("{id}: connection refused")));
        }
        Ok(())
    }

    fn document(&self, id: &str) -> Result<MemoryDocument> {
        self.check_reachable(id)?;
        self.get(id)
            .ok_or_else(|| MirrorError::NotFound(id.to_string()))
    }
}

#[async_trait]
impl RemoteStore for MemoryStore {
    async fn modification_time(&self, id: &str) -> Result<Timestamp> {
        self.metadata_reads.fetch_add(1, Ordering::SeqCst);
        let doc = self.document(id)?;
        let raw = doc
            .modified_time
            .ok_or_else(|| MirrorError::malformed(id, "modifiedTime missing"))?;
        Timestamp::parse_canonical(&raw).map_err(|e| MirrorError::malformed(id, e.to_string()))
    }

    async fn download(&self, id: &str) -> Result<Vec<u8>> {
        self.downloads.fetch_add(1, Ordering::SeqCst);
        Ok(self.document(id)?.content)
    }

    async fn upload(&self, local_path: &Path, id: &str, modified: Timestamp) -> Result<()> {
        self.uploads.fetch_add(1, Ordering::SeqCst);
        self.document(id)?;

        let content = tokio::fs::read(local_path)
            .await
            .map_err(|source| MirrorError::LocalRead {
                path: local_path.to_path_buf(),
                source,
            })?;
        let modified_time = modified.to_canonical().ok_or_else(|| {
            MirrorError::malformed(id, format!("modification time {modified} out of range"))
        })?;

        self.insert_raw(id, content, Some(modified_time));
        Ok(())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}
