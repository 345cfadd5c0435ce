//! Timestamp reconciliation
//!
//! [`PairReconciler`] decides and performs the transfer for one pair;
//! [`PollScheduler`] runs every configured pair once per cycle, forever.

mod reconciler;
mod scheduler;

pub use reconciler::{local_modification_time, PairReconciler};
pub use scheduler::PollScheduler;

use crate::timestamp::Timestamp;

/// Sync direction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncDirection {
    /// Local is newer: replace the remote document
    Upload,
    /// Remote is newer: replace the local file
    Download,
    /// Same whole second on both sides
    Unchanged,
}

impl SyncDirection {
    /// Decide from raw modification times.
    ///
    /// Both sides are truncated to whole seconds before comparing; comparing
    /// raw values would flip direction on every cycle for files that are
    /// actually in step.
    pub fn between(local: Timestamp, remote: Timestamp) -> Self {
        use std::cmp::Ordering;

        match local.truncated().cmp(&remote.truncated()) {
            Ordering::Greater => SyncDirection::Upload,
            Ordering::Less => SyncDirection::Download,
            Ordering::Equal => SyncDirection::Unchanged,
        }
    }
}
