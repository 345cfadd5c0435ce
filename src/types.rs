//! Core types for drive-mirror

use std::fmt;
use std::path::{Path, PathBuf};

/// One local file and the remote document it mirrors.
///
/// Built fresh for every poll cycle and dropped once reconciled; nothing in
/// it is shared with any other pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncPair {
    local_path: PathBuf,
    remote_id: String,
}

impl SyncPair {
    pub fn new(local_path: impl Into<PathBuf>, remote_id: impl Into<String>) -> Self {
        Self {
            local_path: local_path.into(),
            remote_id: remote_id.into(),
        }
    }

    pub fn local_path(&self) -> &Path {
        &self.local_path
    }

    pub fn remote_id(&self) -> &str {
        &self.remote_id
    }
}

impl fmt::Display for SyncPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} <-> {}", self.local_path.display(), self.remote_id)
    }
}

/// Result of reconciling one pair
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferOutcome {
    Uploaded,
    Downloaded,
    NoOp,
}

impl TransferOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransferOutcome::Uploaded => "uploaded",
            TransferOutcome::Downloaded => "downloaded",
            TransferOutcome::NoOp => "no_op",
        }
    }
}

impl fmt::Display for TransferOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tally of one poll cycle
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub uploaded: usize,
    pub downloaded: usize,
    pub unchanged: usize,
    pub failed: usize,
}

impl CycleReport {
    pub fn record(&mut self, outcome: TransferOutcome) {
        match outcome {
            TransferOutcome::Uploaded => self.uploaded += 1,
            TransferOutcome::Downloaded => self.downloaded += 1,
            TransferOutcome::NoOp => self.unchanged += 1,
        }
    }

    pub fn record_failure(&mut self) {
        self.failed += 1;
    }

    pub fn total(&self) -> usize {
        self.uploaded + self.downloaded + self.unchanged + self.failed
    }

    pub fn all_succeeded(&self) -> bool {
        self.failed == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cycle_report() {
        let mut report = CycleReport::default();
        report.record(TransferOutcome::Uploaded);
        report.record(TransferOutcome::NoOp);
        report.record_failure();

        assert_eq!(report.total(), 3);
        assert_eq!(report.uploaded, 1);
        assert_eq!(report.unchanged, 1);
        assert!(!report.all_succeeded());
    }

    #[test]
    fn test_pair_display() {
        let pair = SyncPair::new("/home/me/todo.md", "1AbC");
        assert_eq!(pair.to_string(), "/home/me/todo.md <-> 1AbC");
    }
}
