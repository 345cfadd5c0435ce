//! Error types for drive-mirror

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for drive-mirror operations
pub type Result<T> = std::result::Result<T, MirrorError>;

/// Main error type for drive-mirror
#[derive(Error, Debug)]
pub enum MirrorError {
    #[error("Local file not found: {}: {}", path.display(), source)]
    LocalNotFound {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Remote file not found: {0}")]
    NotFound(String),

    #[error("Malformed metadata for remote file {id}: {detail}")]
    MalformedMetadata { id: String, detail: String },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Could not read local file {}: {}", path.display(), source)]
    LocalRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Could not write local file {}: {}", path.display(), source)]
    LocalWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl MirrorError {
    /// Check if the next poll cycle may succeed where this one failed
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            MirrorError::Transport(_)
                | MirrorError::LocalRead { .. }
                | MirrorError::LocalWrite { .. }
        )
    }

    /// Short stable name for log fields
    pub fn kind(&self) -> &'static str {
        match self {
            MirrorError::LocalNotFound { .. } => "local_not_found",
            MirrorError::NotFound(_) => "not_found",
            MirrorError::MalformedMetadata { .. } => "malformed_metadata",
            MirrorError::Transport(_) => "transport",
            MirrorError::LocalRead { .. } => "local_read",
            MirrorError::LocalWrite { .. } => "local_write",
            MirrorError::Auth(_) => "auth",
            MirrorError::Config(_) => "config",
        }
    }

    pub(crate) fn malformed(id: &str, detail: impl Into<String>) -> Self {
        MirrorError::MalformedMetadata {
            id: id.to_string(),
            detail: detail.into(),
        }
    }
}

#[cfg(feature = "drive")]
impl From<reqwest::Error> for MirrorError {
    fn from(e: reqwest::Error) -> Self {
        MirrorError::Transport(e.to_string())
    }
}
