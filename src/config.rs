//! Runtime configuration
//!
//! Pairs come from a TOML file and/or repeated `local,remote_id` arguments.
//! File pairs are processed first, then command-line pairs, each in the
//! order given.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;

use crate::error::{MirrorError, Result};
use crate::types::SyncPair;

/// Seconds to sleep after each poll cycle
pub const DEFAULT_INTERVAL_SECS: u64 = 10;

/// Resumable upload chunks must be a multiple of this
pub const UPLOAD_CHUNK_ALIGNMENT: usize = 256 * 1024;

pub const DEFAULT_CHUNK_SIZE: usize = 32 * UPLOAD_CHUNK_ALIGNMENT;

pub const DEFAULT_API_BASE: &str = "https://www.googleapis.com/drive/v3";
pub const DEFAULT_UPLOAD_BASE: &str = "https://www.googleapis.com/upload/drive/v3";

/// A configured `local,remote_id` association
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PairSpec {
    pub local: PathBuf,
    pub remote: String,
}

impl PairSpec {
    /// Parse `local,remote_id`.
    ///
    /// The single comma is the split point, so local paths containing a
    /// comma cannot be expressed. `~` in the local path is expanded.
    pub fn parse(spec: &str) -> Result<Self> {
        let parts: Vec<&str> = spec.split(',').collect();
        let [local, remote] = parts.as_slice() else {
            return Err(MirrorError::Config(format!(
                "sync pair '{}' must be 'local_path,remote_id' with exactly one comma",
                spec
            )));
        };

        Self::new(local, remote)
    }

    pub fn new(local: &str, remote: &str) -> Result<Self> {
        if local.is_empty() || remote.is_empty() {
            return Err(MirrorError::Config(format!(
                "sync pair '{},{}' has an empty side",
                local, remote
            )));
        }

        Ok(Self {
            local: PathBuf::from(shellexpand::tilde(local).as_ref()),
            remote: remote.to_string(),
        })
    }

    /// Fresh pair for one reconciliation
    pub fn to_pair(&self) -> SyncPair {
        SyncPair::new(self.local.clone(), self.remote.clone())
    }
}

impl FromStr for PairSpec {
    type Err = MirrorError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

/// Google Drive backend settings
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DriveConfig {
    pub api_base: String,
    pub upload_base: String,
    /// Bytes per download range request and per upload chunk
    pub chunk_size: usize,
    /// Extra attempts for a chunk that failed transiently
    pub chunk_retries: u32,
    /// First retry delay, doubled per attempt
    pub retry_backoff_ms: u64,
}

impl Default for DriveConfig {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            upload_base: DEFAULT_UPLOAD_BASE.to_string(),
            chunk_size: DEFAULT_CHUNK_SIZE,
            chunk_retries: 3,
            retry_backoff_ms: 500,
        }
    }
}

impl DriveConfig {
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 || self.chunk_size % UPLOAD_CHUNK_ALIGNMENT != 0 {
            return Err(MirrorError::Config(format!(
                "chunk_size {} must be a non-zero multiple of {}",
                self.chunk_size, UPLOAD_CHUNK_ALIGNMENT
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct FilePair {
    local: String,
    remote: String,
}

/// On-disk TOML configuration
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigFile {
    interval_secs: Option<u64>,
    #[serde(default, rename = "pair")]
    pairs: Vec<FilePair>,
    #[serde(default)]
    drive: DriveConfig,
}

/// Fully resolved configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MirrorConfig {
    pub pairs: Vec<PairSpec>,
    pub interval: Duration,
    pub drive: DriveConfig,
}

impl MirrorConfig {
    /// Merge an optional config file with command-line values
    pub fn load(
        file: Option<&Path>,
        cli_pairs: Vec<PairSpec>,
        cli_interval: Option<u64>,
    ) -> Result<Self> {
        let parsed = match file {
            Some(path) => {
                let expanded = PathBuf::from(shellexpand::tilde(&path.to_string_lossy()).as_ref());
                let text = std::fs::read_to_string(&expanded).map_err(|e| {
                    MirrorError::Config(format!("cannot read {}: {}", expanded.display(), e))
                })?;
                Self::parse_file(&text)?
            }
            None => ConfigFile::default(),
        };

        let mut pairs = parsed
            .pairs
            .iter()
            .map(|p| PairSpec::new(&p.local, &p.remote))
            .collect::<Result<Vec<_>>>()?;
        pairs.extend(cli_pairs);

        let interval_secs = cli_interval
            .or(parsed.interval_secs)
            .unwrap_or(DEFAULT_INTERVAL_SECS);

        Ok(Self {
            pairs,
            interval: Duration::from_secs(interval_secs),
            drive: parsed.drive,
        })
    }

    fn parse_file(text: &str) -> Result<ConfigFile> {
        toml::from_str(text).map_err(|e| MirrorError::Config(format!("invalid config file: {}", e)))
    }

    /// Check the configuration before the first cycle
    pub fn validate(&self, looping: bool) -> Result<()> {
        if self.pairs.is_empty() {
            return Err(MirrorError::Config(
                "no sync pairs configured (use --sync or a [[pair]] table)".to_string(),
            ));
        }
        if looping && self.interval.is_zero() {
            return Err(MirrorError::Config(
                "interval must be at least one second".to_string(),
            ));
        }
        self.drive.validate()
    }
}
