//! drive-mirror - keep local files and remote documents in step
//!
//! Every poll cycle compares each pair's local and remote modification
//! times, truncated to whole seconds, and lets the newer side overwrite the
//! older one.

pub mod config;
pub mod error;
pub mod remote;
pub mod sync;
pub mod timestamp;
pub mod types;

pub use config::{MirrorConfig, PairSpec};
pub use error::{MirrorError, Result};
pub use remote::RemoteStore;
pub use sync::{PairReconciler, PollScheduler, SyncDirection};
pub use timestamp::Timestamp;
pub use types::*;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
