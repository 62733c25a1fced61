//! Sync worker error types.

use repositories::RepositoryError;
use thiserror::Error;

/// Errors that stop a sync pass from running.
///
/// Individual record failures never surface here; they are recorded on the
/// record itself.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The device is offline; the pass is skipped.
    #[error("offline")]
    Offline,

    /// The local store could not be read.
    #[error("repository error: {0}")]
    Repository(#[from] RepositoryError),
}
