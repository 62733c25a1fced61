//! Error types for SOS coordination.

use thiserror::Error;

/// Errors returned to callers of the coordinator.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// The coordinator task is gone; commands can no longer be delivered.
    #[error("coordinator stopped")]
    Stopped,

    /// A resolve was requested with a status that does not end an episode.
    #[error("not a terminal alert status: {0}")]
    NotTerminal(guardian_core::AlertStatus),
}

/// Errors from the telephony collaborator.
#[derive(Debug, Error)]
pub enum TelephonyError {
    /// SMS or call permission has not been granted.
    #[error("{0} permission not granted")]
    PermissionDenied(&'static str),

    #[error("send failed: {0}")]
    SendFailed(String),

    #[error("call failed: {0}")]
    CallFailed(String),
}

/// Errors from the recording collaborator.
#[derive(Debug, Error)]
pub enum RecorderError {
    /// No capture device (microphone or camera) is available.
    #[error("capture device unavailable: {0}")]
    Unavailable(String),

    #[error("recording failed: {0}")]
    Failed(String),
}
