//! Monitor error types.

use thiserror::Error;

/// Errors that stop a monitor.
///
/// A monitor that returns one of these has logged it and will not restart on
/// its own.
#[derive(Debug, Error)]
pub enum MonitorError {
    /// The sensor or speech service could not be opened.
    #[error("sensor unavailable: {0}")]
    SensorUnavailable(String),

    /// The platform refused access (microphone, motion sensors).
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// The monitor has already stopped.
    #[error("monitor stopped")]
    Stopped,

    /// The monitor task panicked or was aborted.
    #[error("monitor task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}
