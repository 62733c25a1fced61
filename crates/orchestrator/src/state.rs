//! Observable coordinator state.

use std::fmt;

use guardian_core::{AlertStatus, TriggerMethod};
use repositories::AlertHandle;

/// Phase of the SOS episode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SosState {
    #[default]
    Idle,
    /// Locating the user and creating the alert.
    Dispatching,
    /// Contacts notified; recording.
    Active,
    /// Ending the episode.
    Cancelling,
}

impl fmt::Display for SosState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SosState::Idle => "idle",
            SosState::Dispatching => "dispatching",
            SosState::Active => "active",
            SosState::Cancelling => "cancelling",
        })
    }
}

/// Snapshot published on every change.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SosStatus {
    pub state: SosState,
    /// Counts SOS episodes since startup.
    pub episode: u64,
    /// What started the current episode.
    pub trigger: Option<TriggerMethod>,
    /// The current episode's alert, once created or queued.
    pub alert: Option<AlertHandle>,
    /// How the previous episode ended.
    pub ended_with: Option<AlertStatus>,
    /// Most recent failure, for display. Failures never stop an episode.
    pub last_error: Option<String>,
}

impl SosStatus {
    pub fn is_active(&self) -> bool {
        self.state != SosState::Idle
    }
}
