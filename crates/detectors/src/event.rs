//! What monitors report, and the handle used to drive a running monitor.

use std::fmt;
use std::time::Duration;

use guardian_core::TriggerMethod;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::error::MonitorError;

/// Which monitor an event came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Detector {
    Shake,
    Fall,
    Voice,
}

impl fmt::Display for Detector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Detector::Shake => "shake",
            Detector::Fall => "fall",
            Detector::Voice => "voice",
        })
    }
}

/// Why a confirmation prompt went away.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClearReason {
    /// The user confirmed; a trigger follows.
    Confirmed,
    /// The user dismissed the prompt.
    Dismissed,
    /// Nobody answered in time.
    TimedOut,
}

/// Event emitted by a monitor.
#[derive(Debug, Clone, PartialEq)]
pub enum DetectorEvent {
    /// Start an SOS episode.
    Trigger {
        method: TriggerMethod,
        /// The recognized speech, for voice triggers.
        utterance: Option<String>,
    },
    /// Ask the user to confirm within `timeout`.
    ConfirmationRequested { source: Detector, timeout: Duration },
    /// The confirmation prompt is gone.
    ConfirmationCleared { source: Detector, reason: ClearReason },
    /// Vibrate for `duration`.
    Haptic { source: Detector, duration: Duration },
}

pub type EventSender = mpsc::UnboundedSender<DetectorEvent>;
pub type EventReceiver = mpsc::UnboundedReceiver<DetectorEvent>;

/// Create the channel monitors report on.
pub fn event_channel() -> (EventSender, EventReceiver) {
    mpsc::unbounded_channel()
}

/// Send without waiting. Returns false if nobody is listening anymore.
pub(crate) fn emit(events: &EventSender, event: DetectorEvent) -> bool {
    if events.send(event).is_err() {
        debug!("Event receiver dropped");
        return false;
    }
    true
}

/// A running monitor.
pub struct MonitorHandle<C> {
    detector: Detector,
    commands: mpsc::UnboundedSender<C>,
    task: JoinHandle<Result<(), MonitorError>>,
}

impl<C> MonitorHandle<C> {
    pub(crate) fn new(
        detector: Detector,
        commands: mpsc::UnboundedSender<C>,
        task: JoinHandle<Result<(), MonitorError>>,
    ) -> Self {
        Self {
            detector,
            commands,
            task,
        }
    }

    pub fn detector(&self) -> Detector {
        self.detector
    }

    /// Deliver a command. Fails once the monitor has stopped.
    pub fn send(&self, command: C) -> Result<(), MonitorError> {
        self.commands
            .send(command)
            .map_err(|_| MonitorError::Stopped)
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the monitor to exit.
    pub async fn join(self) -> Result<(), MonitorError> {
        self.task.await?
    }
}
