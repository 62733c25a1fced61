//! SOS coordinator for Guardian.
//!
//! This crate provides the [`SosCoordinator`], which turns a trigger from any
//! detector (or the manual SOS control) into an emergency episode.
//!
//! # Features
//!
//! - One episode at a time; overlapping triggers are dropped
//! - Alert creation that never blocks notification
//! - Texts to every contact, with long bodies split into parts
//! - An emergency call to the primary contact
//! - Audio capture at once and video capture after a delay
//! - State published through a `watch` channel
//!
//! # Architecture
//!
//! ```text
//! Trigger(method)
//!          ↓
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     SOS COORDINATOR                         │
//! │                                                             │
//! │  Dispatching:                                               │
//! │     1. Read the last known location (best effort)           │
//! │     2. Create the alert (queued offline, bounded wait)      │
//! │         ↓                                                   │
//! │  Active:                                                    │
//! │     • text every contact          (background task)         │
//! │     • call the primary contact    (background task)         │
//! │     • start audio, video after 5s (recording queue)         │
//! │         ↓                                                   │
//! │  Cancel / Resolve:                                          │
//! │     stop recording, push the alert status, back to Idle     │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//!
//! use guardian_core::TriggerMethod;
//! use orchestrator::{LoggingRecorder, LoggingTelephony, SosConfig, SosCoordinator, SosServices};
//!
//! let services = SosServices {
//!     contacts,
//!     alerts,
//!     locations,
//!     telephony: Arc::new(LoggingTelephony::default()),
//!     recorder: Arc::new(LoggingRecorder),
//! };
//! let (sos, _task) = SosCoordinator::spawn(services, SosConfig::default());
//!
//! sos.trigger(TriggerMethod::Manual)?;
//! ```

mod coordinator;
mod error;
mod formatting;
mod recorder;
mod state;
mod telephony;

// Public exports
pub use coordinator::{SosCommand, SosConfig, SosCoordinator, SosHandle, SosServices};
pub use error::{OrchestratorError, RecorderError, TelephonyError};
pub use formatting::distress_message;
pub use recorder::{LoggingRecorder, NoOpRecorder, Recorder, RecordingCommand};
pub use state::{SosState, SosStatus};
pub use telephony::{
    split_message, LoggingTelephony, NoOpTelephony, Telephony, MULTIPART_SEGMENT_LEN,
    SINGLE_SEGMENT_LEN,
};
