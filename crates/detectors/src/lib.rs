//! Distress detectors for Guardian.
//!
//! Three independent monitors watch for signs that the user needs help and
//! report [`DetectorEvent`]s on a shared channel:
//!
//! - [`ShakeMonitor`] - three hard shakes, then an explicit confirmation
//! - [`FallMonitor`] - impact spike, lying-still check, then a countdown that
//!   triggers on its own
//! - [`VoiceMonitor`] - distress phrases in recognized speech
//!
//! Each monitor pairs a plain state machine ([`ShakeDetector`],
//! [`FallDetector`], [`match_distress`]) with a tokio task that owns its
//! timers, so a dismissed prompt can never fire late.
//!
//! # Example
//!
//! ```no_run
//! use detectors::{event_channel, AccelBus, DetectorEvent, ShakeConfig, ShakeMonitor};
//!
//! # async fn example() -> Result<(), detectors::MonitorError> {
//! let bus = AccelBus::default();
//! let (events, mut rx) = event_channel();
//! let shake = ShakeMonitor::new(ShakeConfig::default()).spawn(&bus, events)?;
//!
//! while let Some(event) = rx.recv().await {
//!     if let DetectorEvent::Trigger { method, .. } = event {
//!         println!("SOS requested: {method}");
//!     }
//! }
//! # drop(shake);
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod event;
pub mod fall;
pub mod sensor;
pub mod shake;
pub mod voice;

pub use error::MonitorError;
pub use event::{
    event_channel, ClearReason, Detector, DetectorEvent, EventReceiver, EventSender,
    MonitorHandle,
};
pub use fall::{FallCommand, FallConfig, FallDetector, FallMonitor, FallState};
pub use sensor::{AccelBus, AccelSample, AccelerometerSource, STANDARD_GRAVITY};
pub use shake::{ShakeCommand, ShakeConfig, ShakeDetector, ShakeMonitor, ShakeState, ShakeUpdate};
pub use voice::{
    match_distress, ChannelRecognizer, SpeechError, SpeechEvent, SpeechRecognizer, VoiceCommand,
    VoiceConfig, VoiceMonitor, DISTRESS_PHRASES,
};
