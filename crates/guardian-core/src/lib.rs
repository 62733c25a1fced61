//! Core types shared by every Guardian crate.
//!
//! This crate provides the vocabulary the detectors, the SOS orchestrator and
//! the offline-first data layer agree on:
//!
//! - [`AlertStatus`] - Alert lifecycle with forward-only transitions
//! - [`TriggerMethod`] - What started an SOS episode
//! - [`SyncStatus`] - Whether a local record is mirrored on the backend
//! - [`GeoPoint`] - A latitude/longitude pair
//! - [`placeholder`] - Locally generated identifiers for unsynced records
//!
//! # Example
//!
//! ```rust
//! use guardian_core::{placeholder, AlertStatus, TriggerMethod};
//!
//! let id = placeholder::generate();
//! assert!(placeholder::is_placeholder(&id));
//!
//! assert!(AlertStatus::Active.can_transition_to(AlertStatus::Cancelled));
//! assert!(!AlertStatus::Cancelled.can_transition_to(AlertStatus::Active));
//!
//! assert_eq!(TriggerMethod::Shake.as_str(), "shake_detection");
//! ```

mod alert;
mod error;
mod geo;
pub mod placeholder;
mod sync;
mod trigger;

pub use alert::AlertStatus;
pub use error::ParseError;
pub use geo::GeoPoint;
pub use sync::SyncStatus;
pub use trigger::TriggerMethod;
