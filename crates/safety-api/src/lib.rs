//! Safety backend client library.
//!
//! This crate provides the [`SafetyBackend`] trait the rest of Guardian talks
//! to and [`SafetyClient`], its HTTP implementation. It supports:
//!
//! - Creating alerts and updating their status
//! - Reading alert history
//! - Adding, updating, deleting and listing emergency contacts
//! - Pushing location fixes
//! - Health checking for connectivity monitoring
//!
//! # Example
//!
//! ```no_run
//! use guardian_core::{GeoPoint, TriggerMethod};
//! use safety_api::{BackendConfig, NewAlert, SafetyBackend, SafetyClient};
//!
//! # async fn example() -> Result<(), safety_api::ApiError> {
//! let config = BackendConfig::new("https://example.org/safewomen/api").with_token("secret");
//! let client = SafetyClient::new(config)?;
//!
//! let alert = NewAlert::active(
//!     TriggerMethod::Manual,
//!     Some(GeoPoint::new(40.7128, -74.006)),
//!     None,
//! );
//! let alert_id = client.create_alert("user-1", &alert).await?;
//! println!("Created alert {}", alert_id);
//! # Ok(())
//! # }
//! ```

pub mod backend;
pub mod client;
pub mod config;
pub mod error;
pub mod types;

pub use backend::{SafetyBackend, StaticToken, TokenProvider};
pub use client::SafetyClient;
pub use config::BackendConfig;
pub use error::ApiError;
pub use types::{ContactPayload, LocationUpdate, NewAlert, RemoteAlert, RemoteContact};
