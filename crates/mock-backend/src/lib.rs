//! Mock safety backend for testing.
//!
//! This crate provides [`MockBackend`], an in-memory implementation of the
//! [`SafetyBackend`] trait:
//! - records every call with its arguments
//! - assigns predictable ids (`A1`, `A2`, ... for alerts, `101`, ... for contacts)
//! - fails on demand, once or always, per operation
//! - can add latency to an operation to hold requests in flight
//!
//! For the real HTTP backend, use `safety_api::SafetyClient`.
//!
//! # Example
//!
//! ```rust
//! use guardian_core::TriggerMethod;
//! use mock_backend::{Failure, MockBackend, Operation};
//! use safety_api::{NewAlert, SafetyBackend};
//!
//! #[tokio::main]
//! async fn main() {
//!     let backend = MockBackend::new();
//!     backend.fail_next(Operation::CreateAlert, Failure::Unavailable);
//!
//!     let alert = NewAlert::active(TriggerMethod::Shake, None, None);
//!     assert!(backend.create_alert("user-1", &alert).await.is_err());
//!     assert_eq!(backend.create_alert("user-1", &alert).await.unwrap(), "A1");
//! }
//! ```

mod backend;
mod call;

pub use backend::MockBackend;
pub use call::{Call, Failure, Operation};

pub use safety_api::SafetyBackend;
