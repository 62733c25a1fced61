//! Background sync for Guardian.
//!
//! The [`SyncReconciler`] pushes every `pending` contact to the backend one at
//! a time, re-keying placeholder ids as creates succeed, then drains the alert
//! outbox. The [`scheduler`] runs it on sync requests, when connectivity
//! returns, and periodically.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use repositories::{AlertRepository, Connectivity, ContactRepository, SyncRequests};
//! use sync_worker::{scheduler, SyncConfig, SyncReconciler};
//!
//! fn start(
//!     contacts: Arc<ContactRepository>,
//!     alerts: Arc<AlertRepository>,
//!     connectivity: Connectivity,
//!     requests: SyncRequests,
//! ) -> tokio::task::JoinHandle<()> {
//!     let reconciler = SyncReconciler::new(contacts, alerts, connectivity, SyncConfig::from_env());
//!     scheduler::spawn(Arc::new(reconciler), requests)
//! }
//! ```

pub mod config;
pub mod error;
pub mod reconciler;
pub mod scheduler;

pub use config::{RetryConfig, SyncConfig};
pub use error::SyncError;
pub use reconciler::{JobResult, SyncReconciler, SyncReport};
