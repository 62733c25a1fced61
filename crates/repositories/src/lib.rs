//! Offline-first repositories for Guardian.
//!
//! Each repository reads from the local SQLite store and mirrors writes to the
//! safety backend when it can:
//!
//! - [`ContactRepository`] - emergency contacts; saves are local-first and
//!   uploaded immediately or deferred to the sync worker
//! - [`AlertRepository`] - alerts; creation goes to the backend, with an
//!   outbox for when it cannot
//! - [`LocationRepository`] - retention-bounded location history
//!
//! [`Connectivity`] carries the online/offline state and [`sync_channel`]
//! connects the repositories to the sync worker.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use database::Database;
//! use repositories::{sync_channel, Connectivity, ContactRepository, NewContact};
//! use safety_api::{BackendConfig, SafetyClient};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let db = Database::connect("sqlite:guardian.db?mode=rwc").await?;
//! db.migrate().await?;
//!
//! let backend = Arc::new(SafetyClient::new(BackendConfig::from_env())?);
//! let connectivity = Connectivity::new(true);
//! let (requester, _requests) = sync_channel();
//!
//! let contacts = ContactRepository::new(db, backend, connectivity, requester);
//! let saved = contacts
//!     .add(NewContact {
//!         name: "Maya".to_string(),
//!         phone: "+15551234567".to_string(),
//!         relationship: "Sister".to_string(),
//!         is_primary: true,
//!     })
//!     .await?;
//! println!("Saved {} ({})", saved.name, saved.sync_status);
//! # Ok(())
//! # }
//! ```

pub mod alert;
pub mod connectivity;
pub mod contact;
pub mod error;
pub mod location;
pub mod sync_queue;
pub mod validation;

pub use alert::{AlertHandle, AlertRepository, OutboxOutcome};
pub use connectivity::Connectivity;
pub use contact::{ContactRepository, NewContact, UploadOutcome};
pub use error::{RepositoryError, Result};
pub use location::{LocationFix, LocationRepository, RetentionPolicy};
pub use sync_queue::{sync_channel, SyncReason, SyncRequester, SyncRequests};
pub use validation::ValidationError;
