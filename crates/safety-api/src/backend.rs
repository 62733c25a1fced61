//! The backend trait every caller depends on.

use async_trait::async_trait;
use guardian_core::AlertStatus;

use crate::error::ApiError;
use crate::types::{ContactPayload, LocationUpdate, NewAlert, RemoteAlert, RemoteContact};

/// Operations the remote safety backend offers.
///
/// [`SafetyClient`](crate::SafetyClient) implements this over HTTP; tests use
/// an in-memory implementation.
#[async_trait]
pub trait SafetyBackend: Send + Sync {
    /// Create an alert and return the id the backend assigned.
    async fn create_alert(&self, user_id: &str, alert: &NewAlert) -> Result<String, ApiError>;

    /// Set the status of an existing alert.
    async fn update_alert_status(
        &self,
        alert_id: &str,
        status: AlertStatus,
        user_id: &str,
    ) -> Result<(), ApiError>;

    /// Get every alert recorded for the user.
    async fn alert_history(&self, user_id: &str) -> Result<Vec<RemoteAlert>, ApiError>;

    /// Create a contact and return the id the backend assigned.
    async fn add_contact(&self, contact: &ContactPayload) -> Result<String, ApiError>;

    /// Overwrite an existing contact.
    async fn update_contact(&self, contact_id: &str, contact: &ContactPayload)
        -> Result<(), ApiError>;

    /// Delete a contact.
    async fn delete_contact(&self, contact_id: &str) -> Result<(), ApiError>;

    /// Get the user's contacts.
    async fn contacts(&self) -> Result<Vec<RemoteContact>, ApiError>;

    /// Push a location fix.
    async fn update_location(&self, user_id: &str, update: &LocationUpdate)
        -> Result<(), ApiError>;

    /// Whether the backend is reachable.
    async fn health_check(&self) -> Result<bool, ApiError>;
}

/// Supplies the bearer credential attached to each request.
pub trait TokenProvider: Send + Sync {
    fn bearer_token(&self) -> Option<String>;
}

/// A token fixed at construction time.
#[derive(Debug, Clone, Default)]
pub struct StaticToken(pub Option<String>);

impl TokenProvider for StaticToken {
    fn bearer_token(&self) -> Option<String> {
        self.0.clone()
    }
}
