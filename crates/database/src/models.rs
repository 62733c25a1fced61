//! Database models.

use guardian_core::{AlertStatus, GeoPoint, SyncStatus, TriggerMethod};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// An emergency contact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct EmergencyContact {
    /// Server id, or a `local_` placeholder until the first upload succeeds.
    pub id: String,
    /// Display name
    pub name: String,
    /// Phone number texts and calls go to
    pub phone: String,
    /// Free-form relationship (e.g., "Sister")
    pub relationship: String,
    /// At most one contact is primary; it receives the emergency call.
    pub is_primary: bool,
    /// Whether the backend has this version.
    #[sqlx(try_from = "String")]
    pub sync_status: SyncStatus,
    /// Bumped on every local edit; used to detect edits racing an upload.
    pub revision: i64,
}

impl EmergencyContact {
    /// Whether the id was generated locally.
    pub fn is_local_only(&self) -> bool {
        guardian_core::placeholder::is_placeholder(&self.id)
    }
}

/// A timestamped position fix.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct LocationSample {
    pub id: String,
    pub latitude: f64,
    pub longitude: f64,
    /// Reverse-geocoded address, if one was resolved.
    pub address: Option<String>,
    /// Unix epoch milliseconds.
    pub timestamp: i64,
    /// Horizontal accuracy in meters.
    pub accuracy: f64,
}

impl LocationSample {
    pub fn point(&self) -> GeoPoint {
        GeoPoint::new(self.latitude, self.longitude)
    }
}

/// An alert that has not been fully acknowledged by the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct OutboxAlert {
    /// Placeholder id the orchestrator holds for this alert.
    pub local_id: String,
    /// Backend id once the create call succeeded.
    pub server_id: Option<String>,
    /// Unix epoch milliseconds.
    pub created_at: i64,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub address: Option<String>,
    #[sqlx(try_from = "String")]
    pub alert_type: TriggerMethod,
    #[sqlx(try_from = "String")]
    pub status: AlertStatus,
    #[sqlx(try_from = "String")]
    pub sync_status: SyncStatus,
    pub revision: i64,
}

impl OutboxAlert {
    pub fn point(&self) -> Option<GeoPoint> {
        match (self.latitude, self.longitude) {
            (Some(lat), Some(lon)) => Some(GeoPoint::new(lat, lon)),
            _ => None,
        }
    }
}
