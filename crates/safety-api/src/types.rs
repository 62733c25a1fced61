//! Request and response types for the safety backend.
//!
//! The backend is loose about JSON types: ids and coordinates arrive either as
//! numbers or as strings, and booleans as `0`/`1`. The deserializers here
//! accept all of those.

use guardian_core::{AlertStatus, GeoPoint, TriggerMethod};
use serde::{Deserialize, Deserializer, Serialize};

/// Parameters of a create-alert call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewAlert {
    pub point: Option<GeoPoint>,
    pub address: Option<String>,
    pub alert_type: TriggerMethod,
    pub status: AlertStatus,
}

impl NewAlert {
    /// A fresh active alert.
    pub fn active(alert_type: TriggerMethod, point: Option<GeoPoint>, address: Option<String>) -> Self {
        Self {
            point,
            address,
            alert_type,
            status: AlertStatus::Active,
        }
    }
}

/// An alert as returned by the history endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteAlert {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    #[serde(rename = "type", default)]
    pub alert_type: String,
    #[serde(default)]
    pub status: String,
    #[serde(default, deserialize_with = "optional_f64")]
    pub latitude: Option<f64>,
    #[serde(default, deserialize_with = "optional_f64")]
    pub longitude: Option<f64>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default, deserialize_with = "optional_string_or_number")]
    pub timestamp: Option<String>,
}

impl RemoteAlert {
    /// The status, if it is one this client knows.
    pub fn parsed_status(&self) -> Option<AlertStatus> {
        self.status.parse().ok()
    }

    /// The trigger tag, if it is one this client knows.
    pub fn parsed_type(&self) -> Option<TriggerMethod> {
        self.alert_type.parse().ok()
    }
}

/// Contact fields sent on add/update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactPayload {
    pub name: String,
    pub phone: String,
    pub relationship: String,
    pub is_primary: bool,
}

/// A contact as returned by the contacts endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteContact {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    pub name: String,
    pub phone: String,
    #[serde(default)]
    pub relationship: String,
    #[serde(default, deserialize_with = "flag")]
    pub is_primary: bool,
}

/// A position fix pushed to the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationUpdate {
    pub latitude: f64,
    pub longitude: f64,
    pub accuracy: f64,
    /// Unix epoch milliseconds.
    pub timestamp: i64,
    pub address: Option<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Loose {
    Str(String),
    Int(i64),
    Float(f64),
    Bool(bool),
}

impl Loose {
    fn into_string(self) -> String {
        match self {
            Loose::Str(s) => s,
            Loose::Int(i) => i.to_string(),
            Loose::Float(f) => f.to_string(),
            Loose::Bool(b) => b.to_string(),
        }
    }
}

pub(crate) fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Loose::deserialize(deserializer)?.into_string())
}

fn optional_string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Loose>::deserialize(deserializer)?.map(Loose::into_string))
}

fn optional_f64<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Loose>::deserialize(deserializer)? {
        Some(Loose::Float(f)) => Some(f),
        Some(Loose::Int(i)) => Some(i as f64),
        Some(Loose::Str(s)) => s.trim().parse().ok(),
        Some(Loose::Bool(_)) | None => None,
    })
}

fn flag<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Loose>::deserialize(deserializer)? {
        Some(Loose::Bool(b)) => b,
        Some(Loose::Int(i)) => i != 0,
        Some(Loose::Float(f)) => f != 0.0,
        Some(Loose::Str(s)) => matches!(s.trim(), "1" | "true"),
        None => false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remote_contact_accepts_loose_types() {
        let json = r#"{"id": 17, "name": "Maya", "phone": "+15551234", "relationship": "Sister", "is_primary": "1"}"#;
        let contact: RemoteContact = serde_json::from_str(json).unwrap();
        assert_eq!(contact.id, "17");
        assert!(contact.is_primary);

        let json = r#"{"id": "18", "name": "Ana", "phone": "+15550000", "is_primary": 0}"#;
        let contact: RemoteContact = serde_json::from_str(json).unwrap();
        assert_eq!(contact.id, "18");
        assert!(!contact.is_primary);
        assert_eq!(contact.relationship, "");
    }

    #[test]
    fn test_remote_alert_parses_string_coordinates() {
        let json = r#"{
            "id": "A1", "type": "shake_detection", "status": "cancelled",
            "latitude": "40.7128", "longitude": "-74.0060", "address": null,
            "timestamp": "2025-03-01 12:00:00"
        }"#;
        let alert: RemoteAlert = serde_json::from_str(json).unwrap();
        assert_eq!(alert.latitude, Some(40.7128));
        assert_eq!(alert.longitude, Some(-74.006));
        assert_eq!(alert.parsed_status(), Some(AlertStatus::Cancelled));
        assert_eq!(alert.parsed_type(), Some(TriggerMethod::Shake));
    }
}
