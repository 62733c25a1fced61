//! Alert lifecycle.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ParseError;

/// Status of an alert record.
///
/// An alert starts `Active` and may move to exactly one terminal status.
/// Terminal statuses never change again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertStatus {
    Active,
    Resolved,
    Cancelled,
    FalseAlarm,
}

impl AlertStatus {
    /// Wire and storage tag.
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertStatus::Active => "active",
            AlertStatus::Resolved => "resolved",
            AlertStatus::Cancelled => "cancelled",
            AlertStatus::FalseAlarm => "false_alarm",
        }
    }

    /// Whether no further transition is allowed.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, AlertStatus::Active)
    }

    /// Whether `self -> next` moves forward.
    ///
    /// Re-applying the current status is accepted so retried updates stay idempotent.
    pub fn can_transition_to(&self, next: AlertStatus) -> bool {
        *self == next || (*self == AlertStatus::Active && next.is_terminal())
    }
}

impl fmt::Display for AlertStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AlertStatus {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "active" => Ok(AlertStatus::Active),
            "resolved" => Ok(AlertStatus::Resolved),
            "cancelled" | "canceled" => Ok(AlertStatus::Cancelled),
            "false_alarm" => Ok(AlertStatus::FalseAlarm),
            _ => Err(ParseError::new("alert status", s)),
        }
    }
}

impl TryFrom<String> for AlertStatus {
    type Error = ParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}
