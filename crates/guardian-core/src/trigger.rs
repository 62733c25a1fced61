//! What started an SOS episode.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ParseError;

/// Source of a trigger. The tag doubles as the alert `type` on the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TriggerMethod {
    /// Confirmed shake gesture.
    #[serde(rename = "shake_detection")]
    Shake,
    /// User pressed "send now" on the fall prompt.
    #[serde(rename = "fall_detection")]
    Fall,
    /// Fall countdown expired without a response.
    #[serde(rename = "fall_detection_automatic")]
    FallAutomatic,
    /// A distress phrase was recognized.
    #[serde(rename = "voice")]
    Voice,
    /// Manual SOS control.
    #[serde(rename = "manual")]
    Manual,
}

impl TriggerMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            TriggerMethod::Shake => "shake_detection",
            TriggerMethod::Fall => "fall_detection",
            TriggerMethod::FallAutomatic => "fall_detection_automatic",
            TriggerMethod::Voice => "voice",
            TriggerMethod::Manual => "manual",
        }
    }

    /// Human-readable reason used in distress messages.
    pub fn describe(&self) -> &'static str {
        match self {
            TriggerMethod::Shake => "shake alert",
            TriggerMethod::Fall => "fall detected",
            TriggerMethod::FallAutomatic => "fall detected, no response from user",
            TriggerMethod::Voice => "voice distress call",
            TriggerMethod::Manual => "SOS button",
        }
    }
}

impl fmt::Display for TriggerMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TriggerMethod {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "shake_detection" => Ok(TriggerMethod::Shake),
            "fall_detection" => Ok(TriggerMethod::Fall),
            "fall_detection_automatic" => Ok(TriggerMethod::FallAutomatic),
            "voice" => Ok(TriggerMethod::Voice),
            "manual" => Ok(TriggerMethod::Manual),
            _ => Err(ParseError::new("trigger method", s)),
        }
    }
}

impl TryFrom<String> for TriggerMethod {
    type Error = ParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}
