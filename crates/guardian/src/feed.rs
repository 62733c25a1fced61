//! Line-delimited JSON input standing in for sensors, speech and the UI.
//!
//! One object per line, tagged by `type`:
//!
//! ```text
//! {"type":"accel","x":0.3,"y":9.7,"z":0.4}
//! {"type":"speech","text":"somebody help me"}
//! {"type":"confirm_shake"}
//! {"type":"resolve","status":"false_alarm"}
//! {"type":"online","online":false}
//! {"type":"location","latitude":51.5074,"longitude":-0.1278,"accuracy":12.0}
//! {"type":"add_contact","name":"Maya","phone":"+15550000001","relationship":"Sister"}
//! ```

use guardian_core::AlertStatus;
use serde::Deserialize;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FeedEvent {
    /// Accelerometer reading in m/s².
    Accel { x: f64, y: f64, z: f64 },
    /// Recognised speech. `partial` marks an interim hypothesis.
    Speech {
        text: String,
        #[serde(default)]
        partial: bool,
    },
    /// The speaker went silent.
    SpeechEnd,
    ConfirmShake,
    CancelShake,
    ImOk,
    FallSendNow,
    /// Manual SOS button.
    Panic,
    Cancel,
    Resolve { status: AlertStatus },
    /// Override the connectivity flag until the next health probe.
    Online { online: bool },
    /// Move failed contacts back to pending.
    RetryFailed,
    /// Position fix from the location provider.
    Location {
        latitude: f64,
        longitude: f64,
        /// Metres.
        #[serde(default)]
        accuracy: f64,
        #[serde(default)]
        address: Option<String>,
        /// Unix epoch milliseconds.
        #[serde(default)]
        timestamp: Option<i64>,
    },
    AddContact {
        name: String,
        phone: String,
        relationship: String,
        #[serde(default)]
        is_primary: bool,
    },
}

/// Parse one input line. Blank lines and `#` comments yield `None`.
pub fn parse_line(line: &str) -> Result<Option<FeedEvent>, serde_json::Error> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(None);
    }
    serde_json::from_str(line).map(Some)
}
