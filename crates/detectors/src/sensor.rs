//! Acceleration samples and the source monitors subscribe to.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::trace;

use crate::error::MonitorError;

/// Standard gravity in m/s².
pub const STANDARD_GRAVITY: f64 = 9.80665;

/// One accelerometer reading in m/s², gravity included.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AccelSample {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl AccelSample {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// A device lying flat and still.
    pub fn at_rest() -> Self {
        Self::new(0.0, 0.0, STANDARD_GRAVITY)
    }

    pub fn magnitude(&self) -> f64 {
        (self.x * self.x + self.y * self.y + self.z * self.z).sqrt()
    }
}

/// Something monitors can read acceleration samples from.
pub trait AccelerometerSource: Send + Sync {
    /// Open a new subscription. Fails if the device has no accelerometer.
    fn subscribe(&self) -> Result<broadcast::Receiver<AccelSample>, MonitorError>;
}

/// Fan-out of accelerometer samples to every subscribed monitor.
#[derive(Debug, Clone)]
pub struct AccelBus {
    tx: broadcast::Sender<AccelSample>,
}

impl AccelBus {
    /// `capacity` samples are buffered per subscriber before it starts lagging.
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Publish a sample. Returns how many monitors received it.
    pub fn publish(&self, sample: AccelSample) -> usize {
        match self.tx.send(sample) {
            Ok(receivers) => receivers,
            Err(_) => {
                trace!("No monitors subscribed; sample dropped");
                0
            }
        }
    }
}

impl Default for AccelBus {
    fn default() -> Self {
        Self::new(256)
    }
}

impl AccelerometerSource for AccelBus {
    fn subscribe(&self) -> Result<broadcast::Receiver<AccelSample>, MonitorError> {
        Ok(self.tx.subscribe())
    }
}
