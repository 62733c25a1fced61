//! Routes detector output into the SOS coordinator.

use detectors::{DetectorEvent, EventReceiver};
use guardian_core::TriggerMethod;
use orchestrator::SosHandle;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

pub fn spawn(events: EventReceiver, sos: SosHandle) -> JoinHandle<()> {
    tokio::spawn(run(events, sos))
}

/// Forward triggers until every detector has dropped its sender.
pub async fn run(mut events: EventReceiver, sos: SosHandle) {
    while let Some(event) = events.recv().await {
        let Some(method) = route(&event) else {
            continue;
        };
        if let Err(e) = sos.trigger(method) {
            error!(trigger = %method, error = %e, "SOS coordinator unavailable");
            break;
        }
    }
    debug!("Detector event stream closed");
}

/// Present user-facing events and pick out triggers.
fn route(event: &DetectorEvent) -> Option<TriggerMethod> {
    match event {
        DetectorEvent::Trigger { method, utterance } => {
            match utterance {
                Some(text) => warn!(trigger = %method, utterance = %text, "Distress detected"),
                None => warn!(trigger = %method, "Distress detected"),
            }
            Some(*method)
        }
        DetectorEvent::ConfirmationRequested { source, timeout } => {
            info!(
                source = %source,
                timeout_secs = timeout.as_secs(),
                "Confirmation requested; answer before the timeout"
            );
            None
        }
        DetectorEvent::ConfirmationCleared { source, reason } => {
            info!(source = %source, reason = ?reason, "Confirmation closed");
            None
        }
        DetectorEvent::Haptic { source, duration } => {
            debug!(source = %source, duration_ms = duration.as_millis() as u64, "Vibrate");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use detectors::{ClearReason, Detector};
    use std::time::Duration;

    #[test]
    fn test_only_triggers_are_forwarded() {
        assert_eq!(
            route(&DetectorEvent::Trigger {
                method: TriggerMethod::Voice,
                utterance: Some("help me".to_string()),
            }),
            Some(TriggerMethod::Voice)
        );
        assert_eq!(
            route(&DetectorEvent::ConfirmationRequested {
                source: Detector::Shake,
                timeout: Duration::from_secs(10),
            }),
            None
        );
        assert_eq!(
            route(&DetectorEvent::ConfirmationCleared {
                source: Detector::Fall,
                reason: ClearReason::Dismissed,
            }),
            None
        );
        assert_eq!(
            route(&DetectorEvent::Haptic {
                source: Detector::Shake,
                duration: Duration::from_millis(100),
            }),
            None
        );
    }
}
