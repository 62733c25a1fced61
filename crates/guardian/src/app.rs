//! Running monitors and the dispatch of feed events to them.

use std::sync::Arc;

use detectors::{
    AccelBus, AccelSample, FallCommand, MonitorHandle, ShakeCommand, SpeechEvent, VoiceCommand,
};
use guardian_core::TriggerMethod;
use orchestrator::SosHandle;
use repositories::{Connectivity, ContactRepository, LocationFix, LocationRepository, NewContact};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::feed::FeedEvent;

pub struct App {
    pub bus: AccelBus,
    pub shake: Option<MonitorHandle<ShakeCommand>>,
    pub fall: Option<MonitorHandle<FallCommand>>,
    pub voice: Option<MonitorHandle<VoiceCommand>>,
    /// Feeds the voice monitor's recognizer.
    pub speech: Option<mpsc::UnboundedSender<SpeechEvent>>,
    pub sos: SosHandle,
    pub connectivity: Connectivity,
    pub contacts: Arc<ContactRepository>,
    pub locations: Arc<LocationRepository>,
}

impl App {
    pub async fn handle(&self, event: FeedEvent) {
        debug!(event = ?event, "Feed event");

        match event {
            FeedEvent::Accel { x, y, z } => {
                self.bus.publish(AccelSample::new(x, y, z));
            }
            FeedEvent::Speech { text, partial } => {
                let event = if partial {
                    SpeechEvent::Partial(vec![text])
                } else {
                    SpeechEvent::Final(vec![text])
                };
                self.speak(event);
            }
            FeedEvent::SpeechEnd => self.speak(SpeechEvent::EndOfSpeech),
            FeedEvent::ConfirmShake => command(&self.shake, ShakeCommand::Confirm),
            FeedEvent::CancelShake => command(&self.shake, ShakeCommand::Cancel),
            FeedEvent::ImOk => command(&self.fall, FallCommand::ImOk),
            FeedEvent::FallSendNow => command(&self.fall, FallCommand::SendNow),
            FeedEvent::Panic => {
                if let Err(e) = self.sos.trigger(TriggerMethod::Manual) {
                    error!(error = %e, "Manual SOS failed");
                }
            }
            FeedEvent::Cancel => {
                if let Err(e) = self.sos.cancel() {
                    error!(error = %e, "Cancel failed");
                }
            }
            FeedEvent::Resolve { status } => {
                if let Err(e) = self.sos.resolve(status) {
                    warn!(status = %status, error = %e, "Resolve rejected");
                }
            }
            FeedEvent::Online { online } => self.connectivity.set_online(online),
            FeedEvent::RetryFailed => match self.contacts.retry_failed().await {
                Ok(moved) => info!(contacts = moved, "Failed contacts queued for retry"),
                Err(e) => error!(error = %e, "Could not requeue failed contacts"),
            },
            FeedEvent::Location {
                latitude,
                longitude,
                accuracy,
                address,
                timestamp,
            } => {
                let fix = LocationFix {
                    latitude,
                    longitude,
                    accuracy,
                    address,
                    timestamp,
                };
                match self.locations.record(fix).await {
                    Ok(sample) => debug!(location_id = %sample.id, "Location recorded"),
                    Err(e) => warn!(error = %e, "Location rejected"),
                }
            }
            FeedEvent::AddContact {
                name,
                phone,
                relationship,
                is_primary,
            } => {
                let contact = NewContact {
                    name,
                    phone,
                    relationship,
                    is_primary,
                };
                match self.contacts.add(contact).await {
                    Ok(stored) => info!(
                        contact_id = %stored.id,
                        sync_status = %stored.sync_status,
                        "Emergency contact saved"
                    ),
                    Err(e) => warn!(error = %e, "Emergency contact rejected"),
                }
            }
        }
    }

    fn speak(&self, event: SpeechEvent) {
        match &self.speech {
            Some(tx) => {
                if tx.send(event).is_err() {
                    warn!("Voice monitor stopped; speech dropped");
                }
            }
            None => debug!("Voice monitor not running; speech ignored"),
        }
    }

    /// Stop every monitor and wait for it to finish.
    pub async fn shutdown(self) {
        if let Some(handle) = self.shake {
            let _ = handle.send(ShakeCommand::Stop);
            finish(handle).await;
        }
        if let Some(handle) = self.fall {
            let _ = handle.send(FallCommand::Stop);
            finish(handle).await;
        }
        if let Some(handle) = self.voice {
            let _ = handle.send(VoiceCommand::Stop);
            finish(handle).await;
        }
    }
}

fn command<C: std::fmt::Debug + Copy>(handle: &Option<MonitorHandle<C>>, cmd: C) {
    let Some(handle) = handle else {
        debug!(command = ?cmd, "Monitor not running; command ignored");
        return;
    };
    if let Err(e) = handle.send(cmd) {
        warn!(detector = %handle.detector(), command = ?cmd, error = %e, "Monitor command failed");
    }
}

async fn finish<C>(handle: MonitorHandle<C>) {
    let detector = handle.detector();
    match handle.join().await {
        Ok(()) => debug!(detector = %detector, "Monitor finished"),
        Err(e) => warn!(detector = %detector, error = %e, "Monitor ended with error"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use database::Database;
    use mock_backend::MockBackend;
    use orchestrator::{NoOpRecorder, NoOpTelephony, SosConfig, SosCoordinator, SosServices};
    use repositories::{sync_channel, AlertRepository, RetentionPolicy, SyncRequests};

    struct Fixture {
        app: App,
        backend: MockBackend,
        _requests: SyncRequests,
    }

    async fn fixture(online: bool) -> Fixture {
        let db = Database::connect_with_pool_size("sqlite::memory:", 1).await.unwrap();
        db.migrate().await.unwrap();
        let backend = MockBackend::new();
        let remote: Arc<dyn safety_api::SafetyBackend> = Arc::new(backend.clone());
        let connectivity = Connectivity::new(online);
        let (requester, requests) = sync_channel();

        let contacts = Arc::new(ContactRepository::new(
            db.clone(),
            remote.clone(),
            connectivity.clone(),
            requester.clone(),
        ));
        let alerts = Arc::new(AlertRepository::new(
            db.clone(),
            remote.clone(),
            "user-1",
            connectivity.clone(),
            requester,
        ));
        let locations = Arc::new(
            LocationRepository::open(
                db,
                remote,
                "user-1",
                connectivity.clone(),
                RetentionPolicy::default(),
            )
            .await
            .unwrap(),
        );
        let (sos, _task) = SosCoordinator::spawn(
            SosServices {
                contacts: contacts.clone(),
                alerts,
                locations: locations.clone(),
                telephony: Arc::new(NoOpTelephony),
                recorder: Arc::new(NoOpRecorder),
            },
            SosConfig::default(),
        );

        Fixture {
            app: App {
                bus: AccelBus::default(),
                shake: None,
                fall: None,
                voice: None,
                speech: None,
                sos,
                connectivity,
                contacts,
                locations,
            },
            backend,
            _requests: requests,
        }
    }

    #[tokio::test]
    async fn test_location_event_is_recorded() {
        let f = fixture(false).await;

        f.app
            .handle(FeedEvent::Location {
                latitude: 51.5074,
                longitude: -0.1278,
                accuracy: 12.0,
                address: Some("Trafalgar Square".to_string()),
                timestamp: None,
            })
            .await;

        let latest = f.app.locations.most_recent().await.unwrap().unwrap();
        assert_eq!(latest.latitude, 51.5074);
        assert_eq!(latest.address.as_deref(), Some("Trafalgar Square"));
    }

    #[tokio::test]
    async fn test_add_contact_offline_stays_pending() {
        let f = fixture(false).await;

        f.app
            .handle(FeedEvent::AddContact {
                name: "Ravi".to_string(),
                phone: "+15550000002".to_string(),
                relationship: "Brother".to_string(),
                is_primary: false,
            })
            .await;

        let listed = f.app.contacts.list().await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].sync_status, guardian_core::SyncStatus::Pending);
        assert!(f.backend.stored_contacts().is_empty());
    }

    #[tokio::test]
    async fn test_add_contact_event_saves_contact() {
        let f = fixture(true).await;

        f.app
            .handle(FeedEvent::AddContact {
                name: "Maya".to_string(),
                phone: "+15550000001".to_string(),
                relationship: "Sister".to_string(),
                is_primary: true,
            })
            .await;

        let listed = f.app.contacts.list().await.unwrap();
        assert_eq!(listed.len(), 1);
        assert!(listed[0].is_primary);
        assert_eq!(f.backend.stored_contacts().len(), 1);
    }
}
