//! SOS coordinator actor.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use database::{EmergencyContact, LocationSample};
use guardian_core::{AlertStatus, TriggerMethod};
use repositories::{AlertHandle, AlertRepository, ContactRepository, LocationRepository};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout, Instant};
use tracing::{debug, error, info, warn};

use crate::error::OrchestratorError;
use crate::formatting::distress_message;
use crate::recorder::{Recorder, RecordingCommand, RecordingQueue};
use crate::state::{SosState, SosStatus};
use crate::telephony::Telephony;

/// Timing knobs for an episode.
#[derive(Debug, Clone)]
pub struct SosConfig {
    /// Delay between starting audio and starting video capture.
    pub video_delay: Duration,
    /// How long alert bookkeeping may hold up notification.
    pub alert_timeout: Duration,
}

impl Default for SosConfig {
    fn default() -> Self {
        Self {
            video_delay: Duration::from_secs(5),
            alert_timeout: Duration::from_secs(10),
        }
    }
}

/// Commands accepted by the coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SosCommand {
    /// Start an episode. Ignored while one is running.
    Trigger(TriggerMethod),
    /// End the running episode as cancelled.
    Cancel,
    /// End the running episode with a terminal status.
    Resolve(AlertStatus),
}

/// Results of work the coordinator handed to background tasks.
enum Completion {
    /// An alert create that outlived the dispatch timeout finished.
    /// `handle` is `None` when the create failed.
    LateAlert {
        episode: u64,
        handle: Option<AlertHandle>,
    },
}

/// Collaborators the coordinator drives.
pub struct SosServices {
    pub contacts: Arc<ContactRepository>,
    pub alerts: Arc<AlertRepository>,
    pub locations: Arc<LocationRepository>,
    pub telephony: Arc<dyn Telephony>,
    pub recorder: Arc<dyn Recorder>,
}

/// Cloneable handle for sending commands and watching state.
#[derive(Clone)]
pub struct SosHandle {
    commands: mpsc::UnboundedSender<SosCommand>,
    status: watch::Receiver<SosStatus>,
}

impl SosHandle {
    pub fn send(&self, command: SosCommand) -> Result<(), OrchestratorError> {
        self.commands
            .send(command)
            .map_err(|_| OrchestratorError::Stopped)
    }

    pub fn trigger(&self, method: TriggerMethod) -> Result<(), OrchestratorError> {
        self.send(SosCommand::Trigger(method))
    }

    pub fn cancel(&self) -> Result<(), OrchestratorError> {
        self.send(SosCommand::Cancel)
    }

    /// End the episode as `resolved`, `false_alarm` or `cancelled`.
    pub fn resolve(&self, status: AlertStatus) -> Result<(), OrchestratorError> {
        if !status.is_terminal() {
            return Err(OrchestratorError::NotTerminal(status));
        }
        self.send(SosCommand::Resolve(status))
    }

    /// Current snapshot.
    pub fn status(&self) -> SosStatus {
        self.status.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SosStatus> {
        self.status.clone()
    }
}

/// Single owner of SOS state.
///
/// Commands are handled one at a time, so overlapping triggers from several
/// detectors resolve to one episode. Notification never waits on alert
/// bookkeeping for longer than [`SosConfig::alert_timeout`].
pub struct SosCoordinator {
    services: SosServices,
    config: SosConfig,
    recording: RecordingQueue,
    status: watch::Sender<SosStatus>,
    completions: mpsc::UnboundedSender<Completion>,
    video_at: Option<Instant>,
    /// Episodes with an alert create still running, and the status each
    /// ended with, if it has.
    late_alerts: HashMap<u64, Option<AlertStatus>>,
}

impl SosCoordinator {
    /// Start the coordinator task.
    pub fn spawn(services: SosServices, config: SosConfig) -> (SosHandle, JoinHandle<()>) {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (completion_tx, completion_rx) = mpsc::unbounded_channel();
        let (status_tx, status_rx) = watch::channel(SosStatus::default());

        let coordinator = Self {
            recording: RecordingQueue::spawn(services.recorder.clone()),
            services,
            config,
            status: status_tx,
            completions: completion_tx,
            video_at: None,
            late_alerts: HashMap::new(),
        };
        let task = tokio::spawn(coordinator.run(command_rx, completion_rx));

        (
            SosHandle {
                commands: command_tx,
                status: status_rx,
            },
            task,
        )
    }

    async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<SosCommand>,
        mut completions: mpsc::UnboundedReceiver<Completion>,
    ) {
        info!("SOS coordinator started");
        let video = sleep(Duration::ZERO);
        tokio::pin!(video);

        loop {
            if let Some(at) = self.video_at {
                video.as_mut().reset(at);
            }

            tokio::select! {
                biased;

                command = commands.recv() => match command {
                    Some(SosCommand::Trigger(method)) => self.on_trigger(method).await,
                    Some(SosCommand::Cancel) => self.on_end(AlertStatus::Cancelled).await,
                    Some(SosCommand::Resolve(status)) => self.on_end(status).await,
                    None => break,
                },

                Some(completion) = completions.recv() => self.on_completion(completion),

                () = &mut video, if self.video_at.is_some() => {
                    self.video_at = None;
                    if self.state() == SosState::Active {
                        info!("Starting video capture");
                        self.recording.issue(RecordingCommand::StartVideo);
                    }
                }
            }
        }

        info!("SOS coordinator stopped");
    }

    fn state(&self) -> SosState {
        self.status.borrow().state
    }

    fn update(&self, f: impl FnOnce(&mut SosStatus)) {
        self.status.send_modify(f);
    }

    async fn on_trigger(&mut self, method: TriggerMethod) {
        let current = self.status.borrow().clone();
        if current.is_active() {
            info!(
                trigger = %method,
                state = %current.state,
                "SOS already in progress; trigger ignored"
            );
            return;
        }

        let episode = current.episode + 1;
        info!(trigger = %method, episode = episode, "SOS triggered");
        self.update(|s| {
            s.state = SosState::Dispatching;
            s.episode = episode;
            s.trigger = Some(method);
            s.alert = None;
            s.last_error = None;
        });

        let location = match self.services.locations.most_recent().await {
            Ok(location) => location,
            Err(e) => {
                warn!(error = %e, "Could not read last location; continuing without it");
                None
            }
        };
        if location.is_none() {
            warn!("No location available for alert");
        }

        let alert = self.create_alert(episode, method, location.clone()).await;

        let contacts = match self.services.contacts.list().await {
            Ok(contacts) => contacts,
            Err(e) => {
                error!(error = %e, "Could not read emergency contacts");
                self.update(|s| s.last_error = Some(e.to_string()));
                Vec::new()
            }
        };

        let message = distress_message(method, location.as_ref(), alert.as_ref());
        self.notify_contacts(&contacts, message);
        self.call_primary(&contacts);

        info!("Starting audio capture");
        self.recording.issue(RecordingCommand::StartAudio);
        self.video_at = Some(Instant::now() + self.config.video_delay);

        self.update(|s| {
            s.state = SosState::Active;
            s.alert = alert;
        });
    }

    /// Create the episode's alert, waiting at most `alert_timeout`.
    ///
    /// A create still running at the deadline keeps going in the background
    /// and reports back through the completion channel.
    async fn create_alert(
        &mut self,
        episode: u64,
        method: TriggerMethod,
        location: Option<LocationSample>,
    ) -> Option<AlertHandle> {
        let alerts = self.services.alerts.clone();
        let mut create =
            tokio::spawn(async move { alerts.create_alert(method, location.as_ref()).await });

        let outcome = timeout(self.config.alert_timeout, &mut create).await;
        match outcome {
            Ok(Ok(Ok(handle))) => {
                info!(alert = %handle, "Alert recorded");
                Some(handle)
            }
            Ok(Ok(Err(e))) => {
                error!(error = %e, "Alert could not be recorded; notifying contacts anyway");
                self.update(|s| s.last_error = Some(e.to_string()));
                None
            }
            Ok(Err(e)) => {
                error!(error = %e, "Alert task failed; notifying contacts anyway");
                self.update(|s| s.last_error = Some(e.to_string()));
                None
            }
            Err(_) => {
                warn!(
                    timeout_ms = self.config.alert_timeout.as_millis() as u64,
                    "Alert still being recorded; notifying contacts without it"
                );
                self.late_alerts.insert(episode, None);
                let completions = self.completions.clone();
                tokio::spawn(async move {
                    let handle = match create.await {
                        Ok(Ok(handle)) => Some(handle),
                        Ok(Err(e)) => {
                            warn!(episode = episode, error = %e, "Late alert could not be recorded");
                            None
                        }
                        Err(e) => {
                            warn!(episode = episode, error = %e, "Late alert task failed");
                            None
                        }
                    };
                    let _ = completions.send(Completion::LateAlert { episode, handle });
                });
                None
            }
        }
    }

    fn notify_contacts(&self, contacts: &[EmergencyContact], message: String) {
        if contacts.is_empty() {
            warn!("No emergency contacts to notify");
            return;
        }
        if !self.services.telephony.can_send_sms() {
            error!("SMS permission not granted; contacts not texted");
            return;
        }

        let telephony = self.services.telephony.clone();
        let recipients: Vec<(String, String)> = contacts
            .iter()
            .map(|c| (c.name.clone(), c.phone.clone()))
            .collect();

        tokio::spawn(async move {
            for (name, phone) in recipients {
                match telephony.send_text(&phone, &message).await {
                    Ok(()) => info!(contact = %name, phone = %phone, "Emergency text sent"),
                    Err(e) => error!(contact = %name, phone = %phone, error = %e, "Emergency text failed"),
                }
            }
        });
    }

    fn call_primary(&self, contacts: &[EmergencyContact]) {
        let Some(contact) = contacts
            .iter()
            .find(|c| c.is_primary)
            .or_else(|| contacts.first())
        else {
            warn!("No emergency contact to call");
            return;
        };
        if !self.services.telephony.can_place_calls() {
            error!("Call permission not granted; no emergency call placed");
            return;
        }

        let telephony = self.services.telephony.clone();
        let name = contact.name.clone();
        let phone = contact.phone.clone();

        tokio::spawn(async move {
            match telephony.place_call(&phone).await {
                Ok(()) => info!(contact = %name, phone = %phone, "Emergency call placed"),
                Err(e) => error!(contact = %name, phone = %phone, error = %e, "Emergency call failed"),
            }
        });
    }

    async fn on_end(&mut self, status: AlertStatus) {
        let current = self.status.borrow().clone();
        if current.state != SosState::Active {
            debug!(state = %current.state, "No active SOS to end");
            return;
        }

        info!(episode = current.episode, status = %status, "Ending SOS");
        self.update(|s| s.state = SosState::Cancelling);

        self.video_at = None;
        self.recording.issue(RecordingCommand::Stop);

        if let Some(pending) = self.late_alerts.get_mut(&current.episode) {
            *pending = Some(status);
        }

        let mut last_error = None;
        if let Some(handle) = current.alert.clone() {
            if let Err(e) = self.set_alert_status(handle, status).await {
                last_error = Some(e);
            }
        }

        self.update(|s| {
            s.state = SosState::Idle;
            s.trigger = None;
            s.alert = None;
            s.ended_with = Some(status);
            if last_error.is_some() {
                s.last_error = last_error;
            }
        });
        info!(status = %status, "SOS ended");
    }

    /// Push a terminal status, waiting at most `alert_timeout`.
    async fn set_alert_status(&self, handle: AlertHandle, status: AlertStatus) -> Result<(), String> {
        let alerts = self.services.alerts.clone();
        let label = handle.to_string();
        let mut update = tokio::spawn(async move { alerts.update_status(&handle, status).await });

        match timeout(self.config.alert_timeout, &mut update).await {
            Ok(Ok(Ok(()))) => {
                info!(alert = %label, status = %status, "Alert status updated");
                Ok(())
            }
            Ok(Ok(Err(e))) => {
                warn!(alert = %label, status = %status, error = %e, "Alert status update failed");
                Err(e.to_string())
            }
            Ok(Err(e)) => {
                warn!(alert = %label, error = %e, "Alert status task failed");
                Err(e.to_string())
            }
            Err(_) => {
                warn!(alert = %label, status = %status, "Alert status update still running");
                Ok(())
            }
        }
    }

    fn on_completion(&mut self, completion: Completion) {
        match completion {
            Completion::LateAlert { episode, handle } => {
                let ended_with = self.late_alerts.remove(&episode).flatten();
                let Some(handle) = handle else {
                    return;
                };

                let current = self.status.borrow().clone();
                let running = current.episode == episode
                    && matches!(current.state, SosState::Active | SosState::Dispatching);
                if running {
                    info!(alert = %handle, "Alert recorded after dispatch");
                    self.update(|s| s.alert = Some(handle));
                    return;
                }

                // The episode ended before its alert existed; the alert still needs the outcome.
                let Some(status) = ended_with else {
                    warn!(alert = %handle, episode = episode, "Late alert for an episode with no recorded end");
                    return;
                };
                info!(alert = %handle, episode = episode, status = %status, "Applying end status to late alert");
                let alerts = self.services.alerts.clone();
                tokio::spawn(async move {
                    if let Err(e) = alerts.update_status(&handle, status).await {
                        warn!(alert = %handle, error = %e, "Late alert status update failed");
                    }
                });
            }
        }
    }
}
