use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use database::Database;
use guardian_core::{AlertStatus, TriggerMethod};
use mock_backend::{Failure, MockBackend, Operation};
use orchestrator::{
    OrchestratorError, Recorder, RecorderError, RecordingCommand, SosConfig, SosCoordinator,
    SosHandle, SosServices, SosState, Telephony, TelephonyError,
};
use repositories::{
    sync_channel, AlertHandle, AlertRepository, Connectivity, ContactRepository, LocationFix,
    LocationRepository, NewContact, RetentionPolicy, SyncRequests,
};

#[derive(Default)]
struct RecordingTelephony {
    deny_calls: bool,
    texts: Mutex<Vec<(String, Vec<String>)>>,
    calls: Mutex<Vec<String>>,
}

impl RecordingTelephony {
    fn texts(&self) -> Vec<(String, Vec<String>)> {
        self.texts.lock().unwrap().clone()
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Telephony for RecordingTelephony {
    fn can_send_sms(&self) -> bool {
        true
    }

    fn can_place_calls(&self) -> bool {
        !self.deny_calls
    }

    async fn send_segments(&self, phone: &str, segments: &[String]) -> Result<(), TelephonyError> {
        self.texts
            .lock()
            .unwrap()
            .push((phone.to_string(), segments.to_vec()));
        Ok(())
    }

    async fn place_call(&self, phone: &str) -> Result<(), TelephonyError> {
        self.calls.lock().unwrap().push(phone.to_string());
        Ok(())
    }
}

#[derive(Default)]
struct RecordingRecorder {
    commands: Mutex<Vec<(RecordingCommand, Instant)>>,
}

impl RecordingRecorder {
    fn push(&self, command: RecordingCommand) {
        self.commands
            .lock()
            .unwrap()
            .push((command, Instant::now()));
    }

    fn commands(&self) -> Vec<RecordingCommand> {
        self.commands.lock().unwrap().iter().map(|(c, _)| *c).collect()
    }

    fn issued_at(&self, command: RecordingCommand) -> Option<Instant> {
        self.commands
            .lock()
            .unwrap()
            .iter()
            .find(|(c, _)| *c == command)
            .map(|(_, at)| *at)
    }
}

#[async_trait]
impl Recorder for RecordingRecorder {
    async fn start_audio(&self) -> Result<(), RecorderError> {
        self.push(RecordingCommand::StartAudio);
        Ok(())
    }

    async fn start_video(&self) -> Result<(), RecorderError> {
        self.push(RecordingCommand::StartVideo);
        Ok(())
    }

    async fn stop(&self) -> Result<(), RecorderError> {
        self.push(RecordingCommand::Stop);
        Ok(())
    }
}

const VIDEO_DELAY: Duration = Duration::from_millis(300);

struct Harness {
    sos: SosHandle,
    backend: MockBackend,
    contacts: Arc<ContactRepository>,
    locations: Arc<LocationRepository>,
    telephony: Arc<RecordingTelephony>,
    recorder: Arc<RecordingRecorder>,
    _requests: SyncRequests,
}

async fn harness_with(backend: MockBackend, telephony: RecordingTelephony, config: SosConfig) -> Harness {
    let db = Database::connect_with_pool_size("sqlite::memory:", 1)
        .await
        .unwrap();
    db.migrate().await.unwrap();

    let connectivity = Connectivity::new(true);
    let (requester, requests) = sync_channel();
    let api = Arc::new(backend.clone());

    let contacts = Arc::new(ContactRepository::new(
        db.clone(),
        api.clone(),
        connectivity.clone(),
        requester.clone(),
    ));
    let alerts = Arc::new(AlertRepository::new(
        db.clone(),
        api.clone(),
        "user-1",
        connectivity.clone(),
        requester,
    ));
    let locations = Arc::new(
        LocationRepository::open(db, api, "user-1", connectivity, RetentionPolicy::default())
            .await
            .unwrap(),
    );

    let telephony = Arc::new(telephony);
    let recorder = Arc::new(RecordingRecorder::default());
    let (sos, _task) = SosCoordinator::spawn(
        SosServices {
            contacts: contacts.clone(),
            alerts,
            locations: locations.clone(),
            telephony: telephony.clone(),
            recorder: recorder.clone(),
        },
        config,
    );

    Harness {
        sos,
        backend,
        contacts,
        locations,
        telephony,
        recorder,
        _requests: requests,
    }
}

async fn harness() -> Harness {
    harness_with(
        MockBackend::new(),
        RecordingTelephony::default(),
        SosConfig {
            video_delay: VIDEO_DELAY,
            alert_timeout: Duration::from_secs(1),
        },
    )
    .await
}

async fn add_contact(h: &Harness, name: &str, phone: &str, is_primary: bool) {
    h.contacts
        .add(NewContact {
            name: name.to_string(),
            phone: phone.to_string(),
            relationship: "Family".to_string(),
            is_primary,
        })
        .await
        .unwrap();
}

async fn seed_contacts(h: &Harness) {
    add_contact(h, "Ravi", "+15550000001", false).await;
    add_contact(h, "Maya", "+15550000002", true).await;
    add_contact(h, "Zoe", "+15550000003", false).await;
}

async fn seed_location(h: &Harness) {
    h.locations
        .record(LocationFix {
            latitude: 28.6139,
            longitude: 77.209,
            accuracy: 6.0,
            address: Some("Connaught Place, New Delhi".to_string()),
            timestamp: None,
        })
        .await
        .unwrap();
}

async fn wait_for_state(sos: &SosHandle, state: SosState) {
    let mut rx = sos.subscribe();
    tokio::time::timeout(Duration::from_secs(5), rx.wait_for(|s| s.state == state))
        .await
        .expect("state not reached in time")
        .unwrap();
}

async fn wait_for(mut condition: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !condition() {
        assert!(Instant::now() < deadline, "condition not met in time");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

#[tokio::test]
async fn test_shake_trigger_dispatches_everything() {
    let h = harness().await;
    seed_contacts(&h).await;
    seed_location(&h).await;

    h.sos.trigger(TriggerMethod::Shake).unwrap();
    wait_for_state(&h.sos, SosState::Active).await;

    let status = h.sos.status();
    assert_eq!(status.alert, Some(AlertHandle::Remote("A1".to_string())));
    assert_eq!(status.trigger, Some(TriggerMethod::Shake));

    let alert = h.backend.alert("A1").unwrap();
    assert_eq!(alert.status, "active");
    assert_eq!(alert.alert_type, "shake_detection");
    assert_eq!(alert.address.as_deref(), Some("Connaught Place, New Delhi"));

    let telephony = h.telephony.clone();
    wait_for(move || telephony.texts().len() == 3).await;
    for (_, segments) in h.telephony.texts() {
        let body = segments.concat();
        assert!(body.starts_with("EMERGENCY: I need help!"));
        assert!(body.contains("Connaught Place, New Delhi"));
        assert!(body.contains("https://maps.google.com/?q=28.6139,77.209"));
        assert!(body.contains("Alert ID: A1"));
    }

    let telephony = h.telephony.clone();
    wait_for(move || !telephony.calls().is_empty()).await;
    assert_eq!(h.telephony.calls(), vec!["+15550000002".to_string()]);

    let recorder = h.recorder.clone();
    wait_for(move || recorder.commands().contains(&RecordingCommand::StartVideo)).await;
    assert_eq!(
        h.recorder.commands(),
        vec![RecordingCommand::StartAudio, RecordingCommand::StartVideo]
    );
    let audio = h.recorder.issued_at(RecordingCommand::StartAudio).unwrap();
    let video = h.recorder.issued_at(RecordingCommand::StartVideo).unwrap();
    assert!(video.duration_since(audio) >= VIDEO_DELAY - Duration::from_millis(20));
}

#[tokio::test]
async fn test_cancel_ends_episode() {
    let h = harness().await;
    seed_contacts(&h).await;

    h.sos.trigger(TriggerMethod::Shake).unwrap();
    wait_for_state(&h.sos, SosState::Active).await;

    h.sos.cancel().unwrap();
    wait_for_state(&h.sos, SosState::Idle).await;

    assert_eq!(h.backend.alert("A1").unwrap().status, "cancelled");
    assert_eq!(h.sos.status().ended_with, Some(AlertStatus::Cancelled));
    assert_eq!(h.sos.status().alert, None);

    let recorder = h.recorder.clone();
    wait_for(move || recorder.commands().contains(&RecordingCommand::Stop)).await;

    // The video start that was scheduled never runs.
    tokio::time::sleep(VIDEO_DELAY * 2).await;
    assert!(!h.recorder.commands().contains(&RecordingCommand::StartVideo));
}

#[tokio::test]
async fn test_trigger_while_active_is_ignored() {
    let h = harness().await;
    seed_contacts(&h).await;

    h.sos.trigger(TriggerMethod::Shake).unwrap();
    h.sos.trigger(TriggerMethod::Voice).unwrap();
    wait_for_state(&h.sos, SosState::Active).await;

    let telephony = h.telephony.clone();
    wait_for(move || telephony.texts().len() == 3).await;

    h.sos.trigger(TriggerMethod::FallAutomatic).unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    let status = h.sos.status();
    assert_eq!(status.state, SosState::Active);
    assert_eq!(status.episode, 1);
    assert_eq!(status.trigger, Some(TriggerMethod::Shake));
    assert_eq!(h.backend.alerts().len(), 1);
    assert_eq!(h.telephony.texts().len(), 3);
    assert_eq!(h.telephony.calls().len(), 1);
}

#[tokio::test]
async fn test_alert_failure_does_not_block_notification() {
    let backend = MockBackend::new();
    let h = harness_with(
        backend,
        RecordingTelephony::default(),
        SosConfig {
            video_delay: VIDEO_DELAY,
            alert_timeout: Duration::from_secs(1),
        },
    )
    .await;
    seed_contacts(&h).await;
    h.backend
        .fail_always(Operation::CreateAlert, Failure::Unavailable);

    h.sos.trigger(TriggerMethod::Voice).unwrap();
    wait_for_state(&h.sos, SosState::Active).await;

    assert!(matches!(h.sos.status().alert, Some(AlertHandle::Queued(_))));

    let telephony = h.telephony.clone();
    wait_for(move || telephony.texts().len() == 3 && telephony.calls().len() == 1).await;
    for (_, segments) in h.telephony.texts() {
        let body = segments.concat();
        assert!(!body.contains("Alert ID"));
        assert!(!body.contains("My current location"));
    }
}

#[tokio::test]
async fn test_slow_alert_is_cancelled_once_created() {
    let backend = MockBackend::new();
    backend.set_latency(Operation::CreateAlert, Duration::from_millis(500));
    let h = harness_with(
        backend,
        RecordingTelephony::default(),
        SosConfig {
            video_delay: VIDEO_DELAY,
            alert_timeout: Duration::from_millis(100),
        },
    )
    .await;
    add_contact(&h, "Maya", "+15550000002", true).await;

    let started = Instant::now();
    h.sos.trigger(TriggerMethod::Manual).unwrap();
    wait_for_state(&h.sos, SosState::Active).await;
    assert!(started.elapsed() < Duration::from_millis(450));
    assert_eq!(h.sos.status().alert, None);

    h.sos.cancel().unwrap();
    wait_for_state(&h.sos, SosState::Idle).await;

    let backend = h.backend.clone();
    wait_for(move || {
        backend
            .alert("A1")
            .map(|a| a.status == "cancelled")
            .unwrap_or(false)
    })
    .await;
}

#[tokio::test]
async fn test_slow_alert_from_ended_episode_gets_its_end_status() {
    let backend = MockBackend::new();
    backend.set_latency(Operation::CreateAlert, Duration::from_millis(600));
    let h = harness_with(
        backend,
        RecordingTelephony::default(),
        SosConfig {
            video_delay: VIDEO_DELAY,
            alert_timeout: Duration::from_millis(100),
        },
    )
    .await;
    add_contact(&h, "Maya", "+15550000002", true).await;

    h.sos.trigger(TriggerMethod::Manual).unwrap();
    wait_for_state(&h.sos, SosState::Active).await;
    h.sos.cancel().unwrap();
    wait_for_state(&h.sos, SosState::Idle).await;

    // A new episode is running by the time the first alert exists.
    h.sos.trigger(TriggerMethod::Shake).unwrap();
    wait_for_state(&h.sos, SosState::Active).await;
    assert_eq!(h.sos.status().episode, 2);

    let backend = h.backend.clone();
    wait_for(move || {
        backend
            .alerts()
            .iter()
            .any(|a| a.alert_type == "manual" && a.status == "cancelled")
    })
    .await;

    let sos = h.sos.clone();
    wait_for(move || sos.status().alert.is_some()).await;
    let shake: Vec<_> = h
        .backend
        .alerts()
        .into_iter()
        .filter(|a| a.alert_type == "shake_detection")
        .collect();
    assert_eq!(shake.len(), 1);
    assert_eq!(shake[0].status, "active");
    assert_eq!(h.sos.status().state, SosState::Active);
}

#[tokio::test]
async fn test_call_skipped_without_permission() {
    let h = harness_with(
        MockBackend::new(),
        RecordingTelephony {
            deny_calls: true,
            ..RecordingTelephony::default()
        },
        SosConfig {
            video_delay: VIDEO_DELAY,
            alert_timeout: Duration::from_secs(1),
        },
    )
    .await;
    seed_contacts(&h).await;

    h.sos.trigger(TriggerMethod::Manual).unwrap();
    wait_for_state(&h.sos, SosState::Active).await;

    let telephony = h.telephony.clone();
    wait_for(move || telephony.texts().len() == 3).await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(h.telephony.calls().is_empty());
}

#[tokio::test]
async fn test_first_contact_called_without_primary() {
    let h = harness().await;
    add_contact(&h, "Zoe", "+15550000003", false).await;
    add_contact(&h, "Ravi", "+15550000001", false).await;

    h.sos.trigger(TriggerMethod::Fall).unwrap();
    wait_for_state(&h.sos, SosState::Active).await;

    let telephony = h.telephony.clone();
    wait_for(move || !telephony.calls().is_empty()).await;
    // Contacts list alphabetically when none is primary.
    assert_eq!(h.telephony.calls(), vec!["+15550000001".to_string()]);
}

#[tokio::test]
async fn test_resolve_with_false_alarm() {
    let h = harness().await;
    seed_contacts(&h).await;

    h.sos.trigger(TriggerMethod::FallAutomatic).unwrap();
    wait_for_state(&h.sos, SosState::Active).await;

    assert!(matches!(
        h.sos.resolve(AlertStatus::Active),
        Err(OrchestratorError::NotTerminal(AlertStatus::Active))
    ));

    h.sos.resolve(AlertStatus::FalseAlarm).unwrap();
    wait_for_state(&h.sos, SosState::Idle).await;
    assert_eq!(h.backend.alert("A1").unwrap().status, "false_alarm");
    assert_eq!(
        h.backend.alert("A1").unwrap().alert_type,
        "fall_detection_automatic"
    );

    // A new episode can start afterwards.
    h.sos.trigger(TriggerMethod::Manual).unwrap();
    wait_for_state(&h.sos, SosState::Active).await;
    assert_eq!(h.sos.status().episode, 2);
    assert_eq!(h.sos.status().alert, Some(AlertHandle::Remote("A2".to_string())));
}

#[tokio::test]
async fn test_episode_without_contacts_still_records() {
    let h = harness().await;

    h.sos.trigger(TriggerMethod::Manual).unwrap();
    wait_for_state(&h.sos, SosState::Active).await;

    let recorder = h.recorder.clone();
    wait_for(move || recorder.commands().contains(&RecordingCommand::StartAudio)).await;
    assert!(h.telephony.texts().is_empty());
    assert!(h.telephony.calls().is_empty());
}
