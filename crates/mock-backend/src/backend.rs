//! In-memory safety backend.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use guardian_core::AlertStatus;
use safety_api::{
    ApiError, ContactPayload, LocationUpdate, NewAlert, RemoteAlert, RemoteContact, SafetyBackend,
};
use tokio::time::sleep;

use crate::call::{Call, Failure, Operation};

#[derive(Default)]
struct State {
    alerts: Vec<RemoteAlert>,
    contacts: Vec<RemoteContact>,
    locations: Vec<LocationUpdate>,
    calls: Vec<Call>,
    next_alert: u64,
    next_contact: u64,
    offline: bool,
    fail_next: HashMap<Operation, VecDeque<Failure>>,
    fail_always: HashMap<Operation, Failure>,
    latency: HashMap<Operation, Duration>,
}

/// A backend that keeps everything in memory.
///
/// Alert ids are `A1`, `A2`, ... and contact ids are `101`, `102`, ... in
/// creation order. Every call is recorded, including calls that were made to
/// fail. Cloning shares the same state.
#[derive(Clone, Default)]
pub struct MockBackend {
    state: Arc<Mutex<State>>,
}

impl MockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        // A panic while holding the lock only happens inside a failing test.
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Make every call fail as unavailable until set back online.
    pub fn set_offline(&self, offline: bool) {
        self.state().offline = offline;
    }

    /// Fail the next call of `op` with `failure`. Queued failures stack.
    pub fn fail_next(&self, op: Operation, failure: Failure) {
        self.state()
            .fail_next
            .entry(op)
            .or_default()
            .push_back(failure);
    }

    /// Fail every call of `op` until [`clear_failures`](Self::clear_failures).
    pub fn fail_always(&self, op: Operation, failure: Failure) {
        self.state().fail_always.insert(op, failure);
    }

    pub fn clear_failures(&self) {
        let mut state = self.state();
        state.fail_next.clear();
        state.fail_always.clear();
    }

    /// Delay every call of `op` by `delay` before answering.
    pub fn set_latency(&self, op: Operation, delay: Duration) {
        self.state().latency.insert(op, delay);
    }

    /// Add a contact as if another device had created it.
    pub fn seed_contact(&self, mut contact: RemoteContact) -> String {
        let mut state = self.state();
        if contact.id.is_empty() {
            state.next_contact += 1;
            contact.id = (100 + state.next_contact).to_string();
        }
        let id = contact.id.clone();
        state.contacts.push(contact);
        id
    }

    /// Every call received so far, oldest first.
    pub fn calls(&self) -> Vec<Call> {
        self.state().calls.clone()
    }

    /// Number of calls received for `op`.
    pub fn call_count(&self, op: Operation) -> usize {
        self.state()
            .calls
            .iter()
            .filter(|c| c.operation() == op)
            .count()
    }

    /// Alerts currently stored.
    pub fn alerts(&self) -> Vec<RemoteAlert> {
        self.state().alerts.clone()
    }

    /// Look up a stored alert.
    pub fn alert(&self, id: &str) -> Option<RemoteAlert> {
        self.state().alerts.iter().find(|a| a.id == id).cloned()
    }

    /// Contacts currently stored.
    pub fn stored_contacts(&self) -> Vec<RemoteContact> {
        self.state().contacts.clone()
    }

    /// Location fixes received.
    pub fn locations(&self) -> Vec<LocationUpdate> {
        self.state().locations.clone()
    }

    /// Record `call`, wait out any latency, then report a programmed failure if one applies.
    async fn enter(&self, call: Call) -> Result<(), ApiError> {
        let op = call.operation();
        let delay = {
            let mut state = self.state();
            state.calls.push(call);
            state.latency.get(&op).copied()
        };

        if let Some(delay) = delay {
            sleep(delay).await;
        }

        let mut state = self.state();
        if state.offline {
            return Err(Failure::Unavailable.to_error());
        }
        if let Some(failure) = state.fail_next.get_mut(&op).and_then(VecDeque::pop_front) {
            return Err(failure.to_error());
        }
        if let Some(failure) = state.fail_always.get(&op) {
            return Err(failure.to_error());
        }
        Ok(())
    }
}

fn not_found(kind: &str, id: &str) -> ApiError {
    ApiError::Rejected {
        message: format!("{kind} {id} not found"),
    }
}

#[async_trait]
impl SafetyBackend for MockBackend {
    async fn create_alert(&self, user_id: &str, alert: &NewAlert) -> Result<String, ApiError> {
        self.enter(Call::CreateAlert {
            user_id: user_id.to_string(),
            alert: alert.clone(),
        })
        .await?;

        let mut state = self.state();
        state.next_alert += 1;
        let id = format!("A{}", state.next_alert);
        state.alerts.push(RemoteAlert {
            id: id.clone(),
            alert_type: alert.alert_type.as_str().to_string(),
            status: alert.status.as_str().to_string(),
            latitude: alert.point.map(|p| p.latitude),
            longitude: alert.point.map(|p| p.longitude),
            address: alert.address.clone(),
            timestamp: None,
        });
        Ok(id)
    }

    async fn update_alert_status(
        &self,
        alert_id: &str,
        status: AlertStatus,
        _user_id: &str,
    ) -> Result<(), ApiError> {
        self.enter(Call::UpdateAlertStatus {
            alert_id: alert_id.to_string(),
            status,
        })
        .await?;

        let mut state = self.state();
        let alert = state
            .alerts
            .iter_mut()
            .find(|a| a.id == alert_id)
            .ok_or_else(|| not_found("alert", alert_id))?;
        alert.status = status.as_str().to_string();
        Ok(())
    }

    async fn alert_history(&self, user_id: &str) -> Result<Vec<RemoteAlert>, ApiError> {
        self.enter(Call::AlertHistory {
            user_id: user_id.to_string(),
        })
        .await?;
        Ok(self.state().alerts.clone())
    }

    async fn add_contact(&self, contact: &ContactPayload) -> Result<String, ApiError> {
        self.enter(Call::AddContact(contact.clone())).await?;

        let mut state = self.state();
        state.next_contact += 1;
        let id = (100 + state.next_contact).to_string();
        state.contacts.push(RemoteContact {
            id: id.clone(),
            name: contact.name.clone(),
            phone: contact.phone.clone(),
            relationship: contact.relationship.clone(),
            is_primary: contact.is_primary,
        });
        Ok(id)
    }

    async fn update_contact(
        &self,
        contact_id: &str,
        contact: &ContactPayload,
    ) -> Result<(), ApiError> {
        self.enter(Call::UpdateContact {
            contact_id: contact_id.to_string(),
            contact: contact.clone(),
        })
        .await?;

        let mut state = self.state();
        let stored = state
            .contacts
            .iter_mut()
            .find(|c| c.id == contact_id)
            .ok_or_else(|| not_found("contact", contact_id))?;
        stored.name = contact.name.clone();
        stored.phone = contact.phone.clone();
        stored.relationship = contact.relationship.clone();
        stored.is_primary = contact.is_primary;
        Ok(())
    }

    async fn delete_contact(&self, contact_id: &str) -> Result<(), ApiError> {
        self.enter(Call::DeleteContact {
            contact_id: contact_id.to_string(),
        })
        .await?;

        let mut state = self.state();
        let before = state.contacts.len();
        state.contacts.retain(|c| c.id != contact_id);
        if state.contacts.len() == before {
            return Err(not_found("contact", contact_id));
        }
        Ok(())
    }

    async fn contacts(&self) -> Result<Vec<RemoteContact>, ApiError> {
        self.enter(Call::Contacts).await?;
        Ok(self.state().contacts.clone())
    }

    async fn update_location(
        &self,
        _user_id: &str,
        update: &LocationUpdate,
    ) -> Result<(), ApiError> {
        self.enter(Call::UpdateLocation(update.clone())).await?;
        self.state().locations.push(update.clone());
        Ok(())
    }

    async fn health_check(&self) -> Result<bool, ApiError> {
        let offline = self.state().offline;
        self.state().calls.push(Call::HealthCheck);
        Ok(!offline)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use guardian_core::TriggerMethod;

    fn payload(name: &str) -> ContactPayload {
        ContactPayload {
            name: name.to_string(),
            phone: "+15550001".to_string(),
            relationship: "Friend".to_string(),
            is_primary: false,
        }
    }

    #[tokio::test]
    async fn test_ids_are_sequential() {
        let backend = MockBackend::new();
        let alert = NewAlert::active(TriggerMethod::Manual, None, None);

        assert_eq!(backend.create_alert("u", &alert).await.unwrap(), "A1");
        assert_eq!(backend.create_alert("u", &alert).await.unwrap(), "A2");
        assert_eq!(backend.add_contact(&payload("Amy")).await.unwrap(), "101");
    }

    #[tokio::test]
    async fn test_fail_next_applies_once() {
        let backend = MockBackend::new();
        backend.fail_next(Operation::AddContact, Failure::Unavailable);

        let err = backend.add_contact(&payload("Amy")).await.unwrap_err();
        assert!(err.is_transient());
        assert!(backend.add_contact(&payload("Amy")).await.is_ok());
        assert_eq!(backend.call_count(Operation::AddContact), 2);
        assert_eq!(backend.stored_contacts().len(), 1);
    }

    #[tokio::test]
    async fn test_offline_fails_everything_but_records() {
        let backend = MockBackend::new();
        backend.set_offline(true);

        assert!(backend.contacts().await.is_err());
        assert!(!backend.health_check().await.unwrap());
        assert_eq!(backend.calls().len(), 2);

        backend.set_offline(false);
        assert!(backend.health_check().await.unwrap());
    }

    #[tokio::test]
    async fn test_status_update_on_unknown_alert_is_rejected() {
        let backend = MockBackend::new();
        let err = backend
            .update_alert_status("A404", AlertStatus::Cancelled, "u")
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Rejected { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_latency_delays_answer() {
        let backend = MockBackend::new();
        backend.set_latency(Operation::Contacts, Duration::from_secs(3));

        let start = tokio::time::Instant::now();
        backend.contacts().await.unwrap();
        assert!(start.elapsed() >= Duration::from_secs(3));
    }
}
