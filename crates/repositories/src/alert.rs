//! Alert repository: remote-backed, with a local outbox for failed writes.

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::Arc;

use database::{alert_outbox as outbox, Database, LocationSample, OutboxAlert};
use guardian_core::{placeholder, AlertStatus, SyncStatus, TriggerMethod};
use safety_api::{NewAlert, RemoteAlert, SafetyBackend};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::connectivity::Connectivity;
use crate::error::{RepositoryError, Result};
use crate::sync_queue::{SyncReason, SyncRequester};

/// Where an alert lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AlertHandle {
    /// The backend accepted the alert under this id.
    Remote(String),
    /// The alert is waiting in the local outbox under this placeholder id.
    Queued(String),
}

impl AlertHandle {
    /// The backend id, if the backend has acknowledged the alert.
    pub fn remote_id(&self) -> Option<&str> {
        match self {
            AlertHandle::Remote(id) => Some(id),
            AlertHandle::Queued(_) => None,
        }
    }
}

impl fmt::Display for AlertHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AlertHandle::Remote(id) | AlertHandle::Queued(id) => f.write_str(id),
        }
    }
}

/// Result of pushing one outbox row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboxOutcome {
    /// Backend holds the row's latest status.
    Synced,
    /// Backend accepted, but the row changed meanwhile and needs another pass.
    StillPending,
    /// Transient failure; the row stays pending.
    Deferred(String),
    /// Backend rejected the row; it was marked failed.
    Rejected(String),
}

/// Alerts, created against the backend.
///
/// A create or status update that cannot reach the backend lands in the
/// outbox and a sync pass is requested.
pub struct AlertRepository {
    db: Database,
    backend: Arc<dyn SafetyBackend>,
    user_id: String,
    connectivity: Connectivity,
    sync: SyncRequester,
    writer: Mutex<()>,
    /// Statuses set through this repository for backend alerts.
    known: RwLock<StatusCache>,
}

impl AlertRepository {
    pub fn new(
        db: Database,
        backend: Arc<dyn SafetyBackend>,
        user_id: impl Into<String>,
        connectivity: Connectivity,
        sync: SyncRequester,
    ) -> Self {
        Self {
            db,
            backend,
            user_id: user_id.into(),
            connectivity,
            sync,
            writer: Mutex::new(()),
            known: RwLock::new(StatusCache::default()),
        }
    }

    /// Create an active alert.
    ///
    /// When the backend cannot be reached or rejects the alert, it is queued
    /// and a [`AlertHandle::Queued`] handle is returned instead.
    pub async fn create_alert(
        &self,
        method: TriggerMethod,
        location: Option<&LocationSample>,
    ) -> Result<AlertHandle> {
        let alert = NewAlert::active(
            method,
            location.map(LocationSample::point),
            location.and_then(|l| l.address.clone()),
        );

        if self.connectivity.is_online() {
            match self.backend.create_alert(&self.user_id, &alert).await {
                Ok(id) => {
                    info!(alert_id = %id, trigger = %method, "Alert created");
                    self.known.write().await.record(&id, AlertStatus::Active);
                    return Ok(AlertHandle::Remote(id));
                }
                Err(e) => {
                    warn!(trigger = %method, error = %e, "Alert create failed; queueing");
                }
            }
        }

        let row = OutboxAlert {
            local_id: placeholder::generate(),
            server_id: None,
            created_at: chrono::Utc::now().timestamp_millis(),
            latitude: alert.point.map(|p| p.latitude),
            longitude: alert.point.map(|p| p.longitude),
            address: alert.address,
            alert_type: method,
            status: AlertStatus::Active,
            sync_status: SyncStatus::Pending,
            revision: 0,
        };

        {
            let _guard = self.writer.lock().await;
            outbox::insert_outbox_alert(self.db.pool(), &row).await?;
        }
        self.sync.request(SyncReason::AlertQueued);

        Ok(AlertHandle::Queued(row.local_id))
    }

    /// Move an alert to `status`. Backward moves are rejected.
    ///
    /// A status the backend did not take is queued for the sync worker.
    pub async fn update_status(&self, handle: &AlertHandle, status: AlertStatus) -> Result<()> {
        match handle {
            AlertHandle::Queued(local_id) => self.update_queued(local_id, status).await,
            AlertHandle::Remote(id) => self.update_remote(id, status).await,
        }
    }

    async fn update_queued(&self, local_id: &str, status: AlertStatus) -> Result<()> {
        let _guard = self.writer.lock().await;

        let row = outbox::find_outbox_alert(self.db.pool(), local_id)
            .await?
            .ok_or_else(|| RepositoryError::NotFound {
                entity: "Alert",
                id: local_id.to_string(),
            })?;

        check_transition(row.status, status)?;
        if row.status == status {
            return Ok(());
        }

        outbox::update_outbox_status(self.db.pool(), local_id, status).await?;
        debug!(local_id = %local_id, status = %status, "Queued alert status change");
        self.sync.request(SyncReason::AlertQueued);
        Ok(())
    }

    async fn update_remote(&self, id: &str, status: AlertStatus) -> Result<()> {
        let current = self.known.read().await.get(id);
        if let Some(current) = current {
            check_transition(current, status)?;
            if current == status {
                return Ok(());
            }
        }

        // A status change that was queued earlier is still ahead in line.
        let queued = outbox::find_outbox_by_server_id(self.db.pool(), id).await?;
        if let Some(row) = queued {
            check_transition(row.status, status)?;
            self.known.write().await.record(id, status);
            return self.update_queued(&row.local_id, status).await;
        }

        if self.connectivity.is_online() {
            match self
                .backend
                .update_alert_status(id, status, &self.user_id)
                .await
            {
                Ok(()) => {
                    info!(alert_id = %id, status = %status, "Alert status updated");
                    self.known.write().await.record(id, status);
                    return Ok(());
                }
                Err(e) => {
                    warn!(alert_id = %id, status = %status, error = %e, "Alert status update failed; queueing");
                }
            }
        }

        let row = OutboxAlert {
            local_id: placeholder::generate(),
            server_id: Some(id.to_string()),
            created_at: chrono::Utc::now().timestamp_millis(),
            latitude: None,
            longitude: None,
            address: None,
            // Only read when creating; this row already has a server id.
            alert_type: TriggerMethod::Manual,
            status,
            sync_status: SyncStatus::Pending,
            revision: 0,
        };

        {
            let _guard = self.writer.lock().await;
            outbox::insert_outbox_alert(self.db.pool(), &row).await?;
        }
        self.known.write().await.record(id, status);
        self.sync.request(SyncReason::AlertQueued);
        Ok(())
    }

    /// The user's alert history, read from the backend.
    pub async fn history(&self) -> Result<Vec<RemoteAlert>> {
        if !self.connectivity.is_online() {
            return Err(RepositoryError::Offline);
        }
        Ok(self.backend.alert_history(&self.user_id).await?)
    }

    /// Outbox rows waiting for upload, oldest first.
    pub async fn pending_outbox(&self) -> Result<Vec<OutboxAlert>> {
        Ok(outbox::pending_outbox_alerts(self.db.pool()).await?)
    }

    /// Every outbox row, oldest first.
    pub async fn outbox(&self) -> Result<Vec<OutboxAlert>> {
        Ok(outbox::list_outbox_alerts(self.db.pool()).await?)
    }

    /// Move failed outbox rows back to pending and request a sync pass.
    pub async fn retry_failed(&self) -> Result<u64> {
        let moved = self.requeue_failed().await?;
        if moved > 0 {
            self.sync.request(SyncReason::RetryRequested);
        }
        Ok(moved)
    }

    /// Move failed outbox rows back to pending without requesting a pass.
    pub async fn requeue_failed(&self) -> Result<u64> {
        let _guard = self.writer.lock().await;
        Ok(outbox::requeue_failed_outbox(self.db.pool()).await?)
    }

    /// Push one outbox row to the backend.
    ///
    /// Rows without a server id are created with their current status; the
    /// rest get a status update.
    pub async fn push_outbox(&self, row: &OutboxAlert) -> Result<OutboxOutcome> {
        let result = match &row.server_id {
            None => {
                let alert = NewAlert {
                    point: row.point(),
                    address: row.address.clone(),
                    alert_type: row.alert_type,
                    status: row.status,
                };
                self.backend
                    .create_alert(&self.user_id, &alert)
                    .await
                    .map(Some)
            }
            Some(server_id) => self
                .backend
                .update_alert_status(server_id, row.status, &self.user_id)
                .await
                .map(|()| None),
        };

        let _guard = self.writer.lock().await;

        match result {
            Ok(created) => {
                let synced = match created {
                    Some(server_id) => {
                        info!(local_id = %row.local_id, alert_id = %server_id, "Queued alert created");
                        self.known.write().await.record(&server_id, row.status);
                        outbox::mark_outbox_uploaded(
                            self.db.pool(),
                            &row.local_id,
                            &server_id,
                            row.revision,
                        )
                        .await?
                    }
                    None => {
                        outbox::mark_outbox_synced_if_unchanged(
                            self.db.pool(),
                            &row.local_id,
                            row.revision,
                        )
                        .await?
                    }
                };

                if synced {
                    Ok(OutboxOutcome::Synced)
                } else {
                    Ok(OutboxOutcome::StillPending)
                }
            }
            Err(e) if e.is_transient() => {
                debug!(local_id = %row.local_id, error = %e, "Outbox push deferred");
                Ok(OutboxOutcome::Deferred(e.to_string()))
            }
            Err(e) => {
                warn!(local_id = %row.local_id, error = %e, "Outbox push rejected");
                outbox::mark_outbox_failed(self.db.pool(), &row.local_id).await?;
                Ok(OutboxOutcome::Rejected(e.to_string()))
            }
        }
    }

    /// Drop synced rows whose alert has ended. Returns how many were removed.
    pub async fn purge_settled(&self) -> Result<u64> {
        let _guard = self.writer.lock().await;
        Ok(outbox::purge_settled_outbox(self.db.pool()).await?)
    }
}

/// Number of settled alerts whose final status is remembered.
const SETTLED_CAPACITY: usize = 32;

/// Last known statuses of backend alerts.
///
/// Active alerts stay until they settle. Settled ones move to a short ring, so
/// a late backward move on a recent alert is still rejected.
#[derive(Debug, Default)]
struct StatusCache {
    active: HashMap<String, AlertStatus>,
    settled: VecDeque<(String, AlertStatus)>,
}

impl StatusCache {
    fn get(&self, id: &str) -> Option<AlertStatus> {
        self.active.get(id).copied().or_else(|| {
            self.settled
                .iter()
                .find(|(settled, _)| settled == id)
                .map(|(_, status)| *status)
        })
    }

    fn record(&mut self, id: &str, status: AlertStatus) {
        if !status.is_terminal() {
            self.active.insert(id.to_string(), status);
            return;
        }

        self.active.remove(id);
        self.settled.retain(|(settled, _)| settled != id);
        if self.settled.len() >= SETTLED_CAPACITY {
            self.settled.pop_front();
        }
        self.settled.push_back((id.to_string(), status));
    }
}

fn check_transition(from: AlertStatus, to: AlertStatus) -> Result<()> {
    if from.can_transition_to(to) {
        Ok(())
    } else {
        Err(RepositoryError::InvalidTransition { from, to })
    }
}
