//! One reconciliation pass over pending contacts and queued alerts.

use std::sync::Arc;

use guardian_core::SyncStatus;
use repositories::{
    AlertRepository, Connectivity, ContactRepository, OutboxOutcome, UploadOutcome,
};
use tracing::{debug, info, warn};

use crate::config::SyncConfig;
use crate::error::SyncError;

/// Counts from one pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub contacts_uploaded: usize,
    pub contacts_failed: usize,
    pub contacts_skipped: usize,
    pub alerts_synced: usize,
    pub alerts_deferred: usize,
    pub alerts_rejected: usize,
    pub alerts_purged: u64,
    /// Records whose processing hit a local error.
    pub errors: usize,
}

impl SyncReport {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Outcome of a pass, as seen by its scheduler.
#[derive(Debug)]
pub enum JobResult {
    /// The pass ran to completion. Individual records may still have failed.
    Success(SyncReport),
    /// The pass could not run and should be tried again later.
    Retry(SyncError),
    /// Nothing could be done (offline); wait for connectivity.
    Skipped,
}

/// Drains pending contacts, then the alert outbox, one record at a time.
pub struct SyncReconciler {
    contacts: Arc<ContactRepository>,
    alerts: Arc<AlertRepository>,
    connectivity: Connectivity,
    config: SyncConfig,
}

impl SyncReconciler {
    pub fn new(
        contacts: Arc<ContactRepository>,
        alerts: Arc<AlertRepository>,
        connectivity: Connectivity,
        config: SyncConfig,
    ) -> Self {
        Self {
            contacts,
            alerts,
            connectivity,
            config,
        }
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn connectivity(&self) -> &Connectivity {
        &self.connectivity
    }

    /// Run one pass.
    pub async fn run_once(&self) -> JobResult {
        match self.reconcile().await {
            Ok(report) => JobResult::Success(report),
            Err(SyncError::Offline) => JobResult::Skipped,
            Err(e) => JobResult::Retry(e),
        }
    }

    async fn reconcile(&self) -> Result<SyncReport, SyncError> {
        if !self.connectivity.is_online() {
            return Err(SyncError::Offline);
        }

        if self.config.requeue_failed {
            self.contacts.requeue_failed().await?;
            self.alerts.requeue_failed().await?;
        }

        let mut report = SyncReport::default();
        self.sync_contacts(&mut report).await?;
        self.sync_outbox(&mut report).await?;

        report.alerts_purged = self.alerts.purge_settled().await?;
        Ok(report)
    }

    async fn sync_contacts(&self, report: &mut SyncReport) -> Result<(), SyncError> {
        let pending = self.contacts.with_status(SyncStatus::Pending).await?;
        debug!(count = pending.len(), "Syncing pending contacts");

        // Sequential: a create must finish re-keying before the next upload reads the store.
        for contact in pending {
            match self.contacts.upload(&contact.id).await {
                Ok(UploadOutcome::Uploaded(_)) => report.contacts_uploaded += 1,
                Ok(UploadOutcome::Failed { .. }) => report.contacts_failed += 1,
                Ok(UploadOutcome::Skipped) | Ok(UploadOutcome::Missing) => {
                    report.contacts_skipped += 1
                }
                Err(e) => {
                    warn!(contact_id = %contact.id, error = %e, "Contact sync error");
                    report.errors += 1;
                }
            }
        }

        Ok(())
    }

    async fn sync_outbox(&self, report: &mut SyncReport) -> Result<(), SyncError> {
        let queued = self.alerts.pending_outbox().await?;
        debug!(count = queued.len(), "Syncing alert outbox");

        for row in &queued {
            match self.alerts.push_outbox(row).await {
                Ok(OutboxOutcome::Synced) | Ok(OutboxOutcome::StillPending) => {
                    report.alerts_synced += 1
                }
                Ok(OutboxOutcome::Deferred(_)) => report.alerts_deferred += 1,
                Ok(OutboxOutcome::Rejected(_)) => report.alerts_rejected += 1,
                Err(e) => {
                    warn!(local_id = %row.local_id, error = %e, "Outbox sync error");
                    report.errors += 1;
                }
            }
        }

        Ok(())
    }

    /// Run a pass, retrying with backoff while it reports [`JobResult::Retry`]
    /// or leaves alerts deferred.
    pub async fn run_with_retry(&self) -> JobResult {
        let mut attempt = 0u32;

        loop {
            match self.run_once().await {
                JobResult::Success(report) => {
                    if !report.is_empty() {
                        info!(?report, "Sync pass complete");
                    }
                    // Deferred alerts hit a transient backend failure; go again soon.
                    if report.alerts_deferred == 0 || !self.config.retry.should_retry(attempt) {
                        return JobResult::Success(report);
                    }
                    let delay = self.config.retry.delay_for_attempt(attempt);
                    debug!(
                        deferred = report.alerts_deferred,
                        retry_in_ms = delay.as_millis() as u64,
                        "Alerts deferred; scheduling another pass"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                JobResult::Skipped => {
                    debug!("Sync pass skipped: offline");
                    return JobResult::Skipped;
                }
                JobResult::Retry(e) => {
                    if !self.config.retry.should_retry(attempt) {
                        warn!(error = %e, attempts = attempt + 1, "Sync pass failed; giving up");
                        return JobResult::Retry(e);
                    }
                    let delay = self.config.retry.delay_for_attempt(attempt);
                    warn!(error = %e, retry_in_ms = delay.as_millis() as u64, "Sync pass failed; retrying");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}
