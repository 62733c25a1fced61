//! Offline-first emergency contact repository.
//!
//! Every save lands in SQLite first as `pending`. When online the upload runs
//! right away, otherwise a sync pass is requested. Local mutations go through
//! a single writer lock; network calls run outside it.

use std::collections::HashSet;
use std::sync::{Arc, Mutex as StdMutex, MutexGuard};

use database::{contact as store, Database, DatabaseError, EmergencyContact};
use guardian_core::{placeholder, SyncStatus};
use safety_api::{ContactPayload, RemoteContact, SafetyBackend};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::connectivity::Connectivity;
use crate::error::{RepositoryError, Result};
use crate::sync_queue::{SyncReason, SyncRequester};
use crate::validation::validate_contact;

/// Fields of a contact the user enters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewContact {
    pub name: String,
    pub phone: String,
    pub relationship: String,
    pub is_primary: bool,
}

/// What happened to a single contact upload.
#[derive(Debug, Clone, PartialEq)]
pub enum UploadOutcome {
    /// Backend accepted. Carries the stored row, which may be under a new id
    /// and stays `pending` if it was edited while the upload ran.
    Uploaded(EmergencyContact),
    /// Upload failed and the record was marked `failed`.
    Failed { id: String, error: String },
    /// Nothing to do: not pending, or another upload for it is in flight.
    Skipped,
    /// The record no longer exists.
    Missing,
}

/// Removes an id from the in-flight set when dropped.
struct InFlight<'a> {
    set: &'a StdMutex<HashSet<String>>,
    id: String,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        lock_in_flight(self.set).remove(&self.id);
    }
}

/// The set holds plain ids, so it stays usable after a panic elsewhere.
fn lock_in_flight(set: &StdMutex<HashSet<String>>) -> MutexGuard<'_, HashSet<String>> {
    set.lock().unwrap_or_else(|poisoned| {
        warn!("In-flight upload set was poisoned; recovering");
        poisoned.into_inner()
    })
}

/// Emergency contacts, stored locally and mirrored to the backend.
pub struct ContactRepository {
    db: Database,
    backend: Arc<dyn SafetyBackend>,
    connectivity: Connectivity,
    sync: SyncRequester,
    writer: Mutex<()>,
    in_flight: StdMutex<HashSet<String>>,
}

impl ContactRepository {
    pub fn new(
        db: Database,
        backend: Arc<dyn SafetyBackend>,
        connectivity: Connectivity,
        sync: SyncRequester,
    ) -> Self {
        Self {
            db,
            backend,
            connectivity,
            sync,
            writer: Mutex::new(()),
            in_flight: StdMutex::new(HashSet::new()),
        }
    }

    /// All contacts, primary first.
    pub async fn list(&self) -> Result<Vec<EmergencyContact>> {
        Ok(store::list_contacts(self.db.pool()).await?)
    }

    pub async fn get(&self, id: &str) -> Result<EmergencyContact> {
        store::find_contact(self.db.pool(), id)
            .await?
            .ok_or_else(|| RepositoryError::NotFound {
                entity: "Contact",
                id: id.to_string(),
            })
    }

    /// The primary contact, if one is marked.
    pub async fn primary(&self) -> Result<Option<EmergencyContact>> {
        Ok(store::primary_contact(self.db.pool()).await?)
    }

    /// Contacts with the given sync status.
    pub async fn with_status(&self, status: SyncStatus) -> Result<Vec<EmergencyContact>> {
        Ok(store::list_contacts_by_status(self.db.pool(), status).await?)
    }

    /// Add a contact under a placeholder id.
    ///
    /// Returns the stored row after the immediate upload attempt, if one ran.
    pub async fn add(&self, contact: NewContact) -> Result<EmergencyContact> {
        validate_contact(&contact.name, &contact.phone, &contact.relationship)?;

        let record = EmergencyContact {
            id: placeholder::generate(),
            name: contact.name.trim().to_string(),
            phone: contact.phone.trim().to_string(),
            relationship: contact.relationship.trim().to_string(),
            is_primary: contact.is_primary,
            sync_status: SyncStatus::Pending,
            revision: 0,
        };

        {
            let _guard = self.writer.lock().await;
            store::create_contact(self.db.pool(), &record).await?;
        }

        info!(contact_id = %record.id, "Added contact");
        self.push_or_defer(record).await
    }

    /// Save edits to an existing contact.
    pub async fn update(&self, contact: EmergencyContact) -> Result<EmergencyContact> {
        validate_contact(&contact.name, &contact.phone, &contact.relationship)?;

        let edited = EmergencyContact {
            name: contact.name.trim().to_string(),
            phone: contact.phone.trim().to_string(),
            relationship: contact.relationship.trim().to_string(),
            sync_status: SyncStatus::Pending,
            ..contact
        };

        let stored = {
            let _guard = self.writer.lock().await;
            store::update_contact(self.db.pool(), &edited)
                .await
                .map_err(|e| not_found_as_repository(e, &edited.id))?
        };

        debug!(contact_id = %stored.id, revision = stored.revision, "Updated contact");
        self.push_or_defer(stored).await
    }

    /// Mark one contact primary. Every other contact loses the flag.
    pub async fn set_primary(&self, id: &str) -> Result<EmergencyContact> {
        let contact = self.get(id).await?;
        self.update(EmergencyContact {
            is_primary: true,
            ..contact
        })
        .await
    }

    /// Delete a contact on the backend, then locally.
    ///
    /// Needs connectivity; deletes are never queued. A contact the backend has
    /// never seen is only deleted locally.
    pub async fn delete(&self, id: &str) -> Result<()> {
        let contact = self.get(id).await?;

        if !contact.is_local_only() {
            if !self.connectivity.is_online() {
                return Err(RepositoryError::Offline);
            }
            self.backend.delete_contact(id).await?;
        }

        let _guard = self.writer.lock().await;
        store::delete_contact(self.db.pool(), id)
            .await
            .map_err(|e| not_found_as_repository(e, id))?;

        info!(contact_id = %id, "Deleted contact");
        Ok(())
    }

    /// Pull the backend's contacts and merge them in.
    ///
    /// Local `pending` and `failed` edits are kept. Returns how many rows the
    /// merge wrote.
    pub async fn refresh(&self) -> Result<usize> {
        if !self.connectivity.is_online() {
            return Err(RepositoryError::Offline);
        }

        let remote = self.backend.contacts().await?;
        let pulled: Vec<EmergencyContact> = remote.into_iter().map(from_remote).collect();

        let _guard = self.writer.lock().await;
        let written = store::merge_remote_contacts(self.db.pool(), &pulled).await?;

        info!(pulled = pulled.len(), written = written, "Refreshed contacts");
        Ok(written)
    }

    /// Move every failed contact back to pending and request a sync pass.
    pub async fn retry_failed(&self) -> Result<u64> {
        let moved = self.requeue_failed().await?;
        if moved > 0 {
            self.sync.request(SyncReason::RetryRequested);
        }
        Ok(moved)
    }

    /// Move every failed contact back to pending without requesting a pass.
    pub async fn requeue_failed(&self) -> Result<u64> {
        let moved = {
            let _guard = self.writer.lock().await;
            store::requeue_failed(self.db.pool()).await?
        };
        if moved > 0 {
            info!(count = moved, "Requeued failed contacts");
        }
        Ok(moved)
    }

    /// Upload one pending contact.
    ///
    /// A placeholder id is sent as a create and the row is re-keyed under the
    /// returned server id; any other id is sent as an update.
    pub async fn upload(&self, id: &str) -> Result<UploadOutcome> {
        let Some(_in_flight) = self.claim(id) else {
            debug!(contact_id = %id, "Upload already in flight");
            return Ok(UploadOutcome::Skipped);
        };

        let Some(record) = store::find_contact(self.db.pool(), id).await? else {
            return Ok(UploadOutcome::Missing);
        };
        if record.sync_status != SyncStatus::Pending {
            return Ok(UploadOutcome::Skipped);
        }

        let payload = ContactPayload {
            name: record.name.clone(),
            phone: record.phone.clone(),
            relationship: record.relationship.clone(),
            is_primary: record.is_primary,
        };

        let result = if record.is_local_only() {
            self.backend.add_contact(&payload).await.map(Some)
        } else {
            self.backend
                .update_contact(&record.id, &payload)
                .await
                .map(|()| None)
        };

        let _guard = self.writer.lock().await;

        match result {
            Ok(Some(server_id)) => {
                let replaced =
                    store::replace_contact_id(self.db.pool(), id, &server_id, record.revision)
                        .await?;
                match replaced {
                    Some(stored) => {
                        info!(placeholder_id = %id, contact_id = %server_id, "Contact created on backend");
                        self.request_if_pending(&stored);
                        Ok(UploadOutcome::Uploaded(stored))
                    }
                    None => {
                        warn!(placeholder_id = %id, contact_id = %server_id, "Contact deleted locally during upload");
                        Ok(UploadOutcome::Missing)
                    }
                }
            }
            Ok(None) => {
                store::set_sync_status_if_unchanged(
                    self.db.pool(),
                    id,
                    record.revision,
                    SyncStatus::Synced,
                )
                .await?;
                match store::find_contact(self.db.pool(), id).await? {
                    Some(stored) => {
                        debug!(contact_id = %id, "Contact update synced");
                        self.request_if_pending(&stored);
                        Ok(UploadOutcome::Uploaded(stored))
                    }
                    None => Ok(UploadOutcome::Missing),
                }
            }
            Err(e) => {
                warn!(contact_id = %id, error = %e, "Contact upload failed");
                // An edit made during the upload has not been tried yet; leave it pending.
                store::set_sync_status_if_unchanged(
                    self.db.pool(),
                    id,
                    record.revision,
                    SyncStatus::Failed,
                )
                .await?;
                Ok(UploadOutcome::Failed {
                    id: id.to_string(),
                    error: e.to_string(),
                })
            }
        }
    }

    /// Upload now if online, otherwise request a deferred pass.
    async fn push_or_defer(&self, record: EmergencyContact) -> Result<EmergencyContact> {
        if !self.connectivity.is_online() {
            self.sync.request(SyncReason::ContactChanged);
            return Ok(record);
        }

        match self.upload(&record.id).await? {
            UploadOutcome::Uploaded(stored) => Ok(stored),
            UploadOutcome::Skipped => {
                // The running upload saw an older revision; make sure this one follows.
                self.sync.request(SyncReason::ContactChanged);
                self.get(&record.id).await
            }
            UploadOutcome::Failed { .. } | UploadOutcome::Missing => self.get(&record.id).await,
        }
    }

    fn claim(&self, id: &str) -> Option<InFlight<'_>> {
        if !lock_in_flight(&self.in_flight).insert(id.to_string()) {
            return None;
        }
        Some(InFlight {
            set: &self.in_flight,
            id: id.to_string(),
        })
    }

    fn request_if_pending(&self, stored: &EmergencyContact) {
        if stored.sync_status == SyncStatus::Pending {
            self.sync.request(SyncReason::ContactChanged);
        }
    }
}

fn from_remote(remote: RemoteContact) -> EmergencyContact {
    EmergencyContact {
        id: remote.id,
        name: remote.name,
        phone: remote.phone,
        relationship: remote.relationship,
        is_primary: remote.is_primary,
        sync_status: SyncStatus::Synced,
        revision: 0,
    }
}

fn not_found_as_repository(err: DatabaseError, id: &str) -> RepositoryError {
    match err {
        DatabaseError::NotFound { entity, .. } => RepositoryError::NotFound {
            entity,
            id: id.to_string(),
        },
        other => RepositoryError::Database(other),
    }
}
