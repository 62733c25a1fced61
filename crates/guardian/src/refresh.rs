//! Pulls the backend's contact list whenever the backend becomes reachable.

use std::sync::Arc;

use repositories::{Connectivity, ContactRepository};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

pub fn spawn(contacts: Arc<ContactRepository>, connectivity: Connectivity) -> JoinHandle<()> {
    tokio::spawn(run(contacts, connectivity))
}

/// Refresh once if online now, then on every offline to online edge.
pub async fn run(contacts: Arc<ContactRepository>, connectivity: Connectivity) {
    let mut online = connectivity.subscribe();
    let mut was_online = *online.borrow_and_update();
    if was_online {
        refresh(&contacts).await;
    }

    while online.changed().await.is_ok() {
        let now_online = *online.borrow_and_update();
        if now_online && !was_online {
            refresh(&contacts).await;
        }
        was_online = now_online;
    }
    debug!("Connectivity closed; contact refresh stopped");
}

async fn refresh(contacts: &ContactRepository) {
    match contacts.refresh().await {
        Ok(count) => info!(contacts = count, "Contacts refreshed from backend"),
        Err(e) => warn!(error = %e, "Contact refresh failed; keeping local list"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use database::Database;
    use mock_backend::{MockBackend, Operation};
    use repositories::sync_channel;
    use safety_api::RemoteContact;
    use std::time::{Duration, Instant};

    async fn contacts(backend: &MockBackend, connectivity: &Connectivity) -> Arc<ContactRepository> {
        let db = Database::connect_with_pool_size("sqlite::memory:", 1).await.unwrap();
        db.migrate().await.unwrap();
        let (requester, _requests) = sync_channel();
        Arc::new(ContactRepository::new(
            db,
            Arc::new(backend.clone()),
            connectivity.clone(),
            requester,
        ))
    }

    fn remote(name: &str, is_primary: bool) -> RemoteContact {
        RemoteContact {
            id: String::new(),
            name: name.to_string(),
            phone: "+15550000001".to_string(),
            relationship: "Sister".to_string(),
            is_primary,
        }
    }

    async fn wait_for(mut condition: impl FnMut() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !condition() {
            assert!(Instant::now() < deadline, "condition not met in time");
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    #[tokio::test]
    async fn test_refresh_when_backend_comes_back() {
        let backend = MockBackend::new();
        backend.seed_contact(remote("Maya", true));
        let connectivity = Connectivity::new(false);
        let repo = contacts(&backend, &connectivity).await;

        let task = spawn(repo.clone(), connectivity.clone());
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(backend.call_count(Operation::Contacts), 0);

        connectivity.set_online(true);
        let watched = backend.clone();
        wait_for(move || watched.call_count(Operation::Contacts) == 1).await;
        let mut listed = Vec::new();
        for _ in 0..100 {
            listed = repo.list().await.unwrap();
            if !listed.is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].name, "Maya");

        connectivity.set_online(false);
        tokio::time::sleep(Duration::from_millis(50)).await;
        backend.seed_contact(remote("Ravi", false));
        connectivity.set_online(true);
        let watched = backend.clone();
        wait_for(move || watched.call_count(Operation::Contacts) == 2).await;

        task.abort();
    }

    #[tokio::test]
    async fn test_refresh_at_startup_when_online() {
        let backend = MockBackend::new();
        backend.seed_contact(remote("Maya", true));
        let connectivity = Connectivity::new(true);
        let repo = contacts(&backend, &connectivity).await;

        let task = spawn(repo.clone(), connectivity.clone());
        let watched = backend.clone();
        wait_for(move || watched.call_count(Operation::Contacts) == 1).await;

        task.abort();
    }
}
