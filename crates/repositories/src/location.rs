//! Location history with bounded retention.

use std::sync::Arc;
use std::time::Duration;

use database::{location as store, Database, LocationSample};
use safety_api::{LocationUpdate, SafetyBackend};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::connectivity::Connectivity;
use crate::error::Result;

/// How much location history to keep.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionPolicy {
    /// Samples older than this are dropped, except the newest.
    pub max_age: Duration,
    /// Count ceiling.
    pub max_samples: i64,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            max_age: Duration::from_secs(30 * 24 * 60 * 60),
            max_samples: 100,
        }
    }
}

/// A position fix from the location provider.
#[derive(Debug, Clone, PartialEq)]
pub struct LocationFix {
    pub latitude: f64,
    pub longitude: f64,
    pub accuracy: f64,
    pub address: Option<String>,
    /// Unix epoch milliseconds; `None` means now.
    pub timestamp: Option<i64>,
}

/// Local location history, optionally mirrored to the backend.
pub struct LocationRepository {
    db: Database,
    backend: Arc<dyn SafetyBackend>,
    user_id: String,
    connectivity: Connectivity,
    policy: RetentionPolicy,
    writer: Mutex<()>,
}

impl LocationRepository {
    /// Open the repository and apply the retention policy once.
    pub async fn open(
        db: Database,
        backend: Arc<dyn SafetyBackend>,
        user_id: impl Into<String>,
        connectivity: Connectivity,
        policy: RetentionPolicy,
    ) -> Result<Self> {
        let repo = Self {
            db,
            backend,
            user_id: user_id.into(),
            connectivity,
            policy,
            writer: Mutex::new(()),
        };
        repo.prune().await?;
        Ok(repo)
    }

    pub fn policy(&self) -> RetentionPolicy {
        self.policy
    }

    /// Store a fix, prune, and push it to the backend in the background when online.
    pub async fn record(&self, fix: LocationFix) -> Result<LocationSample> {
        let sample = LocationSample {
            id: uuid::Uuid::new_v4().to_string(),
            latitude: fix.latitude,
            longitude: fix.longitude,
            address: fix.address,
            timestamp: fix
                .timestamp
                .unwrap_or_else(|| chrono::Utc::now().timestamp_millis()),
            accuracy: fix.accuracy,
        };

        {
            let _guard = self.writer.lock().await;
            store::insert_location(self.db.pool(), &sample).await?;
            self.prune_locked().await?;
        }

        if self.connectivity.is_online() {
            self.spawn_upload(&sample);
        }

        Ok(sample)
    }

    fn spawn_upload(&self, sample: &LocationSample) {
        let backend = self.backend.clone();
        let user_id = self.user_id.clone();
        let update = LocationUpdate {
            latitude: sample.latitude,
            longitude: sample.longitude,
            accuracy: sample.accuracy,
            timestamp: sample.timestamp,
            address: sample.address.clone(),
        };

        tokio::spawn(async move {
            if let Err(e) = backend.update_location(&user_id, &update).await {
                warn!(error = %e, "Location upload failed");
            }
        });
    }

    /// Apply the retention policy. Returns how many samples were removed.
    pub async fn prune(&self) -> Result<u64> {
        let _guard = self.writer.lock().await;
        self.prune_locked().await
    }

    async fn prune_locked(&self) -> Result<u64> {
        let max_age_ms = i64::try_from(self.policy.max_age.as_millis()).unwrap_or(i64::MAX);
        let cutoff = chrono::Utc::now()
            .timestamp_millis()
            .saturating_sub(max_age_ms);

        let removed = store::prune_locations(self.db.pool(), cutoff, self.policy.max_samples).await?;
        if removed > 0 {
            debug!(removed = removed, "Applied location retention");
        }
        Ok(removed)
    }

    /// The newest sample, if any.
    pub async fn most_recent(&self) -> Result<Option<LocationSample>> {
        Ok(store::most_recent_location(self.db.pool()).await?)
    }

    /// The newest `limit` samples, newest first.
    pub async fn recent(&self, limit: i64) -> Result<Vec<LocationSample>> {
        Ok(store::recent_locations(self.db.pool(), limit).await?)
    }

    /// Samples between `start_ms` and `end_ms` inclusive, oldest first.
    pub async fn in_range(&self, start_ms: i64, end_ms: i64) -> Result<Vec<LocationSample>> {
        Ok(store::locations_in_range(self.db.pool(), start_ms, end_ms).await?)
    }

    pub async fn count(&self) -> Result<i64> {
        Ok(store::count_locations(self.db.pool()).await?)
    }

    /// Delete all history.
    pub async fn clear(&self) -> Result<u64> {
        let _guard = self.writer.lock().await;
        Ok(store::clear_locations(self.db.pool()).await?)
    }

    /// All samples as a JSON array, newest first.
    pub async fn export_json(&self) -> Result<String> {
        let mut samples = store::all_locations(self.db.pool()).await?;
        samples.reverse();
        Ok(serde_json::to_string_pretty(&samples)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mock_backend::{MockBackend, Operation};

    async fn repo(online: bool, policy: RetentionPolicy) -> (LocationRepository, MockBackend) {
        let db = Database::connect_with_pool_size("sqlite::memory:", 1).await.unwrap();
        db.migrate().await.unwrap();
        let backend = MockBackend::new();
        let repo = LocationRepository::open(
            db,
            Arc::new(backend.clone()),
            "user-1",
            Connectivity::new(online),
            policy,
        )
        .await
        .unwrap();
        (repo, backend)
    }

    fn fix_at(timestamp: i64) -> LocationFix {
        LocationFix {
            latitude: 51.5,
            longitude: -0.12,
            accuracy: 10.0,
            address: None,
            timestamp: Some(timestamp),
        }
    }

    fn now_ms() -> i64 {
        chrono::Utc::now().timestamp_millis()
    }

    #[tokio::test]
    async fn test_count_never_exceeds_ceiling() {
        let policy = RetentionPolicy {
            max_samples: 5,
            ..RetentionPolicy::default()
        };
        let (repo, _) = repo(false, policy).await;
        let base = now_ms();

        for i in 0..8 {
            repo.record(fix_at(base + i)).await.unwrap();
            assert!(repo.count().await.unwrap() <= 5);
        }

        let newest = repo.most_recent().await.unwrap().unwrap();
        assert_eq!(newest.timestamp, base + 7);
    }

    #[tokio::test]
    async fn test_stale_newest_sample_survives() {
        let (repo, _) = repo(false, RetentionPolicy::default()).await;
        let ancient = now_ms() - 60 * 24 * 60 * 60 * 1000;

        let sample = repo.record(fix_at(ancient)).await.unwrap();
        assert_eq!(repo.count().await.unwrap(), 1);
        assert_eq!(repo.most_recent().await.unwrap().unwrap().id, sample.id);

        repo.record(fix_at(ancient - 1000)).await.unwrap();
        assert_eq!(repo.count().await.unwrap(), 1);
        assert_eq!(repo.most_recent().await.unwrap().unwrap().id, sample.id);
    }

    #[tokio::test]
    async fn test_export_is_newest_first() {
        let (repo, _) = repo(false, RetentionPolicy::default()).await;
        let base = now_ms();
        repo.record(fix_at(base)).await.unwrap();
        repo.record(fix_at(base + 10)).await.unwrap();

        let exported: Vec<LocationSample> =
            serde_json::from_str(&repo.export_json().await.unwrap()).unwrap();
        assert_eq!(exported.len(), 2);
        assert_eq!(exported[0].timestamp, base + 10);

        assert_eq!(repo.in_range(base, base + 5).await.unwrap().len(), 1);
        assert_eq!(repo.clear().await.unwrap(), 2);
        assert!(repo.most_recent().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_online_record_is_uploaded() {
        let (repo, backend) = repo(true, RetentionPolicy::default()).await;
        repo.record(fix_at(now_ms())).await.unwrap();

        for _ in 0..50 {
            if backend.call_count(Operation::UpdateLocation) == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(backend.locations().len(), 1);
    }
}
