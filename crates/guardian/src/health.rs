//! Backend reachability probe feeding [`Connectivity`].

use std::sync::Arc;
use std::time::Duration;

use repositories::Connectivity;
use safety_api::SafetyBackend;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, warn};

pub fn spawn(
    backend: Arc<dyn SafetyBackend>,
    connectivity: Connectivity,
    every: Duration,
) -> JoinHandle<()> {
    tokio::spawn(run(backend, connectivity, every))
}

/// Probe the backend every `every` and publish the result.
pub async fn run(backend: Arc<dyn SafetyBackend>, connectivity: Connectivity, every: Duration) {
    let mut ticker = interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;

        let online = match backend.health_check().await {
            Ok(up) => up,
            Err(e) => {
                debug!(error = %e, "Health check failed");
                false
            }
        };

        if !online && connectivity.is_online() {
            warn!("Backend unreachable; working offline");
        }
        connectivity.set_online(online);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mock_backend::MockBackend;

    #[tokio::test(start_paused = true)]
    async fn test_probe_follows_backend() {
        let backend = MockBackend::new();
        backend.set_offline(true);
        let connectivity = Connectivity::new(true);
        let mut online = connectivity.subscribe();

        let task = spawn(
            Arc::new(backend.clone()),
            connectivity.clone(),
            Duration::from_secs(30),
        );

        online.changed().await.unwrap();
        assert!(!*online.borrow_and_update());

        backend.set_offline(false);
        online.changed().await.unwrap();
        assert!(*online.borrow_and_update());
        assert!(backend.call_count(mock_backend::Operation::HealthCheck) >= 2);

        task.abort();
    }
}
