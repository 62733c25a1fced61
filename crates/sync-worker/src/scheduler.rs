//! Decides when a sync pass runs.

use std::sync::Arc;

use repositories::SyncRequests;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info};

use crate::reconciler::SyncReconciler;

/// What started a pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Wake {
    Requested,
    Reconnected,
    Interval,
}

/// Spawn the scheduler loop.
///
/// A pass runs on every sync request, on every offline-to-online edge, and on
/// the configured interval. Requests that pile up while a pass runs are served
/// by a single follow-up pass.
pub fn spawn(reconciler: Arc<SyncReconciler>, requests: SyncRequests) -> JoinHandle<()> {
    tokio::spawn(run(reconciler, requests))
}

/// Run the scheduler loop until every sync requester is dropped.
pub async fn run(reconciler: Arc<SyncReconciler>, mut requests: SyncRequests) {
    let mut online = reconciler.connectivity().subscribe();
    let mut ticker = interval(reconciler.config().interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    info!(
        interval_secs = reconciler.config().interval.as_secs(),
        "Sync scheduler started"
    );

    loop {
        let wake = tokio::select! {
            request = requests.recv() => match request {
                Some(reason) => {
                    debug!(reason = ?reason, "Sync requested");
                    Wake::Requested
                }
                None => break,
            },
            changed = online.changed() => {
                if changed.is_err() {
                    break;
                }
                if !*online.borrow_and_update() {
                    continue;
                }
                Wake::Reconnected
            }
            _ = ticker.tick() => Wake::Interval,
        };

        if !reconciler.connectivity().is_online() {
            debug!(wake = ?wake, "Offline; sync deferred");
            continue;
        }

        let coalesced = requests.drain();
        debug!(wake = ?wake, coalesced = coalesced, "Starting sync pass");
        reconciler.run_with_retry().await;
    }

    info!("Sync scheduler stopped");
}
