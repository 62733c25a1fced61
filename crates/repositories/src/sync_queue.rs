//! Requests for a deferred sync pass.
//!
//! Repositories hold a [`SyncRequester`]; the sync worker owns the matching
//! [`SyncRequests`] and runs a reconciliation pass for each burst of requests.

use tokio::sync::mpsc;
use tracing::debug;

/// Why a sync pass was requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncReason {
    /// A contact was saved while offline or left pending.
    ContactChanged,
    /// An alert or alert status change was queued in the outbox.
    AlertQueued,
    /// Failed records were moved back to pending.
    RetryRequested,
    /// Requested by the application.
    Manual,
}

/// Sending half of the sync request queue.
#[derive(Debug, Clone)]
pub struct SyncRequester {
    tx: mpsc::UnboundedSender<SyncReason>,
}

impl SyncRequester {
    /// Ask for a sync pass. Never blocks.
    pub fn request(&self, reason: SyncReason) {
        if self.tx.send(reason).is_err() {
            debug!(reason = ?reason, "Sync worker not running; request dropped");
        }
    }
}

/// Receiving half of the sync request queue.
#[derive(Debug)]
pub struct SyncRequests {
    rx: mpsc::UnboundedReceiver<SyncReason>,
}

impl SyncRequests {
    /// Wait for the next request. `None` once every requester is dropped.
    pub async fn recv(&mut self) -> Option<SyncReason> {
        self.rx.recv().await
    }

    /// Discard requests that are already queued. Returns how many were dropped.
    ///
    /// One pass serves any number of queued requests.
    pub fn drain(&mut self) -> usize {
        let mut drained = 0;
        while self.rx.try_recv().is_ok() {
            drained += 1;
        }
        drained
    }
}

/// Create a connected requester/receiver pair.
pub fn sync_channel() -> (SyncRequester, SyncRequests) {
    let (tx, rx) = mpsc::unbounded_channel();
    (SyncRequester { tx }, SyncRequests { rx })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_drain_coalesces_bursts() {
        let (requester, mut requests) = sync_channel();
        requester.request(SyncReason::ContactChanged);
        requester.request(SyncReason::ContactChanged);
        requester.request(SyncReason::AlertQueued);

        assert_eq!(requests.recv().await, Some(SyncReason::ContactChanged));
        assert_eq!(requests.drain(), 2);
        assert_eq!(requests.drain(), 0);
    }

    #[tokio::test]
    async fn test_request_without_worker_is_harmless() {
        let (requester, requests) = sync_channel();
        drop(requests);
        requester.request(SyncReason::Manual);
    }
}
