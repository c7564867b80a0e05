//! Coalescing refresher
//!
//! Turns any number of "state changed" signals into full re-fetches with at
//! most one fetch in flight and at most one queued behind it.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;
use tracing::{debug, trace};

use crate::client::DashboardApi;
use crate::store::DashboardStore;

/// What happened to a refresh request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshRequest {
    /// A fetch was started
    Started,
    /// A fetch is already running; one follow-up fetch is queued
    Coalesced,
}

#[derive(Default)]
struct Flags {
    in_flight: bool,
    pending: bool,
}

struct Inner {
    store: Arc<DashboardStore>,
    api: Arc<dyn DashboardApi>,
    flags: Mutex<Flags>,
    fetches: AtomicUsize,
    idle: Notify,
}

/// Cheap to clone; clones share one in-flight slot
#[derive(Clone)]
pub struct Refresher {
    inner: Arc<Inner>,
}

impl Refresher {
    pub fn new(store: Arc<DashboardStore>, api: Arc<dyn DashboardApi>) -> Self {
        Self {
            inner: Arc::new(Inner {
                store,
                api,
                flags: Mutex::new(Flags::default()),
                fetches: AtomicUsize::new(0),
                idle: Notify::new(),
            }),
        }
    }

    /// Ask for a re-fetch. Must be called inside a Tokio runtime.
    pub fn request(&self) -> RefreshRequest {
        {
            let mut flags = self.inner.flags.lock();
            if flags.in_flight {
                flags.pending = true;
                trace!("refresh coalesced");
                return RefreshRequest::Coalesced;
            }
            flags.in_flight = true;
        }

        let inner = self.inner.clone();
        tokio::spawn(inner.run());
        RefreshRequest::Started
    }

    pub fn is_busy(&self) -> bool {
        self.inner.flags.lock().in_flight
    }

    /// Fetches issued through this refresher
    pub fn fetch_count(&self) -> usize {
        self.inner.fetches.load(Ordering::SeqCst)
    }

    /// Wait until no fetch is running or queued
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.inner.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if !self.is_busy() {
                return;
            }
            notified.await;
        }
    }
}

impl Inner {
    async fn run(self: Arc<Self>) {
        loop {
            let n = self.fetches.fetch_add(1, Ordering::SeqCst) + 1;
            debug!(fetch = n, "refreshing dashboard");
            // Failures are logged and recorded by the store.
            let _ = self.store.refresh_from(self.api.as_ref()).await;

            let mut flags = self.flags.lock();
            if flags.pending {
                flags.pending = false;
                continue;
            }
            flags.in_flight = false;
            break;
        }
        self.idle.notify_waiters();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{container, FakeDashboardApi};
    use devstack_common::Status;
    use std::time::Duration;
    use tokio::sync::Semaphore;

    async fn wait_for_fetches(api: &FakeDashboardApi, n: usize) {
        tokio::time::timeout(Duration::from_secs(2), async {
            while api.fetch_count() < n {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_burst_during_fetch_yields_one_extra_fetch() {
        let gate = Arc::new(Semaphore::new(0));
        let api = Arc::new(
            FakeDashboardApi::new(vec![container("c1", Status::Running)], vec![])
                .with_fetch_gate(gate.clone()),
        );
        let store = Arc::new(DashboardStore::new());
        let refresher = Refresher::new(store.clone(), api.clone());

        assert_eq!(refresher.request(), RefreshRequest::Started);
        wait_for_fetches(&api, 1).await;

        for _ in 0..5 {
            assert_eq!(refresher.request(), RefreshRequest::Coalesced);
        }

        gate.add_permits(2);
        refresher.wait_idle().await;

        assert_eq!(api.fetch_count(), 2);
        assert_eq!(refresher.fetch_count(), 2);
        assert_eq!(store.current().containers.len(), 1);
    }

    #[tokio::test]
    async fn test_idle_refresher_starts_immediately() {
        let api = Arc::new(FakeDashboardApi::new(vec![], vec![]));
        let refresher = Refresher::new(Arc::new(DashboardStore::new()), api.clone());

        assert_eq!(refresher.request(), RefreshRequest::Started);
        refresher.wait_idle().await;
        assert_eq!(refresher.request(), RefreshRequest::Started);
        refresher.wait_idle().await;

        assert_eq!(api.fetch_count(), 2);
        assert!(!refresher.is_busy());
    }
}
