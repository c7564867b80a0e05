//! Dashboard state store
//!
//! Holds the last applied snapshot. Every fetch takes a ticket from a
//! monotonic counter, and a response is applied only when its ticket is
//! newer than the one behind the current snapshot.

use chrono::{DateTime, Utc};
use devstack_common::{
    Container, EntityKind, EntityRef, Environment, Error, Health, Result, Service, Status,
    SystemMetrics, SystemStatus,
};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::client::DashboardApi;

/// One full fetch of dashboard state
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    pub health: Option<Health>,
    pub status: Option<SystemStatus>,
    pub metrics: Option<SystemMetrics>,
    pub containers: Vec<Container>,
    pub environments: Vec<Environment>,
    pub fetched_at: Option<DateTime<Utc>>,
    /// Ticket of the fetch that produced this snapshot; 0 before the first one
    pub sequence: u64,
}

impl Snapshot {
    pub fn container(&self, id: &str) -> Option<&Container> {
        self.containers.iter().find(|c| c.id == id)
    }

    pub fn environment(&self, id: &str) -> Option<&Environment> {
        self.environments.iter().find(|e| e.id == id)
    }

    pub fn service(&self, id: &str) -> Option<&Service> {
        self.environments
            .iter()
            .flat_map(|e| e.services.iter())
            .find(|s| s.id == id)
    }

    /// Current status of an entity, if it is in the snapshot
    pub fn status_of(&self, entity: &EntityRef) -> Option<Status> {
        match entity.kind {
            EntityKind::Container => self.container(&entity.id).map(|c| c.status),
            EntityKind::Environment => self.environment(&entity.id).map(|e| e.status),
            EntityKind::Service => self.service(&entity.id).map(|s| s.status),
        }
    }

    pub fn running_containers(&self) -> usize {
        self.containers.iter().filter(|c| c.status.is_running()).count()
    }
}

/// Sequence number handed out when a fetch starts
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct FetchTicket(u64);

impl FetchTicket {
    pub fn sequence(self) -> u64 {
        self.0
    }
}

/// Result of offering a snapshot to the store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    Applied,
    /// A newer fetch already landed; the snapshot was discarded
    Stale,
}

#[derive(Default)]
struct StoreInner {
    applied: u64,
    last_error: Option<String>,
}

/// Last known dashboard state, shared by the sync channel, the poller and
/// the dispatcher
pub struct DashboardStore {
    next_ticket: AtomicU64,
    inner: Mutex<StoreInner>,
    tx: watch::Sender<Arc<Snapshot>>,
}

impl Default for DashboardStore {
    fn default() -> Self {
        Self::new()
    }
}

impl DashboardStore {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(Arc::new(Snapshot::default()));
        Self {
            next_ticket: AtomicU64::new(1),
            inner: Mutex::new(StoreInner::default()),
            tx,
        }
    }

    /// Take a ticket before issuing a fetch
    pub fn begin_fetch(&self) -> FetchTicket {
        FetchTicket(self.next_ticket.fetch_add(1, Ordering::SeqCst))
    }

    /// Apply a fetched snapshot unless a newer one is already in place
    pub fn apply(&self, ticket: FetchTicket, mut snapshot: Snapshot) -> ApplyOutcome {
        let mut inner = self.inner.lock();
        if ticket.0 <= inner.applied {
            debug!(ticket = ticket.0, applied = inner.applied, "discarding stale snapshot");
            return ApplyOutcome::Stale;
        }

        inner.applied = ticket.0;
        inner.last_error = None;
        snapshot.sequence = ticket.0;
        self.tx.send_replace(Arc::new(snapshot));
        ApplyOutcome::Applied
    }

    /// Remember a failed fetch. The previous snapshot stays visible.
    pub fn record_error(&self, ticket: FetchTicket, error: &Error) {
        let mut inner = self.inner.lock();
        if ticket.0 > inner.applied {
            inner.last_error = Some(error.to_string());
        }
    }

    pub fn last_error(&self) -> Option<String> {
        self.inner.lock().last_error.clone()
    }

    /// Sequence of the snapshot currently shown
    pub fn applied_sequence(&self) -> u64 {
        self.inner.lock().applied
    }

    pub fn current(&self) -> Arc<Snapshot> {
        self.tx.borrow().clone()
    }

    /// Receive every applied snapshot
    pub fn subscribe(&self) -> watch::Receiver<Arc<Snapshot>> {
        self.tx.subscribe()
    }

    pub fn status_of(&self, entity: &EntityRef) -> Option<Status> {
        self.current().status_of(entity)
    }

    /// Fetch a full snapshot and apply it through the sequence guard
    pub async fn refresh_from<A: DashboardApi + ?Sized>(&self, api: &A) -> Result<ApplyOutcome> {
        let ticket = self.begin_fetch();
        match api.fetch_snapshot().await {
            Ok(snapshot) => Ok(self.apply(ticket, snapshot)),
            Err(e) => {
                warn!(ticket = ticket.0, "dashboard refresh failed: {}", e);
                self.record_error(ticket, &e);
                Err(e)
            }
        }
    }
}
