//! Lifecycle action dispatcher
//!
//! Issues start/stop/restart/toggle requests and reconciles afterwards by
//! re-fetching the whole dashboard, whether the action succeeded or not.

use devstack_common::{Action, CreateEnvironment, EntityRef, Environment, Error, Result};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{info, warn};

use crate::client::DashboardApi;
use crate::store::DashboardStore;

/// Severity of a notice
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NoticeLevel {
    Info,
    Error,
}

/// User-visible feedback about an action
#[derive(Debug, Clone, Serialize)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

/// Outcome of a bulk start/stop
#[derive(Debug, Clone, Default, Serialize)]
pub struct BulkReport {
    pub succeeded: Vec<String>,
    /// Containers whose current status made the action pointless
    pub skipped: Vec<String>,
    pub failed: Vec<(String, String)>,
}

impl BulkReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Releases the in-flight marker when the action completes
struct InFlight<'a> {
    set: &'a Mutex<HashSet<EntityRef>>,
    entity: EntityRef,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.set.lock().remove(&self.entity);
    }
}

pub struct Dispatcher {
    api: Arc<dyn DashboardApi>,
    store: Arc<DashboardStore>,
    in_flight: Mutex<HashSet<EntityRef>>,
    notices: broadcast::Sender<Notice>,
}

impl Dispatcher {
    pub fn new(api: Arc<dyn DashboardApi>, store: Arc<DashboardStore>) -> Self {
        let (notices, _) = broadcast::channel(64);
        Self {
            api,
            store,
            in_flight: Mutex::new(HashSet::new()),
            notices,
        }
    }

    /// Feedback for every action, failed ones included
    pub fn subscribe(&self) -> broadcast::Receiver<Notice> {
        self.notices.subscribe()
    }

    pub fn is_in_flight(&self, entity: &EntityRef) -> bool {
        self.in_flight.lock().contains(entity)
    }

    /// Run one action, then re-fetch the dashboard
    pub async fn perform(&self, entity: &EntityRef, action: Action) -> Result<()> {
        if !entity.kind.supports(action) {
            let err = Error::UnsupportedAction {
                kind: entity.kind.to_string(),
                action: action.to_string(),
            };
            self.fail(entity, action, &err);
            return Err(err);
        }

        let _marker = match self.claim(entity) {
            Ok(marker) => marker,
            Err(err) => {
                self.fail(entity, action, &err);
                return Err(err);
            }
        };

        info!(%entity, %action, "dispatching action");
        let result = self.api.perform(entity, action).await;
        self.reconcile().await;

        match &result {
            Ok(()) => self.notify(NoticeLevel::Info, format!("{} {}: done", action, entity)),
            Err(err) => self.fail(entity, action, err),
        }
        result
    }

    /// Start every container that is not running, one at a time
    pub async fn start_all(&self) -> BulkReport {
        self.bulk(Action::Start).await
    }

    /// Stop every running container, one at a time
    pub async fn stop_all(&self) -> BulkReport {
        self.bulk(Action::Stop).await
    }

    pub async fn create_environment(&self, name: &str, stack: &str) -> Result<Environment> {
        let name = name.trim();
        if name.is_empty() {
            return Err(Error::InvalidConfig("environment name is required".into()));
        }

        let request = CreateEnvironment {
            name: name.to_string(),
            stack: stack.to_string(),
        };
        let result = self.api.create_environment(&request).await;
        self.reconcile().await;

        match &result {
            Ok(env) => self.notify(NoticeLevel::Info, format!("created environment {} ({})", env.name, env.id)),
            Err(e) => self.notify(NoticeLevel::Error, format!("create environment {} failed: {}", name, e)),
        }
        result
    }

    pub async fn delete_environment(&self, id: &str) -> Result<()> {
        let entity = EntityRef::environment(id);
        let _marker = match self.claim(&entity) {
            Ok(marker) => marker,
            Err(err) => {
                warn!(%entity, "delete refused: {}", err);
                self.notify(NoticeLevel::Error, format!("delete environment {} failed: {}", id, err));
                return Err(err);
            }
        };

        let result = self.api.delete_environment(id).await;
        self.reconcile().await;

        match &result {
            Ok(()) => self.notify(NoticeLevel::Info, format!("deleted environment {}", id)),
            Err(e) => self.notify(NoticeLevel::Error, format!("delete environment {} failed: {}", id, e)),
        }
        result
    }

    async fn bulk(&self, action: Action) -> BulkReport {
        // The id list is taken once; statuses are read fresh before each step.
        let ids: Vec<String> = self.store.current().containers.iter().map(|c| c.id.clone()).collect();
        let mut report = BulkReport::default();

        for id in ids {
            let entity = EntityRef::container(&id);
            match self.store.status_of(&entity) {
                Some(status) if action.valid_for(status) => {}
                _ => {
                    report.skipped.push(id);
                    continue;
                }
            }

            match self.perform(&entity, action).await {
                Ok(()) => report.succeeded.push(id),
                Err(e) => report.failed.push((id, e.to_string())),
            }
        }

        info!(
            %action,
            succeeded = report.succeeded.len(),
            skipped = report.skipped.len(),
            failed = report.failed.len(),
            "bulk action finished"
        );
        report
    }

    fn claim(&self, entity: &EntityRef) -> Result<InFlight<'_>> {
        let mut set = self.in_flight.lock();
        if !set.insert(entity.clone()) {
            return Err(Error::ActionInFlight(entity.to_string()));
        }
        Ok(InFlight {
            set: &self.in_flight,
            entity: entity.clone(),
        })
    }

    async fn reconcile(&self) {
        // Failures are logged by the store; the previous snapshot stays.
        let _ = self.store.refresh_from(self.api.as_ref()).await;
    }

    fn fail(&self, entity: &EntityRef, action: Action, err: &Error) {
        warn!(%entity, %action, "action failed: {}", err);
        self.notify(NoticeLevel::Error, format!("{} {} failed: {}", action, entity, err));
    }

    fn notify(&self, level: NoticeLevel, message: String) {
        // No subscribers is fine.
        let _ = self.notices.send(Notice { level, message });
    }
}
