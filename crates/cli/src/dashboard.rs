//! Live dashboard runtime
//!
//! Wires the store, the coalescing refresher, the sync channel, the poller
//! and the action dispatcher together for one dashboard view.

use devstack_common::Endpoints;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::info;

use crate::client::DashboardApi;
use crate::config::CliConfig;
use crate::dispatcher::Dispatcher;
use crate::poller::Poller;
use crate::refresh::Refresher;
use crate::store::DashboardStore;
use crate::sync::{Connectivity, SyncChannel, SyncHandle, SyncOptions};

pub struct Dashboard {
    store: Arc<DashboardStore>,
    refresher: Refresher,
    dispatcher: Arc<Dispatcher>,
    sync: Option<SyncHandle>,
    poller: Option<Poller>,
}

impl Dashboard {
    /// Store, refresher and dispatcher without any background task
    pub fn new(api: Arc<dyn DashboardApi>) -> Self {
        let store = Arc::new(DashboardStore::new());
        let refresher = Refresher::new(store.clone(), api.clone());
        let dispatcher = Arc::new(Dispatcher::new(api, store.clone()));
        Self {
            store,
            refresher,
            dispatcher,
            sync: None,
            poller: None,
        }
    }

    /// Start the sync channel (when enabled) and the poller, and kick off the
    /// first fetch
    pub fn start(api: Arc<dyn DashboardApi>, endpoints: &Endpoints, config: &CliConfig) -> Self {
        let mut dashboard = Self::new(api);

        if config.sync.enabled {
            let options = SyncOptions {
                reconnect_delay: config.reconnect_delay(),
                connect_timeout: config.request_timeout(),
            };
            let channel = SyncChannel::new(endpoints.sync_socket(), options);
            dashboard.sync = Some(channel.spawn(Arc::new(dashboard.refresher.clone())));
        }
        dashboard.poller = Some(Poller::spawn(dashboard.refresher.clone(), config.poll_interval()));
        dashboard.refresher.request();

        info!(sync = config.sync.enabled, "dashboard started");
        dashboard
    }

    pub fn store(&self) -> &Arc<DashboardStore> {
        &self.store
    }

    pub fn refresher(&self) -> &Refresher {
        &self.refresher
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    /// Sync connectivity; `None` when the sync channel is disabled
    pub fn connectivity(&self) -> Option<watch::Receiver<Connectivity>> {
        self.sync.as_ref().map(SyncHandle::subscribe)
    }

    /// Stop all background tasks
    pub async fn shutdown(mut self) {
        if let Some(sync) = self.sync.take() {
            sync.shutdown().await;
        }
        if let Some(poller) = self.poller.take() {
            poller.shutdown().await;
        }
        self.refresher.wait_idle().await;
        info!("dashboard stopped");
    }
}
