//! Polling fallback for the sync channel

use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::refresh::Refresher;

/// Periodically requests a refresh; stops when dropped
pub struct Poller {
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl Poller {
    /// Start polling. The first tick fires after one full interval.
    pub fn spawn(refresher: Refresher, interval: Duration) -> Self {
        let cancel = CancellationToken::new();
        let token = cancel.clone();

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            debug!(interval_secs = interval.as_secs(), "dashboard poller started");

            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        trace!("poll tick");
                        refresher.request();
                    }
                }
            }
            debug!("dashboard poller stopped");
        });

        Self { cancel, task: Some(task) }
    }

    /// Stop polling and wait for the task to exit
    pub async fn shutdown(mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for Poller {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
