//! Dashboard sync channel
//!
//! A WebSocket that only tells the console "something changed". It
//! reconnects after a fixed delay for as long as its handle is alive; no
//! backoff and no retry cap.

use devstack_common::SyncNotification;
use futures::StreamExt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};
use url::Url;

use crate::refresh::Refresher;

/// Connectivity indicator shown by the dashboard
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Connectivity {
    Connecting,
    Connected,
    Disconnected,
}

impl std::fmt::Display for Connectivity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Connectivity::Connecting => write!(f, "connecting"),
            Connectivity::Connected => write!(f, "connected"),
            Connectivity::Disconnected => write!(f, "disconnected"),
        }
    }
}

/// Receives state-change signals from the sync channel
pub trait SyncListener: Send + Sync {
    fn state_changed(&self);
}

impl SyncListener for Refresher {
    fn state_changed(&self) {
        self.request();
    }
}

/// Reconnect policy
#[derive(Debug, Clone, Copy)]
pub struct SyncOptions {
    /// Fixed wait between a disconnect and the next attempt
    pub reconnect_delay: Duration,
    /// Bound on each handshake
    pub connect_timeout: Duration,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            reconnect_delay: Duration::from_secs(3),
            connect_timeout: Duration::from_secs(15),
        }
    }
}

/// Sync socket configuration; [`SyncChannel::spawn`] starts the loop
pub struct SyncChannel {
    url: Url,
    options: SyncOptions,
}

impl SyncChannel {
    pub fn new(url: Url, options: SyncOptions) -> Self {
        Self { url, options }
    }

    /// Start the reconnect loop. Must be called inside a Tokio runtime.
    pub fn spawn(self, listener: Arc<dyn SyncListener>) -> SyncHandle {
        let cancel = CancellationToken::new();
        let attempts = Arc::new(AtomicU64::new(0));
        let (tx, rx) = watch::channel(Connectivity::Connecting);

        let task = tokio::spawn(run(
            self.url,
            self.options,
            listener,
            tx,
            attempts.clone(),
            cancel.clone(),
        ));

        SyncHandle {
            cancel,
            task: Some(task),
            connectivity: rx,
            attempts,
        }
    }
}

/// Owns the running sync loop; dropping it stops the loop
pub struct SyncHandle {
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
    connectivity: watch::Receiver<Connectivity>,
    attempts: Arc<AtomicU64>,
}

impl SyncHandle {
    pub fn connectivity(&self) -> Connectivity {
        *self.connectivity.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<Connectivity> {
        self.connectivity.clone()
    }

    /// Connection attempts so far, the first one included
    pub fn attempts(&self) -> u64 {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Stop the loop and wait for it to finish
    pub async fn shutdown(mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for SyncHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn run(
    url: Url,
    options: SyncOptions,
    listener: Arc<dyn SyncListener>,
    tx: watch::Sender<Connectivity>,
    attempts: Arc<AtomicU64>,
    cancel: CancellationToken,
) {
    loop {
        let attempt = attempts.fetch_add(1, Ordering::SeqCst) + 1;
        tx.send_replace(Connectivity::Connecting);
        debug!(attempt, "connecting dashboard sync channel");

        let connect = tokio::time::timeout(options.connect_timeout, connect_async(url.as_str()));
        let result = tokio::select! {
            _ = cancel.cancelled() => break,
            result = connect => result,
        };

        match result {
            Ok(Ok((stream, _))) => {
                info!(attempt, "dashboard sync connected");
                tx.send_replace(Connectivity::Connected);
                let reason = tokio::select! {
                    _ = cancel.cancelled() => break,
                    reason = read_notifications(stream, listener.as_ref()) => reason,
                };
                warn!("dashboard sync disconnected: {}", reason);
            }
            Ok(Err(e)) => warn!(attempt, "dashboard sync connect failed: {}", e),
            Err(_) => warn!(
                attempt,
                "dashboard sync connect timed out after {}s",
                options.connect_timeout.as_secs()
            ),
        }

        tx.send_replace(Connectivity::Disconnected);
        debug!(delay_ms = options.reconnect_delay.as_millis() as u64, "scheduling sync reconnect");
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(options.reconnect_delay) => {}
        }
    }

    tx.send_replace(Connectivity::Disconnected);
    debug!("dashboard sync stopped");
}

/// Pump frames until the socket goes away; returns the reason
async fn read_notifications<S>(mut stream: S, listener: &dyn SyncListener) -> String
where
    S: futures::Stream<Item = Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin,
{
    while let Some(frame) = stream.next().await {
        match frame {
            Ok(Message::Text(text)) => match SyncNotification::parse(&text) {
                Some(notification) if notification.is_state_change() => {
                    trace!("sync notification: state changed");
                    listener.state_changed();
                }
                Some(_) => trace!("ignoring sync notification"),
                None => debug!("ignoring malformed sync frame"),
            },
            Ok(Message::Close(_)) => return "closed by server".to_string(),
            Ok(_) => {}
            Err(e) => return e.to_string(),
        }
    }
    "stream ended".to_string()
}
