//! Terminal bridge
//!
//! Binds one authenticated session to one surface over a WebSocket. Input
//! goes out as JSON `input` frames through a single writer task; output
//! comes back as raw frames and is rendered by a single reader task. The
//! surface and the socket are torn down together, exactly once.

use devstack_common::{Endpoints, Error, Result, TerminalFrame};
use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

use super::surface::TerminalSurface;
use crate::session::Session;

/// Notice written once the socket is open
pub const CONNECTED_NOTICE: &str = "Terminal connected...";

/// Notice written when the remote side hangs up
pub const CLOSED_NOTICE: &str = "\r\n\r\nConnection closed.";

/// Bridge lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BridgeState {
    Idle,
    Connecting,
    Open,
    Closed,
}

/// Why a bridge closed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseReason {
    /// Dismissed locally
    User,
    /// Remote close frame or end of stream
    Remote,
    /// Handshake or socket failure
    Error(String),
}

#[derive(Debug, Clone, Copy)]
pub struct BridgeOptions {
    /// Bound on the WebSocket handshake
    pub connect_timeout: Duration,
    /// Send `resize` frames when the surface is re-fitted
    pub propagate_resize: bool,
}

impl Default for BridgeOptions {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(15),
            propagate_resize: false,
        }
    }
}

/// State shared with the I/O tasks
struct Shared<S> {
    surface: Mutex<Option<S>>,
    state: watch::Sender<BridgeState>,
    reason: Mutex<Option<CloseReason>>,
    cancel: CancellationToken,
}

impl<S: TerminalSurface> Shared<S> {
    /// Render to the surface if it is still alive; dropped otherwise
    fn render(&self, bytes: &[u8]) {
        if let Some(surface) = self.surface.lock().as_mut() {
            if let Err(e) = surface.write(bytes) {
                debug!("surface write failed: {}", e);
            }
        }
    }

    /// Close everything once. Returns false when already closed.
    fn teardown(&self, reason: CloseReason, notice: Option<&str>) -> bool {
        {
            let mut slot = self.reason.lock();
            if slot.is_some() {
                return false;
            }
            *slot = Some(reason.clone());
        }

        if let Some(mut surface) = self.surface.lock().take() {
            if let Some(notice) = notice {
                let _ = surface.write_line(notice);
            }
            surface.dispose();
        }
        self.cancel.cancel();
        self.state.send_replace(BridgeState::Closed);
        info!(?reason, "terminal bridge closed");
        true
    }
}

/// One live terminal connection
pub struct TerminalBridge<S: TerminalSurface> {
    session: Session,
    url: Url,
    options: BridgeOptions,
    shared: Arc<Shared<S>>,
    input: Mutex<Option<mpsc::UnboundedSender<Message>>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl<S: TerminalSurface> TerminalBridge<S> {
    /// Bind a session to a surface. The session is consumed; nothing is
    /// connected until [`TerminalBridge::connect`].
    pub fn new(session: Session, endpoints: &Endpoints, surface: S, options: BridgeOptions) -> Self {
        let url = session.socket_url(endpoints);
        let (state, _) = watch::channel(BridgeState::Idle);
        Self {
            session,
            url,
            options,
            shared: Arc::new(Shared {
                surface: Mutex::new(Some(surface)),
                state,
                reason: Mutex::new(None),
                cancel: CancellationToken::new(),
            }),
            input: Mutex::new(None),
            tasks: Mutex::new(Vec::new()),
        }
    }

    pub fn container_id(&self) -> &str {
        self.session.container_id()
    }

    pub fn username(&self) -> &str {
        self.session.username()
    }

    pub fn state(&self) -> BridgeState {
        *self.shared.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<BridgeState> {
        self.shared.state.subscribe()
    }

    pub fn close_reason(&self) -> Option<CloseReason> {
        self.shared.reason.lock().clone()
    }

    /// Open the socket. On failure the surface is disposed and the bridge
    /// ends up closed.
    pub async fn connect(&self) -> Result<()> {
        let current = self.state();
        if current != BridgeState::Idle {
            return Err(Error::InvalidStateTransition {
                from: format!("{:?}", current),
                to: "Connecting".into(),
            });
        }
        self.shared.state.send_replace(BridgeState::Connecting);
        info!(container = self.container_id(), user = self.username(), "opening terminal bridge");

        let handshake = tokio::time::timeout(self.options.connect_timeout, connect_async(self.url.as_str()));
        let stream = match handshake.await {
            Ok(Ok((stream, _))) => stream,
            Ok(Err(e)) => {
                let detail = e.to_string();
                warn!(container = self.container_id(), "terminal handshake failed: {}", detail);
                self.fail(&detail);
                return Err(Error::WebSocket(detail));
            }
            Err(_) => {
                let seconds = self.options.connect_timeout.as_secs();
                warn!(container = self.container_id(), "terminal handshake timed out");
                self.fail(&format!("timed out after {}s", seconds));
                return Err(Error::Timeout { seconds });
            }
        };

        // Dismissed while the handshake was running.
        if self.shared.cancel.is_cancelled() {
            return Err(Error::BridgeNotOpen);
        }

        // Announce before the reader exists so the notice precedes remote output.
        let announced = {
            let mut surface = self.shared.surface.lock();
            match surface.as_mut() {
                Some(surface) => {
                    let _ = surface.write_line(CONNECTED_NOTICE);
                    true
                }
                None => false,
            }
        };
        if !announced {
            return Err(Error::BridgeNotOpen);
        }

        let (mut sink, mut stream) = stream.split();
        let (tx, mut rx) = mpsc::unbounded_channel::<Message>();
        *self.input.lock() = Some(tx);
        self.shared.state.send_if_modified(|state| {
            if *state == BridgeState::Connecting {
                *state = BridgeState::Open;
                true
            } else {
                false
            }
        });
        info!(container = self.container_id(), "terminal bridge open");

        let shared = self.shared.clone();
        let writer = tokio::spawn(async move {
            loop {
                let message = tokio::select! {
                    _ = shared.cancel.cancelled() => break,
                    message = rx.recv() => message,
                };
                let Some(message) = message else { break };

                let sent = tokio::select! {
                    _ = shared.cancel.cancelled() => break,
                    sent = sink.send(message) => sent,
                };
                if let Err(e) = sent {
                    let notice = format!("\r\nConnection error: {}", e);
                    shared.teardown(CloseReason::Error(e.to_string()), Some(&notice));
                    break;
                }
            }
            let _ = tokio::time::timeout(Duration::from_millis(250), sink.close()).await;
        });

        let shared = self.shared.clone();
        let reader = tokio::spawn(async move {
            loop {
                let frame = tokio::select! {
                    _ = shared.cancel.cancelled() => return,
                    frame = stream.next() => frame,
                };
                match frame {
                    Some(Ok(Message::Text(text))) => shared.render(text.as_bytes()),
                    Some(Ok(Message::Binary(bytes))) => shared.render(&bytes),
                    Some(Ok(Message::Close(_))) | None => {
                        shared.teardown(CloseReason::Remote, Some(CLOSED_NOTICE));
                        return;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        let notice = format!("\r\nConnection error: {}", e);
                        shared.teardown(CloseReason::Error(e.to_string()), Some(&notice));
                        return;
                    }
                }
            }
        });

        self.tasks.lock().extend([writer, reader]);
        Ok(())
    }

    /// Queue keystrokes or pasted text as one `input` frame
    pub fn send_input(&self, data: &str) -> Result<()> {
        if self.state() != BridgeState::Open {
            return Err(Error::BridgeNotOpen);
        }
        let frame = TerminalFrame::input(data).to_json()?;
        self.queue(frame)?;
        debug!(bytes = data.len(), "queued input frame");
        Ok(())
    }

    /// Re-fit the surface. The new size goes to the remote side only when
    /// resize propagation is enabled.
    pub fn resize(&self) -> Result<Option<(u16, u16)>> {
        let size = match self.shared.surface.lock().as_mut() {
            Some(surface) => surface.fit(),
            None => return Ok(None),
        };

        if self.options.propagate_resize && self.state() == BridgeState::Open {
            let (cols, rows) = size;
            self.queue(TerminalFrame::Resize { cols, rows }.to_json()?)?;
            debug!(cols, rows, "queued resize frame");
        }
        Ok(Some(size))
    }

    /// Dismiss the bridge. Idempotent; safe while a send is in flight.
    pub fn close(&self) {
        self.shared.teardown(CloseReason::User, None);
        self.input.lock().take();
        for task in self.tasks.lock().drain(..) {
            task.abort();
        }
    }

    /// Wait until the bridge reaches [`BridgeState::Closed`]
    pub async fn closed(&self) {
        let mut state = self.subscribe();
        let _ = state.wait_for(|s| *s == BridgeState::Closed).await;
    }

    fn queue(&self, frame: String) -> Result<()> {
        match self.input.lock().as_ref() {
            Some(tx) => tx.send(Message::Text(frame)).map_err(|_| Error::BridgeNotOpen),
            None => Err(Error::BridgeNotOpen),
        }
    }

    fn fail(&self, detail: &str) {
        let notice = format!("\r\nConnection error: {}", detail);
        self.shared.teardown(CloseReason::Error(detail.to_string()), Some(&notice));
    }
}

impl<S: TerminalSurface> Drop for TerminalBridge<S> {
    fn drop(&mut self) {
        self.close();
    }
}
