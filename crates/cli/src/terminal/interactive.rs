//! Keyboard pump for an open bridge

use crossterm::event::Event;
use devstack_common::{Error, Result};
use futures::{Stream, StreamExt};
use std::io;
use tracing::debug;

use super::bridge::{BridgeState, TerminalBridge};
use super::input::{encode_key, is_detach};
use super::surface::TerminalSurface;

pub const DETACH_HINT: &str = "Press Ctrl+] to close the terminal.";

/// Forward local events to the bridge until either side ends the session.
/// Detaching closes the bridge.
pub async fn pump<S, E>(bridge: &TerminalBridge<S>, mut events: E) -> Result<()>
where
    S: TerminalSurface,
    E: Stream<Item = io::Result<Event>> + Unpin,
{
    let mut state = bridge.subscribe();

    loop {
        let event = tokio::select! {
            _ = state.wait_for(|s| *s == BridgeState::Closed) => break,
            event = events.next() => event,
        };

        let sent = match event {
            None => {
                debug!("input stream ended");
                bridge.close();
                break;
            }
            Some(Err(e)) => {
                bridge.close();
                return Err(Error::Io(e));
            }
            Some(Ok(Event::Key(key))) if is_detach(&key) => {
                debug!("detach requested");
                bridge.close();
                break;
            }
            Some(Ok(Event::Key(key))) => match encode_key(key) {
                Some(data) => bridge.send_input(&data),
                None => Ok(()),
            },
            Some(Ok(Event::Paste(text))) => bridge.send_input(&text),
            Some(Ok(Event::Resize(_, _))) => bridge.resize().map(|_| ()),
            Some(Ok(_)) => Ok(()),
        };

        match sent {
            Ok(()) => {}
            // Remote side went away between the event and the send.
            Err(Error::BridgeNotOpen) => break,
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{Session, SessionId};
    use crate::terminal::{BridgeOptions, BufferSurface, CloseReason};
    use crate::testing::ws_peer;
    use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
    use futures::channel::mpsc;
    use tokio_tungstenite::tungstenite::Message;

    fn key(code: KeyCode, modifiers: KeyModifiers) -> io::Result<Event> {
        Ok(Event::Key(KeyEvent::new(code, modifiers)))
    }

    #[tokio::test]
    async fn test_keys_then_detach() {
        let peer = ws_peer().await;
        let surface = BufferSurface::default();
        let bridge = TerminalBridge::new(
            Session::new("c1", "admin", SessionId::new("s1")),
            &peer.endpoints,
            surface.clone(),
            BridgeOptions::default(),
        );
        bridge.connect().await.unwrap();
        let (_, mut ws) = peer.accept().await;

        let (tx, events) = mpsc::unbounded();
        tx.unbounded_send(key(KeyCode::Char('l'), KeyModifiers::NONE)).unwrap();
        tx.unbounded_send(Ok(Event::Paste("s -la".to_string()))).unwrap();
        tx.unbounded_send(key(KeyCode::F(1), KeyModifiers::NONE)).unwrap();
        tx.unbounded_send(key(KeyCode::Enter, KeyModifiers::NONE)).unwrap();
        let pumping = pump(&bridge, events);
        tokio::pin!(pumping);

        let mut received = Vec::new();
        while received.len() < 3 {
            tokio::select! {
                _ = &mut pumping => panic!("pump ended early"),
                message = ws.next() => match message {
                    Some(Ok(Message::Text(text))) => received.push(text),
                    other => panic!("unexpected peer frame: {:?}", other),
                },
            }
        }
        assert_eq!(
            received,
            vec![
                r#"{"type":"input","data":"l"}"#,
                r#"{"type":"input","data":"s -la"}"#,
                r#"{"type":"input","data":"\r"}"#,
            ]
        );

        tx.unbounded_send(key(KeyCode::Char(']'), KeyModifiers::CONTROL)).unwrap();
        pumping.await.unwrap();

        assert_eq!(bridge.close_reason(), Some(CloseReason::User));
        assert!(surface.is_disposed());
    }
}
