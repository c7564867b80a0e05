//! WebSocket frame shapes
//!
//! The terminal socket is asymmetric: the console sends JSON frames and the
//! remote shell answers with raw text that is written to the terminal as-is.
//! The sync socket only carries JSON control notifications.

use serde::{Deserialize, Serialize};

/// Frame sent from the console to a container terminal
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TerminalFrame {
    /// Keystrokes or pasted text, forwarded untouched
    Input { data: String },
    /// Viewport size; only sent when resize propagation is enabled
    Resize { cols: u16, rows: u16 },
}

impl TerminalFrame {
    pub fn input(data: impl Into<String>) -> Self {
        TerminalFrame::Input { data: data.into() }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// Notification received on the dashboard sync socket
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SyncNotification {
    MetricsUpdate {
        #[serde(default)]
        timestamp: Option<String>,
    },
    #[serde(other)]
    Other,
}

impl SyncNotification {
    /// Parse a text frame. Frames that are not JSON objects with a `type`
    /// field yield `None`.
    pub fn parse(text: &str) -> Option<Self> {
        serde_json::from_str(text).ok()
    }

    /// Whether the notification means server-side state changed.
    pub fn is_state_change(&self) -> bool {
        matches!(self, SyncNotification::MetricsUpdate { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_input_frame_shape() {
        let json = TerminalFrame::input("ls\n").to_json().unwrap();
        assert_eq!(json, r#"{"type":"input","data":"ls\n"}"#);
    }

    #[test]
    fn test_resize_frame_is_distinct_type() {
        let json = TerminalFrame::Resize { cols: 120, rows: 40 }.to_json().unwrap();
        assert_eq!(json, r#"{"type":"resize","cols":120,"rows":40}"#);
    }

    #[test]
    fn test_sync_notification_parsing() {
        let n = SyncNotification::parse(r#"{"type":"metrics_update","timestamp":"t","cpu":3}"#).unwrap();
        assert!(n.is_state_change());

        let n = SyncNotification::parse(r#"{"type":"heartbeat"}"#).unwrap();
        assert_eq!(n, SyncNotification::Other);
        assert!(!n.is_state_change());

        assert!(SyncNotification::parse("not json").is_none());
    }
}
