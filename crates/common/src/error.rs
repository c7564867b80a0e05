//! Error types for DevStack

use thiserror::Error;

/// Result type alias using DevStack Error
pub type Result<T> = std::result::Result<T, Error>;

/// Fallback message shown when the backend rejects credentials without detail.
pub const AUTH_FAILED_FALLBACK: &str = "Authentication failed";

/// DevStack error types
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("WebSocket error: {0}")]
    WebSocket(String),

    #[error("Backend returned {status}: {detail}")]
    Api { status: u16, detail: String },

    #[error("Operation timeout after {seconds}s")]
    Timeout { seconds: u64 },

    #[error("{0}")]
    Authentication(String),

    #[error("Invalid credentials: {0}")]
    InvalidCredentials(String),

    #[error("Authentication already in progress")]
    AuthenticationInFlight,

    #[error("An action is already in progress for {0}")]
    ActionInFlight(String),

    #[error("Action '{action}' is not supported for {kind}")]
    UnsupportedAction { kind: String, action: String },

    #[error("Terminal bridge is not open")]
    BridgeNotOpen,

    #[error("Invalid state transition: {from} -> {to}")]
    InvalidStateTransition { from: String, to: String },
}

impl Error {
    /// Whether this error means the backend could not be reached at all.
    pub fn is_connectivity(&self) -> bool {
        matches!(
            self,
            Error::Transport(_) | Error::WebSocket(_) | Error::Timeout { .. } | Error::Io(_)
        )
    }

    /// Message suitable for showing inline next to a credential prompt.
    ///
    /// Backend-provided details are passed through verbatim; anything else
    /// the backend rejected collapses to a generic fallback.
    pub fn auth_message(&self) -> String {
        match self {
            Error::Authentication(detail) if !detail.trim().is_empty() => detail.clone(),
            Error::Authentication(_) | Error::Api { .. } => AUTH_FAILED_FALLBACK.to_string(),
            other => other.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auth_message_passes_detail_through() {
        let err = Error::Authentication("Invalid username or password".into());
        assert_eq!(err.auth_message(), "Invalid username or password");
    }

    #[test]
    fn test_auth_message_falls_back() {
        assert_eq!(Error::Authentication(String::new()).auth_message(), AUTH_FAILED_FALLBACK);
        let api = Error::Api { status: 500, detail: "Internal Server Error".into() };
        assert_eq!(api.auth_message(), AUTH_FAILED_FALLBACK);
    }

    #[test]
    fn test_connectivity_classification() {
        assert!(Error::Timeout { seconds: 15 }.is_connectivity());
        assert!(Error::Transport("refused".into()).is_connectivity());
        assert!(!Error::BridgeNotOpen.is_connectivity());
        assert!(!Error::ActionInFlight("env-1".into()).is_connectivity());
    }
}
