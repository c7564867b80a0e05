//! Terminal session negotiation
//!
//! Exchanges credentials for an opaque session id bound to one container.

use chrono::{DateTime, Utc};
use devstack_common::{Endpoints, Result};
use std::fmt;
use std::sync::Arc;
use tracing::info;
use url::Url;

use crate::client::TerminalApi;

/// Opaque session capability. Whoever holds it can open the terminal bridge,
/// so it is never printed or logged.
#[derive(Clone, PartialEq, Eq)]
pub struct SessionId(String);

impl SessionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub(crate) fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SessionId(***)")
    }
}

/// An authenticated terminal session, consumed when a bridge is opened
#[derive(Debug)]
pub struct Session {
    container_id: String,
    username: String,
    id: SessionId,
    created_at: DateTime<Utc>,
}

impl Session {
    pub fn new(container_id: impl Into<String>, username: impl Into<String>, id: SessionId) -> Self {
        Self {
            container_id: container_id.into(),
            username: username.into(),
            id,
            created_at: Utc::now(),
        }
    }

    pub fn container_id(&self) -> &str {
        &self.container_id
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Terminal socket URL; contains the capability
    pub(crate) fn socket_url(&self, endpoints: &Endpoints) -> Url {
        endpoints.terminal_socket(&self.container_id, self.id.expose())
    }
}

/// One-shot credential exchange
pub struct SessionNegotiator<A: ?Sized> {
    api: Arc<A>,
}

impl<A: TerminalApi + ?Sized> SessionNegotiator<A> {
    pub fn new(api: Arc<A>) -> Self {
        Self { api }
    }

    /// Authenticate against `container_id`. Failures are returned as-is;
    /// re-submission is always up to the user.
    pub async fn authenticate(
        &self,
        container_id: &str,
        username: &str,
        password: &str,
    ) -> Result<Session> {
        let id = self.api.authenticate(container_id, username, password).await?;
        info!(container = container_id, user = username, "terminal session established");
        Ok(Session::new(container_id, username, id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeTerminalApi;
    use devstack_common::Error;

    #[test]
    fn test_session_id_is_redacted() {
        let session = Session::new("c1", "admin", SessionId::new("s1-secret"));
        let rendered = format!("{:?}", session);
        assert!(!rendered.contains("s1-secret"));
        assert!(rendered.contains("admin"));
    }

    #[test]
    fn test_socket_url_embeds_container_and_session() {
        let endpoints = Endpoints::new("https://example.com").unwrap();
        let session = Session::new("c1", "admin", SessionId::new("s1"));
        assert_eq!(
            session.socket_url(&endpoints).as_str(),
            "wss://example.com/api/nanobox/containers/c1/terminal/s1"
        );
    }

    #[tokio::test]
    async fn test_authenticate_returns_bound_session() {
        let api = Arc::new(FakeTerminalApi::with_user("c1", "admin", "admin123", "s1"));
        let negotiator = SessionNegotiator::new(api.clone());

        let session = negotiator.authenticate("c1", "admin", "admin123").await.unwrap();
        assert_eq!(session.container_id(), "c1");
        assert_eq!(session.username(), "admin");
        assert_eq!(session.id.expose(), "s1");
    }

    #[tokio::test]
    async fn test_failed_authentication_is_not_retried() {
        let api = Arc::new(FakeTerminalApi::with_user("c1", "admin", "admin123", "s1"));
        let negotiator = SessionNegotiator::new(api.clone());

        let err = negotiator.authenticate("c1", "admin", "wrong").await.unwrap_err();
        assert!(matches!(err, Error::Authentication(_)));
        assert_eq!(api.auth_calls(), 1);
    }
}
