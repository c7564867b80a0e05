//! Credential gate
//!
//! Collects a username/password pair for one container and exchanges it for
//! a terminal session. Failures leave the gate open for another attempt;
//! there is no lockout on this side.

use devstack_common::{Error, Result, TerminalUser};
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{debug, warn};

use crate::client::TerminalApi;
use crate::session::{Session, SessionNegotiator};

/// Passwords of the demo identities shipped with the nanobox images.
/// Only used to pre-fill a prompt.
static DEMO_PASSWORDS: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    [
        ("testuser", "testpass123"),
        ("admin", "admin123"),
        ("developer", "dev123"),
        ("nanobox", "nanobox123"),
    ]
    .into_iter()
    .collect()
});

/// Known password for a demo identity
pub fn demo_password(username: &str) -> Option<&'static str> {
    DEMO_PASSWORDS.get(username).copied()
}

/// Username/password pair; lives only in memory
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    username: String,
    password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    /// Credentials pre-filled from the demo identity table
    pub fn demo(username: &str) -> Self {
        Self::new(username, demo_password(username).unwrap_or_default())
    }

    pub fn username(&self) -> &str {
        self.username.trim()
    }

    pub fn has_password(&self) -> bool {
        !self.password.is_empty()
    }

    /// Both fields must be non-empty
    pub fn validate(&self) -> Result<()> {
        if self.username().is_empty() {
            return Err(Error::InvalidCredentials("username is required".into()));
        }
        if self.password.is_empty() {
            return Err(Error::InvalidCredentials("password is required".into()));
        }
        Ok(())
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

/// Where the gate is in the login flow
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateState {
    /// Waiting for input; carries the last failure, if any
    Form { error: Option<String> },
    Authenticating,
    Authenticated { username: String },
}

/// Puts the gate back to [`GateState::Form`] if a submission is abandoned
/// before the backend answers
struct Pending<'a> {
    state: &'a Mutex<GateState>,
    armed: bool,
}

impl Pending<'_> {
    fn settle(mut self, next: GateState) {
        self.armed = false;
        *self.state.lock() = next;
    }
}

impl Drop for Pending<'_> {
    fn drop(&mut self) {
        if self.armed {
            *self.state.lock() = GateState::Form { error: None };
        }
    }
}

/// Login flow for one container's terminal
pub struct CredentialGate<A: ?Sized> {
    container_id: String,
    api: Arc<A>,
    negotiator: SessionNegotiator<A>,
    demo_users: OnceCell<Vec<TerminalUser>>,
    state: Mutex<GateState>,
}

impl<A: TerminalApi + ?Sized> CredentialGate<A> {
    pub fn new(container_id: impl Into<String>, api: Arc<A>) -> Self {
        Self {
            container_id: container_id.into(),
            negotiator: SessionNegotiator::new(api.clone()),
            api,
            demo_users: OnceCell::new(),
            state: Mutex::new(GateState::Form { error: None }),
        }
    }

    pub fn container_id(&self) -> &str {
        &self.container_id
    }

    pub fn state(&self) -> GateState {
        self.state.lock().clone()
    }

    /// Demo identities for this container, fetched at most once.
    /// Advisory only: a failed fetch yields an empty list.
    pub async fn demo_identities(&self) -> &[TerminalUser] {
        self.demo_users
            .get_or_init(|| async {
                match self.api.terminal_users(&self.container_id).await {
                    Ok(users) => {
                        debug!(container = %self.container_id, count = users.len(), "loaded demo identities");
                        users
                    }
                    Err(e) => {
                        warn!(container = %self.container_id, "failed to load demo identities: {}", e);
                        Vec::new()
                    }
                }
            })
            .await
    }

    /// Submit credentials. Returns the session on success; on failure the
    /// gate goes back to [`GateState::Form`] with a displayable error.
    pub async fn submit(&self, credentials: Credentials) -> Result<Session> {
        {
            let mut state = self.state.lock();
            match &*state {
                GateState::Authenticating => return Err(Error::AuthenticationInFlight),
                GateState::Authenticated { .. } => {
                    return Err(Error::InvalidStateTransition {
                        from: "authenticated".into(),
                        to: "authenticating".into(),
                    })
                }
                GateState::Form { .. } => {}
            }

            if let Err(e) = credentials.validate() {
                *state = GateState::Form { error: Some(e.to_string()) };
                return Err(e);
            }
            *state = GateState::Authenticating;
        }
        let pending = Pending {
            state: &self.state,
            armed: true,
        };

        let result = self
            .negotiator
            .authenticate(&self.container_id, credentials.username(), &credentials.password)
            .await;

        match result {
            Ok(session) => {
                pending.settle(GateState::Authenticated {
                    username: session.username().to_string(),
                });
                Ok(session)
            }
            Err(e) => {
                let message = e.auth_message();
                warn!(
                    container = %self.container_id,
                    user = credentials.username(),
                    "terminal authentication failed: {}",
                    message
                );
                pending.settle(GateState::Form { error: Some(message) });
                Err(e)
            }
        }
    }
}
