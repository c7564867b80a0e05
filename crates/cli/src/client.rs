//! Backend HTTP client

use async_trait::async_trait;
use devstack_common::error::AUTH_FAILED_FALLBACK;
use devstack_common::{
    Action, ActionResponse, AuthRequest, AuthResponse, Container, CreateEnvironment, EntityKind,
    EntityRef, Endpoints, Environment, Error, ErrorBody, Health, LogEntry, Result, SystemMetrics,
    SystemStatus, TerminalUser, TerminalUsers,
};
use reqwest::{Client, Method, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, trace};

use crate::session::SessionId;
use crate::store::Snapshot;

/// Calls the dashboard needs to stay in sync and to act on entities
#[async_trait]
pub trait DashboardApi: Send + Sync {
    /// Fetch the full collection state in one go
    async fn fetch_snapshot(&self) -> Result<Snapshot>;

    /// Issue one state-changing request
    async fn perform(&self, entity: &EntityRef, action: Action) -> Result<()>;

    async fn create_environment(&self, request: &CreateEnvironment) -> Result<Environment>;

    async fn delete_environment(&self, id: &str) -> Result<()>;
}

/// Calls the terminal login flow needs
#[async_trait]
pub trait TerminalApi: Send + Sync {
    /// Demo identities advertised for a container
    async fn terminal_users(&self, container_id: &str) -> Result<Vec<TerminalUser>>;

    /// Exchange credentials for a terminal session id
    async fn authenticate(
        &self,
        container_id: &str,
        username: &str,
        password: &str,
    ) -> Result<SessionId>;
}

/// Client for the DevStack backend REST API
#[derive(Clone)]
pub struct ApiClient {
    http: Client,
    endpoints: Endpoints,
    timeout: Duration,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum LogsResponse {
    List(Vec<LogEntry>),
    Wrapped { logs: Vec<LogEntry> },
}

impl ApiClient {
    /// Create a new client; every request is bounded by `timeout`
    pub fn new(endpoints: Endpoints, timeout: Duration) -> Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .user_agent(format!("devstack-cli/{}", devstack_common::VERSION))
            .build()
            .map_err(|e| Error::Transport(e.to_string()))?;
        Ok(Self { http, endpoints, timeout })
    }

    pub fn endpoints(&self) -> &Endpoints {
        &self.endpoints
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    // Nanobox host and containers

    pub async fn health(&self) -> Result<Health> {
        self.get(&["nanobox", "health"]).await
    }

    pub async fn system_status(&self) -> Result<SystemStatus> {
        self.get(&["nanobox", "status"]).await
    }

    pub async fn system_metrics(&self) -> Result<SystemMetrics> {
        self.get(&["nanobox", "metrics"]).await
    }

    pub async fn containers(&self) -> Result<Vec<Container>> {
        self.get(&["nanobox", "containers"]).await
    }

    /// Start, stop or restart a container
    pub async fn container_action(&self, id: &str, action: Action) -> Result<ActionResponse> {
        self.send(Method::POST, &["nanobox", "containers", id, action.as_str()], None::<&()>)
            .await
    }

    // Environments and services

    pub async fn environments(&self) -> Result<Vec<Environment>> {
        self.get(&["environments"]).await
    }

    pub async fn create_environment(&self, request: &CreateEnvironment) -> Result<Environment> {
        self.send(Method::POST, &["environments"], Some(request)).await
    }

    /// Start or stop an environment
    pub async fn environment_action(&self, id: &str, action: Action) -> Result<()> {
        self.execute(Method::PUT, &["environments", id, action.as_str()], None::<&()>)
            .await
            .map(|_| ())
    }

    pub async fn delete_environment(&self, id: &str) -> Result<()> {
        self.execute(Method::DELETE, &["environments", id], None::<&()>)
            .await
            .map(|_| ())
    }

    pub async fn toggle_service(&self, id: &str) -> Result<()> {
        self.execute(Method::PUT, &["services", id, "toggle"], None::<&()>)
            .await
            .map(|_| ())
    }

    /// Fetch a snapshot of a service's logs
    pub async fn service_logs(&self, id: &str) -> Result<Vec<LogEntry>> {
        let response: LogsResponse = self.get(&["services", id, "logs"]).await?;
        Ok(match response {
            LogsResponse::List(entries) => entries,
            LogsResponse::Wrapped { logs } => logs,
        })
    }

    // Terminal access

    pub async fn terminal_users(&self, container_id: &str) -> Result<Vec<TerminalUser>> {
        let users: TerminalUsers = self
            .get(&["nanobox", "containers", container_id, "terminal", "users"])
            .await?;
        Ok(users.available_users)
    }

    /// Exchange credentials for a session id.
    ///
    /// Client errors become [`Error::Authentication`] carrying the backend's
    /// detail verbatim. Never retried.
    pub async fn terminal_auth(
        &self,
        container_id: &str,
        username: &str,
        password: &str,
    ) -> Result<SessionId> {
        let url = self
            .endpoints
            .api(&["nanobox", "containers", container_id, "terminal", "auth"]);
        let body = AuthRequest {
            username: username.to_string(),
            password: password.to_string(),
            container_id: container_id.to_string(),
        };
        debug!(container = container_id, user = username, "requesting terminal session");

        let response = self
            .http
            .post(url)
            .json(&body)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = response.status();
        if status.is_success() {
            let auth: AuthResponse = response.json().await.map_err(|e| self.transport_error(e))?;
            return Ok(SessionId::new(auth.session_id));
        }

        let detail = error_detail(response).await;
        if status.is_client_error() {
            Err(Error::Authentication(
                detail.unwrap_or_else(|| AUTH_FAILED_FALLBACK.to_string()),
            ))
        } else {
            Err(Error::Api {
                status: status.as_u16(),
                detail: detail.unwrap_or_else(|| status_reason(status)),
            })
        }
    }

    // Plumbing

    async fn get<T: DeserializeOwned>(&self, segments: &[&str]) -> Result<T> {
        self.send(Method::GET, segments, None::<&()>).await
    }

    async fn send<B, T>(&self, method: Method, segments: &[&str], body: Option<&B>) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let response = self.execute(method, segments, body).await?;
        response.json::<T>().await.map_err(|e| self.transport_error(e))
    }

    async fn execute<B>(&self, method: Method, segments: &[&str], body: Option<&B>) -> Result<Response>
    where
        B: Serialize + ?Sized,
    {
        let url = self.endpoints.api(segments);
        trace!(%method, path = url.path(), "backend request");

        let mut request = self.http.request(method, url);
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await.map_err(|e| self.transport_error(e))?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let detail = error_detail(response).await;
        Err(Error::Api {
            status: status.as_u16(),
            detail: detail.unwrap_or_else(|| status_reason(status)),
        })
    }

    fn transport_error(&self, e: reqwest::Error) -> Error {
        if e.is_timeout() {
            Error::Timeout { seconds: self.timeout.as_secs() }
        } else if e.is_decode() {
            Error::Transport(format!("invalid response body: {}", e.without_url()))
        } else {
            Error::Transport(e.without_url().to_string())
        }
    }
}

async fn error_detail(response: Response) -> Option<String> {
    response
        .json::<ErrorBody>()
        .await
        .ok()
        .and_then(|body| body.detail_text())
}

fn status_reason(status: StatusCode) -> String {
    status
        .canonical_reason()
        .map(str::to_string)
        .unwrap_or_else(|| status.as_str().to_string())
}

#[async_trait]
impl DashboardApi for ApiClient {
    async fn fetch_snapshot(&self) -> Result<Snapshot> {
        let environments = async {
            match self.environments().await {
                // Backends without environment support still serve the nanobox view.
                Err(Error::Api { status: 404, .. }) => Ok(Vec::new()),
                other => other,
            }
        };

        let (health, status, metrics, containers, environments) = tokio::try_join!(
            self.health(),
            self.system_status(),
            self.system_metrics(),
            self.containers(),
            environments,
        )?;

        Ok(Snapshot {
            health: Some(health),
            status: Some(status),
            metrics: Some(metrics),
            containers,
            environments,
            fetched_at: Some(chrono::Utc::now()),
            sequence: 0,
        })
    }

    async fn perform(&self, entity: &EntityRef, action: Action) -> Result<()> {
        if !entity.kind.supports(action) {
            return Err(Error::UnsupportedAction {
                kind: entity.kind.to_string(),
                action: action.to_string(),
            });
        }

        match entity.kind {
            EntityKind::Container => self.container_action(&entity.id, action).await.map(|_| ()),
            EntityKind::Environment => self.environment_action(&entity.id, action).await,
            EntityKind::Service => self.toggle_service(&entity.id).await,
        }
    }

    async fn create_environment(&self, request: &CreateEnvironment) -> Result<Environment> {
        ApiClient::create_environment(self, request).await
    }

    async fn delete_environment(&self, id: &str) -> Result<()> {
        ApiClient::delete_environment(self, id).await
    }
}

#[async_trait]
impl TerminalApi for ApiClient {
    async fn terminal_users(&self, container_id: &str) -> Result<Vec<TerminalUser>> {
        ApiClient::terminal_users(self, container_id).await
    }

    async fn authenticate(
        &self,
        container_id: &str,
        username: &str,
        password: &str,
    ) -> Result<SessionId> {
        self.terminal_auth(container_id, username, password).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_logs_response_accepts_both_shapes() {
        let list: LogsResponse =
            serde_json::from_str(r#"[{"level":"info","message":"ready"}]"#).unwrap();
        let wrapped: LogsResponse =
            serde_json::from_str(r#"{"logs":[{"level":"warn","message":"slow"}]}"#).unwrap();

        assert!(matches!(list, LogsResponse::List(ref v) if v.len() == 1));
        match wrapped {
            LogsResponse::Wrapped { logs } => assert_eq!(logs[0].level, devstack_common::LogLevel::Warning),
            LogsResponse::List(_) => panic!("expected wrapped logs"),
        }
    }

    #[test]
    fn test_status_reason_fallback() {
        assert_eq!(status_reason(StatusCode::NOT_FOUND), "Not Found");
    }

    #[tokio::test]
    async fn test_unreachable_backend_is_transport_error() {
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let endpoints = Endpoints::new(&format!("http://127.0.0.1:{}", port)).unwrap();
        let client = ApiClient::new(endpoints, Duration::from_secs(2)).unwrap();
        let err = client.health().await.unwrap_err();
        assert!(err.is_connectivity(), "unexpected error: {err}");
    }
}
