//! Web server implementation

use crate::shell::Shell;
use crate::state::{AppState, AuthError};
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use devstack_common::{Action, AuthRequest, AuthResponse, CreateEnvironment, TerminalFrame, TerminalUsers};
use futures::{SinkExt, StreamExt};
use std::future::IntoFuture;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

/// Web server configuration
#[derive(Debug, Clone)]
pub struct WebServerConfig {
    /// Period of unsolicited `metrics_update` broadcasts; `None` disables them
    pub metrics_interval: Option<Duration>,
}

impl Default for WebServerConfig {
    fn default() -> Self {
        Self {
            metrics_interval: Some(Duration::from_secs(5)),
        }
    }
}

pub struct WebServer {
    state: Arc<AppState>,
    cfg: WebServerConfig,
}

/// A server running on a background task
pub struct RunningServer {
    addr: SocketAddr,
    state: Arc<AppState>,
    task: JoinHandle<()>,
}

impl RunningServer {
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// `http://` origin of the server
    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn state(&self) -> &Arc<AppState> {
        &self.state
    }
}

impl Drop for RunningServer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

pub async fn serve(addr: SocketAddr, cfg: WebServerConfig) -> anyhow::Result<()> {
    let server = WebServer::new(cfg);
    server.serve(addr).await
}

impl WebServer {
    /// Create a new web server over the seeded demo fleet
    pub fn new(cfg: WebServerConfig) -> Self {
        Self {
            state: Arc::new(AppState::seeded()),
            cfg,
        }
    }

    pub fn state(&self) -> &Arc<AppState> {
        &self.state
    }

    /// Create router
    pub fn router(&self) -> Router {
        Router::new()
            // Nanobox host and containers
            .route("/api/nanobox/health", get(health_handler))
            .route("/api/nanobox/status", get(status_handler))
            .route("/api/nanobox/metrics", get(metrics_handler))
            .route("/api/nanobox/containers", get(list_containers_handler))
            .route("/api/nanobox/containers/:id/start", post(start_container_handler))
            .route("/api/nanobox/containers/:id/stop", post(stop_container_handler))
            .route("/api/nanobox/containers/:id/restart", post(restart_container_handler))

            // Terminal access
            .route("/api/nanobox/containers/:id/terminal/users", get(terminal_users_handler))
            .route("/api/nanobox/containers/:id/terminal/auth", post(terminal_auth_handler))
            .route("/api/nanobox/containers/:id/terminal/:session_id", get(terminal_socket_handler))

            // Environments and services
            .route("/api/environments", get(list_environments_handler).post(create_environment_handler))
            .route("/api/environments/:id", get(get_environment_handler).delete(delete_environment_handler))
            .route("/api/environments/:id/start", put(start_environment_handler))
            .route("/api/environments/:id/stop", put(stop_environment_handler))
            .route("/api/services/:id/toggle", put(toggle_service_handler))
            .route("/api/services/:id/logs", get(service_logs_handler))

            // Dashboard sync
            .route("/api/ws", get(sync_socket_handler))

            .fallback(not_found_handler)
            .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any))
            .layer(TraceLayer::new_for_http())
            .with_state(self.state.clone())
    }

    /// Start the web server
    pub async fn serve(self, addr: SocketAddr) -> anyhow::Result<()> {
        let listener = tokio::net::TcpListener::bind(addr).await?;
        info!("DevStack backend listening on http://{}", listener.local_addr()?);
        self.run(listener).await
    }

    /// Bind `addr` and serve on a background task
    pub async fn spawn(self, addr: SocketAddr) -> anyhow::Result<RunningServer> {
        let listener = tokio::net::TcpListener::bind(addr).await?;
        let addr = listener.local_addr()?;
        let state = self.state.clone();
        let task = tokio::spawn(async move {
            if let Err(e) = self.run(listener).await {
                warn!("web server stopped: {}", e);
            }
        });
        debug!("DevStack backend spawned on http://{}", addr);
        Ok(RunningServer { addr, state, task })
    }

    async fn run(self, listener: tokio::net::TcpListener) -> anyhow::Result<()> {
        let router = self.router();
        let ticker = metrics_ticker(self.state.clone(), self.cfg.metrics_interval);
        tokio::select! {
            result = axum::serve(listener, router).into_future() => result?,
            _ = ticker => {}
        }
        Ok(())
    }
}

impl Default for WebServer {
    fn default() -> Self {
        Self::new(WebServerConfig::default())
    }
}

async fn metrics_ticker(state: Arc<AppState>, period: Option<Duration>) {
    let Some(period) = period else {
        return futures::future::pending().await;
    };
    let mut interval = tokio::time::interval(period);
    interval.tick().await;
    loop {
        interval.tick().await;
        state.notify().await;
    }
}

/// `{"detail": ...}` error body
fn detail(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(serde_json::json!({ "detail": message.into() }))).into_response()
}

// ============================================================================
// Host and container handlers
// ============================================================================

async fn health_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.health())
}

async fn status_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.system_status().await)
}

async fn metrics_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.system_metrics().await)
}

async fn list_containers_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.containers().await)
}

async fn container_action(state: &AppState, id: &str, action: Action) -> Response {
    match state.container_action(id, action).await {
        Some(response) => Json(response).into_response(),
        None => detail(StatusCode::NOT_FOUND, "Container not found"),
    }
}

async fn start_container_handler(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> Response {
    container_action(&state, &id, Action::Start).await
}

async fn stop_container_handler(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> Response {
    container_action(&state, &id, Action::Stop).await
}

async fn restart_container_handler(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> Response {
    container_action(&state, &id, Action::Restart).await
}

// ============================================================================
// Terminal handlers
// ============================================================================

async fn terminal_users_handler(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> Response {
    match state.terminal_users(&id).await {
        Some(available_users) => Json(TerminalUsers { available_users }).into_response(),
        None => detail(StatusCode::NOT_FOUND, "Container not found"),
    }
}

async fn terminal_auth_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<AuthRequest>,
) -> Response {
    match state.authenticate(&id, &req.username, &req.password).await {
        Ok(session_id) => Json(AuthResponse { session_id }).into_response(),
        Err(e) => {
            let status = match e {
                AuthError::UnknownContainer => StatusCode::NOT_FOUND,
                AuthError::NotRunning => StatusCode::BAD_REQUEST,
                AuthError::InvalidCredentials => StatusCode::UNAUTHORIZED,
            };
            debug!(container = %id, user = %req.username, "terminal auth refused: {}", e.detail());
            detail(status, e.detail())
        }
    }
}

async fn terminal_socket_handler(
    State(state): State<Arc<AppState>>,
    Path((id, session_id)): Path<(String, String)>,
    ws: WebSocketUpgrade,
) -> Response {
    match state.take_session(&id, &session_id).await {
        Some(username) => ws.on_upgrade(move |socket| handle_terminal(socket, id, username)),
        None => detail(StatusCode::NOT_FOUND, "Session not found"),
    }
}

async fn handle_terminal(socket: WebSocket, container_id: String, username: String) {
    info!(container = %container_id, user = %username, "terminal opened");
    let mut shell = Shell::new(username, container_id.clone());
    let (mut tx, mut rx) = socket.split();

    if tx.send(Message::Text(shell.banner())).await.is_err() {
        return;
    }

    while let Some(Ok(message)) = rx.next().await {
        let text = match message {
            Message::Text(text) => text,
            Message::Close(_) => break,
            _ => continue,
        };

        let data = match serde_json::from_str::<TerminalFrame>(&text) {
            Ok(TerminalFrame::Input { data }) => data,
            Ok(TerminalFrame::Resize { cols, rows }) => {
                debug!(cols, rows, "terminal resized");
                continue;
            }
            Err(e) => {
                warn!("ignoring malformed terminal frame: {}", e);
                continue;
            }
        };

        let output = shell.feed(&data);
        if !output.text.is_empty() && tx.send(Message::Text(output.text)).await.is_err() {
            break;
        }
        if output.exit {
            let _ = tx.send(Message::Close(None)).await;
            break;
        }
    }

    info!(container = %container_id, "terminal closed");
}

// ============================================================================
// Environment and service handlers
// ============================================================================

async fn list_environments_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.environments().await)
}

async fn get_environment_handler(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> Response {
    match state.environment(&id).await {
        Some(environment) => Json(environment).into_response(),
        None => detail(StatusCode::NOT_FOUND, "Environment not found"),
    }
}

async fn create_environment_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateEnvironment>,
) -> Response {
    if req.name.trim().is_empty() {
        return detail(StatusCode::BAD_REQUEST, "name is required");
    }
    let environment = state.create_environment(req).await;
    (StatusCode::CREATED, Json(environment)).into_response()
}

async fn delete_environment_handler(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> Response {
    if state.delete_environment(&id).await {
        Json(serde_json::json!({ "message": format!("Environment {} deleted", id) })).into_response()
    } else {
        detail(StatusCode::NOT_FOUND, "Environment not found")
    }
}

async fn environment_action(state: &AppState, id: &str, action: Action) -> Response {
    match state.environment_action(id, action).await {
        Some(status) => Json(serde_json::json!({ "id": id, "status": status })).into_response(),
        None => detail(StatusCode::NOT_FOUND, "Environment not found"),
    }
}

async fn start_environment_handler(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> Response {
    environment_action(&state, &id, Action::Start).await
}

async fn stop_environment_handler(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> Response {
    environment_action(&state, &id, Action::Stop).await
}

async fn toggle_service_handler(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> Response {
    match state.toggle_service(&id).await {
        Some(status) => Json(serde_json::json!({ "id": id, "status": status })).into_response(),
        None => detail(StatusCode::NOT_FOUND, "Service not found"),
    }
}

async fn service_logs_handler(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> Response {
    match state.service_logs(&id).await {
        Some(logs) => Json(serde_json::json!({ "logs": logs })).into_response(),
        None => detail(StatusCode::NOT_FOUND, "Service not found"),
    }
}

// ============================================================================
// Dashboard sync
// ============================================================================

async fn sync_socket_handler(State(state): State<Arc<AppState>>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| handle_sync(socket, state))
}

async fn handle_sync(socket: WebSocket, state: Arc<AppState>) {
    let mut events = state.subscribe();
    let mut epoch = state.sync_joined();
    let (mut tx, mut rx) = socket.split();
    debug!("sync client connected");

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(frame) => {
                    if tx.send(Message::Text(frame)).await.is_err() {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => debug!(skipped, "sync client lagging"),
                Err(RecvError::Closed) => break,
            },
            _ = epoch.changed() => {
                let _ = tx.send(Message::Close(None)).await;
                break;
            }
            incoming = rx.next() => match incoming {
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
        }
    }

    debug!("sync client disconnected");
}

async fn not_found_handler() -> Response {
    detail(StatusCode::NOT_FOUND, "Not Found")
}

#[cfg(test)]
mod tests {
    use super::*;
    use devstack_common::{Container, Environment, Status};
    use tokio_tungstenite::tungstenite::Message as WsMessage;

    async fn spawn() -> RunningServer {
        WebServer::new(WebServerConfig { metrics_interval: None })
            .spawn("127.0.0.1:0".parse().unwrap())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_health_and_containers() {
        let server = spawn().await;
        let http = reqwest::Client::new();

        let health: serde_json::Value = http
            .get(format!("{}/api/nanobox/health", server.base_url()))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(health["status"], "healthy");
        assert_eq!(health["service"], "nanobox-devstack");

        let containers: Vec<Container> = http
            .get(format!("{}/api/nanobox/containers", server.base_url()))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert!(containers.iter().any(|c| c.id == "nanobox-web-001"));
    }

    #[tokio::test]
    async fn test_container_action_response() {
        let server = spawn().await;
        let response: serde_json::Value = reqwest::Client::new()
            .post(format!("{}/api/nanobox/containers/nanobox-web-001/restart", server.base_url()))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(response["status"], "running");
        assert!(response["message"].as_str().unwrap().contains("nanobox-web-001"));
    }

    #[tokio::test]
    async fn test_bad_credentials_are_unauthorized_with_detail() {
        let server = spawn().await;
        let response = reqwest::Client::new()
            .post(format!(
                "{}/api/nanobox/containers/nanobox-web-001/terminal/auth",
                server.base_url()
            ))
            .json(&serde_json::json!({
                "username": "admin",
                "password": "nope",
                "container_id": "nanobox-web-001",
            }))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), reqwest::StatusCode::UNAUTHORIZED);
        let body: serde_json::Value = response.json().await.unwrap();
        assert_eq!(body["detail"], "Invalid username or password");
    }

    #[tokio::test]
    async fn test_environment_stop_via_put() {
        let server = spawn().await;
        let http = reqwest::Client::new();
        let response = http
            .put(format!("{}/api/environments/env-1/stop", server.base_url()))
            .send()
            .await
            .unwrap();
        assert!(response.status().is_success());

        let env: Environment = http
            .get(format!("{}/api/environments/env-1", server.base_url()))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(env.status, Status::Stopped);
        assert!(env.services.iter().all(|s| s.status == Status::Stopped));
    }

    #[tokio::test]
    async fn test_unknown_session_is_rejected() {
        let server = spawn().await;
        let url = format!(
            "ws://{}/api/nanobox/containers/nanobox-web-001/terminal/not-a-session",
            server.addr()
        );
        assert!(tokio_tungstenite::connect_async(url).await.is_err());
    }

    #[tokio::test]
    async fn test_sync_socket_forwards_notifications() {
        let server = spawn().await;
        let (mut ws, _) = tokio_tungstenite::connect_async(format!("ws://{}/api/ws", server.addr()))
            .await
            .unwrap();

        while server.state().sync_connections() == 0 {
            tokio::task::yield_now().await;
        }
        server.state().notify().await;

        match ws.next().await.unwrap().unwrap() {
            WsMessage::Text(text) => assert!(text.contains("metrics_update")),
            other => panic!("expected text frame, got {:?}", other),
        }

        server.state().drop_sync_clients();
        loop {
            match ws.next().await {
                Some(Ok(WsMessage::Close(_))) | None | Some(Err(_)) => break,
                Some(Ok(_)) => {}
            }
        }
    }
}
