//! In-memory fleet, demo identities and terminal sessions

use chrono::Utc;
use devstack_common::{
    Action, ActionResponse, Container, CreateEnvironment, Environment, Health, LogEntry, LogLevel, Port,
    Service, ServiceType, Status, SystemMetrics, SystemStatus, TerminalUser,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;
use tokio::sync::{broadcast, watch, RwLock};
use tracing::{debug, info};
use uuid::Uuid;

/// Demo identities accepted by every container terminal
const DEMO_USERS: [(&str, &str, &str); 4] = [
    ("testuser", "testpass123", "Test user with basic access"),
    ("admin", "admin123", "Administrator with full access"),
    ("developer", "dev123", "Developer account"),
    ("nanobox", "nanobox123", "Default nanobox user"),
];

/// Why a terminal authentication was refused
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthError {
    UnknownContainer,
    NotRunning,
    InvalidCredentials,
}

impl AuthError {
    pub fn detail(self) -> &'static str {
        match self {
            AuthError::UnknownContainer => "Container not found",
            AuthError::NotRunning => "Container is not running",
            AuthError::InvalidCredentials => "Invalid username or password",
        }
    }
}

/// A terminal session issued by a successful authentication
#[derive(Debug, Clone)]
struct TerminalSession {
    container_id: String,
    username: String,
}

pub struct AppState {
    containers: RwLock<Vec<Container>>,
    environments: RwLock<Vec<Environment>>,
    sessions: RwLock<HashMap<String, TerminalSession>>,
    events: broadcast::Sender<String>,
    sync_epoch: watch::Sender<u64>,
    sync_connections: AtomicUsize,
    next_environment: AtomicUsize,
    started: Instant,
}

impl AppState {
    /// State seeded with the demo fleet
    pub fn seeded() -> Self {
        let (events, _) = broadcast::channel(64);
        let (sync_epoch, _) = watch::channel(0);
        let environments = vec![seed_environment()];

        Self {
            containers: RwLock::new(seed_containers()),
            next_environment: AtomicUsize::new(environments.len() + 1),
            environments: RwLock::new(environments),
            sessions: RwLock::new(HashMap::new()),
            events,
            sync_epoch,
            sync_connections: AtomicUsize::new(0),
            started: Instant::now(),
        }
    }

    // Host

    pub fn health(&self) -> Health {
        Health {
            status: "healthy".to_string(),
            service: "nanobox-devstack".to_string(),
            version: devstack_common::VERSION.to_string(),
            timestamp: Some(now()),
        }
    }

    pub async fn system_status(&self) -> SystemStatus {
        let (cpu, memory) = self.load().await;
        SystemStatus {
            status: "running".to_string(),
            uptime: format_uptime(self.started.elapsed().as_secs()),
            cpu_usage: cpu,
            memory_usage: memory,
            disk_usage: 42.0,
            timestamp: Some(now()),
        }
    }

    pub async fn system_metrics(&self) -> SystemMetrics {
        let (cpu, memory) = self.load().await;
        let memory_total = 16.0;
        let disk_total = 256.0;
        SystemMetrics {
            cpu_usage: cpu,
            cpu_count: 8,
            memory_total,
            memory_available: memory_total * (1.0 - memory / 100.0),
            memory_usage: memory,
            disk_total,
            disk_free: disk_total * 0.58,
            disk_usage: 42.0,
            network_sent: 1024.0,
            network_recv: 2048.0,
            timestamp: Some(now()),
        }
    }

    /// Host load derived from what is currently running
    async fn load(&self) -> (f64, f64) {
        let containers = self.containers.read().await;
        let cpu = 5.0 + containers.iter().map(|c| c.cpu_usage).sum::<f64>();
        let memory = 20.0 + containers.iter().map(|c| c.memory_usage).sum::<f64>() / 4.0;
        (cpu.min(100.0), memory.min(100.0))
    }

    // Containers

    pub async fn containers(&self) -> Vec<Container> {
        self.containers.read().await.clone()
    }

    /// Apply a lifecycle action; `None` when the container does not exist
    pub async fn container_action(&self, id: &str, action: Action) -> Option<ActionResponse> {
        let status = {
            let mut containers = self.containers.write().await;
            let container = containers.iter_mut().find(|c| c.id == id)?;
            container.status = match action {
                Action::Stop => Status::Stopped,
                Action::Start | Action::Restart | Action::Toggle => Status::Running,
            };
            let (cpu, memory) = if container.status.is_running() { (12.5, 40.0) } else { (0.0, 0.0) };
            container.cpu_usage = cpu;
            container.memory_usage = memory;
            container.status
        };

        info!(container = id, %action, %status, "container action");
        self.notify().await;

        let verb = match action {
            Action::Start => "started",
            Action::Stop => "stopped",
            Action::Restart => "restarted",
            Action::Toggle => "toggled",
        };
        Some(ActionResponse {
            message: format!("Container {} {} successfully", id, verb),
            status,
            timestamp: Some(now()),
        })
    }

    // Environments and services

    pub async fn environments(&self) -> Vec<Environment> {
        self.environments.read().await.clone()
    }

    pub async fn environment(&self, id: &str) -> Option<Environment> {
        self.environments.read().await.iter().find(|e| e.id == id).cloned()
    }

    pub async fn create_environment(&self, request: CreateEnvironment) -> Environment {
        let n = self.next_environment.fetch_add(1, Ordering::SeqCst);
        let id = format!("env-{}", n);
        let environment = Environment {
            services: stack_services(&id, &request.stack),
            id,
            name: request.name,
            status: Status::Stopped,
            stack: request.stack,
            ports: Vec::new(),
            created_at: Some(now()),
        };

        self.environments.write().await.push(environment.clone());
        info!(environment = %environment.id, "environment created");
        self.notify().await;
        environment
    }

    /// Start or stop every service of an environment
    pub async fn environment_action(&self, id: &str, action: Action) -> Option<Status> {
        let status = {
            let mut environments = self.environments.write().await;
            let environment = environments.iter_mut().find(|e| e.id == id)?;
            let target = if action == Action::Stop { Status::Stopped } else { Status::Running };
            for service in &mut environment.services {
                service.status = target;
            }
            environment.status = target;
            target
        };

        info!(environment = id, %action, "environment action");
        self.notify().await;
        Some(status)
    }

    pub async fn delete_environment(&self, id: &str) -> bool {
        let removed = {
            let mut environments = self.environments.write().await;
            let before = environments.len();
            environments.retain(|e| e.id != id);
            environments.len() != before
        };
        if removed {
            info!(environment = id, "environment deleted");
            self.notify().await;
        }
        removed
    }

    /// Flip a service between running and stopped and recompute its
    /// environment's aggregate status
    pub async fn toggle_service(&self, id: &str) -> Option<Status> {
        let status = {
            let mut environments = self.environments.write().await;
            let environment = environments
                .iter_mut()
                .find(|e| e.services.iter().any(|s| s.id == id))?;
            let service = environment.services.iter_mut().find(|s| s.id == id)?;
            service.status = if service.status.is_running() { Status::Stopped } else { Status::Running };
            let status = service.status;
            environment.status = aggregate(&environment.services);
            status
        };

        info!(service = id, %status, "service toggled");
        self.notify().await;
        Some(status)
    }

    pub async fn service_logs(&self, id: &str) -> Option<Vec<LogEntry>> {
        let environments = self.environments.read().await;
        let service = environments.iter().flat_map(|e| &e.services).find(|s| s.id == id)?;

        let mut logs = vec![LogEntry {
            level: LogLevel::Info,
            message: format!("Starting {}", service.name),
            timestamp: Some(now()),
        }];
        match (service.status, service.port) {
            (Status::Running, Some(port)) => logs.push(LogEntry {
                level: LogLevel::Info,
                message: format!("{} listening on port {}", service.name, port),
                timestamp: Some(now()),
            }),
            (Status::Running, None) => {}
            _ => logs.push(LogEntry {
                level: LogLevel::Warning,
                message: format!("{} is not running", service.name),
                timestamp: Some(now()),
            }),
        }
        Some(logs)
    }

    // Terminal access

    pub async fn terminal_users(&self, container_id: &str) -> Option<Vec<TerminalUser>> {
        self.containers.read().await.iter().find(|c| c.id == container_id)?;
        Some(
            DEMO_USERS
                .iter()
                .map(|(username, _, description)| TerminalUser {
                    username: username.to_string(),
                    description: description.to_string(),
                })
                .collect(),
        )
    }

    /// Check credentials and issue a single-use session id
    pub async fn authenticate(&self, container_id: &str, username: &str, password: &str) -> Result<String, AuthError> {
        let running = self
            .containers
            .read()
            .await
            .iter()
            .find(|c| c.id == container_id)
            .map(|c| c.status.is_running())
            .ok_or(AuthError::UnknownContainer)?;
        if !running {
            return Err(AuthError::NotRunning);
        }
        if !DEMO_USERS.iter().any(|(u, p, _)| *u == username && *p == password) {
            return Err(AuthError::InvalidCredentials);
        }

        let session_id = Uuid::new_v4().to_string();
        self.sessions.write().await.insert(
            session_id.clone(),
            TerminalSession {
                container_id: container_id.to_string(),
                username: username.to_string(),
            },
        );
        debug!(container = container_id, user = username, "terminal session issued");
        Ok(session_id)
    }

    /// Consume a session; returns the username when it was issued for this
    /// container
    pub async fn take_session(&self, container_id: &str, session_id: &str) -> Option<String> {
        let mut sessions = self.sessions.write().await;
        match sessions.get(session_id) {
            Some(session) if session.container_id == container_id => {
                sessions.remove(session_id).map(|s| s.username)
            }
            _ => None,
        }
    }

    // Sync notifications

    pub fn subscribe(&self) -> broadcast::Receiver<String> {
        self.events.subscribe()
    }

    /// Broadcast a `metrics_update` to every sync client
    pub async fn notify(&self) {
        let (cpu, memory) = self.load().await;
        let frame = serde_json::json!({
            "type": "metrics_update",
            "timestamp": now(),
            "cpu_usage": cpu,
            "memory_usage": memory,
        });
        // No receivers is fine.
        let _ = self.events.send(frame.to_string());
    }

    /// Register a sync client; the receiver fires when clients must drop
    pub fn sync_joined(&self) -> watch::Receiver<u64> {
        let epoch = self.sync_epoch.subscribe();
        self.sync_connections.fetch_add(1, Ordering::SeqCst);
        epoch
    }

    /// Total sync connections accepted so far
    pub fn sync_connections(&self) -> usize {
        self.sync_connections.load(Ordering::SeqCst)
    }

    /// Close every open sync socket
    pub fn drop_sync_clients(&self) {
        self.sync_epoch.send_modify(|epoch| *epoch += 1);
    }
}

fn now() -> String {
    Utc::now().to_rfc3339()
}

fn format_uptime(seconds: u64) -> String {
    format!("{}h {}m", seconds / 3600, (seconds % 3600) / 60)
}

fn aggregate(services: &[Service]) -> Status {
    let running = services.iter().filter(|s| s.status.is_running()).count();
    match running {
        0 => Status::Stopped,
        n if n == services.len() => Status::Running,
        _ => Status::Partial,
    }
}

fn container(id: &str, name: &str, image: &str, port: &str, running: bool) -> Container {
    Container {
        id: id.to_string(),
        name: name.to_string(),
        status: if running { Status::Running } else { Status::Stopped },
        image: image.to_string(),
        created: Some(now()),
        ports: vec![Port::Mapping(port.to_string())],
        cpu_usage: if running { 12.5 } else { 0.0 },
        memory_usage: if running { 40.0 } else { 0.0 },
    }
}

fn seed_containers() -> Vec<Container> {
    vec![
        container("nanobox-web-001", "web-server", "nginx:latest", "80:8080", true),
        container("nanobox-db-001", "database", "postgres:15", "5432:5432", true),
        container("nanobox-cache-001", "redis-cache", "redis:7-alpine", "6379:6379", false),
    ]
}

fn service(env_id: &str, n: usize, name: &str, kind: ServiceType, port: u16, status: Status) -> Service {
    Service {
        id: format!("{}-svc-{}", env_id, n),
        name: name.to_string(),
        kind,
        status,
        port: Some(port),
        cpu_usage: if status.is_running() { 3.5 } else { 0.0 },
        memory_usage: if status.is_running() { 18.0 } else { 0.0 },
        uptime: if status.is_running() { "2h 15m".to_string() } else { String::new() },
    }
}

fn seed_environment() -> Environment {
    let id = "env-1";
    Environment {
        id: id.to_string(),
        name: "E-commerce API".to_string(),
        status: Status::Running,
        stack: "node-postgres".to_string(),
        ports: vec![Port::Number(3000), Port::Number(5432)],
        services: vec![
            service(id, 1, "api-server", ServiceType::Api, 3000, Status::Running),
            service(id, 2, "postgres", ServiceType::Database, 5432, Status::Running),
            service(id, 3, "redis", ServiceType::Cache, 6379, Status::Running),
        ],
        created_at: Some(now()),
    }
}

/// Stopped services for a freshly created environment
fn stack_services(env_id: &str, stack: &str) -> Vec<Service> {
    let mut services = vec![service(env_id, 1, "app", ServiceType::Runtime, 3000, Status::Stopped)];
    if stack.contains("postgres") {
        services.push(service(env_id, 2, "postgres", ServiceType::Database, 5432, Status::Stopped));
    }
    services
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_authenticate_checks_container_and_credentials() {
        let state = AppState::seeded();
        assert_eq!(
            state.authenticate("nope", "admin", "admin123").await,
            Err(AuthError::UnknownContainer)
        );
        assert_eq!(
            state.authenticate("nanobox-cache-001", "admin", "admin123").await,
            Err(AuthError::NotRunning)
        );
        assert_eq!(
            state.authenticate("nanobox-web-001", "admin", "wrong").await,
            Err(AuthError::InvalidCredentials)
        );
        assert!(state.authenticate("nanobox-web-001", "admin", "admin123").await.is_ok());
    }

    #[tokio::test]
    async fn test_sessions_are_single_use_and_bound_to_container() {
        let state = AppState::seeded();
        let session = state.authenticate("nanobox-web-001", "developer", "dev123").await.unwrap();

        assert_eq!(state.take_session("nanobox-db-001", &session).await, None);
        assert_eq!(
            state.take_session("nanobox-web-001", &session).await.as_deref(),
            Some("developer")
        );
        assert_eq!(state.take_session("nanobox-web-001", &session).await, None);
    }

    #[tokio::test]
    async fn test_toggle_service_recomputes_environment_status() {
        let state = AppState::seeded();
        assert_eq!(state.toggle_service("env-1-svc-3").await, Some(Status::Stopped));
        assert_eq!(state.environment("env-1").await.unwrap().status, Status::Partial);

        assert_eq!(state.toggle_service("env-1-svc-3").await, Some(Status::Running));
        assert_eq!(state.environment("env-1").await.unwrap().status, Status::Running);

        assert_eq!(state.toggle_service("missing").await, None);
    }

    #[tokio::test]
    async fn test_mutations_broadcast_metrics_update() {
        let state = AppState::seeded();
        let mut events = state.subscribe();

        state.container_action("nanobox-cache-001", Action::Start).await.unwrap();
        let frame = events.recv().await.unwrap();
        assert!(frame.contains(r#""type":"metrics_update""#));

        assert!(state.container_action("missing", Action::Start).await.is_none());
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_create_and_delete_environment() {
        let state = AppState::seeded();
        let env = state
            .create_environment(CreateEnvironment { name: "blog".into(), stack: "node-postgres".into() })
            .await;
        assert_eq!(env.id, "env-2");
        assert_eq!(env.services.len(), 2);
        assert_eq!(env.status, Status::Stopped);

        assert!(state.delete_environment("env-2").await);
        assert!(!state.delete_environment("env-2").await);
    }
}
