//! Core types for DevStack

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle status shared by containers, environments and services.
///
/// Always assigned from server responses. Strings the console does not
/// recognise deserialize to [`Status::Unknown`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Running,
    Stopped,
    Error,
    Partial,
    #[default]
    #[serde(other)]
    Unknown,
}

impl Status {
    pub fn is_running(self) -> bool {
        matches!(self, Status::Running)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Status::Running => write!(f, "running"),
            Status::Stopped => write!(f, "stopped"),
            Status::Error => write!(f, "error"),
            Status::Partial => write!(f, "partial"),
            Status::Unknown => write!(f, "unknown"),
        }
    }
}

/// Service type tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ServiceType {
    Database,
    Web,
    Api,
    Cache,
    Runtime,
    #[default]
    #[serde(other)]
    Other,
}

/// Presentation attributes for a service type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServiceStyle {
    pub glyph: &'static str,
    pub label: &'static str,
}

impl ServiceType {
    pub const ALL: [ServiceType; 6] = [
        ServiceType::Database,
        ServiceType::Web,
        ServiceType::Api,
        ServiceType::Cache,
        ServiceType::Runtime,
        ServiceType::Other,
    ];

    pub const fn style(self) -> ServiceStyle {
        match self {
            ServiceType::Database => ServiceStyle { glyph: "🗄", label: "database" },
            ServiceType::Web => ServiceStyle { glyph: "🌐", label: "web" },
            ServiceType::Api => ServiceStyle { glyph: "🔌", label: "api" },
            ServiceType::Cache => ServiceStyle { glyph: "⚡", label: "cache" },
            ServiceType::Runtime => ServiceStyle { glyph: "⚙", label: "runtime" },
            ServiceType::Other => ServiceStyle { glyph: "📦", label: "other" },
        }
    }
}

impl fmt::Display for ServiceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.style().label)
    }
}

/// A declared port. The backend reports either bare numbers or mapping strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Port {
    Number(u16),
    Mapping(String),
}

impl fmt::Display for Port {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Port::Number(n) => write!(f, "{}", n),
            Port::Mapping(s) => f.write_str(s),
        }
    }
}

/// Join ports for display
pub fn format_ports(ports: &[Port]) -> String {
    ports.iter().map(Port::to_string).collect::<Vec<_>>().join(", ")
}

/// Container managed by the nanobox runtime
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Container {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub status: Status,
    #[serde(default)]
    pub image: String,
    #[serde(default)]
    pub created: Option<String>,
    #[serde(default)]
    pub ports: Vec<Port>,
    #[serde(default)]
    pub cpu_usage: f64,
    #[serde(default)]
    pub memory_usage: f64,
}

/// Service owned by an environment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Service {
    pub id: String,
    pub name: String,
    #[serde(rename = "type", default)]
    pub kind: ServiceType,
    #[serde(default)]
    pub status: Status,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub cpu_usage: f64,
    #[serde(default)]
    pub memory_usage: f64,
    #[serde(default)]
    pub uptime: String,
}

/// Development environment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Environment {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub status: Status,
    #[serde(default, alias = "image")]
    pub stack: String,
    #[serde(default)]
    pub ports: Vec<Port>,
    #[serde(default)]
    pub services: Vec<Service>,
    #[serde(default)]
    pub created_at: Option<String>,
}

/// Request body for creating an environment
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateEnvironment {
    pub name: String,
    pub stack: String,
}

/// Log level of a service log entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    Info,
    #[serde(alias = "warn")]
    Warning,
    Error,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogLevel::Info => write!(f, "info"),
            LogLevel::Warning => write!(f, "warning"),
            LogLevel::Error => write!(f, "error"),
        }
    }
}

/// Point-in-time service log entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub level: LogLevel,
    pub message: String,
    #[serde(default)]
    pub timestamp: Option<String>,
}

/// `GET /api/nanobox/health`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Health {
    pub status: String,
    #[serde(default)]
    pub service: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub timestamp: Option<String>,
}

/// `GET /api/nanobox/status`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemStatus {
    pub status: String,
    #[serde(default)]
    pub uptime: String,
    #[serde(default)]
    pub cpu_usage: f64,
    #[serde(default)]
    pub memory_usage: f64,
    #[serde(default)]
    pub disk_usage: f64,
    #[serde(default)]
    pub timestamp: Option<String>,
}

/// `GET /api/nanobox/metrics`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemMetrics {
    pub cpu_usage: f64,
    pub cpu_count: u32,
    pub memory_total: f64,
    pub memory_available: f64,
    pub memory_usage: f64,
    pub disk_total: f64,
    pub disk_free: f64,
    pub disk_usage: f64,
    pub network_sent: f64,
    pub network_recv: f64,
    #[serde(default)]
    pub timestamp: Option<String>,
}

/// Response to a container lifecycle action
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionResponse {
    pub message: String,
    pub status: Status,
    #[serde(default)]
    pub timestamp: Option<String>,
}

/// Demo identity advertised by a container's terminal endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TerminalUser {
    pub username: String,
    #[serde(default)]
    pub description: String,
}

/// `GET /api/nanobox/containers/{id}/terminal/users`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TerminalUsers {
    #[serde(default)]
    pub available_users: Vec<TerminalUser>,
}

/// `POST /api/nanobox/containers/{id}/terminal/auth` request body
#[derive(Clone, Serialize, Deserialize)]
pub struct AuthRequest {
    pub username: String,
    pub password: String,
    pub container_id: String,
}

impl fmt::Debug for AuthRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthRequest")
            .field("username", &self.username)
            .field("password", &"***")
            .field("container_id", &self.container_id)
            .finish()
    }
}

/// `POST /api/nanobox/containers/{id}/terminal/auth` response body
#[derive(Clone, Serialize, Deserialize)]
pub struct AuthResponse {
    pub session_id: String,
}

/// Error body returned by the backend (`{"detail": ...}`)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ErrorBody {
    #[serde(default)]
    pub detail: Option<serde_json::Value>,
}

impl ErrorBody {
    /// Detail rendered as text; strings are passed through unquoted.
    pub fn detail_text(&self) -> Option<String> {
        match &self.detail {
            Some(serde_json::Value::String(s)) => Some(s.clone()),
            Some(serde_json::Value::Null) | None => None,
            Some(other) => Some(other.to_string()),
        }
    }
}

/// Kind of entity a lifecycle action targets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Container,
    Environment,
    Service,
}

impl EntityKind {
    /// Actions the backend exposes for this kind of entity.
    pub fn supports(self, action: Action) -> bool {
        match self {
            EntityKind::Container => {
                matches!(action, Action::Start | Action::Stop | Action::Restart)
            }
            EntityKind::Environment => matches!(action, Action::Start | Action::Stop),
            EntityKind::Service => matches!(action, Action::Toggle),
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityKind::Container => write!(f, "container"),
            EntityKind::Environment => write!(f, "environment"),
            EntityKind::Service => write!(f, "service"),
        }
    }
}

/// Lifecycle action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Start,
    Stop,
    Restart,
    Toggle,
}

impl Action {
    pub fn as_str(self) -> &'static str {
        match self {
            Action::Start => "start",
            Action::Stop => "stop",
            Action::Restart => "restart",
            Action::Toggle => "toggle",
        }
    }

    /// Whether the action makes sense for an entity currently in `status`.
    pub fn valid_for(self, status: Status) -> bool {
        match self {
            Action::Start => !status.is_running(),
            Action::Stop | Action::Restart => status.is_running(),
            Action::Toggle => true,
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reference to an entity by kind and id
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntityRef {
    pub kind: EntityKind,
    pub id: String,
}

impl EntityRef {
    pub fn container(id: impl Into<String>) -> Self {
        Self { kind: EntityKind::Container, id: id.into() }
    }

    pub fn environment(id: impl Into<String>) -> Self {
        Self { kind: EntityKind::Environment, id: id.into() }
    }

    pub fn service(id: impl Into<String>) -> Self {
        Self { kind: EntityKind::Service, id: id.into() }
    }
}

impl fmt::Display for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind, self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test]
    fn test_unknown_status_string_maps_to_unknown() {
        let status: Status = serde_json::from_str(r#""exploded""#).unwrap();
        assert_eq!(status, Status::Unknown);
        let status: Status = serde_json::from_str(r#""partial""#).unwrap();
        assert_eq!(status, Status::Partial);
    }

    #[test]
    fn test_service_type_parsing_and_style() {
        let json = r#"{"id":"s1","name":"postgres","type":"database","status":"running","port":5432,"cpu_usage":1.5,"memory_usage":12.0,"uptime":"2h"}"#;
        let service: Service = serde_json::from_str(json).unwrap();
        assert_eq!(service.kind, ServiceType::Database);
        assert_eq!(service.kind.style().label, "database");

        let odd: ServiceType = serde_json::from_str(r#""queue""#).unwrap();
        assert_eq!(odd, ServiceType::Other);
    }

    #[test]
    fn test_every_service_type_has_distinct_label() {
        let mut labels: Vec<_> = ServiceType::ALL.iter().map(|t| t.style().label).collect();
        labels.sort();
        labels.dedup();
        assert_eq!(labels.len(), ServiceType::ALL.len());
    }

    #[test]
    fn test_container_parsing_with_mixed_ports() {
        let json = r#"{"id":"nanobox-web-001","name":"web","status":"running","image":"nginx:latest","created":"2024-01-01T00:00:00","ports":["80:8080", 443],"cpu_usage":12.5,"memory_usage":40.1}"#;
        let container: Container = serde_json::from_str(json).unwrap();
        assert_eq!(container.status, Status::Running);
        assert_eq!(format_ports(&container.ports), "80:8080, 443");
    }

    #[test]
    fn test_environment_accepts_image_alias() {
        let json = r#"{"id":"env-1","name":"shop","status":"partial","image":"node-postgres"}"#;
        let env: Environment = serde_json::from_str(json).unwrap();
        assert_eq!(env.stack, "node-postgres");
        assert!(env.services.is_empty());
    }

    #[test]
    fn test_error_body_detail_text() {
        let body: ErrorBody = serde_json::from_str(r#"{"detail":"Invalid username or password"}"#).unwrap();
        assert_eq!(body.detail_text().as_deref(), Some("Invalid username or password"));
        let body: ErrorBody = serde_json::from_str(r#"{}"#).unwrap();
        assert_eq!(body.detail_text(), None);
    }

    #[test]
    fn test_auth_request_debug_hides_password() {
        let req = AuthRequest {
            username: "admin".into(),
            password: "admin123".into(),
            container_id: "c1".into(),
        };
        let rendered = format!("{:?}", req);
        assert!(!rendered.contains("admin123"));
    }

    #[test_case(EntityKind::Container, Action::Restart, true)]
    #[test_case(EntityKind::Container, Action::Toggle, false)]
    #[test_case(EntityKind::Environment, Action::Stop, true)]
    #[test_case(EntityKind::Environment, Action::Restart, false)]
    #[test_case(EntityKind::Service, Action::Toggle, true)]
    #[test_case(EntityKind::Service, Action::Start, false)]
    fn test_entity_action_support(kind: EntityKind, action: Action, expected: bool) {
        assert_eq!(kind.supports(action), expected);
    }

    #[test_case(Action::Start, Status::Stopped, true)]
    #[test_case(Action::Start, Status::Running, false)]
    #[test_case(Action::Stop, Status::Running, true)]
    #[test_case(Action::Restart, Status::Error, false)]
    #[test_case(Action::Toggle, Status::Partial, true)]
    fn test_action_validity_by_status(action: Action, status: Status, expected: bool) {
        assert_eq!(action.valid_for(status), expected);
    }
}
