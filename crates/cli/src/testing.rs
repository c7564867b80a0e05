//! In-memory backends for unit tests

use async_trait::async_trait;
use devstack_common::{
    Action, Container, CreateEnvironment, EntityKind, EntityRef, Endpoints, Environment, Error, Result,
    Service, ServiceType, Status, TerminalUser,
};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{oneshot, Semaphore};
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::WebSocketStream;

use crate::client::{DashboardApi, TerminalApi};
use crate::session::SessionId;
use crate::store::Snapshot;

pub(crate) fn container(id: &str, status: Status) -> Container {
    Container {
        id: id.to_string(),
        name: format!("nanobox-{}", id),
        status,
        image: "nanobox/alpine:latest".to_string(),
        created: None,
        ports: Vec::new(),
        cpu_usage: 0.0,
        memory_usage: 0.0,
    }
}

/// Environment with one service, `svc-1`
pub(crate) fn environment(id: &str, status: Status) -> Environment {
    Environment {
        id: id.to_string(),
        name: format!("{} env", id),
        status,
        stack: "node".to_string(),
        ports: Vec::new(),
        services: vec![Service {
            id: "svc-1".to_string(),
            name: "api".to_string(),
            kind: ServiceType::Api,
            status,
            port: Some(3000),
            cpu_usage: 0.0,
            memory_usage: 0.0,
            uptime: String::new(),
        }],
        created_at: None,
    }
}

async fn pass(gate: &Option<Arc<Semaphore>>) {
    if let Some(gate) = gate {
        gate.acquire().await.expect("gate closed").forget();
    }
}

/// Terminal backend with a single valid identity
pub(crate) struct FakeTerminalApi {
    container_id: String,
    username: String,
    password: String,
    session_id: String,
    fail_users: bool,
    gate: Option<Arc<Semaphore>>,
    users_calls: AtomicUsize,
    auth_calls: AtomicUsize,
}

impl FakeTerminalApi {
    pub(crate) fn with_user(container_id: &str, username: &str, password: &str, session_id: &str) -> Self {
        Self {
            container_id: container_id.to_string(),
            username: username.to_string(),
            password: password.to_string(),
            session_id: session_id.to_string(),
            fail_users: false,
            gate: None,
            users_calls: AtomicUsize::new(0),
            auth_calls: AtomicUsize::new(0),
        }
    }

    /// Hold every authentication until a permit is added
    pub(crate) fn with_gate(mut self, gate: Arc<Semaphore>) -> Self {
        self.gate = Some(gate);
        self
    }

    pub(crate) fn failing_users(mut self) -> Self {
        self.fail_users = true;
        self
    }

    pub(crate) fn users_calls(&self) -> usize {
        self.users_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn auth_calls(&self) -> usize {
        self.auth_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TerminalApi for FakeTerminalApi {
    async fn terminal_users(&self, _container_id: &str) -> Result<Vec<TerminalUser>> {
        self.users_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_users {
            return Err(Error::Transport("connection refused".into()));
        }
        Ok(vec![TerminalUser {
            username: self.username.clone(),
            description: "Demo user".to_string(),
        }])
    }

    async fn authenticate(&self, container_id: &str, username: &str, password: &str) -> Result<SessionId> {
        self.auth_calls.fetch_add(1, Ordering::SeqCst);
        pass(&self.gate).await;

        if container_id != self.container_id {
            return Err(Error::Authentication("Container not found".into()));
        }
        if username == self.username && password == self.password {
            Ok(SessionId::new(self.session_id.clone()))
        } else {
            Err(Error::Authentication("Invalid username or password".into()))
        }
    }
}

/// Dashboard backend that applies actions to its own state
pub(crate) struct FakeDashboardApi {
    containers: Mutex<Vec<Container>>,
    environments: Mutex<Vec<Environment>>,
    fetch_gate: Option<Arc<Semaphore>>,
    perform_gate: Option<Arc<Semaphore>>,
    fail_actions: AtomicBool,
    fetches: AtomicUsize,
    performed: Mutex<Vec<(EntityRef, Action)>>,
}

impl FakeDashboardApi {
    pub(crate) fn new(containers: Vec<Container>, environments: Vec<Environment>) -> Self {
        Self {
            containers: Mutex::new(containers),
            environments: Mutex::new(environments),
            fetch_gate: None,
            perform_gate: None,
            fail_actions: AtomicBool::new(false),
            fetches: AtomicUsize::new(0),
            performed: Mutex::new(Vec::new()),
        }
    }

    /// Hold every fetch until a permit is added
    pub(crate) fn with_fetch_gate(mut self, gate: Arc<Semaphore>) -> Self {
        self.fetch_gate = Some(gate);
        self
    }

    /// Hold every action until a permit is added
    pub(crate) fn with_perform_gate(mut self, gate: Arc<Semaphore>) -> Self {
        self.perform_gate = Some(gate);
        self
    }

    pub(crate) fn fail_actions(&self, fail: bool) {
        self.fail_actions.store(fail, Ordering::SeqCst);
    }

    pub(crate) fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    pub(crate) fn performed(&self) -> Vec<(EntityRef, Action)> {
        self.performed.lock().clone()
    }

    fn transition(status: Status, action: Action) -> Status {
        match action {
            Action::Start | Action::Restart => Status::Running,
            Action::Stop => Status::Stopped,
            Action::Toggle if status.is_running() => Status::Stopped,
            Action::Toggle => Status::Running,
        }
    }
}

#[async_trait]
impl DashboardApi for FakeDashboardApi {
    async fn fetch_snapshot(&self) -> Result<Snapshot> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        pass(&self.fetch_gate).await;
        Ok(Snapshot {
            containers: self.containers.lock().clone(),
            environments: self.environments.lock().clone(),
            ..Default::default()
        })
    }

    async fn perform(&self, entity: &EntityRef, action: Action) -> Result<()> {
        self.performed.lock().push((entity.clone(), action));
        pass(&self.perform_gate).await;

        if self.fail_actions.load(Ordering::SeqCst) {
            return Err(Error::Api { status: 500, detail: "action failed".into() });
        }

        let found = match entity.kind {
            EntityKind::Container => self
                .containers
                .lock()
                .iter_mut()
                .find(|c| c.id == entity.id)
                .map(|c| c.status = Self::transition(c.status, action))
                .is_some(),
            EntityKind::Environment => self
                .environments
                .lock()
                .iter_mut()
                .find(|e| e.id == entity.id)
                .map(|e| e.status = Self::transition(e.status, action))
                .is_some(),
            EntityKind::Service => self
                .environments
                .lock()
                .iter_mut()
                .flat_map(|e| e.services.iter_mut())
                .find(|s| s.id == entity.id)
                .map(|s| s.status = Self::transition(s.status, action))
                .is_some(),
        };

        if found {
            Ok(())
        } else {
            Err(Error::Api { status: 404, detail: format!("{} not found", entity) })
        }
    }

    async fn create_environment(&self, request: &CreateEnvironment) -> Result<Environment> {
        let mut environments = self.environments.lock();
        let mut env = environment(&format!("env-{}", environments.len() + 1), Status::Stopped);
        env.name = request.name.clone();
        env.stack = request.stack.clone();
        env.services.clear();
        environments.push(env.clone());
        Ok(env)
    }

    async fn delete_environment(&self, id: &str) -> Result<()> {
        let mut environments = self.environments.lock();
        let before = environments.len();
        environments.retain(|e| e.id != id);
        if environments.len() == before {
            return Err(Error::Api { status: 404, detail: "Environment not found".into() });
        }
        Ok(())
    }
}

/// Single-connection WebSocket server standing in for the backend
pub(crate) struct WsPeer {
    pub(crate) endpoints: Endpoints,
    accepted: oneshot::Receiver<(String, WebSocketStream<TcpStream>)>,
}

impl WsPeer {
    /// Request path and server side of the first accepted socket
    pub(crate) async fn accept(self) -> (String, WebSocketStream<TcpStream>) {
        self.accepted.await.expect("peer never accepted a connection")
    }
}

pub(crate) async fn ws_peer() -> WsPeer {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind peer");
    let addr = listener.local_addr().expect("peer address");
    let (tx, accepted) = oneshot::channel();

    tokio::spawn(async move {
        let Ok((tcp, _)) = listener.accept().await else { return };
        let path = Arc::new(Mutex::new(String::new()));
        let seen = path.clone();
        let callback = move |request: &Request, response: Response| {
            *seen.lock() = request.uri().path().to_string();
            Ok::<_, ErrorResponse>(response)
        };
        let accepted = tokio_tungstenite::accept_hdr_async(tcp, callback).await;
        if let Ok(ws) = accepted {
            let path = path.lock().clone();
            let _ = tx.send((path, ws));
        }
    });

    WsPeer {
        endpoints: Endpoints::new(&format!("http://{}", addr)).expect("peer endpoints"),
        accepted,
    }
}
