//! Lifecycle actions against the development backend

use devstack_cli::{ApiClient, DashboardApi, DashboardStore, Dispatcher, NoticeLevel};
use devstack_common::{Action, EntityRef, Error, Status};
use devstack_web::{RunningServer, WebServer, WebServerConfig};
use std::sync::Arc;
use std::time::Duration;

struct Fixture {
    _server: RunningServer,
    store: Arc<DashboardStore>,
    dispatcher: Dispatcher,
}

async fn fixture() -> Fixture {
    let server = WebServer::new(WebServerConfig { metrics_interval: None })
        .spawn("127.0.0.1:0".parse().unwrap())
        .await
        .unwrap();
    let endpoints = devstack_common::Endpoints::new(&server.base_url()).unwrap();
    let api: Arc<dyn DashboardApi> = Arc::new(ApiClient::new(endpoints, Duration::from_secs(5)).unwrap());

    let store = Arc::new(DashboardStore::new());
    store.refresh_from(api.as_ref()).await.unwrap();
    let dispatcher = Dispatcher::new(api, store.clone());
    Fixture { _server: server, store, dispatcher }
}

#[tokio::test]
async fn test_stop_environment_is_reflected_after_refetch() {
    let f = fixture().await;
    let env = EntityRef::environment("env-1");
    assert_eq!(f.store.status_of(&env), Some(Status::Running));
    let before = f.store.applied_sequence();

    f.dispatcher.perform(&env, Action::Stop).await.unwrap();

    assert_eq!(f.store.status_of(&env), Some(Status::Stopped));
    assert!(f.store.applied_sequence() > before);
    let snapshot = f.store.current();
    let services = &snapshot.environment("env-1").unwrap().services;
    assert!(services.iter().all(|s| s.status == Status::Stopped));
}

#[tokio::test]
async fn test_duplicate_action_is_rejected_while_in_flight() {
    let f = fixture().await;
    let web = EntityRef::container("nanobox-web-001");

    let (first, second) = tokio::join!(
        f.dispatcher.perform(&web, Action::Restart),
        f.dispatcher.perform(&web, Action::Restart),
    );
    first.unwrap();
    assert!(matches!(second, Err(Error::ActionInFlight(_))));
    assert!(!f.dispatcher.is_in_flight(&web));

    f.dispatcher.perform(&web, Action::Restart).await.unwrap();
}

#[tokio::test]
async fn test_failed_action_still_refetches_and_notifies() {
    let f = fixture().await;
    let mut notices = f.dispatcher.subscribe();
    let before = f.store.applied_sequence();

    let err = f
        .dispatcher
        .perform(&EntityRef::container("nanobox-gone-001"), Action::Start)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Api { status: 404, .. }));
    assert!(f.store.applied_sequence() > before);

    let notice = notices.recv().await.unwrap();
    assert_eq!(notice.level, NoticeLevel::Error);
}

#[tokio::test]
async fn test_toggle_service_updates_environment_aggregate() {
    let f = fixture().await;
    f.dispatcher
        .perform(&EntityRef::service("env-1-svc-3"), Action::Toggle)
        .await
        .unwrap();

    assert_eq!(f.store.status_of(&EntityRef::service("env-1-svc-3")), Some(Status::Stopped));
    assert_eq!(f.store.status_of(&EntityRef::environment("env-1")), Some(Status::Partial));
}

#[tokio::test]
async fn test_stop_all_then_start_all() {
    let f = fixture().await;

    let report = f.dispatcher.stop_all().await;
    assert!(report.is_clean());
    assert_eq!(report.succeeded, ["nanobox-web-001", "nanobox-db-001"]);
    assert_eq!(report.skipped, ["nanobox-cache-001"]);
    assert_eq!(f.store.current().running_containers(), 0);

    let report = f.dispatcher.start_all().await;
    assert_eq!(report.succeeded.len(), 3);
    assert!(report.skipped.is_empty());
}

#[tokio::test]
async fn test_create_then_delete_environment() {
    let f = fixture().await;

    let env = f.dispatcher.create_environment("blog", "node-postgres").await.unwrap();
    assert_eq!(f.store.status_of(&EntityRef::environment(&env.id)), Some(Status::Stopped));

    f.dispatcher.delete_environment(&env.id).await.unwrap();
    assert!(f.store.current().environment(&env.id).is_none());
}
