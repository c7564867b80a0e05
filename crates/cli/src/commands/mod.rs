//! CLI Commands

pub mod container;
pub mod environment;
pub mod service;
pub mod status;
pub mod terminal;
pub mod watch;

use anyhow::{anyhow, bail, Result};
use devstack_common::{Action, EntityRef};
use std::sync::Arc;

use crate::client::{ApiClient, DashboardApi};
use crate::dashboard::Dashboard;
use crate::dispatcher::BulkReport;
use crate::output::{print_error, print_success, print_warning, spinner, status_label};

/// Run one lifecycle action through the dispatcher and report the status
/// the backend settled on
pub(crate) async fn run_action(client: ApiClient, entity: EntityRef, action: Action, force: bool) -> Result<()> {
    let api: Arc<dyn DashboardApi> = Arc::new(client);
    let dashboard = Dashboard::new(api.clone());
    let store = dashboard.store();
    store.refresh_from(api.as_ref()).await?;

    let status = store
        .status_of(&entity)
        .ok_or_else(|| anyhow!("{} not found", entity))?;
    if !force && !action.valid_for(status) {
        bail!("cannot {} {} while it is {} (use --force to send anyway)", action, entity, status);
    }

    let progress = spinner(format!("{} {}...", action, entity));
    let result = dashboard.dispatcher().perform(&entity, action).await;
    progress.finish_and_clear();
    result?;

    let status = store.status_of(&entity).unwrap_or_default();
    print_success(&format!("{} {}: now {}", action, entity, status_label(status)));
    Ok(())
}

/// Run a bulk start/stop over every container
pub(crate) async fn run_bulk(client: ApiClient, action: Action) -> Result<BulkReport> {
    let api: Arc<dyn DashboardApi> = Arc::new(client);
    let dashboard = Dashboard::new(api.clone());
    dashboard.store().refresh_from(api.as_ref()).await?;

    let progress = spinner(format!("{} all containers...", action));
    let report = match action {
        Action::Stop => dashboard.dispatcher().stop_all().await,
        _ => dashboard.dispatcher().start_all().await,
    };
    progress.finish_and_clear();

    for id in &report.succeeded {
        print_success(&format!("{} container {}", action, id));
    }
    if !report.skipped.is_empty() {
        print_warning(&format!("skipped: {}", report.skipped.join(", ")));
    }
    for (id, error) in &report.failed {
        print_error(&format!("{} container {} failed: {}", action, id, error));
    }
    Ok(report)
}
