//! Live dashboard
//!
//! Redraws whenever a new snapshot lands or the sync connectivity changes.

use anyhow::Result;
use clap::Parser;
use colored::Colorize;
use crossterm::cursor::MoveTo;
use crossterm::execute;
use crossterm::terminal::{Clear, ClearType};
use std::future::pending;
use std::io;
use std::sync::Arc;
use tokio::sync::watch;

use super::container::ContainerDisplay;
use super::environment::EnvironmentDisplay;
use crate::client::ApiClient;
use crate::config::CliConfig;
use crate::dashboard::Dashboard;
use crate::output::{percent, print_list, print_warning, OutputFormat};
use crate::store::Snapshot;
use crate::sync::Connectivity;

#[derive(Parser)]
pub struct WatchArgs {
    /// Rely on polling only; do not open the sync socket
    #[arg(long)]
    pub no_sync: bool,
}

fn connectivity_label(connectivity: Option<Connectivity>) -> String {
    match connectivity {
        Some(Connectivity::Connected) => "● live".green().to_string(),
        Some(Connectivity::Connecting) => "○ connecting".yellow().to_string(),
        Some(Connectivity::Disconnected) => "○ disconnected".red().to_string(),
        None => "polling".dimmed().to_string(),
    }
}

fn render(backend: &str, snapshot: &Snapshot, connectivity: Option<Connectivity>, last_error: Option<String>) -> io::Result<()> {
    execute!(io::stdout(), Clear(ClearType::All), MoveTo(0, 0))?;

    let updated = snapshot
        .fetched_at
        .map(|t| t.format("%H:%M:%S").to_string())
        .unwrap_or_else(|| "never".to_string());
    println!(
        "{}  {}  {}  updated {}",
        "DevStack".bold(),
        backend,
        connectivity_label(connectivity),
        updated
    );

    if let Some(metrics) = &snapshot.metrics {
        println!(
            "CPU {} ({} cores)  Memory {}  Disk {}",
            percent(metrics.cpu_usage),
            metrics.cpu_count,
            percent(metrics.memory_usage),
            percent(metrics.disk_usage)
        );
    }
    println!(
        "{}/{} containers running",
        snapshot.running_containers(),
        snapshot.containers.len()
    );
    println!();

    let containers: Vec<ContainerDisplay> = snapshot.containers.iter().map(ContainerDisplay::from).collect();
    print_list(&containers, OutputFormat::Table);
    let environments: Vec<EnvironmentDisplay> = snapshot.environments.iter().map(EnvironmentDisplay::from).collect();
    print_list(&environments, OutputFormat::Table);

    if let Some(error) = last_error {
        print_warning(&format!("last refresh failed: {}", error));
    }
    println!("\nCtrl+C to quit");
    Ok(())
}

async fn connectivity_changed(rx: &mut Option<watch::Receiver<Connectivity>>) {
    if let Some(rx) = rx {
        if rx.changed().await.is_ok() {
            return;
        }
    }
    pending::<()>().await
}

pub async fn execute(args: WatchArgs, client: ApiClient, config: &CliConfig) -> Result<()> {
    let mut config = config.clone();
    if args.no_sync {
        config.sync.enabled = false;
    }

    let endpoints = client.endpoints().clone();
    let backend = endpoints.base().to_string();
    let dashboard = Dashboard::start(Arc::new(client), &endpoints, &config);
    let mut snapshots = dashboard.store().subscribe();
    let mut connectivity = dashboard.connectivity();

    loop {
        let snapshot = snapshots.borrow_and_update().clone();
        let current = connectivity.as_ref().map(|rx| *rx.borrow());
        render(&backend, &snapshot, current, dashboard.store().last_error())?;

        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            changed = snapshots.changed() => {
                if changed.is_err() {
                    break;
                }
            }
            _ = connectivity_changed(&mut connectivity) => {}
        }
    }

    dashboard.shutdown().await;
    Ok(())
}
