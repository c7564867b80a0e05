//! Container Commands

use anyhow::{bail, Result};
use clap::Subcommand;
use devstack_common::{format_ports, Action, Container, EntityRef, Status};
use serde::Serialize;

use super::{run_action, run_bulk};
use crate::client::ApiClient;
use crate::output::{percent, print_list, status_label, OutputFormat, TableDisplay};

#[derive(Subcommand)]
pub enum ContainerCommands {
    /// List all containers
    List,

    /// Start a container
    Start {
        /// Container ID
        id: String,

        /// Send the request even if the container is already running
        #[arg(short, long)]
        force: bool,
    },

    /// Stop a container
    Stop {
        /// Container ID
        id: String,

        /// Send the request even if the container is not running
        #[arg(short, long)]
        force: bool,
    },

    /// Restart a container
    Restart {
        /// Container ID
        id: String,

        /// Send the request even if the container is not running
        #[arg(short, long)]
        force: bool,
    },

    /// Start every container that is not running
    StartAll,

    /// Stop every running container
    StopAll,
}

/// Container display wrapper for serialization
#[derive(Serialize)]
pub struct ContainerDisplay {
    pub id: String,
    pub name: String,
    pub status: Status,
    pub image: String,
    pub ports: String,
    pub cpu_usage: f64,
    pub memory_usage: f64,
}

impl From<&Container> for ContainerDisplay {
    fn from(c: &Container) -> Self {
        Self {
            id: c.id.clone(),
            name: c.name.clone(),
            status: c.status,
            image: c.image.clone(),
            ports: format_ports(&c.ports),
            cpu_usage: c.cpu_usage,
            memory_usage: c.memory_usage,
        }
    }
}

impl TableDisplay for ContainerDisplay {
    fn headers() -> Vec<&'static str> {
        vec!["ID", "Name", "Status", "Image", "Ports", "CPU", "Memory"]
    }

    fn row(&self) -> Vec<String> {
        vec![
            self.id.clone(),
            self.name.clone(),
            status_label(self.status).to_string(),
            self.image.clone(),
            self.ports.clone(),
            percent(self.cpu_usage),
            percent(self.memory_usage),
        ]
    }
}

pub async fn execute(cmd: ContainerCommands, client: ApiClient, format: OutputFormat) -> Result<()> {
    match cmd {
        ContainerCommands::List => {
            let containers = client.containers().await?;
            let displays: Vec<ContainerDisplay> = containers.iter().map(ContainerDisplay::from).collect();
            print_list(&displays, format);
        }

        ContainerCommands::Start { id, force } => {
            run_action(client, EntityRef::container(id), Action::Start, force).await?;
        }

        ContainerCommands::Stop { id, force } => {
            run_action(client, EntityRef::container(id), Action::Stop, force).await?;
        }

        ContainerCommands::Restart { id, force } => {
            run_action(client, EntityRef::container(id), Action::Restart, force).await?;
        }

        ContainerCommands::StartAll => {
            let report = run_bulk(client, Action::Start).await?;
            if !report.is_clean() {
                bail!("{} container(s) failed to start", report.failed.len());
            }
        }

        ContainerCommands::StopAll => {
            let report = run_bulk(client, Action::Stop).await?;
            if !report.is_clean() {
                bail!("{} container(s) failed to stop", report.failed.len());
            }
        }
    }

    Ok(())
}
