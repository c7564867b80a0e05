//! Environment Commands

use anyhow::Result;
use clap::Subcommand;
use devstack_common::{format_ports, Action, EntityRef, Environment, Status};
use serde::Serialize;
use std::sync::Arc;

use super::run_action;
use super::service::ServiceDisplay;
use crate::client::{ApiClient, DashboardApi};
use crate::dashboard::Dashboard;
use crate::output::{print_item, print_list, print_success, status_label, OutputFormat, TableDisplay};

#[derive(Subcommand)]
pub enum EnvironmentCommands {
    /// List all environments
    List,

    /// Show an environment and its services
    Get {
        /// Environment ID
        id: String,
    },

    /// Create a new environment
    Create {
        /// Environment name
        #[arg(short, long)]
        name: String,

        /// Stack template (node, python, go, ...)
        #[arg(short, long, default_value = "node")]
        stack: String,
    },

    /// Start an environment
    Start {
        /// Environment ID
        id: String,

        /// Send the request even if the environment is already running
        #[arg(short, long)]
        force: bool,
    },

    /// Stop an environment
    Stop {
        /// Environment ID
        id: String,

        /// Send the request even if the environment is not running
        #[arg(short, long)]
        force: bool,
    },

    /// Delete an environment and its services
    Delete {
        /// Environment ID
        id: String,
    },
}

/// Environment display wrapper for serialization
#[derive(Serialize)]
pub struct EnvironmentDisplay {
    pub id: String,
    pub name: String,
    pub status: Status,
    pub stack: String,
    pub ports: String,
    pub services: usize,
    pub created_at: String,
}

impl From<&Environment> for EnvironmentDisplay {
    fn from(env: &Environment) -> Self {
        Self {
            id: env.id.clone(),
            name: env.name.clone(),
            status: env.status,
            stack: env.stack.clone(),
            ports: format_ports(&env.ports),
            services: env.services.len(),
            created_at: env.created_at.clone().unwrap_or_default(),
        }
    }
}

impl TableDisplay for EnvironmentDisplay {
    fn headers() -> Vec<&'static str> {
        vec!["ID", "Name", "Status", "Stack", "Ports", "Services", "Created"]
    }

    fn row(&self) -> Vec<String> {
        vec![
            self.id.clone(),
            self.name.clone(),
            status_label(self.status).to_string(),
            self.stack.clone(),
            self.ports.clone(),
            self.services.to_string(),
            self.created_at.clone(),
        ]
    }
}

pub async fn execute(cmd: EnvironmentCommands, client: ApiClient, format: OutputFormat) -> Result<()> {
    match cmd {
        EnvironmentCommands::List => {
            let environments = client.environments().await?;
            let displays: Vec<EnvironmentDisplay> = environments.iter().map(EnvironmentDisplay::from).collect();
            print_list(&displays, format);
        }

        EnvironmentCommands::Get { id } => {
            let environments = client.environments().await?;
            let env = environments
                .iter()
                .find(|e| e.id == id)
                .ok_or_else(|| anyhow::anyhow!("environment {} not found", id))?;
            print_item(&EnvironmentDisplay::from(env), format);
            let services: Vec<ServiceDisplay> = env.services.iter().map(ServiceDisplay::from).collect();
            print_list(&services, format);
        }

        EnvironmentCommands::Create { name, stack } => {
            let api: Arc<dyn DashboardApi> = Arc::new(client);
            let dashboard = Dashboard::new(api);
            let env = dashboard.dispatcher().create_environment(&name, &stack).await?;
            print_success(&format!("Environment '{}' created", env.name));
            print_item(&EnvironmentDisplay::from(&env), format);
        }

        EnvironmentCommands::Start { id, force } => {
            run_action(client, EntityRef::environment(id), Action::Start, force).await?;
        }

        EnvironmentCommands::Stop { id, force } => {
            run_action(client, EntityRef::environment(id), Action::Stop, force).await?;
        }

        EnvironmentCommands::Delete { id } => {
            let api: Arc<dyn DashboardApi> = Arc::new(client);
            let dashboard = Dashboard::new(api);
            dashboard.dispatcher().delete_environment(&id).await?;
            print_success(&format!("Environment '{}' deleted", id));
        }
    }

    Ok(())
}
