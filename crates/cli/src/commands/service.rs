//! Service Commands

use anyhow::Result;
use clap::Subcommand;
use devstack_common::{Action, EntityRef, LogEntry, LogLevel, Service, ServiceType, Status};
use serde::Serialize;

use super::run_action;
use crate::client::ApiClient;
use crate::output::{percent, print_list, service_badge, status_label, OutputFormat, TableDisplay};

#[derive(Subcommand)]
pub enum ServiceCommands {
    /// Toggle a service between running and stopped
    Toggle {
        /// Service ID
        id: String,
    },

    /// Show a snapshot of a service's logs
    Logs {
        /// Service ID
        id: String,
    },
}

/// Service display wrapper for serialization
#[derive(Serialize)]
pub struct ServiceDisplay {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: ServiceType,
    pub status: Status,
    pub port: Option<u16>,
    pub cpu_usage: f64,
    pub memory_usage: f64,
    pub uptime: String,
}

impl From<&Service> for ServiceDisplay {
    fn from(s: &Service) -> Self {
        Self {
            id: s.id.clone(),
            name: s.name.clone(),
            kind: s.kind,
            status: s.status,
            port: s.port,
            cpu_usage: s.cpu_usage,
            memory_usage: s.memory_usage,
            uptime: s.uptime.clone(),
        }
    }
}

impl TableDisplay for ServiceDisplay {
    fn headers() -> Vec<&'static str> {
        vec!["ID", "Name", "Type", "Status", "Port", "CPU", "Memory", "Uptime"]
    }

    fn row(&self) -> Vec<String> {
        vec![
            self.id.clone(),
            self.name.clone(),
            service_badge(self.kind),
            status_label(self.status).to_string(),
            self.port.map(|p| p.to_string()).unwrap_or_else(|| "-".to_string()),
            percent(self.cpu_usage),
            percent(self.memory_usage),
            self.uptime.clone(),
        ]
    }
}

#[derive(Serialize)]
pub struct LogDisplay {
    pub level: LogLevel,
    pub timestamp: String,
    pub message: String,
}

impl From<LogEntry> for LogDisplay {
    fn from(entry: LogEntry) -> Self {
        Self {
            level: entry.level,
            timestamp: entry.timestamp.unwrap_or_default(),
            message: entry.message,
        }
    }
}

impl TableDisplay for LogDisplay {
    fn headers() -> Vec<&'static str> {
        vec!["Level", "Time", "Message"]
    }

    fn row(&self) -> Vec<String> {
        vec![self.level.to_string(), self.timestamp.clone(), self.message.clone()]
    }
}

pub async fn execute(cmd: ServiceCommands, client: ApiClient, format: OutputFormat) -> Result<()> {
    match cmd {
        ServiceCommands::Toggle { id } => {
            run_action(client, EntityRef::service(id), Action::Toggle, false).await?;
        }

        ServiceCommands::Logs { id } => {
            let logs = client.service_logs(&id).await?;
            let displays: Vec<LogDisplay> = logs.into_iter().map(LogDisplay::from).collect();
            print_list(&displays, format);
        }
    }

    Ok(())
}
