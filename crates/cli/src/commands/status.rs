//! Host status command

use anyhow::Result;
use serde::Serialize;

use crate::client::ApiClient;
use crate::output::{percent, print_item, OutputFormat, TableDisplay};

/// Combined health, status and metrics of the nanobox host
#[derive(Serialize)]
pub struct HostDisplay {
    pub backend: String,
    pub health: String,
    pub version: String,
    pub uptime: String,
    pub cpu_usage: f64,
    pub cpu_count: u32,
    pub memory_usage: f64,
    pub memory_available_gb: f64,
    pub disk_usage: f64,
    pub disk_free_gb: f64,
}

impl TableDisplay for HostDisplay {
    fn headers() -> Vec<&'static str> {
        vec!["Backend", "Health", "Version", "Uptime", "CPU", "Cores", "Memory", "Mem Free", "Disk", "Disk Free"]
    }

    fn row(&self) -> Vec<String> {
        vec![
            self.backend.clone(),
            self.health.clone(),
            self.version.clone(),
            self.uptime.clone(),
            percent(self.cpu_usage),
            self.cpu_count.to_string(),
            percent(self.memory_usage),
            format!("{:.1} GB", self.memory_available_gb),
            percent(self.disk_usage),
            format!("{:.1} GB", self.disk_free_gb),
        ]
    }
}

pub async fn execute(client: ApiClient, format: OutputFormat) -> Result<()> {
    let (health, status, metrics) =
        tokio::try_join!(client.health(), client.system_status(), client.system_metrics())?;

    let display = HostDisplay {
        backend: client.endpoints().base().to_string(),
        health: health.status,
        version: health.version,
        uptime: status.uptime,
        cpu_usage: metrics.cpu_usage,
        cpu_count: metrics.cpu_count,
        memory_usage: metrics.memory_usage,
        memory_available_gb: metrics.memory_available,
        disk_usage: metrics.disk_usage,
        disk_free_gb: metrics.disk_free,
    };
    print_item(&display, format);
    Ok(())
}
