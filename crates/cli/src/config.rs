//! Console configuration

use devstack_common::{Endpoints, Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Console configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    /// Backend origin; HTTP and WebSocket endpoints are derived from it
    pub backend_url: String,

    /// HTTP configuration
    pub http: HttpConfig,

    /// Dashboard sync configuration
    pub sync: SyncConfig,

    /// Terminal configuration
    pub terminal: TerminalConfig,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            backend_url: "http://127.0.0.1:8001".to_string(),
            http: HttpConfig::default(),
            sync: SyncConfig::default(),
            terminal: TerminalConfig::default(),
        }
    }
}

/// HTTP client configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Upper bound for every request and WebSocket handshake
    pub timeout_secs: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self { timeout_secs: 15 }
    }
}

/// Dashboard sync configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Connect to the push channel at all
    pub enabled: bool,

    /// Fixed delay between reconnect attempts
    pub reconnect_delay_ms: u64,

    /// Polling fallback interval
    pub poll_interval_secs: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            reconnect_delay_ms: 3000,
            poll_interval_secs: 10,
        }
    }
}

/// Terminal configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TerminalConfig {
    /// Send `resize` frames to the remote pty
    pub propagate_resize: bool,
}

impl Default for TerminalConfig {
    fn default() -> Self {
        Self { propagate_resize: false }
    }
}

impl CliConfig {
    /// Load configuration from file, falling back to defaults when absent
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: Self = toml::from_str(&content)?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        let content = toml::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Resolve backend endpoints
    pub fn endpoints(&self) -> Result<Endpoints> {
        Endpoints::new(&self.backend_url)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.http.timeout_secs)
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.sync.reconnect_delay_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.sync.poll_interval_secs)
    }

    /// Reject values that would make the console spin or hang
    pub fn validate(&self) -> Result<()> {
        if self.http.timeout_secs == 0 {
            return Err(Error::InvalidConfig("http.timeout_secs must be at least 1".into()));
        }
        if self.sync.reconnect_delay_ms == 0 {
            return Err(Error::InvalidConfig("sync.reconnect_delay_ms must be positive".into()));
        }
        if self.sync.poll_interval_secs == 0 {
            return Err(Error::InvalidConfig("sync.poll_interval_secs must be at least 1".into()));
        }
        self.endpoints().map(|_| ())
    }
}
