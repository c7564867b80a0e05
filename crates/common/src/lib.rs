//! DevStack Common Library
//!
//! Shared data model, wire frames and endpoint derivation for the DevStack
//! console and its development backend.

pub mod endpoints;
pub mod error;
pub mod types;
pub mod wire;

// Re-export commonly used types
pub use endpoints::Endpoints;
pub use error::{Error, Result};
pub use types::*;
pub use wire::{SyncNotification, TerminalFrame};

/// DevStack version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default state directory
pub fn default_store_path() -> std::path::PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| std::path::PathBuf::from("."))
        .join(".devstack")
}

/// Default configuration file path
pub fn default_config_path() -> std::path::PathBuf {
    default_store_path().join("config.toml")
}

/// Home directory helper
mod dirs {
    pub fn home_dir() -> Option<std::path::PathBuf> {
        std::env::var_os("HOME").map(std::path::PathBuf::from)
    }
}
