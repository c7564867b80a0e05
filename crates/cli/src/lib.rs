//! DevStack CLI
//!
//! Console for DevStack development environments: lists and controls
//! containers, environments and services, keeps a live dashboard in sync
//! with the backend, and attaches the local terminal to container shells.

pub mod client;
pub mod commands;
pub mod config;
pub mod dashboard;
pub mod dispatcher;
pub mod gate;
pub mod output;
pub mod poller;
pub mod refresh;
pub mod session;
pub mod store;
pub mod sync;
pub mod terminal;

#[cfg(test)]
pub(crate) mod testing;

pub use client::{ApiClient, DashboardApi, TerminalApi};
pub use config::CliConfig;
pub use dashboard::Dashboard;
pub use dispatcher::{BulkReport, Dispatcher, Notice, NoticeLevel};
pub use gate::{CredentialGate, Credentials, GateState};
pub use refresh::{RefreshRequest, Refresher};
pub use session::{Session, SessionId, SessionNegotiator};
pub use store::{ApplyOutcome, DashboardStore, FetchTicket, Snapshot};
pub use sync::{Connectivity, SyncChannel, SyncHandle, SyncListener, SyncOptions};
