//! DevStack development backend
//!
//! An in-memory stand-in for the nanobox/DevStack API: a seeded container
//! fleet, environments with services, demo terminal identities, a toy shell
//! behind the terminal socket and `metrics_update` broadcasts on `/api/ws`.

pub mod server;
pub mod shell;
pub mod state;

pub use server::{serve, RunningServer, WebServer, WebServerConfig};
pub use state::AppState;
