//! Interactive terminal access to containers

pub mod bridge;
pub mod input;
pub mod interactive;
pub mod surface;

pub use bridge::{BridgeOptions, BridgeState, CloseReason, TerminalBridge};
pub use surface::{BufferSurface, RawTerminal, TerminalSurface};
