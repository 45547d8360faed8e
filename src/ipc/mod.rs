//! IPC module - Command and status channels between UI windows and the supervisor

pub mod commands;
pub mod messages;
pub mod stdio;
pub mod window;

pub use commands::Command;
pub use messages::{CommandFailure, UiMessage};
pub use stdio::Inbound;
pub use window::UiWindow;
