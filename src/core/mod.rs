//! Core module - Instance registry, lifecycle, readiness polling and status broadcasting

mod broadcast;
mod error;
pub mod instance;
mod params;
mod poller;
mod process;
mod registry;
pub mod settings;
mod supervisor;

#[cfg(test)]
pub mod testing;

pub use error::SupervisorError;
pub use instance::{InstanceEvent, StatusSnapshot};
pub use params::{CoreParams, InstanceParams};
pub use settings::Settings;
pub use supervisor::{Flow, InstanceSupervisor};
