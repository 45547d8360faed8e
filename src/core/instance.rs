//! Instance status - What the UI is told about each named core

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Name of the instance whose config lives in the core's default location
pub const DEFAULT_INSTANCE: &str = "instance1";

/// Status of an instance, derived on demand and never persisted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstanceStatus {
    /// No live process
    Stopped,
    /// Process spawned, `/api/info` not answering yet
    Starting,
    /// Readiness probe succeeded for the current process
    Running,
}

impl InstanceStatus {
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Starting | Self::Running)
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Stopped => "stopped",
            Self::Starting => "starting",
            Self::Running => "running",
        }
    }
}

impl fmt::Display for InstanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Status of every known instance, rebuilt for each broadcast
pub type StatusSnapshot = BTreeMap<String, InstanceStatus>;

/// Lifecycle transitions recorded in the instance history
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstanceEvent {
    Started,
    Ready,
    Stopped,
    Exited,
    Crashed,
    Deleted,
    SpawnFailed,
}

impl InstanceEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Started => "started",
            Self::Ready => "ready",
            Self::Stopped => "stopped",
            Self::Exited => "exited",
            Self::Crashed => "crashed",
            Self::Deleted => "deleted",
            Self::SpawnFailed => "spawn_failed",
        }
    }
}

/// Whether `name` can be used as a single config directory component
pub fn is_valid_instance_name(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains(['/', '\\'])
        && !std::path::Path::new(name).is_absolute()
}

/// Name given to an instance started without one
pub fn next_instance_name(known: usize) -> String {
    format!("instance{}", known + 1)
}
