//! Errors surfaced to the command channel

use std::path::PathBuf;

use thiserror::Error;

/// Why a lifecycle command could not be carried out
#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error("Core executable not found: {}", .0.display())]
    ExecutableNotFound(PathBuf),

    #[error("Failed to spawn instance '{name}': {source}")]
    Spawn {
        name: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid instance name '{0}'")]
    InvalidName(String),

    #[error("Instance '{0}' is already running")]
    AlreadyRunning(String),

    #[error("Failed to persist launch parameters: {0:#}")]
    Persistence(#[from] anyhow::Error),
}

impl SupervisorError {
    /// Short machine-readable tag sent alongside the message
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ExecutableNotFound(_) => "executable_not_found",
            Self::Spawn { .. } => "spawn_error",
            Self::InvalidName(_) => "invalid_name",
            Self::AlreadyRunning(_) => "already_running",
            Self::Persistence(_) => "persistence",
        }
    }
}
