//! Messages pushed from the supervisor to UI windows

use serde::{Deserialize, Serialize};

use crate::core::{InstanceParams, StatusSnapshot, SupervisorError};
use crate::platform::PlatformId;

/// One outbound message, serialized as `{"type": ..., "payload": ...}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "camelCase")]
pub enum UiMessage {
    /// Status of every known instance
    Status(StatusSnapshot),
    /// Persisted launch parameters for the current platform
    CoreParams(InstanceParams),
    Platform(PlatformId),
    /// A line of core output, for the UI's snackbar
    Snackbar(String),
    /// A command could not be carried out
    CommandFailed(CommandFailure),
    /// The supervisor is about to stop every core and exit
    Shutdown,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandFailure {
    pub command: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instance: Option<String>,
    pub kind: String,
    pub error: String,
}

impl CommandFailure {
    pub fn new(
        command: impl Into<String>,
        instance: Option<String>,
        kind: impl Into<String>,
        error: impl Into<String>,
    ) -> Self {
        Self {
            command: command.into(),
            instance,
            kind: kind.into(),
            error: error.into(),
        }
    }

    pub fn from_error(command: &str, instance: Option<String>, error: &SupervisorError) -> Self {
        Self::new(command, instance, error.kind(), error.to_string())
    }
}
