//! UI window abstraction - Where broadcasts are delivered

use anyhow::Result;
use tokio::sync::mpsc;

use super::messages::UiMessage;

/// A destination for supervisor messages. Windows may go away at any time;
/// senders check `is_destroyed` before every delivery.
pub trait UiWindow: Send + Sync {
    /// Label used in logs
    fn label(&self) -> &str;

    fn is_destroyed(&self) -> bool;

    fn send(&self, message: UiMessage) -> Result<()>;
}

/// Window backed by an in-process channel; destroyed once the receiver is dropped
#[derive(Debug, Clone)]
pub struct ChannelWindow {
    label: String,
    tx: mpsc::UnboundedSender<UiMessage>,
}

impl ChannelWindow {
    pub fn new(label: impl Into<String>) -> (Self, mpsc::UnboundedReceiver<UiMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                label: label.into(),
                tx,
            },
            rx,
        )
    }
}

impl UiWindow for ChannelWindow {
    fn label(&self) -> &str {
        &self.label
    }

    fn is_destroyed(&self) -> bool {
        self.tx.is_closed()
    }

    fn send(&self, message: UiMessage) -> Result<()> {
        self.tx
            .send(message)
            .map_err(|_| anyhow::anyhow!("Window '{}' is closed", self.label))
    }
}
