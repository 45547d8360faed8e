//! Status broadcasting - Push snapshots and messages to every live UI window

use std::sync::Arc;

use tracing::{debug, error};

use super::instance::StatusSnapshot;
use super::registry::ProcessRegistry;
use crate::ipc::{UiMessage, UiWindow};

/// Build the status of every known instance.
///
/// `known` is the configured instance names; registered processes missing
/// from it are included too, so nothing live is ever hidden from the UI.
pub fn snapshot<I>(registry: &ProcessRegistry, known: I) -> StatusSnapshot
where
    I: IntoIterator<Item = String>,
{
    let mut snapshot: StatusSnapshot = known
        .into_iter()
        .map(|name| {
            let status = registry.status_of(&name);
            (name, status)
        })
        .collect();
    for (name, handle) in registry.handles() {
        snapshot
            .entry(name.clone())
            .or_insert_with(|| handle.status());
    }
    snapshot
}

/// Fan-out of supervisor messages to the attached windows
#[derive(Default)]
pub struct StatusBroadcaster {
    windows: Vec<Arc<dyn UiWindow>>,
}

impl StatusBroadcaster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attach(&mut self, window: Arc<dyn UiWindow>) {
        debug!("Attached window '{}'", window.label());
        self.windows.push(window);
    }

    pub fn window_count(&self) -> usize {
        self.windows.len()
    }

    /// Deliver `message` to every live window. Destroyed windows are logged
    /// and dropped; nothing is propagated to the caller.
    pub fn send(&mut self, message: UiMessage) {
        self.windows.retain(|window| {
            if window.is_destroyed() {
                error!("Window '{}' is destroyed, dropping it", window.label());
                return false;
            }
            if let Err(e) = window.send(message.clone()) {
                error!("Failed to deliver to window '{}': {}", window.label(), e);
            }
            true
        });
    }

    /// Compute a fresh snapshot and push it as a `status` message
    pub fn broadcast_status<I>(&mut self, registry: &ProcessRegistry, known: I) -> StatusSnapshot
    where
        I: IntoIterator<Item = String>,
    {
        let snapshot = snapshot(registry, known);
        debug!(?snapshot, "Broadcasting status");
        self.send(UiMessage::Status(snapshot.clone()));
        snapshot
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::instance::InstanceStatus;
    use crate::core::registry::ProcessHandle;
    use crate::ipc::window::ChannelWindow;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn snapshot_covers_configured_and_registered_instances() {
        let mut registry = ProcessRegistry::new();
        registry.register("instance2", ProcessHandle::new(None, 1, 8889, None));
        registry.register("orphan", ProcessHandle::new(None, 1, 8890, None));
        registry.get_mut("orphan").unwrap().ready = true;

        let s = snapshot(&registry, names(&["instance1", "instance2"]));
        assert_eq!(s.len(), 3);
        assert_eq!(s["instance1"], InstanceStatus::Stopped);
        assert_eq!(s["instance2"], InstanceStatus::Starting);
        assert_eq!(s["orphan"], InstanceStatus::Running);
    }

    #[test]
    fn broadcast_reaches_every_live_window() {
        let (a, mut rx_a) = ChannelWindow::new("a");
        let (b, mut rx_b) = ChannelWindow::new("b");
        let mut broadcaster = StatusBroadcaster::new();
        broadcaster.attach(Arc::new(a));
        broadcaster.attach(Arc::new(b));

        let registry = ProcessRegistry::new();
        broadcaster.broadcast_status(&registry, names(&["instance1"]));

        for rx in [&mut rx_a, &mut rx_b] {
            match rx.try_recv().unwrap() {
                UiMessage::Status(s) => assert_eq!(s["instance1"], InstanceStatus::Stopped),
                other => panic!("unexpected {:?}", other),
            }
        }
    }

    #[test]
    fn destroyed_windows_are_skipped() {
        let (live, mut rx) = ChannelWindow::new("live");
        let (dead, dead_rx) = ChannelWindow::new("dead");
        drop(dead_rx);

        let mut broadcaster = StatusBroadcaster::new();
        broadcaster.attach(Arc::new(dead));
        broadcaster.attach(Arc::new(live));

        broadcaster.send(UiMessage::Shutdown);
        assert_eq!(broadcaster.window_count(), 1);
        assert_eq!(rx.try_recv().unwrap(), UiMessage::Shutdown);
    }
}
