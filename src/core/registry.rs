//! Process registry - Which instances have a live core process right now

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::instance::InstanceStatus;
use crate::platform::StopSignal;

/// An owned core process as seen by the supervisor
#[derive(Debug)]
pub struct ProcessHandle {
    /// Operating system process ID
    pub pid: Option<u32>,
    /// Cleared on stop, exit or spawn error
    pub running: bool,
    /// Set once `/api/info` answered for this process
    pub ready: bool,
    /// Generation the process was spawned under
    pub generation: u64,
    /// Port the readiness poller is probing
    pub port: u16,
    pub started_at: DateTime<Utc>,
    poll: CancellationToken,
    control: Option<mpsc::UnboundedSender<StopSignal>>,
}

impl ProcessHandle {
    pub fn new(
        pid: Option<u32>,
        generation: u64,
        port: u16,
        control: Option<mpsc::UnboundedSender<StopSignal>>,
    ) -> Self {
        Self {
            pid,
            running: false,
            ready: false,
            generation,
            port,
            started_at: Utc::now(),
            poll: CancellationToken::new(),
            control,
        }
    }

    pub fn status(&self) -> InstanceStatus {
        match (self.running, self.ready) {
            (true, true) => InstanceStatus::Running,
            (true, false) => InstanceStatus::Starting,
            (false, _) => InstanceStatus::Stopped,
        }
    }

    /// Token the readiness poller for this process watches
    pub fn poll_token(&self) -> CancellationToken {
        self.poll.clone()
    }

    pub fn cancel_poll(&self) {
        self.poll.cancel();
    }

    /// Ask the exit watcher to signal the process. Returns false when the
    /// watcher is already gone.
    pub fn terminate(&self, signal: StopSignal) -> bool {
        match &self.control {
            Some(tx) => tx.send(signal).is_ok(),
            None => false,
        }
    }

    pub fn uptime(&self) -> chrono::Duration {
        Utc::now() - self.started_at
    }
}

/// Single source of truth for live core processes, keyed by instance name
#[derive(Debug, Default)]
pub struct ProcessRegistry {
    handles: HashMap<String, ProcessHandle>,
    generations: HashMap<String, u64>,
}

impl ProcessRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a handle and mark it running. Replacing a live entry is allowed;
    /// the displaced handle is returned so the caller can dispose of it.
    pub fn register(&mut self, name: &str, mut handle: ProcessHandle) -> Option<ProcessHandle> {
        handle.running = true;
        let previous = self.handles.insert(name.to_string(), handle);
        if let Some(ref prev) = previous {
            if prev.running {
                warn!(
                    "Instance '{}' re-registered while generation {} was still running",
                    name, prev.generation
                );
            }
        }
        previous
    }

    pub fn unregister(&mut self, name: &str) -> Option<ProcessHandle> {
        let removed = self.handles.remove(name);
        if removed.is_some() {
            debug!("Unregistered instance '{}'", name);
        }
        removed
    }

    #[cfg(test)]
    pub fn get(&self, name: &str) -> Option<&ProcessHandle> {
        self.handles.get(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut ProcessHandle> {
        self.handles.get_mut(name)
    }

    pub fn names(&self) -> Vec<String> {
        self.handles.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    pub fn handles(&self) -> impl Iterator<Item = (&String, &ProcessHandle)> {
        self.handles.iter()
    }

    /// Bump and return the generation for `name`. Survives unregistering so a
    /// restarted instance never reuses an old generation.
    pub fn next_generation(&mut self, name: &str) -> u64 {
        let generation = self.generations.entry(name.to_string()).or_insert(0);
        *generation += 1;
        *generation
    }

    /// Whether `generation` is the registered process for `name`
    pub fn is_current(&self, name: &str, generation: u64) -> bool {
        self.handles
            .get(name)
            .map(|h| h.generation == generation)
            .unwrap_or(false)
    }

    pub fn status_of(&self, name: &str) -> InstanceStatus {
        self.handles
            .get(name)
            .map(|h| h.status())
            .unwrap_or(InstanceStatus::Stopped)
    }
}
