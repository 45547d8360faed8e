//! Instance supervisor - Owns the registry and launch parameters and applies
//! every UI command and process event in one place

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use super::broadcast::{self, StatusBroadcaster};
use super::error::SupervisorError;
use super::instance::{
    is_valid_instance_name, InstanceEvent, StatusSnapshot, DEFAULT_INSTANCE,
};
use super::params::{config_dir_of, port_of, CoreParams, ResolvedLaunch};
use super::poller::ReadinessPoller;
use super::process::{self, EventReceiver, EventSender, OutputStream, ProcessEvent};
use super::registry::{ProcessHandle, ProcessRegistry};
use super::settings::Settings;
use crate::ipc::{Command, CommandFailure, Inbound, UiMessage, UiWindow};
use crate::persistence::Database;
use crate::platform::{PlatformId, StopSignal};

/// How long cores get to exit after the supervisor asks them to
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// What the host should do after a command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    /// Stop every core and start a fresh supervisor
    Relaunch,
    Exit,
}

/// Supervisor for the named core instances of one platform
pub struct InstanceSupervisor {
    settings: Settings,
    platform: PlatformId,
    params: CoreParams,
    registry: ProcessRegistry,
    broadcaster: StatusBroadcaster,
    db: Database,
    poller: ReadinessPoller,
    events_tx: EventSender,
    events_rx: EventReceiver,
}

impl InstanceSupervisor {
    /// Create a supervisor, loading persisted launch parameters
    pub fn new(settings: Settings, db: Database) -> anyhow::Result<Self> {
        let params = db.load_core_params()?;
        let poller = ReadinessPoller::new(settings.poll_interval(), settings.probe_timeout())
            .context("Failed to build readiness probe client")?;
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        let platform = PlatformId::current();
        info!(
            "Supervisor ready on {} with {} configured instance(s)",
            platform,
            params.instance_count(platform)
        );

        Ok(Self {
            settings,
            platform,
            params,
            registry: ProcessRegistry::new(),
            broadcaster: StatusBroadcaster::new(),
            db,
            poller,
            events_tx,
            events_rx,
        })
    }

    pub fn platform(&self) -> PlatformId {
        self.platform
    }

    pub fn params(&self) -> &CoreParams {
        &self.params
    }

    pub fn attach_window(&mut self, window: Arc<dyn UiWindow>) {
        self.broadcaster.attach(window);
    }

    /// Current status of every known instance
    pub fn status(&self) -> StatusSnapshot {
        broadcast::snapshot(&self.registry, self.params.names(self.platform))
    }

    fn broadcast_status(&mut self) {
        let known = self.params.names(self.platform);
        self.broadcaster.broadcast_status(&self.registry, known);
    }

    fn save_params(&self) -> Result<(), SupervisorError> {
        self.db.save_core_params(&self.params)?;
        Ok(())
    }

    fn record(&self, name: &str, event: InstanceEvent, details: Option<&str>) {
        if let Err(e) = self.db.record_instance_event(name, event, details) {
            error!(
                "Failed to record '{}' for instance '{}': {:#}",
                event.as_str(),
                name,
                e
            );
        }
    }

    // === Lifecycle ===

    /// Spawn a core for `name` (or a generated name) and start polling it.
    ///
    /// Returns the instance name once the process is registered. The status
    /// goes to `starting` immediately; `running` follows from the poller.
    pub fn start(
        &mut self,
        name: Option<&str>,
        port: Option<u16>,
    ) -> Result<String, SupervisorError> {
        let name = match name {
            Some(n) if !n.trim().is_empty() => n.trim().to_string(),
            _ => self.params.generate_name(self.platform),
        };
        if !is_valid_instance_name(&name) {
            warn!("Refusing to start instance with name {:?}", name);
            return Err(SupervisorError::InvalidName(name));
        }
        if self.registry.status_of(&name).is_active() {
            return Err(SupervisorError::AlreadyRunning(name));
        }

        let executable = self.settings.core_executable_path(self.platform);
        if !executable.exists() {
            warn!("Cannot start '{}': {:?} does not exist", name, executable);
            return Err(SupervisorError::ExecutableNotFound(executable));
        }

        let ResolvedLaunch {
            name,
            params,
            changed,
        } = self.params.resolve_for_start(
            self.platform,
            Some(&name),
            port,
            self.settings.default_instance_port,
            &self.settings.config_root(),
        );
        if changed {
            self.save_params()?;
        }
        if let Some(dir) = config_dir_of(&params) {
            std::fs::create_dir_all(dir).map_err(|source| SupervisorError::Spawn {
                name: name.clone(),
                source,
            })?;
        }

        let generation = self.registry.next_generation(&name);
        let spawned = match process::spawn_core(
            &name,
            generation,
            &executable,
            &params,
            self.events_tx.clone(),
        ) {
            Ok(spawned) => spawned,
            Err(e) => {
                error!("{}", e);
                self.record(&name, InstanceEvent::SpawnFailed, Some(&e.to_string()));
                return Err(e);
            }
        };

        let port = port_of(&params);
        let handle = ProcessHandle::new(spawned.pid, generation, port, Some(spawned.control));
        let token = handle.poll_token();
        if let Some(previous) = self.registry.register(&name, handle) {
            previous.cancel_poll();
        }
        self.poller
            .spawn(name.clone(), generation, port, token, self.events_tx.clone());

        let details = format!("pid {:?}, port {}", spawned.pid, port);
        self.record(&name, InstanceEvent::Started, Some(&details));
        info!("Instance '{}' starting ({})", name, details);

        self.broadcast_status();
        Ok(name)
    }

    /// Clear `running`, cancel the poll and signal the process. Returns false
    /// when there was nothing to stop.
    fn stop_with(&mut self, name: &str, signal: StopSignal) -> bool {
        let Some(handle) = self.registry.get_mut(name) else {
            return false;
        };
        if !handle.running {
            return false;
        }

        handle.cancel_poll();
        handle.running = false;
        handle.ready = false;
        if !handle.terminate(signal) {
            debug!("Instance '{}' already exited", name);
        }
        let details = format!("pid {:?}, port {}, {:?}", handle.pid, handle.port, signal);
        self.record(name, InstanceEvent::Stopped, Some(&details));
        info!("Instance '{}' stopped ({})", name, details);
        true
    }

    /// Stop an instance. Reports `stopped` right away without waiting for the
    /// process to exit; a no-op when nothing is running under `name`.
    pub fn stop(&mut self, name: &str) -> bool {
        let stopped = self.stop_with(name, StopSignal::Terminate);
        if stopped {
            self.broadcast_status();
        } else {
            debug!("Stop for '{}' ignored, not running", name);
        }
        stopped
    }

    /// Stop an instance and forget it: handle, launch parameters and status
    pub fn delete(&mut self, name: &str) -> Result<(), SupervisorError> {
        self.stop_with(name, StopSignal::Terminate);
        if let Some(handle) = self.registry.unregister(name) {
            handle.cancel_poll();
        }

        if self.params.remove(self.platform, name) {
            self.save_params()?;
        }
        self.record(name, InstanceEvent::Deleted, None);
        info!("Instance '{}' deleted", name);

        self.broadcast_status();
        Ok(())
    }

    /// Apply one event from a poller or exit watcher
    pub fn handle_process_event(&mut self, name: &str, event: ProcessEvent) {
        match event {
            ProcessEvent::Ready { generation } => {
                let Some(handle) = self
                    .registry
                    .get_mut(name)
                    .filter(|h| h.generation == generation && h.running)
                else {
                    debug!("Ignoring stale readiness of '{}' gen {}", name, generation);
                    return;
                };
                handle.ready = true;
                let elapsed = handle.uptime().num_milliseconds();
                info!("Instance '{}' is running", name);
                self.record(
                    name,
                    InstanceEvent::Ready,
                    Some(&format!("after {} ms", elapsed)),
                );
                self.broadcast_status();
            }
            ProcessEvent::Exited {
                generation,
                code,
                error,
            } => {
                if !self.registry.is_current(name, generation) {
                    debug!("Ignoring exit of replaced '{}' gen {}", name, generation);
                    return;
                }
                let Some(handle) = self.registry.unregister(name) else {
                    return;
                };
                handle.cancel_poll();

                let details = match (&error, code) {
                    (Some(e), _) => e.clone(),
                    (None, Some(code)) => format!("exit code {}", code),
                    (None, None) => "terminated by signal".to_string(),
                };
                if handle.running {
                    warn!("Instance '{}' exited unexpectedly ({})", name, details);
                    self.record(name, InstanceEvent::Crashed, Some(&details));
                    self.broadcast_status();
                } else {
                    debug!("Instance '{}' exited ({})", name, details);
                    self.record(name, InstanceEvent::Exited, Some(&details));
                }
            }
            ProcessEvent::Output { stream, line } => {
                let tag = match stream {
                    OutputStream::Stdout => "out",
                    OutputStream::Stderr => "err",
                };
                debug!(target: "ledfx_supervisor::core", "[{}:{}] {}", name, tag, line);
                self.broadcaster
                    .send(UiMessage::Snackbar(format!("{}: {}", name, line)));
            }
        }
    }

    // === Launch parameters ===

    /// Push launch parameters for this platform, then the status
    pub fn get_core_params(&mut self) {
        let params = self.params.platform(self.platform);
        self.broadcaster.send(UiMessage::CoreParams(params));
        self.broadcast_status();
    }

    /// Restore built-in launch parameters on every platform
    pub fn reset_params(&mut self) -> Result<(), SupervisorError> {
        self.params.reset();
        self.save_params()?;
        info!("Launch parameters reset to defaults");
        let params = self.params.platform(self.platform);
        self.broadcaster.send(UiMessage::CoreParams(params));
        Ok(())
    }

    /// Where the core keeps its config for `name`
    pub fn config_dir(&self, name: &str) -> PathBuf {
        let configured = self
            .params
            .get(self.platform, name)
            .and_then(|p| config_dir_of(p));
        match configured {
            Some(dir) => PathBuf::from(dir),
            None if name == DEFAULT_INSTANCE => dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".ledfx"),
            None => self.settings.config_root().join(name),
        }
    }

    /// Reveal an instance's config directory in the OS file browser. A core
    /// that never ran has no directory yet, so its closest existing parent is
    /// shown instead.
    pub fn open_config(&self, name: Option<&str>) -> anyhow::Result<PathBuf> {
        let dir = self.config_dir(name.unwrap_or(DEFAULT_INSTANCE));
        let target = existing_ancestor(&dir);
        open::that(&target).context(format!("Failed to open {:?}", target))?;
        info!("Opened {:?} for config directory {:?}", target, dir);
        Ok(target)
    }

    // === Commands ===

    fn report(&mut self, command: &Command, error: &SupervisorError) {
        warn!("{} failed: {}", command.name(), error);
        let failure =
            CommandFailure::from_error(command.name(), command.instance().map(String::from), error);
        self.broadcaster.send(UiMessage::CommandFailed(failure));
    }

    /// Carry out one line from the command channel
    pub fn dispatch(&mut self, inbound: Inbound) -> Flow {
        let command = match inbound {
            Inbound::Command(command) => command,
            Inbound::Malformed { line, error } => {
                debug!("Rejecting command line {:?}", line);
                let failure = CommandFailure::new("unknown", None, "invalid_command", error);
                self.broadcaster.send(UiMessage::CommandFailed(failure));
                return Flow::Continue;
            }
        };
        debug!("Handling {}", command.name());

        match &command {
            Command::GetPlatform => self.broadcaster.send(UiMessage::Platform(self.platform)),
            Command::GetCoreParams => self.get_core_params(),
            Command::StartCore { instance } => {
                if let Err(e) = self.start(instance.as_deref(), None) {
                    self.report(&command, &e);
                }
            }
            Command::StartCoreInstance { instance, port } => {
                if let Err(e) = self.start(instance.as_deref(), *port) {
                    self.report(&command, &e);
                }
            }
            Command::StopCoreInstance { instance } => {
                self.stop(instance);
            }
            Command::DeleteCoreInstance { instance } => match self.delete(instance) {
                Ok(()) => {
                    let params = self.params.platform(self.platform);
                    self.broadcaster.send(UiMessage::CoreParams(params));
                }
                Err(e) => self.report(&command, &e),
            },
            Command::DeleteCoreParams => match self.reset_params() {
                Ok(()) => return Flow::Relaunch,
                Err(e) => self.report(&command, &e),
            },
            Command::OpenConfig { instance } => {
                if let Err(e) = self.open_config(instance.as_deref()) {
                    error!("{:#}", e);
                    let failure = CommandFailure::new(
                        command.name(),
                        instance.clone(),
                        "open_failed",
                        format!("{:#}", e),
                    );
                    self.broadcaster.send(UiMessage::CommandFailed(failure));
                }
            }
            Command::RestartClient => return Flow::Relaunch,
        }
        Flow::Continue
    }

    /// Serve commands and process events until asked to exit or relaunch,
    /// then shut every core down.
    pub async fn run(mut self, mut commands: mpsc::Receiver<Inbound>) -> Flow {
        info!(
            "Serving commands for {} window(s)",
            self.broadcaster.window_count()
        );
        let flow = loop {
            tokio::select! {
                inbound = commands.recv() => match inbound {
                    Some(inbound) => match self.dispatch(inbound) {
                        Flow::Continue => {}
                        flow => break flow,
                    },
                    None => {
                        info!("Command channel closed");
                        break Flow::Exit;
                    }
                },
                Some((name, event)) = self.events_rx.recv() => {
                    self.handle_process_event(&name, event);
                }
                result = tokio::signal::ctrl_c() => {
                    if let Err(e) = result {
                        error!("Failed to listen for interrupt: {}", e);
                    }
                    info!("Interrupted");
                    break Flow::Exit;
                }
            }
        };

        self.shutdown(SHUTDOWN_GRACE).await;
        flow
    }

    /// Tell the windows, interrupt every core and wait up to `grace` for them
    /// to exit
    pub async fn shutdown(&mut self, grace: Duration) {
        self.broadcaster.send(UiMessage::Shutdown);

        for name in self.registry.names() {
            self.stop_with(&name, StopSignal::Interrupt);
        }
        if self.registry.is_empty() {
            return;
        }

        info!("Waiting for {} core(s) to exit", self.registry.len());
        let deadline = Instant::now() + grace;
        while !self.registry.is_empty() {
            match tokio::time::timeout_at(deadline, self.events_rx.recv()).await {
                Ok(Some((name, event))) => self.handle_process_event(&name, event),
                Ok(None) => break,
                Err(_) => {
                    warn!(
                        "{} core(s) still running after {:?}: {:?}",
                        self.registry.len(),
                        grace,
                        self.registry.names()
                    );
                    break;
                }
            }
        }
    }

    #[cfg(test)]
    async fn process_next_event(&mut self) -> bool {
        match self.events_rx.recv().await {
            Some((name, event)) => {
                self.handle_process_event(&name, event);
                true
            }
            None => false,
        }
    }
}

/// `path` itself, or the nearest parent directory that exists
fn existing_ancestor(path: &Path) -> PathBuf {
    path.ancestors()
        .find(|p| p.is_dir())
        .unwrap_or(path)
        .to_path_buf()
}
