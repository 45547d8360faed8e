//! Process management - Spawning core processes and watching them exit

use std::path::Path;
use std::process::Stdio;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::error::SupervisorError;
#[cfg(unix)]
use crate::platform;
use crate::platform::StopSignal;

/// Which pipe a line of core output came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputStream {
    Stdout,
    Stderr,
}

/// Something that happened to a core process outside of a UI command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessEvent {
    /// `/api/info` answered for this generation
    Ready { generation: u64 },
    /// The process is gone, or waiting on it failed
    Exited {
        generation: u64,
        code: Option<i32>,
        error: Option<String>,
    },
    /// One line of core output
    Output { stream: OutputStream, line: String },
}

/// Process events tagged with the instance they belong to
pub type EventSender = mpsc::UnboundedSender<(String, ProcessEvent)>;
pub type EventReceiver = mpsc::UnboundedReceiver<(String, ProcessEvent)>;

/// A freshly spawned core and the channel used to stop it
#[derive(Debug)]
pub struct SpawnedCore {
    pub pid: Option<u32>,
    pub control: mpsc::UnboundedSender<StopSignal>,
}

/// Spawn a core executable and hand its lifetime over to background tasks.
///
/// Output lines and the final exit are reported on `events`; stop requests
/// arrive through the returned control channel.
pub fn spawn_core(
    name: &str,
    generation: u64,
    executable: &Path,
    params: &[String],
    events: EventSender,
) -> Result<SpawnedCore, SupervisorError> {
    if !executable.exists() {
        return Err(SupervisorError::ExecutableNotFound(executable.to_path_buf()));
    }

    info!(
        "Spawning instance '{}' from {:?} with {:?}",
        name, executable, params
    );

    let mut cmd = Command::new(executable);
    cmd.args(params);
    if let Some(parent) = executable.parent() {
        cmd.current_dir(parent);
    }

    let mut child = cmd
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|source| SupervisorError::Spawn {
            name: name.to_string(),
            source,
        })?;

    let pid = child.id();
    info!("Spawned instance '{}' with PID {:?}", name, pid);

    if let Some(out) = child.stdout.take() {
        forward_lines(name, OutputStream::Stdout, out, events.clone());
    }
    if let Some(err) = child.stderr.take() {
        forward_lines(name, OutputStream::Stderr, err, events.clone());
    }

    let (control, control_rx) = mpsc::unbounded_channel();
    watch_exit(name.to_string(), generation, child, control_rx, events);

    Ok(SpawnedCore { pid, control })
}

fn forward_lines<R>(name: &str, stream: OutputStream, reader: R, events: EventSender)
where
    R: tokio::io::AsyncRead + Unpin + Send + 'static,
{
    let name = name.to_string();
    tokio::spawn(async move {
        let mut lines = BufReader::new(reader).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            if events
                .send((name.clone(), ProcessEvent::Output { stream, line }))
                .is_err()
            {
                break;
            }
        }
    });
}

fn watch_exit(
    name: String,
    generation: u64,
    mut child: Child,
    mut control: mpsc::UnboundedReceiver<StopSignal>,
    events: EventSender,
) {
    tokio::spawn(async move {
        let outcome = loop {
            tokio::select! {
                status = child.wait() => break status,
                Some(signal) = control.recv() => deliver_signal(&name, &mut child, signal),
            }
        };

        let event = match outcome {
            Ok(status) => {
                debug!("Instance '{}' exited with {}", name, status);
                ProcessEvent::Exited {
                    generation,
                    code: status.code(),
                    error: None,
                }
            }
            Err(e) => {
                warn!("Waiting on instance '{}' failed: {}", name, e);
                ProcessEvent::Exited {
                    generation,
                    code: None,
                    error: Some(e.to_string()),
                }
            }
        };
        let _ = events.send((name, event));
    });
}

fn deliver_signal(name: &str, child: &mut Child, signal: StopSignal) {
    debug!("Sending {:?} to instance '{}'", signal, name);

    #[cfg(unix)]
    if let Some(pid) = child.id() {
        match platform::signal_process(pid, signal) {
            Ok(()) => return,
            Err(e) => warn!("{}, forcing kill", e),
        }
    }
    #[cfg(not(unix))]
    let _ = signal;

    if let Err(e) = child.start_kill() {
        debug!("Kill request for instance '{}' ignored: {}", name, e);
    }
}
