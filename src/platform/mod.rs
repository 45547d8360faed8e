//! Platform-specific details: host identification, core executable layout and signals

use std::fmt;
use std::path::{Path, PathBuf};

use anyhow::Result;
use serde::{Deserialize, Serialize};

/// Host operating system, as reported to the UI and used to key launch parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlatformId {
    Darwin,
    Linux,
    Win32,
}

impl PlatformId {
    /// The platform this binary was compiled for
    pub fn current() -> Self {
        if cfg!(target_os = "macos") {
            Self::Darwin
        } else if cfg!(windows) {
            Self::Win32
        } else {
            Self::Linux
        }
    }

    pub fn all() -> &'static [PlatformId] {
        &[PlatformId::Darwin, PlatformId::Linux, PlatformId::Win32]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Darwin => "darwin",
            Self::Linux => "linux",
            Self::Win32 => "win32",
        }
    }

    /// Location of the bundled core binary inside the resources directory
    pub fn core_executable(&self, resources_dir: &Path) -> PathBuf {
        match self {
            Self::Darwin => resources_dir
                .join("LedFx_core.app")
                .join("Contents")
                .join("MacOS")
                .join("LedFx_v2"),
            Self::Win32 => resources_dir.join("LedFx-notray.exe"),
            Self::Linux => resources_dir.join("LedFx-notray"),
        }
    }
}

impl fmt::Display for PlatformId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Signal used when asking a core to go away
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopSignal {
    /// Regular stop requested by the UI
    Terminate,
    /// Supervisor shutdown
    Interrupt,
}

/// Deliver a stop signal to a process
#[cfg(unix)]
pub fn signal_process(pid: u32, signal: StopSignal) -> Result<()> {
    let signo = match signal {
        StopSignal::Terminate => libc::SIGTERM,
        StopSignal::Interrupt => libc::SIGINT,
    };
    // SAFETY: kill(2) has no memory-safety preconditions
    let result = unsafe { libc::kill(pid as libc::pid_t, signo) };
    if result == 0 {
        Ok(())
    } else {
        anyhow::bail!(
            "Failed to signal process {}: {}",
            pid,
            std::io::Error::last_os_error()
        )
    }
}

/// Windows has no signals; callers fall back to `Child::start_kill`
#[cfg(not(unix))]
pub fn signal_process(pid: u32, signal: StopSignal) -> Result<()> {
    let _ = (pid, signal);
    anyhow::bail!("Signals are not supported on this platform")
}
