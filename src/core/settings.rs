//! Supervisor settings management

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::platform::PlatformId;

/// Overrides the data directory (database and per-instance config dirs)
pub const DATA_DIR_ENV: &str = "LEDFX_SUPERVISOR_DATA_DIR";
/// Overrides the path of the core executable
pub const CORE_EXECUTABLE_ENV: &str = "LEDFX_CORE_EXECUTABLE";

/// Directory, under the data directory, holding one config dir per instance
const CONFIG_ROOT_DIR: &str = ".ledfx-cc";

/// Supervisor settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    // Paths
    /// Custom data directory
    pub data_directory: Option<PathBuf>,
    /// Directory the bundled core lives in (defaults to `<exe dir>/extraResources`)
    pub resources_directory: Option<PathBuf>,
    /// Explicit core executable, bypassing the platform layout
    pub core_executable: Option<PathBuf>,

    // Instances
    /// Port given to a new instance started without one
    pub default_instance_port: u16,

    // Readiness
    /// Delay between `/api/info` probes
    pub poll_interval_ms: u64,
    /// Timeout of a single probe
    pub probe_timeout_ms: u64,

    // Advanced
    /// Enable debug logging
    pub debug_logging: bool,
    /// Keep instance history for N days (0 = forever)
    pub history_retention_days: u32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            data_directory: None,
            resources_directory: None,
            core_executable: None,

            default_instance_port: 8889,

            poll_interval_ms: 1000,
            probe_timeout_ms: 2000,

            debug_logging: false,
            history_retention_days: 30,
        }
    }
}

impl Settings {
    /// Get the data directory, using default if not set
    pub fn get_data_directory(&self) -> PathBuf {
        self.data_directory.clone().unwrap_or_else(|| {
            dirs::data_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("LedFx Supervisor")
        })
    }

    /// Root of the per-instance config directories
    pub fn config_root(&self) -> PathBuf {
        self.get_data_directory().join(CONFIG_ROOT_DIR)
    }

    /// Get the resources directory, next to the running executable by default
    pub fn get_resources_directory(&self) -> PathBuf {
        self.resources_directory.clone().unwrap_or_else(|| {
            std::env::current_exe()
                .ok()
                .and_then(|exe| exe.parent().map(Path::to_path_buf))
                .unwrap_or_else(|| PathBuf::from("."))
                .join("extraResources")
        })
    }

    /// Core executable to spawn on `platform`
    pub fn core_executable_path(&self, platform: PlatformId) -> PathBuf {
        match &self.core_executable {
            Some(path) => path.clone(),
            None => platform.core_executable(&self.get_resources_directory()),
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    /// Validate settings and fix any invalid values
    pub fn validate(&mut self) {
        self.poll_interval_ms = self.poll_interval_ms.clamp(100, 60_000);
        self.probe_timeout_ms = self.probe_timeout_ms.clamp(100, 60_000);
        if self.default_instance_port == 0 {
            warn!("Default instance port 0 is not usable, falling back to 8889");
            self.default_instance_port = 8889;
        }
    }

    /// Apply environment overrides on top of stored settings
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(
            std::env::var_os(DATA_DIR_ENV),
            std::env::var_os(CORE_EXECUTABLE_ENV),
        );
    }

    fn apply_overrides(
        &mut self,
        data_dir: Option<std::ffi::OsString>,
        core_executable: Option<std::ffi::OsString>,
    ) {
        if let Some(dir) = data_dir.filter(|d| !d.is_empty()) {
            info!("Data directory overridden by {}: {:?}", DATA_DIR_ENV, dir);
            self.data_directory = Some(PathBuf::from(dir));
        }
        if let Some(exe) = core_executable.filter(|e| !e.is_empty()) {
            info!("Core executable overridden by {}: {:?}", CORE_EXECUTABLE_ENV, exe);
            self.core_executable = Some(PathBuf::from(exe));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_core_conventions() {
        let settings = Settings::default();
        assert_eq!(settings.default_instance_port, 8889);
        assert_eq!(settings.poll_interval(), Duration::from_secs(1));
        assert!(settings
            .get_resources_directory()
            .ends_with("extraResources"));
    }

    #[test]
    fn config_root_lives_under_the_data_directory() {
        let settings = Settings {
            data_directory: Some(PathBuf::from("/srv/ledfx")),
            ..Default::default()
        };
        assert_eq!(settings.config_root(), PathBuf::from("/srv/ledfx/.ledfx-cc"));
    }

    #[test]
    fn explicit_executable_wins_over_layout() {
        let mut settings = Settings {
            resources_directory: Some(PathBuf::from("/opt/ledfx")),
            ..Default::default()
        };
        assert_eq!(
            settings.core_executable_path(PlatformId::Linux),
            PathBuf::from("/opt/ledfx/LedFx-notray")
        );

        settings.apply_overrides(None, Some("/usr/bin/ledfx".into()));
        assert_eq!(
            settings.core_executable_path(PlatformId::Darwin),
            PathBuf::from("/usr/bin/ledfx")
        );
    }

    #[test]
    fn empty_overrides_are_ignored() {
        let mut settings = Settings::default();
        settings.apply_overrides(Some("".into()), Some("".into()));
        assert!(settings.data_directory.is_none());
        assert!(settings.core_executable.is_none());
    }

    #[test]
    fn validate_clamps_intervals() {
        let mut settings = Settings {
            poll_interval_ms: 1,
            probe_timeout_ms: 1_000_000,
            default_instance_port: 0,
            ..Default::default()
        };
        settings.validate();
        assert_eq!(settings.poll_interval_ms, 100);
        assert_eq!(settings.probe_timeout_ms, 60_000);
        assert_eq!(settings.default_instance_port, 8889);
    }

    #[test]
    fn missing_fields_take_defaults() {
        let settings: Settings = serde_json::from_str(r#"{"debug_logging":true}"#).unwrap();
        assert!(settings.debug_logging);
        assert_eq!(settings.history_retention_days, 30);
    }
}
