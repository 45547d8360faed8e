//! Launch parameters - CLI arguments per platform and instance

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use super::instance::{next_instance_name, DEFAULT_INSTANCE};
use crate::platform::PlatformId;

/// Port a core listens on when its arguments do not say otherwise
pub const DEFAULT_CORE_PORT: u16 = 8888;

const PORT_FLAGS: &[&str] = &["-p", "--port"];
const CONFIG_FLAGS: &[&str] = &["-c", "--config"];

/// Ordered CLI arguments for one instance
pub type LaunchParams = Vec<String>;

/// Launch parameters of every instance on one platform
pub type InstanceParams = BTreeMap<String, LaunchParams>;

/// Persisted `{ platform: { instance: [args] } }` map
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CoreParams(BTreeMap<PlatformId, InstanceParams>);

/// Outcome of preparing an instance for launch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedLaunch {
    pub name: String,
    pub params: LaunchParams,
    /// The stored parameters were created or modified and must be persisted
    pub changed: bool,
}

impl Default for CoreParams {
    fn default() -> Self {
        Self(
            PlatformId::all()
                .iter()
                .map(|p| (*p, Self::platform_defaults(*p)))
                .collect(),
        )
    }
}

impl CoreParams {
    /// Built-in parameters shipped for each platform
    pub fn platform_defaults(platform: PlatformId) -> InstanceParams {
        let args: &[&str] = match platform {
            PlatformId::Darwin => &[],
            PlatformId::Linux | PlatformId::Win32 => &["-p", "8888", "--no-tray"],
        };
        let mut params = InstanceParams::new();
        params.insert(
            DEFAULT_INSTANCE.to_string(),
            args.iter().map(|a| a.to_string()).collect(),
        );
        params
    }

    /// Fill in defaults for platforms missing from a loaded store
    pub fn ensure_platforms(&mut self) {
        for platform in PlatformId::all() {
            self.0
                .entry(*platform)
                .or_insert_with(|| Self::platform_defaults(*platform));
        }
    }

    pub fn platform(&self, platform: PlatformId) -> InstanceParams {
        self.0.get(&platform).cloned().unwrap_or_default()
    }

    pub fn get(&self, platform: PlatformId, name: &str) -> Option<&LaunchParams> {
        self.0.get(&platform).and_then(|p| p.get(name))
    }

    pub fn names(&self, platform: PlatformId) -> Vec<String> {
        self.0
            .get(&platform)
            .map(|p| p.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn instance_count(&self, platform: PlatformId) -> usize {
        self.0.get(&platform).map(|p| p.len()).unwrap_or(0)
    }

    /// Pick a name for an unnamed start request
    pub fn generate_name(&self, platform: PlatformId) -> String {
        next_instance_name(self.instance_count(platform))
    }

    /// Work out the arguments for starting `name`, creating or updating its entry.
    ///
    /// New instances get `-p <port> -c <config_root>/<name>`. Any instance other
    /// than the default one is forced onto its own config directory, and an
    /// explicit port overwrites the stored one.
    pub fn resolve_for_start(
        &mut self,
        platform: PlatformId,
        name: Option<&str>,
        port: Option<u16>,
        default_port: u16,
        config_root: &Path,
    ) -> ResolvedLaunch {
        let name = match name {
            Some(n) if !n.trim().is_empty() => n.trim().to_string(),
            _ => self.generate_name(platform),
        };
        let isolated = name != DEFAULT_INSTANCE;
        let free_port = self.free_port(platform, default_port);
        let config_dir = config_root.join(&name).to_string_lossy().into_owned();

        let entries = self
            .0
            .entry(platform)
            .or_insert_with(|| Self::platform_defaults(platform));

        let mut changed = false;
        let params = entries.entry(name.clone()).or_insert_with(|| {
            changed = true;
            if isolated {
                vec![
                    "-p".to_string(),
                    port.unwrap_or(free_port).to_string(),
                    "-c".to_string(),
                    config_dir.clone(),
                ]
            } else {
                Self::platform_defaults(platform)
                    .remove(DEFAULT_INSTANCE)
                    .unwrap_or_default()
            }
        });

        if let Some(port) = port {
            changed |= set_flag(params, PORT_FLAGS, &port.to_string());
        }
        if isolated {
            changed |= set_flag(params, CONFIG_FLAGS, &config_dir);
        }

        ResolvedLaunch {
            name,
            params: params.clone(),
            changed,
        }
    }

    /// Lowest port from `from` upwards that no instance on `platform` uses
    fn free_port(&self, platform: PlatformId, from: u16) -> u16 {
        let used: Vec<u16> = self
            .0
            .get(&platform)
            .map(|p| p.values().map(|args| port_of(args)).collect())
            .unwrap_or_default();
        (from..=u16::MAX)
            .find(|port| !used.contains(port))
            .unwrap_or(from)
    }

    /// Drop an instance's entry, returning whether it existed
    pub fn remove(&mut self, platform: PlatformId, name: &str) -> bool {
        self.0
            .get_mut(&platform)
            .map(|p| p.remove(name).is_some())
            .unwrap_or(false)
    }

    /// Restore built-in defaults on every platform
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Port the core will listen on for these arguments
pub fn port_of(params: &[String]) -> u16 {
    flag_value(params, PORT_FLAGS)
        .and_then(|v| v.parse().ok())
        .unwrap_or(DEFAULT_CORE_PORT)
}

/// Config directory passed to the core, if any
pub fn config_dir_of(params: &[String]) -> Option<&str> {
    flag_value(params, CONFIG_FLAGS)
}

fn flag_value<'a>(params: &'a [String], flags: &[&str]) -> Option<&'a str> {
    params
        .iter()
        .position(|a| flags.contains(&a.as_str()))
        .and_then(|i| params.get(i + 1))
        .map(String::as_str)
}

/// Set `flag value`, returning whether the arguments changed
fn set_flag(params: &mut LaunchParams, flags: &[&str], value: &str) -> bool {
    match params.iter().position(|a| flags.contains(&a.as_str())) {
        Some(i) => match params.get_mut(i + 1) {
            Some(current) if current == value => false,
            Some(current) => {
                *current = value.to_string();
                true
            }
            None => {
                params.push(value.to_string());
                true
            }
        },
        None => {
            params.push(flags[0].to_string());
            params.push(value.to_string());
            true
        }
    }
}
