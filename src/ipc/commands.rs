//! Commands sent from UI windows to the supervisor

use serde::{Deserialize, Deserializer};

/// One inbound command, discriminated by its `command` field
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "command", rename_all = "kebab-case")]
pub enum Command {
    GetPlatform,
    GetCoreParams,
    StartCore {
        #[serde(default)]
        instance: Option<String>,
    },
    StartCoreInstance {
        #[serde(default)]
        instance: Option<String>,
        #[serde(default, deserialize_with = "deserialize_port")]
        port: Option<u16>,
    },
    StopCoreInstance {
        instance: String,
    },
    DeleteCoreInstance {
        instance: String,
    },
    DeleteCoreParams,
    OpenConfig {
        #[serde(default)]
        instance: Option<String>,
    },
    RestartClient,
}

impl Command {
    pub fn parse(line: &str) -> serde_json::Result<Self> {
        serde_json::from_str(line)
    }

    /// Wire name of the command
    pub fn name(&self) -> &'static str {
        match self {
            Self::GetPlatform => "get-platform",
            Self::GetCoreParams => "get-core-params",
            Self::StartCore { .. } => "start-core",
            Self::StartCoreInstance { .. } => "start-core-instance",
            Self::StopCoreInstance { .. } => "stop-core-instance",
            Self::DeleteCoreInstance { .. } => "delete-core-instance",
            Self::DeleteCoreParams => "delete-core-params",
            Self::OpenConfig { .. } => "open-config",
            Self::RestartClient => "restart-client",
        }
    }

    pub fn instance(&self) -> Option<&str> {
        match self {
            Self::StartCore { instance }
            | Self::StartCoreInstance { instance, .. }
            | Self::OpenConfig { instance } => instance.as_deref(),
            Self::StopCoreInstance { instance } | Self::DeleteCoreInstance { instance } => {
                Some(instance)
            }
            _ => None,
        }
    }
}

/// Renderers send ports as numbers or as strings from text fields
#[derive(Deserialize)]
#[serde(untagged)]
enum PortArg {
    Number(u16),
    Text(String),
}

fn deserialize_port<'de, D>(deserializer: D) -> Result<Option<u16>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<PortArg>::deserialize(deserializer)? {
        None => Ok(None),
        Some(PortArg::Number(port)) => Ok(Some(port)),
        Some(PortArg::Text(text)) if text.trim().is_empty() => Ok(None),
        Some(PortArg::Text(text)) => text
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| serde::de::Error::custom(format!("invalid port '{}'", text))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_every_command() {
        let cases = [
            (r#"{"command":"get-platform"}"#, Command::GetPlatform),
            (r#"{"command":"get-core-params"}"#, Command::GetCoreParams),
            (
                r#"{"command":"start-core","instance":"instance1"}"#,
                Command::StartCore {
                    instance: Some("instance1".into()),
                },
            ),
            (
                r#"{"command":"start-core-instance","instance":"instance2","port":8890}"#,
                Command::StartCoreInstance {
                    instance: Some("instance2".into()),
                    port: Some(8890),
                },
            ),
            (
                r#"{"command":"stop-core-instance","instance":"instance2"}"#,
                Command::StopCoreInstance {
                    instance: "instance2".into(),
                },
            ),
            (
                r#"{"command":"delete-core-instance","instance":"instance2"}"#,
                Command::DeleteCoreInstance {
                    instance: "instance2".into(),
                },
            ),
            (r#"{"command":"delete-core-params"}"#, Command::DeleteCoreParams),
            (
                r#"{"command":"open-config"}"#,
                Command::OpenConfig { instance: None },
            ),
            (r#"{"command":"restart-client"}"#, Command::RestartClient),
        ];
        for (line, expected) in cases {
            let parsed = Command::parse(line).unwrap();
            assert_eq!(parsed.name(), expected.name());
            assert_eq!(parsed, expected);
        }
    }

    #[test]
    fn port_may_be_a_string_or_missing() {
        let cmd = Command::parse(r#"{"command":"start-core-instance","port":"8891"}"#).unwrap();
        assert_eq!(
            cmd,
            Command::StartCoreInstance {
                instance: None,
                port: Some(8891)
            }
        );

        let cmd =
            Command::parse(r#"{"command":"start-core-instance","instance":"a","port":""}"#)
                .unwrap();
        assert_eq!(cmd.instance(), Some("a"));
        assert!(matches!(cmd, Command::StartCoreInstance { port: None, .. }));

        assert!(
            Command::parse(r#"{"command":"start-core-instance","port":"eighty"}"#).is_err()
        );
    }

    #[test]
    fn unknown_or_incomplete_commands_are_rejected() {
        assert!(Command::parse(r#"{"command":"verify_otp"}"#).is_err());
        assert!(Command::parse(r#"{"command":"stop-core-instance"}"#).is_err());
        assert!(Command::parse("get-platform").is_err());
    }

    #[test]
    fn extra_fields_are_ignored() {
        let cmd = Command::parse(r#"{"command":"get-core-params","windowId":3}"#).unwrap();
        assert_eq!(cmd, Command::GetCoreParams);
    }
}
