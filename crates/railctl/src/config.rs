//! Layered CLI configuration: defaults, then `--config` file, then flags.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use dccex::{SessionConfig, ThrottleConfig};
use serde::{Deserialize, Serialize};

/// State file used when neither the config file nor a flag names one.
pub const DEFAULT_STATE_FILE: &str = "railcam-state.json";

/// Contents of a `--config` JSON file. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FileConfig {
    /// Serial device path of the command station.
    pub port: Option<String>,
    pub baud_rate: Option<u32>,
    pub state_file: Option<PathBuf>,
    pub throttle: ThrottleConfig,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let text =
            fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
        serde_json::from_str(&text).with_context(|| format!("parse {}", path.display()))
    }
}

/// Values given on the command line.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub port: Option<String>,
    pub baud_rate: Option<u32>,
    pub state_file: Option<PathBuf>,
    pub simulate: bool,
}

/// Effective settings for one invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub port: Option<String>,
    pub session: SessionConfig,
    pub throttle: ThrottleConfig,
    pub state_file: PathBuf,
    /// Talk to the in-process simulated station instead of a serial port.
    pub simulate: bool,
}

impl Settings {
    pub fn resolve(file: FileConfig, flags: Overrides) -> Self {
        let mut session = SessionConfig::default();
        if let Some(baud_rate) = flags.baud_rate.or(file.baud_rate) {
            session.baud_rate = baud_rate;
        }
        Self {
            port: flags.port.or(file.port),
            session,
            throttle: file.throttle,
            state_file: flags
                .state_file
                .or(file.state_file)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_STATE_FILE)),
            simulate: flags.simulate,
        }
    }

    /// Load the optional config file and apply the flags on top.
    pub fn load(config: Option<&Path>, flags: Overrides) -> Result<Self> {
        let file = match config {
            Some(path) => FileConfig::load(path)?,
            None => FileConfig::default(),
        };
        Ok(Self::resolve(file, flags))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_override_file_values() {
        let file: FileConfig = serde_json::from_str(
            r#"{"port":"/dev/ttyUSB0","baudRate":57600,"throttle":{"initialAddress":42}}"#,
        )
        .unwrap();
        let settings = Settings::resolve(
            file.clone(),
            Overrides {
                port: Some("/dev/ttyACM1".into()),
                ..Overrides::default()
            },
        );
        assert_eq!(settings.port.as_deref(), Some("/dev/ttyACM1"));
        assert_eq!(settings.session.baud_rate, 57600);
        assert_eq!(settings.throttle.initial_address, 42);
        assert_eq!(settings.throttle.storage_key, "railcam-loco-states");
        assert_eq!(settings.state_file, PathBuf::from(DEFAULT_STATE_FILE));

        let settings = Settings::resolve(file, Overrides::default());
        assert_eq!(settings.port.as_deref(), Some("/dev/ttyUSB0"));
    }

    #[test]
    fn defaults_without_a_file() {
        let settings = Settings::load(None, Overrides::default()).unwrap();
        assert_eq!(settings.port, None);
        assert_eq!(settings.session, SessionConfig::default());
        assert!(!settings.simulate);
    }

    #[test]
    fn missing_file_is_an_error() {
        let err = Settings::load(
            Some(Path::new("/nonexistent/railctl.json")),
            Overrides::default(),
        )
        .unwrap_err();
        assert!(err.to_string().contains("railctl.json"));
    }
}
