//! Server settings

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use link_session::SessionConfig;
use link_sim::VirtualDeviceConfig;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// External tools used to build and flash Arduino sketches
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ToolchainSettings {
    /// arduino-cli executable
    pub arduino_cli: String,
    /// avrdude executable
    pub avrdude: String,
    /// avrdude configuration file, if not the tool's default
    pub avrdude_config: Option<String>,
    /// avrdude programmer id (`-c`)
    pub programmer: String,
    /// Bootloader baud rate (`-b`)
    pub flash_baud: u32,
}

impl Default for ToolchainSettings {
    fn default() -> Self {
        Self {
            arduino_cli: "arduino-cli".to_string(),
            avrdude: "avrdude".to_string(),
            avrdude_config: None,
            programmer: "arduino".to_string(),
            flash_baud: 115200,
        }
    }
}

/// Application settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Settings {
    /// Discovery enumeration period in milliseconds
    pub discovery_period_ms: u64,
    /// Connection watchdog period in milliseconds
    pub watchdog_period_ms: u64,
    /// How long to wait for a device to close, in milliseconds
    pub close_timeout_ms: u64,
    /// Serve virtual devices instead of real ports
    pub simulate: bool,
    /// Devices attached to the virtual bus when simulating
    pub simulated_devices: Vec<VirtualDeviceConfig>,
    /// Build and flash tools
    pub toolchain: ToolchainSettings,
}

impl Default for Settings {
    fn default() -> Self {
        let session = SessionConfig::default();
        Self {
            discovery_period_ms: session.discovery_period.as_millis() as u64,
            watchdog_period_ms: session.watchdog_period.as_millis() as u64,
            close_timeout_ms: session.close_timeout.as_millis() as u64,
            simulate: false,
            simulated_devices: Vec::new(),
            toolchain: ToolchainSettings::default(),
        }
    }
}

impl Settings {
    /// Get the XDG config directory for serlink
    /// Uses $XDG_CONFIG_HOME/serlink on Linux/macOS, falls back to ~/.config/serlink
    fn config_dir() -> Option<PathBuf> {
        if let Ok(xdg_config) = std::env::var("XDG_CONFIG_HOME") {
            let path = PathBuf::from(xdg_config);
            if path.is_absolute() {
                return Some(path.join("serlink"));
            }
        }

        dirs::home_dir().map(|h| h.join(".config").join("serlink"))
    }

    /// Get the default settings file path
    pub fn settings_path() -> Option<PathBuf> {
        Self::config_dir().map(|p| p.join("settings.json"))
    }

    /// Load settings from the default location, falling back to defaults
    pub fn load() -> Self {
        let Some(path) = Self::settings_path() else {
            return Self::default();
        };
        if !path.exists() {
            return Self::default();
        }
        Self::load_from(&path).unwrap_or_else(|e| {
            warn!("Ignoring settings file: {:#}", e);
            Self::default()
        })
    }

    /// Load settings from an explicit file
    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings from {}", path.display()))?;
        serde_json::from_str(&text)
            .with_context(|| format!("Failed to parse settings in {}", path.display()))
    }

    /// Save settings to `path`, creating its directory
    pub fn save_to(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }

        let json = serde_json::to_string_pretty(self).context("Failed to serialize settings")?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write settings to {}", path.display()))
    }

    /// Session tunables derived from these settings
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            discovery_period: Duration::from_millis(self.discovery_period_ms.max(1)),
            watchdog_period: Duration::from_millis(self.watchdog_period_ms.max(1)),
            close_timeout: Duration::from_millis(self.close_timeout_ms),
            ..SessionConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_follow_session_config() {
        let settings = Settings::default();
        assert_eq!(settings.discovery_period_ms, 100);
        assert_eq!(settings.watchdog_period_ms, 10);
        assert!(!settings.simulate);
        assert_eq!(settings.toolchain.programmer, "arduino");

        let config = settings.session_config();
        assert_eq!(config.discovery_period, Duration::from_millis(100));
        assert_eq!(config.watchdog_period, Duration::from_millis(10));
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let settings: Settings = serde_json::from_str(
            r#"{
                "watchdog_period_ms": 25,
                "toolchain": { "avrdude": "/opt/avr/bin/avrdude" },
                "simulated_devices": [{ "path": "/dev/ttySIM0", "vid": 9025, "pid": 67, "loopback": true }]
            }"#,
        )
        .unwrap();

        assert_eq!(settings.watchdog_period_ms, 25);
        assert_eq!(settings.discovery_period_ms, 100);
        assert_eq!(settings.toolchain.avrdude, "/opt/avr/bin/avrdude");
        assert_eq!(settings.toolchain.arduino_cli, "arduino-cli");
        assert_eq!(settings.toolchain.flash_baud, 115200);
        assert_eq!(settings.simulated_devices.len(), 1);
        assert!(settings.simulated_devices[0].loopback);
    }

    #[test]
    fn test_zero_periods_are_clamped() {
        let settings = Settings {
            discovery_period_ms: 0,
            watchdog_period_ms: 0,
            ..Settings::default()
        };
        let config = settings.session_config();
        assert_eq!(config.discovery_period, Duration::from_millis(1));
        assert_eq!(config.watchdog_period, Duration::from_millis(1));
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("serlink").join("settings.json");

        let settings = Settings {
            simulate: true,
            close_timeout_ms: 500,
            ..Settings::default()
        };
        settings.save_to(&path).unwrap();
        assert_eq!(Settings::load_from(&path).unwrap(), settings);
    }

    #[test]
    fn test_load_errors_name_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.json");
        let err = Settings::load_from(&missing).unwrap_err();
        assert!(format!("{:#}", err).contains("missing.json"));

        let broken = dir.path().join("broken.json");
        std::fs::write(&broken, "{ not json").unwrap();
        let err = Settings::load_from(&broken).unwrap_err();
        assert!(format!("{:#}", err).contains("Failed to parse"));
    }
}
