//! Configuration for penstream
//!
//! Three sections, each with defaults matching the firmware's expectations:
//! - `connection`: port, baud rate and link timing
//! - `streaming`: status poll cadence, watchdog window, progress interval
//! - `geometry`: arc linearization resolution
//!
//! Files are JSON or TOML, chosen by extension. Missing keys fall back to
//! their defaults, so a file only needs the values it changes.

use crate::error::{SettingsError, SettingsResult};
use penstream_communication::{ConnectionParams, EngineConfig};
use penstream_gcode::ArcLinearizerConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Serial link settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionSettings {
    /// Serial port name; empty means "ask on the command line"
    pub port: String,
    /// Baud rate
    pub baud_rate: u32,
    /// Wait after waking the firmware before discarding its boot output (ms)
    pub settle_ms: u64,
    /// Longest a single read may block (ms)
    pub read_timeout_ms: u64,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            port: String::new(),
            baud_rate: 115_200,
            settle_ms: 2_000,
            read_timeout_ms: 50,
        }
    }
}

/// Streaming engine settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamingSettings {
    /// Status query cadence (ms)
    pub status_poll_ms: u64,
    /// Time since the last send before an idle report counts as a lost ack (ms)
    pub watchdog_ms: u64,
    /// Report progress every N sent commands
    pub progress_interval: usize,
}

impl Default for StreamingSettings {
    fn default() -> Self {
        Self {
            status_poll_ms: 500,
            watchdog_ms: 1_000,
            progress_interval: 5,
        }
    }
}

/// Program preprocessing settings
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeometrySettings {
    /// Maximum chord length when replacing arcs (mm)
    pub arc_resolution: f64,
}

impl Default for GeometrySettings {
    fn default() -> Self {
        Self {
            arc_resolution: 0.5,
        }
    }
}

/// Complete application configuration
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub connection: ConnectionSettings,
    pub streaming: StreamingSettings,
    pub geometry: GeometrySettings,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Format {
    Json,
    Toml,
}

impl Format {
    fn from_path(path: &Path) -> SettingsResult<Self> {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => Ok(Self::Json),
            Some("toml") => Ok(Self::Toml),
            other => Err(SettingsError::UnsupportedFormat(
                other.unwrap_or("<none>").to_string(),
            )),
        }
    }
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    /// `<config dir>/penstream/config.toml`
    pub fn default_path() -> SettingsResult<PathBuf> {
        dirs::config_dir()
            .map(|dir| dir.join("penstream").join("config.toml"))
            .ok_or_else(|| {
                SettingsError::ConfigDirectory("no configuration directory on this platform".into())
            })
    }

    /// Load config from file (JSON or TOML)
    pub fn load_from_file(path: &Path) -> SettingsResult<Self> {
        let format = Format::from_path(path)?;
        let content = std::fs::read_to_string(path)?;

        let config: Self = match format {
            Format::Json => serde_json::from_str(&content)?,
            Format::Toml => toml::from_str(&content)?,
        };

        config.validate()?;
        Ok(config)
    }

    /// Load `path` if it exists, otherwise return the defaults
    pub fn load_or_default(path: &Path) -> SettingsResult<Self> {
        if path.exists() {
            Self::load_from_file(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Save config to file (JSON or TOML), creating parent directories
    pub fn save_to_file(&self, path: &Path) -> SettingsResult<()> {
        self.validate()?;

        let content = match Format::from_path(path)? {
            Format::Json => serde_json::to_string_pretty(self)?,
            Format::Toml => toml::to_string_pretty(self)?,
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> SettingsResult<()> {
        if self.connection.baud_rate == 0 {
            return Err(SettingsError::invalid("connection.baud_rate", "must be > 0"));
        }
        if self.connection.read_timeout_ms == 0 {
            return Err(SettingsError::invalid(
                "connection.read_timeout_ms",
                "must be > 0",
            ));
        }
        if self.streaming.status_poll_ms == 0 {
            return Err(SettingsError::invalid(
                "streaming.status_poll_ms",
                "must be > 0",
            ));
        }
        if self.streaming.watchdog_ms == 0 {
            return Err(SettingsError::invalid("streaming.watchdog_ms", "must be > 0"));
        }
        if self.streaming.progress_interval == 0 {
            return Err(SettingsError::invalid(
                "streaming.progress_interval",
                "must be > 0",
            ));
        }
        if !(self.geometry.arc_resolution > 0.0 && self.geometry.arc_resolution.is_finite()) {
            return Err(SettingsError::invalid(
                "geometry.arc_resolution",
                "must be a positive number",
            ));
        }
        Ok(())
    }

    pub fn connection_params(&self) -> ConnectionParams {
        ConnectionParams {
            port: self.connection.port.clone(),
            baud_rate: self.connection.baud_rate,
            settle_ms: self.connection.settle_ms,
            read_timeout_ms: self.connection.read_timeout_ms,
        }
    }

    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            status_poll_ms: self.streaming.status_poll_ms,
            watchdog_ms: self.streaming.watchdog_ms,
            progress_interval: self.streaming.progress_interval,
            arc_resolution: self.geometry.arc_resolution,
        }
    }

    pub fn arc_config(&self) -> ArcLinearizerConfig {
        ArcLinearizerConfig {
            resolution: self.geometry.arc_resolution,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_engine() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.engine_config(), EngineConfig::default());

        let params = config.connection_params();
        assert_eq!(params.baud_rate, 115_200);
        assert_eq!(params.settle_ms, 2_000);
    }

    #[test]
    fn test_validate_rejects_zero_values() {
        let mut config = Config::default();
        config.streaming.watchdog_ms = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.geometry.arc_resolution = -1.0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.geometry.arc_resolution = f64::NAN;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: Config = toml::from_str("[connection]\nport = \"/dev/ttyUSB0\"\n").unwrap();
        assert_eq!(config.connection.port, "/dev/ttyUSB0");
        assert_eq!(config.connection.baud_rate, 115_200);
        assert_eq!(config.streaming, StreamingSettings::default());
    }

    #[test]
    fn test_unsupported_extension() {
        let err = Config::default()
            .save_to_file(Path::new("config.yaml"))
            .unwrap_err();
        assert!(matches!(err, SettingsError::UnsupportedFormat(ext) if ext == "yaml"));
    }
}
