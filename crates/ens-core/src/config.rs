//! Configuration management

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, Result};

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub mixer: MixerSettings,
    pub debug: DebugConfig,
    pub simulation: SimulationConfig,
}

/// Engine settings, mapped onto the mixer's own config at startup
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MixerSettings {
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Length of one mixing frame in milliseconds
    pub frame_duration_ms: u32,
    /// Relay directly between two parties instead of mixing
    pub direct_mode: bool,
    /// Prefer silent frames when correcting a flooding channel
    pub vad: bool,
    /// AGC target level, 0 disables
    pub agc_level: u32,
}

impl Default for MixerSettings {
    fn default() -> Self {
        Self {
            sample_rate: 8000,
            frame_duration_ms: 20,
            direct_mode: true,
            vad: false,
            agc_level: 0,
        }
    }
}

/// Log verbosity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Debugging and logging settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DebugConfig {
    pub log_level: LogLevel,
    /// Separate verbosity for the mixing engine, defaults to `log_level`
    pub mixer_log_level: Option<LogLevel>,
    pub log_to_file: bool,
    pub log_path: PathBuf,
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            log_level: LogLevel::Info,
            mixer_log_level: None,
            log_to_file: false,
            log_path: PathBuf::from("ensemble.log"),
        }
    }
}

/// Parameters for the session simulator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Remote participants joining the session
    pub participants: usize,
    /// Scheduler cycles to run
    pub cycles: u32,
    /// Peak amplitude of each participant's tone
    pub amplitude: i16,
    /// Cycle at which the device source stalls, 0 for never
    pub stall_at_cycle: u32,
    /// Number of cycles the device source stays stalled
    pub stall_length: u32,
    /// Cycle after which the last participant goes silent, 0 for never
    pub drop_participant_at_cycle: u32,
    /// Pace the transport at the frame duration instead of running flat out
    pub realtime: bool,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            participants: 3,
            cycles: 200,
            amplitude: 6000,
            stall_at_cycle: 50,
            stall_length: 12,
            drop_participant_at_cycle: 120,
            realtime: true,
        }
    }
}

impl Config {
    /// Default location of the config file
    pub fn config_path() -> Result<PathBuf> {
        let dir = dirs::config_dir().ok_or(ConfigError::NoConfigDir)?;
        Ok(dir.join("ensemble").join("config.toml"))
    }

    /// Load the config from its default location, falling back to defaults
    /// when no file exists yet.
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        if !path.exists() {
            return Ok(Self::default());
        }
        Self::load_from(&path)
    }

    /// Load the config from an explicit path
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config = Self::from_toml(&content)?;
        tracing::debug!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Parse a config from TOML text
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()).into())
    }

    /// Save the config to its default location
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    /// Save the config to an explicit path
    pub fn save_to(&self, path: &Path) -> Result<()> {
        let content =
            toml::to_string_pretty(self).map_err(|e| ConfigError::Serialize(e.to_string()))?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EnsembleError;

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config = Config::from_toml(
            r#"
            [mixer]
            sample_rate = 16000
            vad = true

            [debug]
            log_level = "warn"
            mixer_log_level = "trace"
            "#,
        )
        .unwrap();

        assert_eq!(config.mixer.sample_rate, 16000);
        assert!(config.mixer.vad);
        assert_eq!(config.mixer.frame_duration_ms, 20);
        assert!(config.mixer.direct_mode);
        assert_eq!(config.debug.log_level, LogLevel::Warn);
        assert_eq!(config.debug.mixer_log_level, Some(LogLevel::Trace));
        assert_eq!(config.simulation, SimulationConfig::default());
    }

    #[test]
    fn test_roundtrip_through_toml() {
        let mut config = Config::default();
        config.mixer.agc_level = 8000;
        config.simulation.participants = 5;

        let text = toml::to_string_pretty(&config).unwrap();
        assert_eq!(Config::from_toml(&text).unwrap(), config);
    }

    #[test]
    fn test_malformed_file_is_parse_error() {
        let err = Config::from_toml("[mixer]\nsample_rate = \"fast\"").unwrap_err();
        assert!(matches!(err, EnsembleError::Config(ConfigError::Parse(_))));
    }
}
