//! Engine configuration.
//!
//! Every section has defaults, so an empty or partial TOML file is a valid
//! configuration. Use [`load_default_config`] to read the file from the
//! platform data directory, or [`load_config`] for an explicit path.

use crate::metrics::zones::ZoneDefinition;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Top-level engine configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Rolling window and peak tracker settings
    pub collectors: CollectorSettings,
    /// Nearby/groups cycle settings
    pub nearby: NearbySettings,
    /// Athlete registry lifecycle
    pub registry: RegistrySettings,
    /// Lap creation rules
    pub laps: LapSettings,
    /// Power zone scheme
    pub zones: ZoneSettings,
    /// W' balance defaults
    pub wbal: WBalSettings,
    /// Periodic cycle error handling
    pub cycle: CycleSettings,
}

/// Rolling window settings shared by every collector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectorSettings {
    /// Sample spacing windows are normalized to, in seconds
    pub ideal_gap: f64,
    /// Gaps longer than this are treated as a pause, in seconds
    pub max_gap: f64,
    /// Peak durations tracked for power, in seconds
    pub power_periods: Vec<u32>,
    /// Peak durations tracked for speed, heart rate and draft, in seconds
    pub long_periods: Vec<u32>,
}

impl Default for CollectorSettings {
    fn default() -> Self {
        Self {
            ideal_gap: 1.0,
            max_gap: 15.0,
            power_periods: vec![5, 15, 60, 300, 1200],
            long_periods: vec![60, 300, 1200],
        }
    }
}

/// Nearby and group computation settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NearbySettings {
    /// Cycle interval in milliseconds
    pub interval_ms: u64,
    /// Athletes without an update for this long are left out
    pub stale_after_secs: f64,
    /// Athletes further than this (in seconds) are left out
    pub max_gap_secs: f64,
    /// Gap between consecutive riders that splits a group
    pub group_gap_secs: f64,
    /// Sample count of the reference speed average
    pub ref_speed_window: u32,
}

impl Default for NearbySettings {
    fn default() -> Self {
        Self {
            interval_ms: 1000,
            stale_after_secs: 10.0,
            max_gap_secs: 900.0,
            group_gap_secs: 2.0,
            ref_speed_window: 10,
        }
    }
}

/// Athlete registry lifecycle settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistrySettings {
    /// Idle athletes are dropped after this many seconds
    pub idle_timeout_secs: f64,
    /// Interval of the idle sweep
    pub gc_interval_secs: u64,
}

impl Default for RegistrySettings {
    fn default() -> Self {
        Self {
            idle_timeout_secs: 1800.0,
            gc_interval_secs: 60,
        }
    }
}

/// What an automatic lap interval is measured in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AutoLapMetric {
    /// Seconds of elapsed time
    Time,
    /// Meters travelled
    Distance,
}

/// Automatic lap rule.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AutoLap {
    pub metric: AutoLapMetric,
    pub interval: f64,
}

/// Lap creation settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LapSettings {
    /// Optional fixed interval laps
    pub auto_lap: Option<AutoLap>,
    /// Start a lap when the athlete changes course or distance resets
    pub lap_on_course_change: bool,
}

impl Default for LapSettings {
    fn default() -> Self {
        Self {
            auto_lap: None,
            lap_on_course_change: true,
        }
    }
}

/// Power zone scheme selection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ZoneScheme {
    /// Coggan 7-zone model
    #[default]
    Coggan,
    /// Three-zone polarized model
    Polarized,
    /// Zones listed in `custom`
    Custom,
}

/// Power zone settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ZoneSettings {
    pub scheme: ZoneScheme,
    /// Add the sweet spot overlap zone (84-97% FTP)
    pub sweetspot: bool,
    /// Zone list used by [`ZoneScheme::Custom`]
    pub custom: Vec<ZoneDefinition>,
}

/// W' balance settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WBalSettings {
    /// W' in joules when the profile has CP or FTP but no W'
    pub default_w_prime: f64,
}

impl Default for WBalSettings {
    fn default() -> Self {
        Self {
            default_w_prime: 20000.0,
        }
    }
}

/// Periodic cycle failure handling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CycleSettings {
    /// Upper bound of the exponential backoff after failures
    pub max_backoff_secs: u64,
    /// Identical error messages are logged at most once per this window
    pub error_throttle_secs: u64,
}

impl Default for CycleSettings {
    fn default() -> Self {
        Self {
            max_backoff_secs: 60,
            error_throttle_secs: 60,
        }
    }
}

/// Get the application data directory.
pub fn get_data_dir() -> PathBuf {
    directories::ProjectDirs::from("com", "rideview", "RideView")
        .map(|dirs| dirs.data_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Get the default configuration file path.
pub fn default_config_path() -> PathBuf {
    get_data_dir().join("config.toml")
}

/// Load configuration from `path`.
pub fn load_config(path: &Path) -> Result<EngineConfig, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::IoError(e.to_string()))?;

    toml::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))
}

/// Load configuration from the default path, falling back to defaults when absent.
pub fn load_default_config() -> Result<EngineConfig, ConfigError> {
    let path = default_config_path();

    if !path.exists() {
        return Ok(EngineConfig::default());
    }

    load_config(&path)
}

/// Save configuration to `path`, creating parent directories.
pub fn save_config(config: &EngineConfig, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| ConfigError::IoError(e.to_string()))?;
    }

    let content = toml::to_string_pretty(config).map_err(|e| ConfigError::SerializeError(e.to_string()))?;

    std::fs::write(path, content).map_err(|e| ConfigError::IoError(e.to_string()))?;

    Ok(())
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Serialize error: {0}")]
    SerializeError(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: EngineConfig = toml::from_str(
            r#"
            [nearby]
            max_gap_secs = 600.0

            [laps.auto_lap]
            metric = "distance"
            interval = 1000.0
            "#,
        )
        .unwrap();

        assert_eq!(config.nearby.max_gap_secs, 600.0);
        assert_eq!(config.nearby.interval_ms, 1000);
        assert_eq!(config.collectors.power_periods, vec![5, 15, 60, 300, 1200]);
        assert_eq!(
            config.laps.auto_lap,
            Some(AutoLap {
                metric: AutoLapMetric::Distance,
                interval: 1000.0
            })
        );
        assert!(config.laps.lap_on_course_change);
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = EngineConfig::default();
        config.zones.scheme = ZoneScheme::Polarized;
        config.zones.sweetspot = true;
        config.registry.idle_timeout_secs = 600.0;

        save_config(&config, &path).unwrap();
        let loaded = load_config(&path).unwrap();

        assert_eq!(loaded, config);
    }

    #[test]
    fn test_load_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = load_config(&dir.path().join("missing.toml"));
        assert!(matches!(result, Err(ConfigError::IoError(_))));
    }

    #[test]
    fn test_invalid_toml_is_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "[nearby\ninterval_ms = ").unwrap();
        assert!(matches!(load_config(&path), Err(ConfigError::ParseError(_))));
    }
}
