//! Declarative settings for a consolidation and windowing run.
//!
//! A run is configured from an optional JSON file, then patched by
//! `SPIRAL_FIELD_*` environment variables, then validated. The library crates
//! take plain arguments; this struct only collects them in one place for the
//! command line tooling.

use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use thiserror::Error;

/// On-disk archive flavour requested for newly written archives.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArchiveModeSetting {
    Fast,
    #[default]
    Compact,
}

/// Whether standardization statistics are pooled over the whole window or
/// kept per window element.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScalerScopeSetting {
    #[default]
    Global,
    PerFeature,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    pub archive_mode: ArchiveModeSetting,
    /// Deflate level for compact archives, 0..=9.
    pub compression_level: u32,
    /// Snapshot prefix kept in development archives.
    pub dev_snapshots: usize,
    /// Window extent per axis (snapshot, x, y, z). Every entry must be odd.
    pub window_shape: [usize; 4],
    pub regularization: f64,
    pub keep_ratio: f64,
    pub scaler_floor: Option<f64>,
    pub scaler_scope: ScalerScopeSetting,
    pub holdout_fraction: f64,
    pub seed: Option<u64>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            archive_mode: ArchiveModeSetting::Compact,
            compression_level: 6,
            dev_snapshots: 2,
            window_shape: [3, 3, 3, 3],
            regularization: 1.0,
            keep_ratio: 0.95,
            scaler_floor: None,
            scaler_scope: ScalerScopeSetting::Global,
            holdout_fraction: 0.2,
            seed: None,
        }
    }
}

/// Errors raised while assembling a [`PipelineConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed config file: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("environment override {key}={value:?} is not valid")]
    Env { key: &'static str, value: String },
    #[error("invalid pipeline setting `{field}`: {reason}")]
    Invalid {
        field: &'static str,
        reason: &'static str,
    },
}

impl PipelineConfig {
    /// Loads a JSON config file. Missing keys fall back to defaults.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let reader = BufReader::new(File::open(path.as_ref())?);
        let config: PipelineConfig = serde_json::from_reader(reader)?;
        Ok(config)
    }

    /// Full resolution: optional file, environment overrides, validation.
    pub fn resolve(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_json_file(path)?,
            None => Self::default(),
        };
        config.apply_env()?;
        config.validate()?;
        Ok(config)
    }

    /// Applies `SPIRAL_FIELD_*` overrides on top of the current values.
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        if let Some(raw) = env_value("SPIRAL_FIELD_ARCHIVE_MODE") {
            self.archive_mode = match raw.as_str() {
                "fast" => ArchiveModeSetting::Fast,
                "compact" => ArchiveModeSetting::Compact,
                _ => return Err(env_error("SPIRAL_FIELD_ARCHIVE_MODE", raw)),
            };
        }
        if let Some(raw) = env_value("SPIRAL_FIELD_COMPRESSION_LEVEL") {
            self.compression_level = parse_env("SPIRAL_FIELD_COMPRESSION_LEVEL", raw)?;
        }
        if let Some(raw) = env_value("SPIRAL_FIELD_DEV_SNAPSHOTS") {
            self.dev_snapshots = parse_env("SPIRAL_FIELD_DEV_SNAPSHOTS", raw)?;
        }
        if let Some(raw) = env_value("SPIRAL_FIELD_WINDOW") {
            self.window_shape = parse_window(&raw)
                .ok_or_else(|| env_error("SPIRAL_FIELD_WINDOW", raw.clone()))?;
        }
        if let Some(raw) = env_value("SPIRAL_FIELD_REGULARIZATION") {
            self.regularization = parse_env("SPIRAL_FIELD_REGULARIZATION", raw)?;
        }
        if let Some(raw) = env_value("SPIRAL_FIELD_KEEP_RATIO") {
            self.keep_ratio = parse_env("SPIRAL_FIELD_KEEP_RATIO", raw)?;
        }
        if let Some(raw) = env_value("SPIRAL_FIELD_SCALER_FLOOR") {
            self.scaler_floor = Some(parse_env("SPIRAL_FIELD_SCALER_FLOOR", raw)?);
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.compression_level > 9 {
            return Err(invalid("compression_level", "must be within 0..=9"));
        }
        if self.dev_snapshots == 0 {
            return Err(invalid("dev_snapshots", "must be positive"));
        }
        if self.window_shape.iter().any(|&w| w == 0 || w % 2 == 0) {
            return Err(invalid("window_shape", "every extent must be odd and >= 1"));
        }
        if !(self.regularization >= 0.0 && self.regularization.is_finite()) {
            return Err(invalid("regularization", "must be finite and non-negative"));
        }
        if !(self.keep_ratio > 0.0 && self.keep_ratio <= 1.0) {
            return Err(invalid("keep_ratio", "must lie in (0, 1]"));
        }
        if let Some(floor) = self.scaler_floor {
            if !(floor > 0.0 && floor.is_finite()) {
                return Err(invalid("scaler_floor", "must be finite and positive"));
            }
        }
        if !(0.0..1.0).contains(&self.holdout_fraction) {
            return Err(invalid("holdout_fraction", "must lie in [0, 1)"));
        }
        Ok(())
    }
}

fn env_value(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|raw| raw.trim().to_string())
        .filter(|raw| !raw.is_empty())
}

fn parse_env<T: std::str::FromStr>(key: &'static str, raw: String) -> Result<T, ConfigError> {
    raw.parse::<T>().map_err(|_| env_error(key, raw))
}

fn parse_window(raw: &str) -> Option<[usize; 4]> {
    let parts: Vec<usize> = raw
        .split(',')
        .map(|part| part.trim().parse::<usize>())
        .collect::<Result<_, _>>()
        .ok()?;
    parts.try_into().ok()
}

fn env_error(key: &'static str, value: String) -> ConfigError {
    ConfigError::Env { key, value }
}

fn invalid(field: &'static str, reason: &'static str) -> ConfigError {
    ConfigError::Invalid { field, reason }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn defaults_validate() {
        PipelineConfig::default().validate().unwrap();
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, r#"{{"archive_mode": "fast", "window_shape": [1, 5, 5, 5]}}"#).unwrap();
        let config = PipelineConfig::from_json_file(file.path()).unwrap();
        assert_eq!(config.archive_mode, ArchiveModeSetting::Fast);
        assert_eq!(config.window_shape, [1, 5, 5, 5]);
        assert_eq!(config.keep_ratio, 0.95);
        assert_eq!(config.dev_snapshots, 2);
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, r#"{{"window": [3, 3, 3, 3]}}"#).unwrap();
        assert!(matches!(
            PipelineConfig::from_json_file(file.path()),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn even_windows_fail_validation() {
        let config = PipelineConfig {
            window_shape: [3, 4, 3, 3],
            ..PipelineConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid {
                field: "window_shape",
                ..
            })
        ));
    }

    #[test]
    fn keep_ratio_bounds_are_enforced() {
        let config = PipelineConfig {
            keep_ratio: 0.0,
            ..PipelineConfig::default()
        };
        assert!(config.validate().is_err());
        let config = PipelineConfig {
            keep_ratio: 1.0,
            ..PipelineConfig::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn window_override_parses_comma_list() {
        assert_eq!(parse_window("1, 3,5 ,7"), Some([1, 3, 5, 7]));
        assert_eq!(parse_window("3,3,3"), None);
        assert_eq!(parse_window("3,x,3,3"), None);
    }
}
