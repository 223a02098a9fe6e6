//! Calibration configuration

use crate::pac::compute_min_samples_for_calibration;
use crate::CalibrationError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Calibration settings
///
/// # Examples
///
/// ```
/// use attest_calibration::CalibrationConfig;
///
/// let config = CalibrationConfig::default();
/// assert_eq!(config.num_buckets, 10);
/// assert_eq!(config.min_samples().unwrap(), 600);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationConfig {
    /// Buckets in a calibration curve
    /// Default: 10
    #[serde(default = "default_num_buckets")]
    pub num_buckets: usize,

    /// Accuracy the PAC floor guarantees
    /// Default: 0.05
    #[serde(default = "default_epsilon")]
    pub epsilon: f64,

    /// Failure probability the PAC floor allows
    /// Default: 0.1
    #[serde(default = "default_delta")]
    pub delta: f64,

    /// Normal quantile for Wilson intervals
    /// Default: 1.96 (95%)
    #[serde(default = "default_wilson_z")]
    pub wilson_z: f64,

    /// Minutes between background recomputations
    /// Default: 60
    #[serde(default = "default_recompute_interval_minutes")]
    pub recompute_interval_minutes: u64,

    /// Append a `calibration` entry per category on each publication
    /// Default: true
    #[serde(default = "default_true")]
    pub record_snapshots: bool,
}

fn default_num_buckets() -> usize {
    10
}

fn default_epsilon() -> f64 {
    0.05
}

fn default_delta() -> f64 {
    0.1
}

fn default_wilson_z() -> f64 {
    1.96
}

fn default_recompute_interval_minutes() -> u64 {
    60
}

fn default_true() -> bool {
    true
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            num_buckets: default_num_buckets(),
            epsilon: default_epsilon(),
            delta: default_delta(),
            wilson_z: default_wilson_z(),
            recompute_interval_minutes: default_recompute_interval_minutes(),
            record_snapshots: true,
        }
    }
}

#[derive(Deserialize)]
struct ConfigFile {
    calibration: CalibrationConfig,
}

impl CalibrationConfig {
    /// Tighter guarantees, more samples needed
    ///
    /// - epsilon 0.03, delta 0.05 (2,050 samples)
    /// - 99% Wilson intervals
    pub fn strict() -> Self {
        Self {
            epsilon: 0.03,
            delta: 0.05,
            wilson_z: 2.576,
            ..Self::default()
        }
    }

    /// Looser guarantees for young deployments
    ///
    /// - epsilon 0.1, delta 0.2 (116 samples)
    /// - Recompute every 15 minutes
    pub fn lenient() -> Self {
        Self {
            epsilon: 0.1,
            delta: 0.2,
            recompute_interval_minutes: 15,
            ..Self::default()
        }
    }

    /// PAC sample floor for these settings
    pub fn min_samples(&self) -> Result<usize, CalibrationError> {
        compute_min_samples_for_calibration(self.epsilon, self.delta)
    }

    /// Interval between background recomputations, at least one minute
    pub fn recompute_interval(&self) -> Duration {
        Duration::from_secs(self.recompute_interval_minutes.max(1) * 60)
    }

    /// Check every parameter is in range
    pub fn validate(&self) -> Result<(), CalibrationError> {
        if self.num_buckets == 0 {
            return Err(CalibrationError::InvalidParameter(
                "num_buckets must be positive".to_string(),
            ));
        }
        if !(self.wilson_z.is_finite() && self.wilson_z > 0.0) {
            return Err(CalibrationError::InvalidParameter(format!(
                "wilson_z must be positive, got {}",
                self.wilson_z
            )));
        }
        self.min_samples().map(|_| ())
    }

    /// Parse a bare `CalibrationConfig` TOML document
    pub fn from_toml_str(toml_str: &str) -> Result<Self, CalibrationError> {
        toml::from_str(toml_str)
            .map_err(|e| CalibrationError::Config(format!("Failed to parse TOML: {}", e)))
    }

    /// Load the `[calibration]` section of a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, CalibrationError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| CalibrationError::Config(format!("Failed to read config file: {}", e)))?;
        let file: ConfigFile = toml::from_str(&contents)
            .map_err(|e| CalibrationError::Config(format!("Failed to parse TOML: {}", e)))?;
        Ok(file.calibration)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = CalibrationConfig::default();
        assert_eq!(config.num_buckets, 10);
        assert_eq!(config.epsilon, 0.05);
        assert_eq!(config.delta, 0.1);
        assert_eq!(config.wilson_z, 1.96);
        assert_eq!(config.recompute_interval(), Duration::from_secs(3600));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_preset_sample_floors() {
        assert_eq!(CalibrationConfig::strict().min_samples().unwrap(), 2050);
        assert_eq!(CalibrationConfig::lenient().min_samples().unwrap(), 116);
    }

    #[test]
    fn test_interval_has_a_floor() {
        let config = CalibrationConfig {
            recompute_interval_minutes: 0,
            ..CalibrationConfig::default()
        };
        assert_eq!(config.recompute_interval(), Duration::from_secs(60));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let zero_buckets = CalibrationConfig {
            num_buckets: 0,
            ..CalibrationConfig::default()
        };
        assert!(zero_buckets.validate().is_err());

        let bad_delta = CalibrationConfig {
            delta: 1.5,
            ..CalibrationConfig::default()
        };
        assert!(bad_delta.validate().is_err());
    }

    #[test]
    fn test_parse_partial_toml() {
        let config = CalibrationConfig::from_toml_str("num_buckets = 20\nepsilon = 0.1").unwrap();
        assert_eq!(config.num_buckets, 20);
        assert_eq!(config.epsilon, 0.1);
        assert_eq!(config.delta, 0.1);
        assert!(config.record_snapshots);
    }
}
