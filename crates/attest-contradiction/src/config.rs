//! Contradiction tracker configuration

use crate::ContradictionError;
use attest_domain::ContradictionSeverity;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Which conflicts to flag and how to grade them
///
/// Severity is read from the weaker of the two claims: a contradiction is
/// only as pressing as its least confident side.
///
/// # Examples
///
/// ```
/// use attest_contradiction::TrackerConfig;
/// use attest_domain::ContradictionSeverity;
///
/// let config = TrackerConfig::default();
/// assert_eq!(config.severity_for(0.8), ContradictionSeverity::Blocking);
/// assert_eq!(config.severity_for(0.5), ContradictionSeverity::Significant);
/// assert_eq!(config.severity_for(0.1), ContradictionSeverity::Minor);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackerConfig {
    /// Flag a proposition against its own negation
    /// Default: true
    #[serde(default = "default_true")]
    pub detect_negation: bool,

    /// Flag the same predicate asserted with different values
    /// Default: true
    #[serde(default = "default_true")]
    pub detect_conflicting_values: bool,

    /// Weaker-side confidence at or above which a contradiction blocks
    /// Default: 0.7
    #[serde(default = "default_blocking_threshold")]
    pub blocking_threshold: f64,

    /// Weaker-side confidence at or above which a contradiction is significant
    /// Default: 0.4
    #[serde(default = "default_significant_threshold")]
    pub significant_threshold: f64,
}

fn default_true() -> bool {
    true
}

fn default_blocking_threshold() -> f64 {
    0.7
}

fn default_significant_threshold() -> f64 {
    0.4
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            detect_negation: true,
            detect_conflicting_values: true,
            blocking_threshold: default_blocking_threshold(),
            significant_threshold: default_significant_threshold(),
        }
    }
}

#[derive(Deserialize)]
struct ConfigFile {
    contradiction: TrackerConfig,
}

impl TrackerConfig {
    /// Escalate early
    ///
    /// - Blocking from 0.5, significant from 0.2
    pub fn strict() -> Self {
        Self {
            blocking_threshold: 0.5,
            significant_threshold: 0.2,
            ..Self::default()
        }
    }

    /// Only outright negations, graded conservatively
    ///
    /// - Conflicting values are not flagged
    /// - Blocking from 0.85, significant from 0.6
    pub fn lenient() -> Self {
        Self {
            detect_conflicting_values: false,
            blocking_threshold: 0.85,
            significant_threshold: 0.6,
            ..Self::default()
        }
    }

    /// Severity for a weaker-side confidence
    pub fn severity_for(&self, confidence: f64) -> ContradictionSeverity {
        if confidence >= self.blocking_threshold {
            ContradictionSeverity::Blocking
        } else if confidence >= self.significant_threshold {
            ContradictionSeverity::Significant
        } else {
            ContradictionSeverity::Minor
        }
    }

    /// Check the thresholds are ordered probabilities
    pub fn validate(&self) -> Result<(), ContradictionError> {
        for (name, value) in [
            ("blocking_threshold", self.blocking_threshold),
            ("significant_threshold", self.significant_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ContradictionError::Config(format!(
                    "{} must be in [0, 1], got {}",
                    name, value
                )));
            }
        }
        if self.significant_threshold > self.blocking_threshold {
            return Err(ContradictionError::Config(format!(
                "significant_threshold {} exceeds blocking_threshold {}",
                self.significant_threshold, self.blocking_threshold
            )));
        }
        Ok(())
    }

    /// Parse from a TOML string
    pub fn from_toml_str(toml_str: &str) -> Result<Self, ContradictionError> {
        toml::from_str(toml_str)
            .map_err(|e| ContradictionError::Config(format!("Failed to parse TOML: {}", e)))
    }

    /// Load the `[contradiction]` section of a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ContradictionError> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            ContradictionError::Config(format!("Failed to read config file: {}", e))
        })?;
        let file: ConfigFile = toml::from_str(&contents)
            .map_err(|e| ContradictionError::Config(format!("Failed to parse TOML: {}", e)))?;
        Ok(file.contradiction)
    }
}
