//! Configuration for defeater detection and application
//!
//! Covers the staleness window, how severities translate into confidence
//! reductions, and how the activity computation treats cycles.

use crate::DefeaterError;
use attest_domain::DefeaterSeverity;
use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// How an active defeater lowers confidence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplicationMethod {
    /// Multiply by `1 - reduction[severity]`
    #[default]
    Severity,
    /// Posterior mean of a Beta-Binomial update with pseudo-failures
    Bayesian,
}

/// What to do with an odd meta-defeat cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OddCyclePolicy {
    /// Leave the defeaters undecided and mark the claim unverified
    #[default]
    SurfaceAmbiguity,
    /// Treat every defeater in the cycle as active
    AssumeActive,
    /// Treat every defeater in the cycle as inactive
    AssumeInactive,
}

/// Reduction factor per severity, each in `[0, 1]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReductionFactors {
    /// Default: 1.0
    #[serde(default = "default_full")]
    pub full: f64,
    /// Default: 0.5
    #[serde(default = "default_partial")]
    pub partial: f64,
    /// Default: 0.1
    #[serde(default = "default_warning")]
    pub warning: f64,
    /// Default: 0.0
    #[serde(default)]
    pub informational: f64,
}

fn default_full() -> f64 {
    1.0
}

fn default_partial() -> f64 {
    0.5
}

fn default_warning() -> f64 {
    0.1
}

impl Default for ReductionFactors {
    fn default() -> Self {
        Self {
            full: default_full(),
            partial: default_partial(),
            warning: default_warning(),
            informational: 0.0,
        }
    }
}

impl ReductionFactors {
    /// Factor for `severity`, clamped to `[0, 1]`
    pub fn get(&self, severity: DefeaterSeverity) -> f64 {
        let factor = match severity {
            DefeaterSeverity::Full => self.full,
            DefeaterSeverity::Partial => self.partial,
            DefeaterSeverity::Warning => self.warning,
            DefeaterSeverity::Informational => self.informational,
        };
        factor.clamp(0.0, 1.0)
    }
}

/// Pseudo-failures added per severity on the Bayesian path
///
/// Full severity has no entry: a full defeater always yields certain falsity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PseudoFailures {
    /// Default: 5.0
    #[serde(default = "default_partial_failures")]
    pub partial: f64,
    /// Default: 1.0
    #[serde(default = "default_warning_failures")]
    pub warning: f64,
    /// Default: 0.0
    #[serde(default)]
    pub informational: f64,
}

fn default_partial_failures() -> f64 {
    5.0
}

fn default_warning_failures() -> f64 {
    1.0
}

impl Default for PseudoFailures {
    fn default() -> Self {
        Self {
            partial: default_partial_failures(),
            warning: default_warning_failures(),
            informational: 0.0,
        }
    }
}

impl PseudoFailures {
    /// Count for `severity`; `None` for full severity
    pub fn get(&self, severity: DefeaterSeverity) -> Option<f64> {
        match severity {
            DefeaterSeverity::Full => None,
            DefeaterSeverity::Partial => Some(self.partial.max(0.0)),
            DefeaterSeverity::Warning => Some(self.warning.max(0.0)),
            DefeaterSeverity::Informational => Some(self.informational.max(0.0)),
        }
    }
}

/// Configuration for the defeater engine
///
/// # Examples
///
/// ```
/// use attest_defeater::{DefeaterConfig, OddCyclePolicy};
///
/// let config = DefeaterConfig::default();
/// assert_eq!(config.max_claim_age_hours, 720);
/// assert_eq!(config.odd_cycle_policy, OddCyclePolicy::SurfaceAmbiguity);
///
/// let config = DefeaterConfig::strict();
/// assert_eq!(config.max_claim_age_hours, 168);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DefeaterConfig {
    /// Claims older than this get a staleness defeater
    /// Default: 720 hours (30 days)
    #[serde(default = "default_max_claim_age_hours")]
    pub max_claim_age_hours: u64,

    /// Severity path reductions
    #[serde(default)]
    pub reduction: ReductionFactors,

    /// Default: severity
    #[serde(default)]
    pub application_method: ApplicationMethod,

    /// `alpha + beta` of the prior on the Bayesian path
    /// Default: 10.0
    #[serde(default = "default_prior_strength")]
    pub prior_strength: f64,

    /// Bayesian path pseudo-failures
    #[serde(default)]
    pub pseudo_failures: PseudoFailures,

    /// Labelling passes allowed per strongly connected component
    /// Default: 64
    #[serde(default = "default_max_fixpoint_iterations")]
    pub max_fixpoint_iterations: usize,

    /// Default: surface_ambiguity
    #[serde(default)]
    pub odd_cycle_policy: OddCyclePolicy,

    /// Write defeat events back to the ledger
    /// Default: true
    #[serde(default = "default_true")]
    pub record_events: bool,

    /// Depth used when a sweep propagates a new defeat to dependents
    /// Default: 8
    #[serde(default = "default_max_propagation_depth")]
    pub max_propagation_depth: usize,
}

fn default_max_claim_age_hours() -> u64 {
    720
}

fn default_prior_strength() -> f64 {
    10.0
}

fn default_max_fixpoint_iterations() -> usize {
    64
}

fn default_true() -> bool {
    true
}

fn default_max_propagation_depth() -> usize {
    8
}

impl Default for DefeaterConfig {
    fn default() -> Self {
        Self {
            max_claim_age_hours: default_max_claim_age_hours(),
            reduction: ReductionFactors::default(),
            application_method: ApplicationMethod::default(),
            prior_strength: default_prior_strength(),
            pseudo_failures: PseudoFailures::default(),
            max_fixpoint_iterations: default_max_fixpoint_iterations(),
            odd_cycle_policy: OddCyclePolicy::default(),
            record_events: true,
            max_propagation_depth: default_max_propagation_depth(),
        }
    }
}

#[derive(Deserialize)]
struct ConfigFile {
    defeater: DefeaterConfig,
}

impl DefeaterConfig {
    /// Short freshness window and harsher reductions
    ///
    /// - Max claim age: 168 hours (7 days)
    /// - Partial: 0.7, warning: 0.25
    pub fn strict() -> Self {
        Self {
            max_claim_age_hours: 168,
            reduction: ReductionFactors {
                partial: 0.7,
                warning: 0.25,
                ..ReductionFactors::default()
            },
            ..Self::default()
        }
    }

    /// Long freshness window and milder reductions
    ///
    /// - Max claim age: 2160 hours (90 days)
    /// - Partial: 0.3, warning: 0.05
    pub fn lenient() -> Self {
        Self {
            max_claim_age_hours: 2160,
            reduction: ReductionFactors {
                partial: 0.3,
                warning: 0.05,
                ..ReductionFactors::default()
            },
            ..Self::default()
        }
    }

    /// Freshness window as a duration, capped at a million hours
    pub fn max_claim_age(&self) -> Duration {
        Duration::hours(self.max_claim_age_hours.min(1_000_000) as i64)
    }

    /// Parse a bare `DefeaterConfig` TOML document
    pub fn from_toml_str(toml_str: &str) -> Result<Self, DefeaterError> {
        toml::from_str(toml_str)
            .map_err(|e| DefeaterError::Config(format!("Failed to parse TOML: {}", e)))
    }

    /// Load the `[defeater]` section of a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, DefeaterError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| DefeaterError::Config(format!("Failed to read config file: {}", e)))?;
        let file: ConfigFile = toml::from_str(&contents)
            .map_err(|e| DefeaterError::Config(format!("Failed to parse TOML: {}", e)))?;
        Ok(file.defeater)
    }
}
