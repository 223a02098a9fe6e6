//! Typed confidence values
//!
//! A confidence is never a bare number. Each [`ConfidenceValue`] says where
//! its number came from:
//!
//! - `Deterministic`: the answer is known to be exactly true or false
//! - `Derived`: computed by a named [`Formula`] over other confidence values
//! - `Measured`: observed against a dataset of outcomes
//! - `Bounded`: an analytic or literature range with a citation
//! - `Absent`: no trustworthy number exists, with the reason why
//!
//! `Absent` is the only legal representation of "we do not know". Code that
//! needs a number must go through [`crate::algebra::get_effective_confidence`]
//! or [`ConfidenceValue::point_value`] and deal with the `None`/error case.

use crate::defeater::DefeaterId;
use crate::error::ConfidenceError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Tolerance used when re-evaluating derived values
pub const DERIVATION_TOLERANCE: f64 = 1e-9;

/// Whether a value still carries empirical calibration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CalibrationStatus {
    /// Every input was calibrated (or certain)
    Preserved,
    /// At least one input was heuristic or uncalibrated
    Degraded,
}

/// Why a defeat computation could not be traced to a definite answer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TraceGap {
    /// An odd-length defeat cycle has no stable labelling
    DefeatCycleAmbiguous,
    /// The defeater fixpoint did not converge within its iteration cap
    DefeatFixpointExceeded,
}

impl TraceGap {
    /// Wire name of the gap
    pub fn as_str(&self) -> &'static str {
        match self {
            TraceGap::DefeatCycleAmbiguous => "defeat_cycle_ambiguous",
            TraceGap::DefeatFixpointExceeded => "defeat_fixpoint_exceeded",
        }
    }
}

/// Reason attached to an absent confidence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "code", content = "detail", rename_all = "snake_case")]
pub enum AbsentReason {
    /// The producing category has not been calibrated
    Uncalibrated,
    /// Too few outcome samples to estimate anything
    InsufficientData,
    /// Confidence does not apply to this entry
    NotApplicable,
    /// An operator was given nothing to combine
    NoInputs,
    /// The defeat computation stopped short of an answer
    UnverifiedByTrace(TraceGap),
}

impl fmt::Display for AbsentReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AbsentReason::Uncalibrated => write!(f, "uncalibrated"),
            AbsentReason::InsufficientData => write!(f, "insufficient_data"),
            AbsentReason::NotApplicable => write!(f, "not_applicable"),
            AbsentReason::NoInputs => write!(f, "no_inputs"),
            AbsentReason::UnverifiedByTrace(gap) => {
                write!(f, "unverified_by_trace({})", gap.as_str())
            }
        }
    }
}

/// Where a bounded range comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BoundBasis {
    /// Follows from the structure of the problem
    Theoretical,
    /// Reported in published literature
    Literature,
    /// Proven by formal analysis of the artifact
    FormalAnalysis,
    /// Wilson score interval over observed outcomes
    WilsonInterval,
}

/// Named formula a derived value was computed with
///
/// Every variant can be re-evaluated from the point values of the inputs,
/// which is what [`ConfidenceValue::verify_derivation`] relies on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Formula {
    /// Weakest link
    Min,
    /// Strongest input
    Max,
    /// Independent conjunction
    Product,
    /// Independent disjunction, `1 - prod(1 - p)`
    NoisyOr,
    /// Fixed severity reduction, `p * (1 - reduction)`
    SeverityDefeat {
        /// Defeater that was applied
        defeater: DefeaterId,
        /// Reduction factor in `[0, 1]`
        reduction: f64,
    },
    /// Beta-binomial update, `alpha / (alpha + beta + pseudo_failures)`
    BetaBinomialDefeat {
        /// Defeater that was applied
        defeater: DefeaterId,
        /// `alpha + beta` of the prior
        prior_strength: f64,
        /// Pseudo-failure count added for the defeater's severity
        pseudo_failures: f64,
    },
    /// Isotonic mapping learned from a category's outcomes
    IsotonicCalibration {
        /// Category whose mapping was used
        category: String,
        /// Snapshot version the mapping came from
        snapshot_version: u64,
        /// Result of the mapping
        mapped: f64,
    },
    /// A claim's own value capped by the claims it depends on
    Dependency,
}

impl Formula {
    /// Short name for logs and audit text
    pub fn name(&self) -> &'static str {
        match self {
            Formula::Min => "min",
            Formula::Max => "max",
            Formula::Product => "product",
            Formula::NoisyOr => "noisy_or",
            Formula::SeverityDefeat { .. } => "severity_defeat",
            Formula::BetaBinomialDefeat { .. } => "beta_binomial_defeat",
            Formula::IsotonicCalibration { .. } => "isotonic_calibration",
            Formula::Dependency => "dependency",
        }
    }

    /// Evaluate the formula over input point values
    ///
    /// Returns `None` when the inputs do not fit the formula (empty input,
    /// or a unary formula given anything but one input).
    pub fn evaluate(&self, inputs: &[f64]) -> Option<f64> {
        if inputs.is_empty() {
            return None;
        }
        let value = match self {
            Formula::Min | Formula::Dependency => {
                inputs.iter().copied().fold(f64::INFINITY, f64::min)
            }
            Formula::Max => inputs.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            Formula::Product => inputs.iter().product::<f64>(),
            Formula::NoisyOr => 1.0 - inputs.iter().map(|p| 1.0 - p).product::<f64>(),
            Formula::SeverityDefeat { reduction, .. } => {
                let [p] = inputs else { return None };
                p * (1.0 - reduction)
            }
            Formula::BetaBinomialDefeat {
                prior_strength,
                pseudo_failures,
                ..
            } => {
                let [p] = inputs else { return None };
                let alpha = p * prior_strength;
                let denominator = prior_strength + pseudo_failures;
                if denominator <= 0.0 {
                    *p
                } else {
                    alpha / denominator
                }
            }
            Formula::IsotonicCalibration { mapped, .. } => {
                if inputs.len() != 1 {
                    return None;
                }
                *mapped
            }
        };
        Some(value.clamp(0.0, 1.0))
    }
}

/// A typed confidence value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ConfidenceValue {
    /// Known to be exactly true (1.0) or false (0.0)
    Deterministic {
        /// Truth value
        value: bool,
        /// What makes the value certain
        reason: String,
    },
    /// Computed by a formula over other confidence values
    Derived {
        /// Result in `[0, 1]`
        value: f64,
        /// Formula used
        formula: Formula,
        /// Values the formula was applied to
        inputs: Vec<ConfidenceValue>,
        /// Whether calibration survived the derivation
        calibration_status: CalibrationStatus,
    },
    /// Empirically measured against a dataset
    Measured {
        /// Observed success rate in `[0, 1]`
        value: f64,
        /// Dataset the measurement came from
        dataset_id: String,
        /// Number of samples observed
        sample_size: u64,
        /// Lower end of the confidence interval
        ci_low: f64,
        /// Upper end of the confidence interval
        ci_high: f64,
    },
    /// Analytic range with a cited basis
    Bounded {
        /// Lower bound
        low: f64,
        /// Upper bound
        high: f64,
        /// Source of the bound
        basis: BoundBasis,
        /// Citation backing the bound
        citation: String,
    },
    /// No trustworthy number exists
    Absent {
        /// Why the value is absent
        reason: AbsentReason,
    },
}

impl ConfidenceValue {
    /// Certain value with a stated reason
    pub fn deterministic(value: bool, reason: impl Into<String>) -> Self {
        ConfidenceValue::Deterministic {
            value,
            reason: reason.into(),
        }
    }

    /// Absent value with a reason
    pub fn absent(reason: AbsentReason) -> Self {
        ConfidenceValue::Absent { reason }
    }

    /// Measured value with its interval
    pub fn measured(
        value: f64,
        dataset_id: impl Into<String>,
        sample_size: u64,
        ci_low: f64,
        ci_high: f64,
    ) -> Self {
        ConfidenceValue::Measured {
            value,
            dataset_id: dataset_id.into(),
            sample_size,
            ci_low,
            ci_high,
        }
    }

    /// Bounded value with its basis and citation
    pub fn bounded(low: f64, high: f64, basis: BoundBasis, citation: impl Into<String>) -> Self {
        ConfidenceValue::Bounded {
            low,
            high,
            basis,
            citation: citation.into(),
        }
    }

    /// Number usable for comparisons, if any
    ///
    /// Deterministic values map to 1.0/0.0 and bounded values to their lower
    /// bound. Absent values have no point value.
    pub fn point_value(&self) -> Option<f64> {
        match self {
            ConfidenceValue::Deterministic { value, .. } => Some(if *value { 1.0 } else { 0.0 }),
            ConfidenceValue::Derived { value, .. } => Some(*value),
            ConfidenceValue::Measured { value, .. } => Some(*value),
            ConfidenceValue::Bounded { low, .. } => Some(*low),
            ConfidenceValue::Absent { .. } => None,
        }
    }

    /// Whether this value is absent
    pub fn is_absent(&self) -> bool {
        matches!(self, ConfidenceValue::Absent { .. })
    }

    /// Reason for absence, if absent
    pub fn absent_reason(&self) -> Option<AbsentReason> {
        match self {
            ConfidenceValue::Absent { reason } => Some(*reason),
            _ => None,
        }
    }

    /// `Some(truth)` for deterministic values
    pub fn as_deterministic(&self) -> Option<bool> {
        match self {
            ConfidenceValue::Deterministic { value, .. } => Some(*value),
            _ => None,
        }
    }

    /// Calibration carried by this value when used as an input
    ///
    /// Certain and measured values are calibrated, bounded values are not,
    /// derived values report their own status. Absent values never reach a
    /// derivation, so they report `Degraded`.
    pub fn calibration_status(&self) -> CalibrationStatus {
        match self {
            ConfidenceValue::Deterministic { .. } | ConfidenceValue::Measured { .. } => {
                CalibrationStatus::Preserved
            }
            ConfidenceValue::Derived {
                calibration_status, ..
            } => *calibration_status,
            ConfidenceValue::Bounded { .. } | ConfidenceValue::Absent { .. } => {
                CalibrationStatus::Degraded
            }
        }
    }

    /// Short discriminant name
    pub fn type_name(&self) -> &'static str {
        match self {
            ConfidenceValue::Deterministic { .. } => "deterministic",
            ConfidenceValue::Derived { .. } => "derived",
            ConfidenceValue::Measured { .. } => "measured",
            ConfidenceValue::Bounded { .. } => "bounded",
            ConfidenceValue::Absent { .. } => "absent",
        }
    }

    /// Check the structural invariants of this value and its inputs
    pub fn validate(&self) -> Result<(), ConfidenceError> {
        match self {
            ConfidenceValue::Deterministic { .. } | ConfidenceValue::Absent { .. } => Ok(()),
            ConfidenceValue::Derived { value, inputs, .. } => {
                check_unit("value", *value)?;
                inputs.iter().try_for_each(ConfidenceValue::validate)
            }
            ConfidenceValue::Measured {
                value,
                dataset_id,
                sample_size,
                ci_low,
                ci_high,
            } => {
                check_unit("value", *value)?;
                check_unit("ci_low", *ci_low)?;
                check_unit("ci_high", *ci_high)?;
                if ci_low > ci_high {
                    return Err(ConfidenceError::InvalidBounds {
                        low: *ci_low,
                        high: *ci_high,
                    });
                }
                if *sample_size == 0 {
                    return Err(ConfidenceError::EmptyDataset {
                        dataset_id: dataset_id.clone(),
                    });
                }
                Ok(())
            }
            ConfidenceValue::Bounded { low, high, .. } => {
                check_unit("low", *low)?;
                check_unit("high", *high)?;
                if low > high {
                    return Err(ConfidenceError::InvalidBounds {
                        low: *low,
                        high: *high,
                    });
                }
                Ok(())
            }
        }
    }

    /// Re-evaluate derived values (recursively) and compare to what is stored
    pub fn verify_derivation(&self) -> Result<(), ConfidenceError> {
        let ConfidenceValue::Derived {
            value,
            formula,
            inputs,
            ..
        } = self
        else {
            return Ok(());
        };

        let mut points = Vec::with_capacity(inputs.len());
        for input in inputs {
            input.verify_derivation()?;
            match input.point_value() {
                Some(p) => points.push(p),
                None => {
                    return Err(ConfidenceError::InsufficientEvidence {
                        reason: input.absent_reason().unwrap_or(AbsentReason::NoInputs),
                    })
                }
            }
        }

        let recomputed = formula
            .evaluate(&points)
            .ok_or(ConfidenceError::InsufficientEvidence {
                reason: AbsentReason::NoInputs,
            })?;
        if (recomputed - value).abs() > DERIVATION_TOLERANCE {
            return Err(ConfidenceError::Irreproducible {
                formula: formula.name().to_string(),
                stated: *value,
                recomputed,
            });
        }
        Ok(())
    }
}

fn check_unit(field: &'static str, value: f64) -> Result<(), ConfidenceError> {
    if value.is_nan() || !(0.0..=1.0).contains(&value) {
        return Err(ConfidenceError::OutOfRange { field, value });
    }
    Ok(())
}

impl fmt::Display for ConfidenceValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfidenceValue::Deterministic { value, .. } => write!(f, "deterministic({})", value),
            ConfidenceValue::Derived { value, formula, .. } => {
                write!(f, "derived({:.4} via {})", value, formula.name())
            }
            ConfidenceValue::Measured {
                value, sample_size, ..
            } => write!(f, "measured({:.4}, n={})", value, sample_size),
            ConfidenceValue::Bounded { low, high, .. } => {
                write!(f, "bounded([{:.4}, {:.4}])", low, high)
            }
            ConfidenceValue::Absent { reason } => write!(f, "absent({})", reason),
        }
    }
}
