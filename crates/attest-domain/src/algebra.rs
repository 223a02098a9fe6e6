//! Confidence algebra
//!
//! Operators for combining [`ConfidenceValue`]s. None of them ever turn an
//! absent input into a number:
//!
//! | Operator       | Formula   | Short-circuit                         |
//! |----------------|-----------|---------------------------------------|
//! | `sequence`     | `min`     | any deterministic false wins          |
//! | `parallel_all` | `product` | any deterministic false wins          |
//! | `parallel_any` | `noisy_or`| any deterministic true wins           |
//! | `and`          | `min`     | absent is the bottom element          |
//! | `or`           | `max`     | absent is the identity                |
//!
//! Derived results record their formula and inputs and are marked
//! calibration-preserved only when every input is.

use crate::confidence::{AbsentReason, CalibrationStatus, ConfidenceValue, Formula};
use std::fmt;

/// A usable confidence number
///
/// Only obtainable through [`get_effective_confidence`] and never converted
/// back into a [`ConfidenceValue`], so a number stripped of its provenance
/// cannot be fed into another derivation.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct EffectiveConfidence(f64);

impl EffectiveConfidence {
    /// The number in `[0, 1]`
    pub fn value(&self) -> f64 {
        self.0
    }

    /// Whether the number reaches `min`
    pub fn meets(&self, min: f64) -> bool {
        self.0 >= min
    }
}

impl fmt::Display for EffectiveConfidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.4}", self.0)
    }
}

/// Outcome of a threshold check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThresholdOutcome {
    /// The value reaches the threshold
    Allowed,
    /// The value is below the threshold or absent
    Blocked,
}

/// Result of [`check_threshold`]
#[derive(Debug, Clone, PartialEq)]
pub struct ThresholdDecision {
    /// Allowed or blocked
    pub outcome: ThresholdOutcome,
    /// Effective number; 0 for absent values
    pub effective: Option<EffectiveConfidence>,
    /// Human-readable explanation
    pub reason: String,
    /// What would lift the block
    pub mitigation: Option<String>,
}

impl ThresholdDecision {
    /// Whether the check passed
    pub fn is_allowed(&self) -> bool {
        self.outcome == ThresholdOutcome::Allowed
    }
}

/// Extract a number for thresholding
///
/// Absent values map to 0, the most conservative reading. The result is for
/// comparisons only; it never re-enters a derivation.
pub fn get_effective_confidence(value: &ConfidenceValue) -> EffectiveConfidence {
    EffectiveConfidence(value.point_value().map_or(0.0, |p| p.clamp(0.0, 1.0)))
}

/// Decide whether `value` is good enough for an action requiring `min`
pub fn check_threshold(value: &ConfidenceValue, min: f64) -> ThresholdDecision {
    if let Some(reason) = value.absent_reason() {
        return ThresholdDecision {
            outcome: ThresholdOutcome::Blocked,
            effective: Some(get_effective_confidence(value)),
            reason: format!("confidence is absent ({})", reason),
            mitigation: Some(absent_mitigation(reason).to_string()),
        };
    }
    let effective = get_effective_confidence(value);

    if effective.meets(min) {
        return ThresholdDecision {
            outcome: ThresholdOutcome::Allowed,
            effective: Some(effective),
            reason: format!("effective confidence {} meets threshold {:.4}", effective, min),
            mitigation: None,
        };
    }

    let mitigation = match value {
        ConfidenceValue::Bounded { .. } => "replace the analytic bound with a measured confidence",
        ConfidenceValue::Derived {
            calibration_status: CalibrationStatus::Degraded,
            ..
        } => "calibrate the degraded inputs of this derivation",
        ConfidenceValue::Deterministic { .. } => "the value is certain; change the claim, not the evidence",
        _ => "gather corroborating evidence or resolve active defeaters",
    };
    ThresholdDecision {
        outcome: ThresholdOutcome::Blocked,
        effective: Some(effective),
        reason: format!("effective confidence {} is below threshold {:.4}", effective, min),
        mitigation: Some(mitigation.to_string()),
    }
}

fn absent_mitigation(reason: AbsentReason) -> &'static str {
    match reason {
        AbsentReason::Uncalibrated => "calibrate the producing category",
        AbsentReason::InsufficientData => "record more outcome samples for the category",
        AbsentReason::UnverifiedByTrace(_) => "resolve the defeat cycle or raise the fixpoint cap",
        AbsentReason::NotApplicable | AbsentReason::NoInputs => "attach evidence with a confidence",
    }
}

/// Calibration status of a derivation over `inputs`
pub fn combined_status(inputs: &[ConfidenceValue]) -> CalibrationStatus {
    if inputs
        .iter()
        .all(|v| v.calibration_status() == CalibrationStatus::Preserved)
    {
        CalibrationStatus::Preserved
    } else {
        CalibrationStatus::Degraded
    }
}

/// Apply `formula` to `inputs`, recording both
///
/// Returns the first absent input unchanged if there is one, and
/// `Absent(no_inputs)` when the formula does not fit the inputs.
pub fn derive(formula: Formula, inputs: Vec<ConfidenceValue>) -> ConfidenceValue {
    if let Some(absent) = inputs.iter().find(|v| v.is_absent()) {
        return absent.clone();
    }
    let points: Vec<f64> = inputs.iter().filter_map(ConfidenceValue::point_value).collect();
    let Some(value) = formula.evaluate(&points) else {
        return ConfidenceValue::absent(AbsentReason::NoInputs);
    };
    let calibration_status = combined_status(&inputs);
    ConfidenceValue::Derived {
        value,
        formula,
        inputs,
        calibration_status,
    }
}

fn first_absent(values: &[ConfidenceValue]) -> Option<&ConfidenceValue> {
    values.iter().find(|v| v.is_absent())
}

fn all_deterministic(values: &[ConfidenceValue], truth: bool) -> bool {
    values.iter().all(|v| v.as_deterministic() == Some(truth))
}

/// Serial composition: every step must hold, weakest link wins
pub fn sequence(steps: &[ConfidenceValue]) -> ConfidenceValue {
    conjunctive(steps, Formula::Min, "sequence")
}

/// Independent conjunction: every branch must hold
pub fn parallel_all(branches: &[ConfidenceValue]) -> ConfidenceValue {
    conjunctive(branches, Formula::Product, "parallel_all")
}

fn conjunctive(values: &[ConfidenceValue], formula: Formula, op: &str) -> ConfidenceValue {
    if values.is_empty() {
        return ConfidenceValue::absent(AbsentReason::NoInputs);
    }
    if values.iter().any(|v| v.as_deterministic() == Some(false)) {
        return ConfidenceValue::deterministic(false, format!("{}: an input is certainly false", op));
    }
    if let Some(absent) = first_absent(values) {
        return absent.clone();
    }
    if all_deterministic(values, true) {
        return ConfidenceValue::deterministic(true, format!("{}: every input is certainly true", op));
    }
    derive(formula, values.to_vec())
}

/// Independent disjunction: at least one branch must hold
pub fn parallel_any(branches: &[ConfidenceValue]) -> ConfidenceValue {
    if branches.is_empty() {
        return ConfidenceValue::absent(AbsentReason::NoInputs);
    }
    if branches.iter().any(|v| v.as_deterministic() == Some(true)) {
        return ConfidenceValue::deterministic(true, "parallel_any: an input is certainly true");
    }
    if let Some(absent) = first_absent(branches) {
        return absent.clone();
    }
    if all_deterministic(branches, false) {
        return ConfidenceValue::deterministic(false, "parallel_any: every input is certainly false");
    }
    derive(Formula::NoisyOr, branches.to_vec())
}

/// Lattice meet
///
/// Absent is the bottom element: `and(a, absent) = absent`.
pub fn and(a: &ConfidenceValue, b: &ConfidenceValue) -> ConfidenceValue {
    if a.is_absent() {
        return a.clone();
    }
    if b.is_absent() {
        return b.clone();
    }
    if let (Some(x), Some(y)) = (a.as_deterministic(), b.as_deterministic()) {
        return ConfidenceValue::deterministic(x && y, "and of certain values");
    }
    derive(Formula::Min, vec![a.clone(), b.clone()])
}

/// Lattice join
///
/// Absent is the identity: `or(a, absent) = a`.
pub fn or(a: &ConfidenceValue, b: &ConfidenceValue) -> ConfidenceValue {
    if a.is_absent() {
        return b.clone();
    }
    if b.is_absent() {
        return a.clone();
    }
    if let (Some(x), Some(y)) = (a.as_deterministic(), b.as_deterministic()) {
        return ConfidenceValue::deterministic(x || y, "or of certain values");
    }
    derive(Formula::Max, vec![a.clone(), b.clone()])
}

/// Compare two values by absence and point value
pub fn approx_eq(a: &ConfidenceValue, b: &ConfidenceValue, tolerance: f64) -> bool {
    match (a.point_value(), b.point_value()) {
        (None, None) => true,
        (Some(x), Some(y)) => (x - y).abs() <= tolerance,
        _ => false,
    }
}
