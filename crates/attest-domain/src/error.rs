//! Error types for domain-level validation

use crate::confidence::AbsentReason;
use crate::evidence::EvidenceKind;
use crate::status::ClaimStatus;
use thiserror::Error;

/// Errors raised when a confidence value is malformed or cannot be used
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfidenceError {
    /// The value is absent where a number was required
    #[error("Insufficient evidence: {reason}")]
    InsufficientEvidence {
        /// Why the value is absent
        reason: AbsentReason,
    },

    /// A numeric field left `[0, 1]` (or is NaN)
    #[error("Confidence field '{field}' out of range: {value}")]
    OutOfRange {
        /// Offending field
        field: &'static str,
        /// Offending value
        value: f64,
    },

    /// `low > high` on a bounded value or interval
    #[error("Invalid bounds: low {low} > high {high}")]
    InvalidBounds {
        /// Lower bound
        low: f64,
        /// Upper bound
        high: f64,
    },

    /// A measured value was recorded without any samples
    #[error("Measured confidence for dataset '{dataset_id}' has no samples")]
    EmptyDataset {
        /// Dataset the measurement refers to
        dataset_id: String,
    },

    /// Re-evaluating a derived value's formula over its inputs disagrees with the stored value
    #[error("Derived value {stated} is not reproducible from {formula}: recomputed {recomputed}")]
    Irreproducible {
        /// Formula name
        formula: String,
        /// Value stored on the derived confidence
        stated: f64,
        /// Value obtained by re-evaluating the formula
        recomputed: f64,
    },
}

/// A single problem found while checking an evidence payload
#[derive(Debug, Clone, PartialEq)]
pub enum ShapeViolation {
    /// The payload is not a JSON object
    NotAnObject,
    /// A required field is missing
    MissingField(String),
    /// A field has the wrong JSON type
    WrongType {
        /// Field name
        field: String,
        /// Expected type description
        expected: &'static str,
    },
    /// A numeric field is outside its permitted range
    OutOfRange {
        /// Field name
        field: String,
        /// Offending value
        value: f64,
    },
    /// Strict mode rejected a field the schema does not know
    UnknownField(String),
    /// The attached confidence value failed its own invariants
    InvalidConfidence(String),
    /// The provenance is unusable
    InvalidProvenance(String),
}

impl std::fmt::Display for ShapeViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ShapeViolation::NotAnObject => write!(f, "payload must be a JSON object"),
            ShapeViolation::MissingField(field) => write!(f, "missing required field '{}'", field),
            ShapeViolation::WrongType { field, expected } => {
                write!(f, "field '{}' must be {}", field, expected)
            }
            ShapeViolation::OutOfRange { field, value } => {
                write!(f, "field '{}' out of range: {}", field, value)
            }
            ShapeViolation::UnknownField(field) => write!(f, "unknown field '{}'", field),
            ShapeViolation::InvalidConfidence(msg) => write!(f, "invalid confidence: {}", msg),
            ShapeViolation::InvalidProvenance(msg) => write!(f, "invalid provenance: {}", msg),
        }
    }
}

/// Rejection of an evidence draft whose payload does not match its kind
#[derive(Error, Debug, Clone, PartialEq)]
#[error("Invalid {kind} evidence: {}", summarize(.violations))]
pub struct ValidationError {
    /// Kind the draft claimed to be
    pub kind: EvidenceKind,
    /// Every violation found (never empty)
    pub violations: Vec<ShapeViolation>,
}

fn summarize(violations: &[ShapeViolation]) -> String {
    violations
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// A status change that the claim lifecycle does not allow
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("Claim status cannot move from {from} to {to}")]
pub struct StatusTransitionError {
    /// Current status
    pub from: ClaimStatus,
    /// Requested status
    pub to: ClaimStatus,
}
