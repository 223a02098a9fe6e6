//! Payload shape validation
//!
//! Every evidence kind has a fixed set of required, type-checked fields.
//! Drafts are checked before anything is hashed or persisted, and every
//! violation is reported, not just the first.

use crate::ValidationConfig;
use attest_domain::{ClaimId, EvidenceKind, NewEvidence, ShapeViolation, ValidationError};
use serde_json::{Map, Value};

/// Expected JSON type of a payload field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FieldType {
    String,
    Bool,
    Number,
    Probability,
    ClaimId,
}

impl FieldType {
    fn describe(&self) -> &'static str {
        match self {
            FieldType::String => "a string",
            FieldType::Bool => "a boolean",
            FieldType::Number => "a number",
            FieldType::Probability => "a number in [0, 1]",
            FieldType::ClaimId => "a claim id (UUID string)",
        }
    }
}

fn required_fields(kind: EvidenceKind) -> &'static [(&'static str, FieldType)] {
    use FieldType as F;
    match kind {
        EvidenceKind::Extraction => &[("entity", F::String), ("content_hash", F::String)],
        EvidenceKind::Retrieval => &[("query", F::String)],
        EvidenceKind::Synthesis => &[("content", F::String)],
        EvidenceKind::Claim => &[
            ("claim_id", F::ClaimId),
            ("subject", F::String),
            ("claim_type", F::String),
            ("proposition", F::String),
        ],
        EvidenceKind::Verification => &[("claim_id", F::ClaimId)],
        EvidenceKind::Contradiction => &[
            ("contradiction_id", F::String),
            ("claim_a", F::String),
            ("claim_b", F::String),
        ],
        EvidenceKind::Feedback => &[("target", F::String), ("signal", F::String)],
        EvidenceKind::Outcome => &[
            ("category", F::String),
            ("predicted_confidence", F::Probability),
            ("actual_outcome", F::Bool),
            ("verification_method", F::String),
        ],
        EvidenceKind::ToolCall => &[("tool", F::String)],
        EvidenceKind::Episode => &[("episode_id", F::String)],
        EvidenceKind::Calibration => &[("category", F::String), ("version", F::Number)],
    }
}

/// Fields accepted in strict mode, where the kind has a closed schema
fn allowed_fields(kind: EvidenceKind) -> Option<&'static [&'static str]> {
    match kind {
        EvidenceKind::Claim => Some(&[
            "claim_id",
            "subject",
            "claim_type",
            "proposition",
            "code_hash",
            "depends_on",
            "assumes",
        ]),
        EvidenceKind::Outcome => Some(&[
            "category",
            "claim_id",
            "predicted_confidence",
            "actual_outcome",
            "verification_method",
        ]),
        _ => None,
    }
}

/// Checks evidence drafts before they are committed
#[derive(Debug, Clone, Default)]
pub struct PayloadValidator {
    config: ValidationConfig,
}

impl PayloadValidator {
    /// Create a validator with the given rules
    pub fn new(config: ValidationConfig) -> Self {
        Self { config }
    }

    /// Rules in effect
    pub fn config(&self) -> &ValidationConfig {
        &self.config
    }

    /// Validate a draft, collecting every violation
    pub fn validate(&self, draft: &NewEvidence) -> Result<(), ValidationError> {
        let mut violations = Vec::new();

        match draft.payload.as_object() {
            Some(object) => self.check_payload(draft.kind, object, &mut violations),
            None => violations.push(ShapeViolation::NotAnObject),
        }

        if self.config.require_provenance_source && draft.provenance.source.trim().is_empty() {
            violations.push(ShapeViolation::InvalidProvenance(
                "source must not be empty".to_string(),
            ));
        }

        if let Some(confidence) = &draft.confidence {
            if self.config.validate_confidence {
                if let Err(e) = confidence.validate() {
                    violations.push(ShapeViolation::InvalidConfidence(e.to_string()));
                }
            }
            if self.config.verify_derivations {
                if let Err(e) = confidence.verify_derivation() {
                    violations.push(ShapeViolation::InvalidConfidence(e.to_string()));
                }
            }
        }

        if violations.is_empty() {
            Ok(())
        } else {
            Err(ValidationError {
                kind: draft.kind,
                violations,
            })
        }
    }

    fn check_payload(
        &self,
        kind: EvidenceKind,
        object: &Map<String, Value>,
        violations: &mut Vec<ShapeViolation>,
    ) {
        for (field, expected) in required_fields(kind) {
            match object.get(*field) {
                None | Some(Value::Null) => {
                    violations.push(ShapeViolation::MissingField(field.to_string()))
                }
                Some(value) => {
                    if let Some(violation) = check_field(field, value, *expected) {
                        violations.push(violation);
                    }
                }
            }
        }

        if kind == EvidenceKind::Verification {
            check_verification(object, violations);
        }

        if self.config.reject_unknown_fields {
            if let Some(allowed) = allowed_fields(kind) {
                let mut unknown: Vec<&String> = object
                    .keys()
                    .filter(|k| !allowed.contains(&k.as_str()))
                    .collect();
                unknown.sort();
                violations.extend(
                    unknown
                        .into_iter()
                        .map(|k| ShapeViolation::UnknownField(k.clone())),
                );
            }
        }
    }
}

fn check_field(field: &str, value: &Value, expected: FieldType) -> Option<ShapeViolation> {
    let wrong_type = || ShapeViolation::WrongType {
        field: field.to_string(),
        expected: expected.describe(),
    };
    match expected {
        FieldType::String => (!value.is_string()).then(wrong_type),
        FieldType::Bool => (!value.is_boolean()).then(wrong_type),
        FieldType::Number => (!value.is_number()).then(wrong_type),
        FieldType::Probability => match value.as_f64() {
            None => Some(wrong_type()),
            Some(p) if !(0.0..=1.0).contains(&p) => Some(ShapeViolation::OutOfRange {
                field: field.to_string(),
                value: p,
            }),
            Some(_) => None,
        },
        FieldType::ClaimId => match value.as_str() {
            Some(s) if ClaimId::from_string(s).is_ok() => None,
            _ => Some(wrong_type()),
        },
    }
}

/// A verification carries either a boolean result or a named verdict
fn check_verification(object: &Map<String, Value>, violations: &mut Vec<ShapeViolation>) {
    match (object.get("verified"), object.get("verdict")) {
        (Some(verified), _) if !verified.is_boolean() => {
            violations.push(ShapeViolation::WrongType {
                field: "verified".to_string(),
                expected: "a boolean",
            })
        }
        (_, Some(verdict)) if !verdict.is_string() => violations.push(ShapeViolation::WrongType {
            field: "verdict".to_string(),
            expected: "a string",
        }),
        (None, None) => violations.push(ShapeViolation::MissingField(
            "verified or verdict".to_string(),
        )),
        _ => {}
    }
}
