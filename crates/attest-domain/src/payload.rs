//! Typed views over evidence payloads
//!
//! Payloads are stored as JSON so the ledger can accept any kind, but the
//! engines read and write them through these structs.

use crate::calibration::{CalibrationSample, VerificationMethod};
use crate::claim::ClaimId;
use crate::contradiction::{
    ContradictionAction, ContradictionId, ContradictionKind, ContradictionSeverity,
};
use crate::defeater::{Defeater, DefeaterId, ResolutionAction};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

macro_rules! json_payload {
    ($ty:ty) => {
        impl $ty {
            /// Render as a JSON payload
            pub fn to_value(&self) -> Result<Value, serde_json::Error> {
                serde_json::to_value(self)
            }

            /// Read from a JSON payload
            pub fn from_value(value: &Value) -> Result<Self, serde_json::Error> {
                <$ty>::deserialize(value)
            }
        }
    };
}

/// Payload of an `extraction` entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionPayload {
    /// Entity that was extracted
    pub entity: String,
    /// Hash of the entity's source at extraction time
    pub content_hash: String,
}

json_payload!(ExtractionPayload);

/// Payload of a `claim` entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClaimPayload {
    /// Claim identifier
    pub claim_id: ClaimId,
    /// Entity the claim is about
    pub subject: String,
    /// Claim type
    pub claim_type: String,
    /// The statement
    pub proposition: String,
    /// Hash of the code the claim refers to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code_hash: Option<String>,
    /// Claims this one depends on
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<ClaimId>,
    /// Claims this one assumes
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub assumes: Vec<ClaimId>,
}

impl ClaimPayload {
    /// Payload without dependencies
    pub fn new(
        claim_id: ClaimId,
        subject: impl Into<String>,
        claim_type: impl Into<String>,
        proposition: impl Into<String>,
    ) -> Self {
        Self {
            claim_id,
            subject: subject.into(),
            claim_type: claim_type.into(),
            proposition: proposition.into(),
            code_hash: None,
            depends_on: Vec::new(),
            assumes: Vec::new(),
        }
    }

    /// Attach a code hash
    pub fn with_code_hash(mut self, code_hash: impl Into<String>) -> Self {
        self.code_hash = Some(code_hash.into());
        self
    }

    /// Add a dependency
    pub fn depends_on(mut self, claim_id: ClaimId) -> Self {
        self.depends_on.push(claim_id);
        self
    }

    /// Add an assumption
    pub fn assumes(mut self, claim_id: ClaimId) -> Self {
        self.assumes.push(claim_id);
        self
    }
}

json_payload!(ClaimPayload);

/// Payload of an `outcome` entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutcomePayload {
    /// Category of the prediction
    pub category: String,
    /// Claim the prediction was attached to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub claim_id: Option<ClaimId>,
    /// Predicted confidence
    pub predicted_confidence: f64,
    /// What happened
    pub actual_outcome: bool,
    /// How it was verified
    pub verification_method: VerificationMethod,
}

impl OutcomePayload {
    /// Build from a sample
    pub fn from_sample(sample: &CalibrationSample) -> Self {
        Self {
            category: sample.category.clone(),
            claim_id: sample.claim_id,
            predicted_confidence: sample.predicted_confidence,
            actual_outcome: sample.actual_outcome,
            verification_method: sample.verification_method,
        }
    }

    /// Turn into a sample observed at `timestamp`
    pub fn into_sample(self, timestamp: DateTime<Utc>) -> CalibrationSample {
        CalibrationSample {
            claim_id: self.claim_id,
            category: self.category,
            predicted_confidence: self.predicted_confidence,
            actual_outcome: self.actual_outcome,
            verification_method: self.verification_method,
            timestamp,
        }
    }
}

json_payload!(OutcomePayload);

/// Verdict of a defeat event written back as a `verification` entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    /// A defeater was detected and registered
    DefeaterDetected,
    /// A defeater was resolved
    DefeaterResolved,
    /// A claim lost to a full-severity defeater
    ClaimDefeated,
    /// A claim regained active status
    ClaimReinstated,
    /// A claim was marked stale by propagation
    ClaimStale,
    /// A claim's defeat state could not be decided
    UnverifiedByTrace,
}

impl Verdict {
    /// Wire name
    pub fn as_str(&self) -> &'static str {
        match self {
            Verdict::DefeaterDetected => "defeater_detected",
            Verdict::DefeaterResolved => "defeater_resolved",
            Verdict::ClaimDefeated => "claim_defeated",
            Verdict::ClaimReinstated => "claim_reinstated",
            Verdict::ClaimStale => "claim_stale",
            Verdict::UnverifiedByTrace => "unverified_by_trace",
        }
    }
}

/// Payload of a defeat event `verification` entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DefeatEventPayload {
    /// Claim the event bears on
    pub claim_id: ClaimId,
    /// What happened
    pub verdict: Verdict,
    /// Full defeater record (for `defeater_detected`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub defeater: Option<Defeater>,
    /// Defeater the event refers to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub defeater_id: Option<DefeaterId>,
    /// Resolution action (for `defeater_resolved`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<ResolutionAction>,
    /// Propagation path (for `claim_stale`)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub path: Vec<ClaimId>,
    /// Propagation depth (for `claim_stale`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub depth: Option<usize>,
    /// Free-form detail
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl DefeatEventPayload {
    /// Event with only a claim and verdict
    pub fn new(claim_id: ClaimId, verdict: Verdict) -> Self {
        Self {
            claim_id,
            verdict,
            defeater: None,
            defeater_id: None,
            action: None,
            path: Vec::new(),
            depth: None,
            detail: None,
        }
    }

    /// Attach the defeater id
    pub fn with_defeater_id(mut self, id: DefeaterId) -> Self {
        self.defeater_id = Some(id);
        self
    }

    /// Attach the full defeater record (and its id)
    pub fn with_defeater(mut self, defeater: Defeater) -> Self {
        self.defeater_id = Some(defeater.id.clone());
        self.defeater = Some(defeater);
        self
    }

    /// Attach free-form detail
    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

json_payload!(DefeatEventPayload);

/// Payload of a `feedback` entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedbackPayload {
    /// Claim id or defeater id the signal is about
    pub target: String,
    /// Signal name (e.g. "provider_unavailable", "defeater_rebutted")
    pub signal: String,
    /// Free-form detail
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl FeedbackPayload {
    /// New feedback signal
    pub fn new(target: impl Into<String>, signal: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            signal: signal.into(),
            detail: None,
        }
    }
}

json_payload!(FeedbackPayload);

/// Payload of a `contradiction` entry (detection or resolution)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContradictionPayload {
    /// Contradiction id
    pub contradiction_id: ContradictionId,
    /// Earlier claim
    pub claim_a: ClaimId,
    /// Later claim
    pub claim_b: ClaimId,
    /// How they conflict
    pub kind: ContradictionKind,
    /// Severity at detection
    pub severity: ContradictionSeverity,
    /// Why the pair was flagged
    pub explanation: String,
    /// Resolution action (resolution entries only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<ContradictionAction>,
    /// Resolution rationale (resolution entries only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rationale: Option<String>,
}

json_payload!(ContradictionPayload);

/// Payload of a `calibration` entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationPayload {
    /// Category the snapshot covers
    pub category: String,
    /// Snapshot version
    pub version: u64,
    /// Samples used
    pub sample_count: u64,
    /// Expected calibration error of the raw predictions
    pub ece: f64,
    /// Whether the category reached the PAC sample floor
    pub sufficient: bool,
}

json_payload!(CalibrationPayload);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_claim_payload_omits_empty_fields() {
        let payload = ClaimPayload::new(ClaimId::from_value(7), "s", "t", "p")
            .to_value()
            .unwrap();
        let object = payload.as_object().unwrap();
        assert!(!object.contains_key("depends_on"));
        assert!(!object.contains_key("code_hash"));
        assert_eq!(object["claim_id"], ClaimId::from_value(7).to_string());
    }

    #[test]
    fn test_event_payload_reads_back() {
        let id = DefeaterId::derive(&["d"]);
        let value = DefeatEventPayload::new(ClaimId::from_value(1), Verdict::DefeaterResolved)
            .with_defeater_id(id.clone())
            .to_value()
            .unwrap();
        assert_eq!(value["verdict"], "defeater_resolved");

        let back = DefeatEventPayload::from_value(&value).unwrap();
        assert_eq!(back.defeater_id, Some(id));
        assert!(back.path.is_empty());
    }

    #[test]
    fn test_outcome_payload_to_sample() {
        let payload = OutcomePayload {
            category: "api".to_string(),
            claim_id: None,
            predicted_confidence: 0.8,
            actual_outcome: true,
            verification_method: VerificationMethod::TestResult,
        };
        let sample = payload.into_sample(Utc::now());
        assert_eq!(sample.category, "api");
        assert_eq!(sample.outcome_value(), 1.0);
    }
}
