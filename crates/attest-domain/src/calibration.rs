//! Calibration samples - predictions paired with what actually happened

use crate::claim::ClaimId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// How an outcome was verified
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationMethod {
    /// An automated test passed or failed
    TestResult,
    /// A user confirmed or rejected the prediction
    UserFeedback,
    /// The system observed the outcome directly
    SystemObservation,
    /// A human reviewer decided
    ManualReview,
}

impl VerificationMethod {
    /// Wire name
    pub fn as_str(&self) -> &'static str {
        match self {
            VerificationMethod::TestResult => "test_result",
            VerificationMethod::UserFeedback => "user_feedback",
            VerificationMethod::SystemObservation => "system_observation",
            VerificationMethod::ManualReview => "manual_review",
        }
    }

    /// Parse from the wire name
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "test_result" => Some(VerificationMethod::TestResult),
            "user_feedback" => Some(VerificationMethod::UserFeedback),
            "system_observation" => Some(VerificationMethod::SystemObservation),
            "manual_review" => Some(VerificationMethod::ManualReview),
            _ => None,
        }
    }
}

/// A single prediction/outcome pair
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationSample {
    /// Claim the prediction was attached to, if any
    pub claim_id: Option<ClaimId>,
    /// Category the prediction belongs to
    pub category: String,
    /// Confidence that was predicted
    pub predicted_confidence: f64,
    /// Whether the prediction held
    pub actual_outcome: bool,
    /// How the outcome was verified
    pub verification_method: VerificationMethod,
    /// When the outcome was observed
    pub timestamp: DateTime<Utc>,
}

impl CalibrationSample {
    /// New sample without a claim reference
    pub fn new(
        category: impl Into<String>,
        predicted_confidence: f64,
        actual_outcome: bool,
        verification_method: VerificationMethod,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            claim_id: None,
            category: category.into(),
            predicted_confidence,
            actual_outcome,
            verification_method,
            timestamp,
        }
    }

    /// Attach the claim the prediction was about
    pub fn for_claim(mut self, claim_id: ClaimId) -> Self {
        self.claim_id = Some(claim_id);
        self
    }

    /// Outcome as 0.0/1.0
    pub fn outcome_value(&self) -> f64 {
        if self.actual_outcome {
            1.0
        } else {
            0.0
        }
    }
}
