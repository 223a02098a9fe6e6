//! Claim module - statements about subjects that the engines reason over

use crate::confidence::{AbsentReason, ConfidenceValue};
use crate::defeater::DefeaterId;
use crate::error::StatusTransitionError;
use crate::evidence::{EvidenceEntry, EvidenceId, EvidenceKind};
use crate::payload::ClaimPayload;
use crate::status::ClaimStatus;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Unique identifier for a claim based on UUIDv7
///
/// UUIDv7 provides:
/// - Chronological sortability for temporal queries
/// - 128-bit uniqueness
/// - No coordination required for distributed generation
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ClaimId(u128);

impl ClaimId {
    /// Generate a new UUIDv7-based ClaimId
    ///
    /// # Examples
    ///
    /// ```
    /// use attest_domain::ClaimId;
    ///
    /// let id = ClaimId::new();
    /// assert!(id.value() > 0);
    /// ```
    pub fn new() -> Self {
        Self(uuid::Uuid::now_v7().as_u128())
    }

    /// Create a ClaimId from a raw u128 value
    pub fn from_value(value: u128) -> Self {
        Self(value)
    }

    /// Parse a ClaimId from its hyphenated string form
    ///
    /// # Examples
    ///
    /// ```
    /// use attest_domain::ClaimId;
    ///
    /// let id = ClaimId::new();
    /// let parsed = ClaimId::from_string(&id.to_string()).unwrap();
    /// assert_eq!(id, parsed);
    /// ```
    pub fn from_string(s: &str) -> Result<Self, String> {
        uuid::Uuid::parse_str(s)
            .map(|u| Self(u.as_u128()))
            .map_err(|e| format!("Invalid claim id: {}", e))
    }

    /// Get the raw u128 value
    pub fn value(&self) -> u128 {
        self.0
    }

    /// Millisecond timestamp embedded in the UUIDv7
    pub fn timestamp(&self) -> u64 {
        // top 48 bits
        (self.0 >> 80) as u64
    }
}

impl Default for ClaimId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ClaimId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", uuid::Uuid::from_u128(self.0))
    }
}

impl Serialize for ClaimId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ClaimId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        ClaimId::from_string(&s).map_err(serde::de::Error::custom)
    }
}

/// Disclosure attached to a claim whose defeat state was settled by a cycle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "defeaters", rename_all = "snake_case")]
pub enum DefeatAmbiguity {
    /// Defeaters in an even cycle cancelled each other out
    MutuallyCancelled(Vec<DefeaterId>),
    /// Defeaters in an odd cycle could not be labelled
    CycleUnresolved(Vec<DefeaterId>),
    /// Activity did not converge within the iteration cap
    FixpointExceeded(Vec<DefeaterId>),
}

/// A claim about a subject
///
/// `base_confidence` is what the claim was asserted with; `confidence` is the
/// effective value after active defeaters (or dependency capping) were applied.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claim {
    /// Unique identifier
    pub id: ClaimId,

    /// Entity the claim is about
    pub subject: String,

    /// Type of the claim (e.g. "behavior", "invariant", "api")
    pub claim_type: String,

    /// The statement itself
    pub proposition: String,

    /// Effective confidence
    pub confidence: ConfidenceValue,

    /// Confidence as asserted
    pub base_confidence: ConfidenceValue,

    /// Lifecycle status
    pub status: ClaimStatus,

    /// When this claim was created
    pub created_at: DateTime<Utc>,

    /// Hash of the code the claim refers to
    pub code_hash: Option<String>,

    /// Ledger entry the claim was recorded in
    pub evidence: Option<EvidenceId>,

    /// Set when a defeat cycle decided (or failed to decide) this claim's state
    pub ambiguity: Option<DefeatAmbiguity>,
}

impl Claim {
    /// Create a new active claim
    pub fn new(
        id: ClaimId,
        subject: impl Into<String>,
        claim_type: impl Into<String>,
        proposition: impl Into<String>,
        confidence: ConfidenceValue,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            subject: subject.into(),
            claim_type: claim_type.into(),
            proposition: proposition.into(),
            base_confidence: confidence.clone(),
            confidence,
            status: ClaimStatus::Active,
            created_at,
            code_hash: None,
            evidence: None,
            ambiguity: None,
        }
    }

    /// Attach the code hash the claim refers to
    pub fn with_code_hash(mut self, code_hash: impl Into<String>) -> Self {
        self.code_hash = Some(code_hash.into());
        self
    }

    /// Attach the recording ledger entry
    pub fn with_evidence(mut self, evidence: EvidenceId) -> Self {
        self.evidence = Some(evidence);
        self
    }

    /// Materialise a claim from a `claim` ledger entry
    ///
    /// Returns `None` for other kinds or malformed payloads. Entries without a
    /// confidence produce `Absent(uncalibrated)`.
    pub fn from_entry(entry: &EvidenceEntry) -> Option<Self> {
        if entry.kind != EvidenceKind::Claim {
            return None;
        }
        let payload = ClaimPayload::from_value(&entry.payload).ok()?;
        let confidence = entry
            .confidence
            .clone()
            .unwrap_or_else(|| ConfidenceValue::absent(AbsentReason::Uncalibrated));
        let mut claim = Claim::new(
            payload.claim_id,
            payload.subject,
            payload.claim_type,
            payload.proposition,
            confidence,
            entry.timestamp,
        )
        .with_evidence(entry.id.clone());
        claim.code_hash = payload.code_hash;
        Some(claim)
    }

    /// Move to a new status if the lifecycle allows it
    ///
    /// Returns the previous status.
    pub fn transition(&mut self, to: ClaimStatus) -> Result<ClaimStatus, StatusTransitionError> {
        let previous = self.status;
        self.status = previous.transition(to)?;
        Ok(previous)
    }

    /// Whether the claim shares subject and type with `other`
    pub fn same_topic(&self, other: &Claim) -> bool {
        self.subject == other.subject && self.claim_type == other.claim_type
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evidence::{NewEvidence, Provenance};

    #[test]
    fn test_claim_id_ordering() {
        let id1 = ClaimId::from_value(1000);
        let id2 = ClaimId::from_value(2000);

        assert!(id1 < id2);
        assert!(id2 > id1);
    }

    #[test]
    fn test_claim_id_chronological() {
        let id1 = ClaimId::new();
        std::thread::sleep(std::time::Duration::from_millis(2));
        let id2 = ClaimId::new();

        assert!(id1 < id2, "Earlier UUIDv7 should be less than later UUIDv7");
        assert!(id1.timestamp() <= id2.timestamp());
    }

    #[test]
    fn test_claim_id_serde_is_string() {
        let id = ClaimId::new();
        let json = serde_json::to_value(id).unwrap();
        assert_eq!(json, serde_json::Value::String(id.to_string()));
        let back: ClaimId = serde_json::from_value(json).unwrap();
        assert_eq!(back, id);
        assert!(serde_json::from_str::<ClaimId>("\"nope\"").is_err());
    }

    #[test]
    fn test_claim_from_entry() {
        let id = ClaimId::new();
        let payload = ClaimPayload::new(id, "cache::get", "behavior", "cache::get returns None on miss")
            .with_code_hash("h1")
            .to_value()
            .unwrap();
        let draft = NewEvidence::new(EvidenceKind::Claim, payload, Provenance::new("agent:a"));
        let entry = EvidenceEntry {
            id: draft.compute_id().unwrap(),
            sequence: 0,
            timestamp: Utc::now(),
            kind: draft.kind,
            payload: draft.payload,
            provenance: draft.provenance,
            confidence: None,
            related_entries: vec![],
            session_id: None,
        };

        let claim = Claim::from_entry(&entry).unwrap();
        assert_eq!(claim.id, id);
        assert_eq!(claim.code_hash.as_deref(), Some("h1"));
        assert_eq!(claim.status, ClaimStatus::Active);
        assert_eq!(
            claim.confidence.absent_reason(),
            Some(AbsentReason::Uncalibrated)
        );
        assert_eq!(claim.evidence.as_ref(), Some(&entry.id));
    }

    #[test]
    fn test_transition_returns_previous() {
        let mut claim = Claim::new(
            ClaimId::new(),
            "s",
            "t",
            "p",
            ConfidenceValue::deterministic(true, "x"),
            Utc::now(),
        );
        assert_eq!(claim.transition(ClaimStatus::Defeated), Ok(ClaimStatus::Active));
        assert_eq!(claim.status, ClaimStatus::Defeated);
    }
}
