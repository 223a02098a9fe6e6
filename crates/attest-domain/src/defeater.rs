//! Defeaters - typed reasons a claim should no longer be trusted at face value

use crate::canonical::{parts_hash, DEFEATER_DOMAIN};
use crate::claim::ClaimId;
use crate::evidence::EvidenceId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Content-addressed defeater identifier
///
/// Derived from the defeater's type, target and triggering evidence, so
/// detecting the same condition twice yields the same id.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DefeaterId(String);

impl DefeaterId {
    /// Hash arbitrary identifying parts into an id
    pub fn derive(parts: &[&str]) -> Self {
        Self(parts_hash(DEFEATER_DOMAIN, parts))
    }

    /// Wrap an existing id string (e.g. read back from a payload)
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Hex form
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First twelve characters, for logs
    pub fn short(&self) -> &str {
        &self.0[..self.0.len().min(12)]
    }
}

impl fmt::Display for DefeaterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Type of defeater
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DefeaterType {
    /// Direct evidence that the claim is false
    Rebutting,
    /// Evidence that the claim's grounds do not support it
    Undercutting,
    /// Evidence that the claim's grounds are unreliable
    Undermining,
    /// The claim is older than the freshness window
    Staleness,
    /// The code the claim refers to has changed
    HashMismatch,
    /// The provider that produced the claim was unavailable
    ProviderUnavailable,
    /// A newer claim on the same topic conflicts with it
    Contradiction,
    /// A test covering the claim failed
    TestFailure,
    /// The claim's evidence does not cover everything it asserts
    CoverageGap,
    /// Something changed that may bear on the claim
    NewInformation,
}

impl DefeaterType {
    /// Wire name
    pub fn as_str(&self) -> &'static str {
        match self {
            DefeaterType::Rebutting => "rebutting",
            DefeaterType::Undercutting => "undercutting",
            DefeaterType::Undermining => "undermining",
            DefeaterType::Staleness => "staleness",
            DefeaterType::HashMismatch => "hash_mismatch",
            DefeaterType::ProviderUnavailable => "provider_unavailable",
            DefeaterType::Contradiction => "contradiction",
            DefeaterType::TestFailure => "test_failure",
            DefeaterType::CoverageGap => "coverage_gap",
            DefeaterType::NewInformation => "new_information",
        }
    }

    /// Parse from the wire name
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "rebutting" => Some(DefeaterType::Rebutting),
            "undercutting" => Some(DefeaterType::Undercutting),
            "undermining" => Some(DefeaterType::Undermining),
            "staleness" => Some(DefeaterType::Staleness),
            "hash_mismatch" => Some(DefeaterType::HashMismatch),
            "provider_unavailable" => Some(DefeaterType::ProviderUnavailable),
            "contradiction" => Some(DefeaterType::Contradiction),
            "test_failure" => Some(DefeaterType::TestFailure),
            "coverage_gap" => Some(DefeaterType::CoverageGap),
            "new_information" => Some(DefeaterType::NewInformation),
            _ => None,
        }
    }

    /// Fixed severity for this type
    pub fn severity(&self) -> DefeaterSeverity {
        match self {
            DefeaterType::Rebutting
            | DefeaterType::Contradiction
            | DefeaterType::HashMismatch
            | DefeaterType::TestFailure => DefeaterSeverity::Full,
            DefeaterType::Undercutting | DefeaterType::Undermining | DefeaterType::Staleness => {
                DefeaterSeverity::Partial
            }
            DefeaterType::ProviderUnavailable | DefeaterType::CoverageGap => {
                DefeaterSeverity::Warning
            }
            DefeaterType::NewInformation => DefeaterSeverity::Informational,
        }
    }
}

impl fmt::Display for DefeaterType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How hard a defeater hits
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DefeaterSeverity {
    /// Claim is defeated outright
    Full,
    /// Confidence is reduced substantially
    Partial,
    /// Confidence is reduced slightly
    Warning,
    /// Recorded only
    Informational,
}

impl DefeaterSeverity {
    /// Wire name
    pub fn as_str(&self) -> &'static str {
        match self {
            DefeaterSeverity::Full => "full",
            DefeaterSeverity::Partial => "partial",
            DefeaterSeverity::Warning => "warning",
            DefeaterSeverity::Informational => "informational",
        }
    }
}

impl fmt::Display for DefeaterSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a defeater attacks
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum DefeatTarget {
    /// A claim
    Claim(ClaimId),
    /// Another defeater (meta-defeat)
    Defeater(DefeaterId),
}

impl DefeatTarget {
    /// Stable string form used when hashing ids
    pub fn key(&self) -> String {
        match self {
            DefeatTarget::Claim(id) => format!("claim:{}", id),
            DefeatTarget::Defeater(id) => format!("defeater:{}", id),
        }
    }
}

/// Action taken to resolve a defeater
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionAction {
    /// The claim was checked again and holds
    Revalidate,
    /// The referenced code was indexed again
    Reindex,
    /// The provider call was retried successfully
    RetryProvider,
    /// The defeater is acknowledged and accepted
    Accept,
}

impl ResolutionAction {
    /// Wire name
    pub fn as_str(&self) -> &'static str {
        match self {
            ResolutionAction::Revalidate => "revalidate",
            ResolutionAction::Reindex => "reindex",
            ResolutionAction::RetryProvider => "retry_provider",
            ResolutionAction::Accept => "accept",
        }
    }

    /// Parse from the wire name
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "revalidate" => Some(ResolutionAction::Revalidate),
            "reindex" => Some(ResolutionAction::Reindex),
            "retry_provider" => Some(ResolutionAction::RetryProvider),
            "accept" => Some(ResolutionAction::Accept),
            _ => None,
        }
    }
}

/// A typed defeater
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Defeater {
    /// Content-addressed id
    pub id: DefeaterId,
    /// Defeater type
    pub defeater_type: DefeaterType,
    /// What it attacks
    pub target: DefeatTarget,
    /// Severity (from the type table)
    pub severity: DefeaterSeverity,
    /// Human-readable description
    pub description: String,
    /// When it was detected
    pub detected_at: DateTime<Utc>,
    /// Entries that triggered it
    pub evidence: Vec<EvidenceId>,
    /// Meta-defeaters attacking this defeater
    #[serde(default)]
    pub defeated_by: Vec<DefeaterId>,
    /// Whether it has been resolved
    #[serde(default)]
    pub resolved: bool,
    /// How it was resolved
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolution: Option<ResolutionAction>,
}

impl Defeater {
    /// Create a defeater with an id derived from type, target and evidence
    pub fn new(
        defeater_type: DefeaterType,
        target: DefeatTarget,
        evidence: Vec<EvidenceId>,
        description: impl Into<String>,
        detected_at: DateTime<Utc>,
    ) -> Self {
        let mut keys: Vec<&str> = evidence.iter().map(EvidenceId::as_str).collect();
        keys.sort_unstable();
        let target_key = target.key();
        let mut parts = vec![defeater_type.as_str(), target_key.as_str()];
        parts.extend(keys);
        let id = DefeaterId::derive(&parts);
        Self::with_id(id, defeater_type, target, evidence, description, detected_at)
    }

    /// Create a defeater with a caller-chosen id
    pub fn with_id(
        id: DefeaterId,
        defeater_type: DefeaterType,
        target: DefeatTarget,
        evidence: Vec<EvidenceId>,
        description: impl Into<String>,
        detected_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            defeater_type,
            severity: defeater_type.severity(),
            target,
            description: description.into(),
            detected_at,
            evidence,
            defeated_by: Vec::new(),
            resolved: false,
            resolution: None,
        }
    }

    /// Claim this defeater attacks directly, if any
    pub fn target_claim(&self) -> Option<ClaimId> {
        match &self.target {
            DefeatTarget::Claim(id) => Some(*id),
            DefeatTarget::Defeater(_) => None,
        }
    }

    /// Defeater this meta-defeater attacks, if any
    pub fn target_defeater(&self) -> Option<&DefeaterId> {
        match &self.target {
            DefeatTarget::Defeater(id) => Some(id),
            DefeatTarget::Claim(_) => None,
        }
    }

    /// Record a meta-defeater, ignoring duplicates
    pub fn add_defeated_by(&mut self, attacker: DefeaterId) -> bool {
        if self.defeated_by.contains(&attacker) {
            return false;
        }
        self.defeated_by.push(attacker);
        self.defeated_by.sort();
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_table() {
        assert_eq!(DefeaterType::Contradiction.severity(), DefeaterSeverity::Full);
        assert_eq!(DefeaterType::Staleness.severity(), DefeaterSeverity::Partial);
        assert_eq!(DefeaterType::CoverageGap.severity(), DefeaterSeverity::Warning);
        assert_eq!(
            DefeaterType::NewInformation.severity(),
            DefeaterSeverity::Informational
        );
    }

    #[test]
    fn test_id_is_deterministic_and_order_free() {
        let claim = ClaimId::from_value(42);
        let e1 = EvidenceId::from_hex(&"a".repeat(64)).unwrap();
        let e2 = EvidenceId::from_hex(&"b".repeat(64)).unwrap();
        let now = Utc::now();

        let a = Defeater::new(
            DefeaterType::Rebutting,
            DefeatTarget::Claim(claim),
            vec![e1.clone(), e2.clone()],
            "first",
            now,
        );
        let b = Defeater::new(
            DefeaterType::Rebutting,
            DefeatTarget::Claim(claim),
            vec![e2, e1.clone()],
            "second description",
            now + chrono::Duration::hours(1),
        );
        assert_eq!(a.id, b.id);

        let other = Defeater::new(
            DefeaterType::Undercutting,
            DefeatTarget::Claim(claim),
            vec![e1],
            "x",
            now,
        );
        assert_ne!(a.id, other.id);
    }

    #[test]
    fn test_targets() {
        let d = Defeater::new(
            DefeaterType::Rebutting,
            DefeatTarget::Defeater(DefeaterId::derive(&["x"])),
            vec![],
            "meta",
            Utc::now(),
        );
        assert!(d.target_claim().is_none());
        assert!(d.target_defeater().is_some());
    }

    #[test]
    fn test_add_defeated_by_dedupes() {
        let mut d = Defeater::new(
            DefeaterType::Staleness,
            DefeatTarget::Claim(ClaimId::from_value(1)),
            vec![],
            "old",
            Utc::now(),
        );
        let attacker = DefeaterId::derive(&["attacker"]);
        assert!(d.add_defeated_by(attacker.clone()));
        assert!(!d.add_defeated_by(attacker));
        assert_eq!(d.defeated_by.len(), 1);
    }
}
