//! Contradictions between claims on the same topic

use crate::canonical::{parts_hash, CONTRADICTION_DOMAIN};
use crate::claim::ClaimId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a contradiction, derived from its claim pair
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContradictionId(String);

impl ContradictionId {
    /// Id for a pair of claims, independent of argument order
    pub fn for_pair(a: ClaimId, b: ClaimId) -> Self {
        let (first, second) = if a <= b { (a, b) } else { (b, a) };
        Self(parts_hash(
            CONTRADICTION_DOMAIN,
            &[&first.to_string(), &second.to_string()],
        ))
    }

    /// Wrap an id read back from a payload
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Hex form
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContradictionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// How the two propositions conflict
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContradictionKind {
    /// One proposition negates the other
    Negation,
    /// Same predicate, different value
    ConflictingValue,
}

/// Resolution state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContradictionStatus {
    /// Awaiting a decision
    Unresolved,
    /// A resolution was recorded
    Resolved,
}

/// How much the contradiction matters
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContradictionSeverity {
    /// Both sides are held with high confidence
    Blocking,
    /// Worth a look
    Significant,
    /// At least one side is weak
    Minor,
}

/// Action recorded when a contradiction is resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContradictionAction {
    /// Keep claim A
    PreferA,
    /// Keep claim B
    PreferB,
    /// Both are folded into a merged statement
    Merge,
    /// Both hold in different contexts
    BothValid,
}

impl ContradictionAction {
    /// Wire name
    pub fn as_str(&self) -> &'static str {
        match self {
            ContradictionAction::PreferA => "prefer_a",
            ContradictionAction::PreferB => "prefer_b",
            ContradictionAction::Merge => "merge",
            ContradictionAction::BothValid => "both_valid",
        }
    }

    /// Parse from the wire name
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "prefer_a" => Some(ContradictionAction::PreferA),
            "prefer_b" => Some(ContradictionAction::PreferB),
            "merge" => Some(ContradictionAction::Merge),
            "both_valid" => Some(ContradictionAction::BothValid),
            _ => None,
        }
    }
}

/// A detected contradiction between two claims
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contradiction {
    /// Pair-derived id
    pub id: ContradictionId,
    /// Earlier claim
    pub claim_a: ClaimId,
    /// Later claim
    pub claim_b: ClaimId,
    /// How they conflict
    pub kind: ContradictionKind,
    /// Resolution state
    pub status: ContradictionStatus,
    /// Severity at detection time
    pub severity: ContradictionSeverity,
    /// Why the pair was flagged
    pub explanation: String,
    /// Detection time
    pub detected_at: DateTime<Utc>,
    /// Recorded resolution action
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolution_action: Option<ContradictionAction>,
    /// Rationale given with the resolution
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rationale: Option<String>,
}

impl Contradiction {
    /// New unresolved contradiction
    pub fn new(
        claim_a: ClaimId,
        claim_b: ClaimId,
        kind: ContradictionKind,
        severity: ContradictionSeverity,
        explanation: impl Into<String>,
        detected_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: ContradictionId::for_pair(claim_a, claim_b),
            claim_a,
            claim_b,
            kind,
            status: ContradictionStatus::Unresolved,
            severity,
            explanation: explanation.into(),
            detected_at,
            resolution_action: None,
            rationale: None,
        }
    }

    /// Whether the contradiction still awaits a decision
    pub fn is_unresolved(&self) -> bool {
        self.status == ContradictionStatus::Unresolved
    }

    /// Whether `claim` is one side of the contradiction
    pub fn involves(&self, claim: ClaimId) -> bool {
        self.claim_a == claim || self.claim_b == claim
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pair_id_is_symmetric() {
        let a = ClaimId::from_value(1);
        let b = ClaimId::from_value(2);
        assert_eq!(ContradictionId::for_pair(a, b), ContradictionId::for_pair(b, a));
        assert_ne!(
            ContradictionId::for_pair(a, b),
            ContradictionId::for_pair(a, ClaimId::from_value(3))
        );
    }

    #[test]
    fn test_action_parse() {
        for action in [
            ContradictionAction::PreferA,
            ContradictionAction::PreferB,
            ContradictionAction::Merge,
            ContradictionAction::BothValid,
        ] {
            assert_eq!(ContradictionAction::parse(action.as_str()), Some(action));
        }
        assert!(ContradictionAction::parse("coin_flip").is_none());
    }
}
