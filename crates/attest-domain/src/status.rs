//! Claim status - lifecycle of a claim under defeat

use crate::error::StatusTransitionError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Status of a claim
///
/// Transitions:
/// - `Active` → `Defeated` | `Contradicted` | `Stale`
/// - `Defeated` | `Contradicted` → `Superseded` | `Stale` | `Active` (reinstatement)
/// - `Stale` → `Active` | `Defeated` | `Contradicted` | `Superseded`
/// - `Superseded` is terminal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClaimStatus {
    /// Trusted at its current confidence
    Active,
    /// Brought down by a full-severity defeater
    Defeated,
    /// Brought down by a contradiction defeater
    Contradicted,
    /// Replaced by a newer claim
    Superseded,
    /// Something it depends on was defeated
    Stale,
}

impl ClaimStatus {
    /// Get the status name as a string
    pub fn as_str(&self) -> &'static str {
        match self {
            ClaimStatus::Active => "active",
            ClaimStatus::Defeated => "defeated",
            ClaimStatus::Contradicted => "contradicted",
            ClaimStatus::Superseded => "superseded",
            ClaimStatus::Stale => "stale",
        }
    }

    /// Parse a status from a string
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "active" => Some(ClaimStatus::Active),
            "defeated" => Some(ClaimStatus::Defeated),
            "contradicted" => Some(ClaimStatus::Contradicted),
            "superseded" => Some(ClaimStatus::Superseded),
            "stale" => Some(ClaimStatus::Stale),
            _ => None,
        }
    }

    /// Whether the lifecycle allows moving to `to`
    pub fn can_transition_to(&self, to: ClaimStatus) -> bool {
        use ClaimStatus::*;
        matches!(
            (self, to),
            (Active, Defeated)
                | (Active, Contradicted)
                | (Active, Stale)
                | (Defeated, Superseded)
                | (Defeated, Stale)
                | (Defeated, Active)
                | (Contradicted, Superseded)
                | (Contradicted, Stale)
                | (Contradicted, Active)
                | (Stale, Active)
                | (Stale, Defeated)
                | (Stale, Contradicted)
                | (Stale, Superseded)
        )
    }

    /// Check a transition, treating a move to the same status as a no-op
    pub fn transition(self, to: ClaimStatus) -> Result<ClaimStatus, StatusTransitionError> {
        if self == to || self.can_transition_to(to) {
            Ok(to)
        } else {
            Err(StatusTransitionError { from: self, to })
        }
    }

    /// No further transitions possible
    pub fn is_terminal(&self) -> bool {
        matches!(self, ClaimStatus::Superseded)
    }

    /// Brought down by a defeater of full severity
    pub fn is_defeated(&self) -> bool {
        matches!(self, ClaimStatus::Defeated | ClaimStatus::Contradicted)
    }
}

impl fmt::Display for ClaimStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ClaimStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| format!("Invalid claim status: {}", s))
    }
}
