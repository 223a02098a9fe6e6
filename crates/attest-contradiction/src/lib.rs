//! Attest Contradiction Tracker
//!
//! Finds claims on the same topic that cannot both be true and records them
//! for a decision. It never picks a side on its own.
//!
//! # Overview
//!
//! - **Detection**: same-subject, same-type claims whose propositions negate
//!   each other or assert different values for the same predicate
//! - **Severity**: graded by the weaker claim's confidence; an absent
//!   confidence counts as zero
//! - **Resolution**: `prefer_a`, `prefer_b`, `merge` or `both_valid`, recorded
//!   with a rationale as a new ledger entry
//! - **Replay**: a fresh tracker rebuilds its state from the ledger
//!
//! # Usage
//!
//! ```
//! use attest_contradiction::{ContradictionTracker, TrackerConfig};
//! use attest_domain::payload::ClaimPayload;
//! use attest_domain::{ClaimId, ContradictionAction, EvidenceKind, NewEvidence, Provenance};
//! use attest_ledger::{EvidenceLedger, MemoryStorage};
//!
//! let ledger = EvidenceLedger::new(MemoryStorage::new()).unwrap();
//! for (n, proposition) in [(1, "function X returns A"), (2, "function X returns B")] {
//!     let payload = ClaimPayload::new(ClaimId::from_value(n), "fn:x", "behavior", proposition);
//!     let draft = NewEvidence::new(EvidenceKind::Claim, payload.to_value().unwrap(), Provenance::new("agent"));
//!     ledger.append(draft).unwrap();
//! }
//!
//! let mut tracker = ContradictionTracker::new(TrackerConfig::default());
//! let found = tracker.detect_contradictions(&ledger).unwrap();
//! assert_eq!(found.len(), 1);
//! assert!(found[0].is_unresolved());
//!
//! let resolved = tracker
//!     .resolve_contradiction(&ledger, &found[0].id, ContradictionAction::BothValid, "different call sites")
//!     .unwrap();
//! assert!(!resolved.is_unresolved());
//! ```
//!
//! # Configuration
//!
//! ```toml
//! [contradiction]
//! detect_negation = true
//! detect_conflicting_values = true
//! blocking_threshold = 0.7
//! significant_threshold = 0.4
//! ```

#![warn(missing_docs)]

mod config;
mod error;
mod tracker;

pub use config::TrackerConfig;
pub use error::ContradictionError;
pub use tracker::{ContradictionTracker, TRACKER_SOURCE};
