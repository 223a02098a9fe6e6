//! Attest Domain Layer
//!
//! Core vocabulary shared by every Attest crate: typed confidence values and
//! the algebra that combines them, claims and their lifecycle, evidence
//! entries, defeaters and contradictions, and the storage trait the evidence
//! ledger is written against.
//!
//! ## Key Concepts
//!
//! - **ConfidenceValue**: A discriminated confidence, never a bare number.
//!   Every value is deterministic, derived (with its formula and inputs),
//!   measured (with its dataset), bounded (with its basis), or absent (with
//!   a reason).
//! - **Confidence algebra**: `sequence`, `parallel_all`, `parallel_any` and the
//!   lattice operators `and`/`or`, all of which propagate absence instead of
//!   inventing numbers.
//! - **Evidence**: Append-only, content-addressed entries linked by typed
//!   relations.
//! - **Claim**: A statement about a subject with a confidence and a status
//!   (`active`, `defeated`, `contradicted`, `superseded`, `stale`).
//! - **Defeater / Contradiction**: Records of why a claim should no longer be
//!   trusted at face value.
//!
//! ## Architecture
//!
//! - Pure data and functions, no I/O
//! - Storage implementations live in `attest-ledger`
//! - Engines (defeaters, calibration, contradictions) live in their own crates

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod algebra;
pub mod calibration;
pub mod canonical;
pub mod claim;
pub mod confidence;
pub mod contradiction;
pub mod defeater;
pub mod error;
pub mod evidence;
pub mod payload;
pub mod proposition;
pub mod semilattice;
pub mod status;
pub mod traits;

// Re-exports for convenience
pub use algebra::{EffectiveConfidence, ThresholdDecision, ThresholdOutcome};
pub use calibration::{CalibrationSample, VerificationMethod};
pub use claim::{Claim, ClaimId, DefeatAmbiguity};
pub use confidence::{
    AbsentReason, BoundBasis, CalibrationStatus, ConfidenceValue, Formula, TraceGap,
};
pub use contradiction::{
    Contradiction, ContradictionAction, ContradictionId, ContradictionKind,
    ContradictionSeverity, ContradictionStatus,
};
pub use defeater::{
    DefeatTarget, Defeater, DefeaterId, DefeaterSeverity, DefeaterType, ResolutionAction,
};
pub use error::{ConfidenceError, ShapeViolation, StatusTransitionError, ValidationError};
pub use evidence::{EvidenceEntry, EvidenceId, EvidenceKind, NewEvidence, Provenance, RelatedEntry, Relation};
pub use status::ClaimStatus;
pub use traits::{EvidenceStorage, StorageFilter};
