//! Attest Defeater Engine
//!
//! Finds the reasons a claim should no longer be taken at face value, decides
//! which of those reasons are themselves beaten, and lowers claim confidence
//! accordingly.
//!
//! # Overview
//!
//! The engine is responsible for:
//! - **Detection**: staleness, code hash mismatches, conflicting claims,
//!   failed verifications, feedback signals and `defeats` relations
//! - **Activity**: defeaters can be defeated too; cycles of mutual attack are
//!   cancelled when even and surfaced (or settled by policy) when odd
//! - **Application**: active defeaters reduce confidence by severity, either
//!   with a fixed factor or a beta-binomial update
//! - **Propagation**: claims that depend on a defeated claim are marked stale
//! - **Event recording**: every decision is appended to the ledger as a
//!   `verification` entry, so a restarted engine replays to the same state
//!
//! # Defeat Semantics
//!
//! | Severity | Default reduction | Status effect |
//! |----------|-------------------|---------------|
//! | **Full** | confidence becomes `Deterministic(false)` | `defeated` or `contradicted` |
//! | **Partial** | x 0.5 | none |
//! | **Warning** | x 0.9 | none |
//! | **Informational** | none | none |
//!
//! # Usage
//!
//! ```
//! use attest_defeater::{DefeaterConfig, DefeaterEngine, DetectionContext};
//! use attest_ledger::{EvidenceLedger, MemoryStorage};
//!
//! let ledger = EvidenceLedger::new(MemoryStorage::new()).unwrap();
//! let mut engine = DefeaterEngine::new(DefeaterConfig::strict());
//! let report = engine.sweep(&ledger, &DetectionContext::now()).unwrap();
//! assert!(report.detected.is_empty());
//! println!("{}", engine.metrics().summary());
//! ```
//!
//! # Configuration
//!
//! ```toml
//! [defeater]
//! max_claim_age_hours = 720
//! application_method = "severity"   # or "bayesian"
//! odd_cycle_policy = "surface_ambiguity"
//! max_fixpoint_iterations = 64
//! max_propagation_depth = 8
//! record_events = true
//!
//! [defeater.reduction]
//! partial = 0.5
//! warning = 0.1
//! ```

#![warn(missing_docs)]

mod activity;
mod application;
mod board;
mod config;
mod detection;
mod engine;
mod error;
mod metrics;
mod propagation;

pub use activity::{compute_activity, is_defeater_active, ActivityReport, DefeatStatus};
pub use application::apply_defeater_to_confidence;
pub use board::{ClaimBoard, DefeaterRegistry};
pub use config::{
    ApplicationMethod, DefeaterConfig, OddCyclePolicy, PseudoFailures, ReductionFactors,
};
pub use detection::{detect_defeaters, DetectionContext};
pub use engine::{DefeaterEngine, Evaluation, Resolution, SweepReport, EVENT_SOURCE};
pub use error::DefeaterError;
pub use metrics::DefeaterMetrics;
pub use propagation::{PropagationReport, StaleMark};
