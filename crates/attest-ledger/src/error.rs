//! Ledger error types

use attest_domain::{EvidenceId, ValidationError};
use thiserror::Error;

/// Errors that can occur during ledger operations
#[derive(Error, Debug)]
pub enum LedgerError {
    /// Payload did not match its kind; nothing was persisted
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Storage backend failure
    #[error("Storage error: {0}")]
    Storage(String),

    /// Entry not found
    #[error("Evidence entry not found: {0}")]
    NotFound(EvidenceId),

    /// A relation points at an entry that is not committed
    #[error("Relation target {target} is not committed")]
    DanglingRelation {
        /// Missing target
        target: EvidenceId,
    },

    /// Serialization failure while hashing or exporting
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// A stored entry's id no longer matches its content
    #[error("Integrity violation: entry {id} at sequence {sequence} does not hash to its id")]
    Integrity {
        /// Offending id
        id: EvidenceId,
        /// Its sequence
        sequence: u64,
    },

    /// Configuration could not be loaded
    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<serde_json::Error> for LedgerError {
    fn from(e: serde_json::Error) -> Self {
        LedgerError::Serialization(e.to_string())
    }
}
