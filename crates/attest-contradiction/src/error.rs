//! Error types for contradiction tracking

use attest_domain::ContradictionId;
use attest_ledger::LedgerError;
use thiserror::Error;

/// Errors that can occur while tracking contradictions
#[derive(Error, Debug)]
pub enum ContradictionError {
    /// No contradiction with this id has been detected
    #[error("Contradiction not found: {0}")]
    NotFound(ContradictionId),

    /// A resolution was already recorded
    #[error("Contradiction already resolved: {0}")]
    AlreadyResolved(ContradictionId),

    /// Ledger read or append failed
    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    /// A payload could not be encoded
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<serde_json::Error> for ContradictionError {
    fn from(e: serde_json::Error) -> Self {
        ContradictionError::Serialization(e.to_string())
    }
}
