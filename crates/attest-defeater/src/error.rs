//! Error types for defeater operations

use attest_domain::{ClaimId, DefeaterId, StatusTransitionError};
use attest_ledger::LedgerError;
use thiserror::Error;

/// Errors that can occur during defeater operations
#[derive(Error, Debug)]
pub enum DefeaterError {
    /// An odd meta-defeat cycle could not be labelled
    #[error("Defeat cycle of {} defeaters is ambiguous", .cycle.len())]
    DefeatCycleAmbiguous {
        /// Defeaters in the unresolved component
        cycle: Vec<DefeaterId>,
    },

    /// Activity computation hit its iteration cap
    #[error("Defeater activity did not converge within {iterations} iterations")]
    FixpointExceeded {
        /// Cap that was reached
        iterations: usize,
    },

    /// Claim is not on the board
    #[error("Claim not found: {0}")]
    ClaimNotFound(ClaimId),

    /// Defeater is not registered
    #[error("Defeater not found: {0}")]
    DefeaterNotFound(DefeaterId),

    /// Claim lifecycle refused the move
    #[error(transparent)]
    InvalidTransition(#[from] StatusTransitionError),

    /// Ledger read or append failed
    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    /// An event payload could not be encoded
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<serde_json::Error> for DefeaterError {
    fn from(e: serde_json::Error) -> Self {
        DefeaterError::Serialization(e.to_string())
    }
}
