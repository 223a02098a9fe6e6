//! Error types for calibration

use attest_ledger::LedgerError;
use thiserror::Error;

/// Errors that can occur while measuring or applying calibration
#[derive(Error, Debug)]
pub enum CalibrationError {
    /// Too few samples for an accurate estimate
    #[error("Category '{category}' has {samples} samples, {required} required")]
    CalibrationUnderpowered {
        /// Category that was measured
        category: String,
        /// Samples available
        samples: usize,
        /// PAC floor
        required: usize,
    },

    /// Nothing to compute over
    #[error("No calibration samples")]
    EmptySamples,

    /// Argument outside its domain
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

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

impl From<serde_json::Error> for CalibrationError {
    fn from(e: serde_json::Error) -> Self {
        CalibrationError::Serialization(e.to_string())
    }
}
