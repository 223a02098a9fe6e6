//! Attest Calibration
//!
//! Measures how well stated confidence matches what actually happened, and
//! turns that measurement into confidence values other components can use.
//!
//! # Overview
//!
//! - **Curves**: reliability buckets with expected and maximum calibration error
//! - **Isotonic mapping**: pool-adjacent-violators fit from predicted to
//!   observed accuracy, never inverting order
//! - **Scoring rules**: Brier score and log loss for comparing methods
//! - **Intervals**: Wilson score intervals for small samples
//! - **Sample floor**: a PAC bound below which a category stays
//!   `Absent(insufficient_data)`
//! - **Snapshots**: versioned results published atomically; consumers pass a
//!   snapshot into every calibration-dependent call
//! - **Worker**: periodic recomputation from the ledger's `outcome` entries
//!
//! # Usage
//!
//! ```
//! use attest_calibration::{CalibrationConfig, CalibrationEngine};
//! use attest_domain::{CalibrationSample, ConfidenceValue, VerificationMethod};
//! use chrono::Utc;
//!
//! let engine = CalibrationEngine::new(CalibrationConfig::lenient());
//! let samples: Vec<_> = (0..200)
//!     .map(|i| CalibrationSample::new("api", 0.9, i % 4 != 0, VerificationMethod::TestResult, Utc::now()))
//!     .collect();
//! let snapshot = engine.recompute(&samples, Utc::now()).unwrap();
//!
//! let stated = ConfidenceValue::measured(0.9, "agent", 1, 0.9, 0.9);
//! let calibrated = engine.calibrate(&stated, "api", &snapshot);
//! assert!((calibrated.point_value().unwrap() - 0.75).abs() < 1e-12);
//! ```
//!
//! # Configuration
//!
//! ```toml
//! [calibration]
//! num_buckets = 10
//! epsilon = 0.05
//! delta = 0.1
//! wilson_z = 1.96
//! recompute_interval_minutes = 60
//! record_snapshots = true
//! ```

#![warn(missing_docs)]

mod config;
mod curve;
mod engine;
mod error;
mod interval;
mod isotonic;
mod pac;
mod scoring;
mod snapshot;
mod worker;

pub use config::CalibrationConfig;
pub use curve::{
    compute_calibration_curve, compute_curve_from_points, CalibrationBucket, CalibrationCurve,
};
pub use engine::{CalibrationEngine, CALIBRATION_SOURCE};
pub use error::CalibrationError;
pub use interval::{compute_wilson_interval, wilson_bounded, WilsonInterval};
pub use isotonic::{isotonic_calibration, pav, IsotonicBlock, IsotonicMapping};
pub use pac::compute_min_samples_for_calibration;
pub use scoring::{compute_brier_score, compute_log_loss, LOG_LOSS_EPSILON};
pub use snapshot::{CalibrationSnapshot, CategoryCalibration, SnapshotHandle};
pub use worker::CalibrationWorker;
