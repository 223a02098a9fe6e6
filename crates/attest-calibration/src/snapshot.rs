//! Versioned calibration snapshots and their atomic publication

use crate::curve::CalibrationCurve;
use crate::interval::WilsonInterval;
use crate::isotonic::IsotonicMapping;
use attest_domain::algebra::derive;
use attest_domain::{AbsentReason, CalibrationStatus, ConfidenceValue, Formula};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

/// Everything learned about one category
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryCalibration {
    /// Category name
    pub category: String,
    /// Samples used
    pub sample_count: usize,
    /// Samples whose prediction held
    pub successes: usize,
    /// Reliability curve of the raw predictions
    pub curve: CalibrationCurve,
    /// Predicted to calibrated confidence
    pub mapping: IsotonicMapping,
    /// Expected calibration error after applying `mapping` to the same samples
    pub calibrated_ece: f64,
    /// Brier score of the raw predictions
    pub brier_score: f64,
    /// Log loss of the raw predictions
    pub log_loss: f64,
    /// Wilson interval around the observed accuracy
    pub interval: WilsonInterval,
    /// PAC floor in force when this was computed
    pub required_samples: usize,
}

impl CategoryCalibration {
    /// Fraction of predictions that held
    pub fn observed_accuracy(&self) -> f64 {
        self.interval.proportion
    }

    /// Whether the category reached the PAC floor
    pub fn is_sufficient(&self) -> bool {
        self.sample_count >= self.required_samples
    }
}

/// Immutable set of category calibrations
///
/// Calibration-consuming calls take a snapshot explicitly; there is no
/// process-wide current mapping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationSnapshot {
    /// Increases by one per publication; 0 is the empty snapshot
    pub version: u64,
    /// When the snapshot was computed
    pub computed_at: DateTime<Utc>,
    /// Per-category results
    pub categories: BTreeMap<String, CategoryCalibration>,
}

impl CalibrationSnapshot {
    /// Version 0 with no categories
    pub fn empty() -> Self {
        Self {
            version: 0,
            computed_at: DateTime::<Utc>::UNIX_EPOCH,
            categories: BTreeMap::new(),
        }
    }

    /// Results for a category
    pub fn get(&self, category: &str) -> Option<&CategoryCalibration> {
        self.categories.get(category)
    }

    /// Results for a category that reached the PAC floor
    pub fn sufficient(&self, category: &str) -> Option<&CategoryCalibration> {
        self.get(category).filter(|c| c.is_sufficient())
    }

    /// Measured accuracy of a category
    ///
    /// Below the PAC floor (or with no samples at all) the answer is
    /// `Absent(insufficient_data)`, whatever the observed accuracy.
    pub fn category_confidence(&self, category: &str) -> ConfidenceValue {
        match self.sufficient(category) {
            Some(c) => ConfidenceValue::measured(
                c.observed_accuracy(),
                format!("calibration:{}:v{}", category, self.version),
                c.sample_count as u64,
                c.interval.low,
                c.interval.high,
            ),
            None => ConfidenceValue::absent(AbsentReason::InsufficientData),
        }
    }

    /// Map a stated confidence through a category's isotonic mapping
    ///
    /// Absent input stays absent; an underpowered category yields
    /// `Absent(insufficient_data)`. The result records the snapshot version.
    pub fn calibrate(&self, value: &ConfidenceValue, category: &str) -> ConfidenceValue {
        if value.is_absent() {
            return value.clone();
        }
        let Some(calibration) = self.sufficient(category) else {
            return ConfidenceValue::absent(AbsentReason::InsufficientData);
        };
        let Some(point) = value.point_value() else {
            return ConfidenceValue::absent(AbsentReason::NoInputs);
        };
        let formula = Formula::IsotonicCalibration {
            category: category.to_string(),
            snapshot_version: self.version,
            mapped: calibration.mapping.apply(point),
        };
        match derive(formula, vec![value.clone()]) {
            ConfidenceValue::Derived {
                value,
                formula,
                inputs,
                ..
            } => ConfidenceValue::Derived {
                value,
                formula,
                inputs,
                calibration_status: CalibrationStatus::Preserved,
            },
            other => other,
        }
    }
}

impl Default for CalibrationSnapshot {
    fn default() -> Self {
        Self::empty()
    }
}

/// Shared slot holding the current snapshot
///
/// Readers clone the `Arc` and keep a consistent view for as long as they
/// hold it; publication swaps the pointer.
#[derive(Debug)]
pub struct SnapshotHandle {
    current: RwLock<Arc<CalibrationSnapshot>>,
}

impl SnapshotHandle {
    /// Handle holding the empty snapshot
    pub fn new() -> Self {
        Self::with_snapshot(CalibrationSnapshot::empty())
    }

    /// Handle holding `snapshot`
    pub fn with_snapshot(snapshot: CalibrationSnapshot) -> Self {
        Self {
            current: RwLock::new(Arc::new(snapshot)),
        }
    }

    /// Current snapshot
    pub fn load(&self) -> Arc<CalibrationSnapshot> {
        self.current
            .read()
            .map(|s| Arc::clone(&s))
            .unwrap_or_else(|e| Arc::clone(&e.into_inner()))
    }

    /// Version of the current snapshot
    pub fn version(&self) -> u64 {
        self.load().version
    }

    /// Replace the current snapshot; returns the one it replaced
    pub fn publish(&self, snapshot: CalibrationSnapshot) -> Arc<CalibrationSnapshot> {
        let mut current = self.current.write().unwrap_or_else(|e| e.into_inner());
        std::mem::replace(&mut *current, Arc::new(snapshot))
    }
}

impl Default for SnapshotHandle {
    fn default() -> Self {
        Self::new()
    }
}
