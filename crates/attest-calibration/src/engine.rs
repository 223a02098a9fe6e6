//! The calibration engine
//!
//! Turns `outcome` entries into per-category calibrations and publishes them
//! as a new snapshot. Anything that consumes calibration reads a snapshot,
//! so a recomputation never changes a value half way through a caller's work.

use crate::curve::compute_curve_from_points;
use crate::interval::compute_wilson_interval;
use crate::isotonic::isotonic_calibration;
use crate::scoring::{compute_brier_score, compute_log_loss};
use crate::snapshot::{CalibrationSnapshot, CategoryCalibration, SnapshotHandle};
use crate::{CalibrationConfig, CalibrationError};
use attest_domain::payload::{CalibrationPayload, OutcomePayload};
use attest_domain::{
    CalibrationSample, ConfidenceValue, EvidenceId, EvidenceKind, EvidenceStorage, NewEvidence,
    Provenance,
};
use attest_ledger::{EvidenceLedger, LedgerSnapshot};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::fmt::Display;
use std::sync::Arc;
use tracing::{debug, info};

/// Provenance source of published `calibration` entries
pub const CALIBRATION_SOURCE: &str = "attest:calibration";

/// Computes and publishes calibration snapshots
///
/// # Examples
///
/// ```
/// use attest_calibration::{CalibrationConfig, CalibrationEngine};
/// use attest_domain::{AbsentReason, CalibrationSample, VerificationMethod};
/// use chrono::Utc;
///
/// let engine = CalibrationEngine::new(CalibrationConfig::default());
/// let samples: Vec<_> = (0..3)
///     .map(|_| CalibrationSample::new("api", 0.9, true, VerificationMethod::TestResult, Utc::now()))
///     .collect();
/// engine.recompute(&samples, Utc::now()).unwrap();
///
/// // three perfect outcomes are still far below the sample floor
/// let confidence = engine.category_confidence("api");
/// assert_eq!(confidence.absent_reason(), Some(AbsentReason::InsufficientData));
/// ```
#[derive(Debug)]
pub struct CalibrationEngine {
    config: CalibrationConfig,
    handle: Arc<SnapshotHandle>,
    last_outcome: Option<u64>,
    // highest version already recorded in a ledger
    recorded_version: u64,
}

impl CalibrationEngine {
    /// Engine publishing into its own handle
    pub fn new(config: CalibrationConfig) -> Self {
        Self::with_handle(config, Arc::new(SnapshotHandle::new()))
    }

    /// Engine publishing into a shared handle
    pub fn with_handle(config: CalibrationConfig, handle: Arc<SnapshotHandle>) -> Self {
        Self {
            config,
            handle,
            last_outcome: None,
            recorded_version: 0,
        }
    }

    /// Configuration in use
    pub fn config(&self) -> &CalibrationConfig {
        &self.config
    }

    /// Handle readers load snapshots from
    pub fn handle(&self) -> Arc<SnapshotHandle> {
        Arc::clone(&self.handle)
    }

    /// Current snapshot
    pub fn snapshot(&self) -> Arc<CalibrationSnapshot> {
        self.handle.load()
    }

    /// Measured accuracy of a category in the current snapshot
    pub fn category_confidence(&self, category: &str) -> ConfidenceValue {
        self.snapshot().category_confidence(category)
    }

    /// Map `value` through a category's mapping in `snapshot`
    pub fn calibrate(
        &self,
        value: &ConfidenceValue,
        category: &str,
        snapshot: &CalibrationSnapshot,
    ) -> ConfidenceValue {
        snapshot.calibrate(value, category)
    }

    /// Calibration for one category, refusing underpowered input
    ///
    /// # Errors
    ///
    /// `CalibrationUnderpowered` below the PAC floor, `EmptySamples` with
    /// no samples at all.
    pub fn measure_category(
        &self,
        category: &str,
        samples: &[CalibrationSample],
    ) -> Result<CategoryCalibration, CalibrationError> {
        let measured = self.fit_category(category, samples)?;
        if !measured.is_sufficient() {
            return Err(CalibrationError::CalibrationUnderpowered {
                category: category.to_string(),
                samples: measured.sample_count,
                required: measured.required_samples,
            });
        }
        Ok(measured)
    }

    fn fit_category(
        &self,
        category: &str,
        samples: &[CalibrationSample],
    ) -> Result<CategoryCalibration, CalibrationError> {
        let required = self.config.min_samples()?;
        let mapping = isotonic_calibration(samples)?;

        let raw: Vec<(f64, bool)> = samples
            .iter()
            .map(|s| (s.predicted_confidence, s.actual_outcome))
            .collect();
        let calibrated: Vec<(f64, bool)> = raw
            .iter()
            .map(|&(p, held)| (mapping.apply(p), held))
            .collect();
        let curve = compute_curve_from_points(&raw, self.config.num_buckets)?;
        let calibrated_ece = compute_curve_from_points(&calibrated, self.config.num_buckets)?.ece;

        let successes = samples.iter().filter(|s| s.actual_outcome).count();
        let interval = compute_wilson_interval(
            successes as u64,
            samples.len() as u64,
            self.config.wilson_z,
        )?;

        Ok(CategoryCalibration {
            category: category.to_string(),
            sample_count: samples.len(),
            successes,
            curve,
            mapping,
            calibrated_ece,
            brier_score: compute_brier_score(samples)?,
            log_loss: compute_log_loss(samples)?,
            interval,
            required_samples: required,
        })
    }

    /// Recompute every category from `samples` and publish the result
    ///
    /// Underpowered categories are kept in the snapshot so their sample
    /// counts stay visible, but they never yield a measured confidence.
    pub fn recompute(
        &self,
        samples: &[CalibrationSample],
        computed_at: DateTime<Utc>,
    ) -> Result<Arc<CalibrationSnapshot>, CalibrationError> {
        let mut grouped: BTreeMap<&str, Vec<CalibrationSample>> = BTreeMap::new();
        for sample in samples {
            grouped
                .entry(sample.category.as_str())
                .or_default()
                .push(sample.clone());
        }

        let mut categories = BTreeMap::new();
        for (category, group) in grouped {
            let measured = self.fit_category(category, &group)?;
            debug!(
                category,
                samples = measured.sample_count,
                sufficient = measured.is_sufficient(),
                ece = measured.curve.ece,
                "Category calibrated"
            );
            categories.insert(category.to_string(), measured);
        }

        let snapshot = CalibrationSnapshot {
            version: self.handle.version().max(self.recorded_version) + 1,
            computed_at,
            categories,
        };
        let sufficient = snapshot
            .categories
            .values()
            .filter(|c| c.is_sufficient())
            .count();
        info!(
            version = snapshot.version,
            categories = snapshot.categories.len(),
            sufficient,
            "Calibration snapshot published"
        );
        self.handle.publish(snapshot);
        Ok(self.handle.load())
    }

    /// Outcome samples recorded in a ledger snapshot
    ///
    /// Outcome entries whose payload does not parse are skipped.
    pub fn samples_from_ledger(snapshot: &LedgerSnapshot) -> Vec<CalibrationSample> {
        snapshot
            .by_kind(EvidenceKind::Outcome)
            .filter_map(|entry| match OutcomePayload::from_value(&entry.payload) {
                Ok(payload) => Some(payload.into_sample(entry.timestamp)),
                Err(e) => {
                    debug!(entry = %entry.id.short(), error = %e, "Skipping malformed outcome");
                    None
                }
            })
            .collect()
    }

    /// Highest snapshot version among recorded `calibration` entries
    pub fn recorded_version(snapshot: &LedgerSnapshot) -> u64 {
        snapshot
            .by_kind(EvidenceKind::Calibration)
            .filter_map(|entry| CalibrationPayload::from_value(&entry.payload).ok())
            .map(|payload| payload.version)
            .max()
            .unwrap_or(0)
    }

    /// Recompute from the ledger's outcomes if any arrived since last time
    ///
    /// Returns the published snapshot, or `None` when nothing was new. When
    /// `record_snapshots` is set, one `calibration` entry per category is
    /// appended. Versions continue from the highest one already recorded, so
    /// a restarted engine never reuses a version number.
    pub fn recompute_from_ledger<S>(
        &mut self,
        ledger: &EvidenceLedger<S>,
        computed_at: DateTime<Utc>,
    ) -> Result<Option<Arc<CalibrationSnapshot>>, CalibrationError>
    where
        S: EvidenceStorage,
        S::Error: Display,
    {
        let view = ledger.snapshot();
        let newest = view.by_kind(EvidenceKind::Outcome).map(|e| e.sequence).max();
        if newest.is_none() || newest == self.last_outcome {
            debug!("No new outcomes, calibration unchanged");
            return Ok(None);
        }

        self.recorded_version = self.recorded_version.max(Self::recorded_version(&view));
        let samples = Self::samples_from_ledger(&view);
        let snapshot = self.recompute(&samples, computed_at)?;
        self.last_outcome = newest;

        if self.config.record_snapshots {
            let recorded = self.record_snapshot(ledger, &snapshot)?;
            debug!(entries = recorded.len(), "Calibration entries recorded");
        }
        Ok(Some(snapshot))
    }

    fn record_snapshot<S>(
        &self,
        ledger: &EvidenceLedger<S>,
        snapshot: &CalibrationSnapshot,
    ) -> Result<Vec<EvidenceId>, CalibrationError>
    where
        S: EvidenceStorage,
        S::Error: Display,
    {
        let mut recorded = Vec::with_capacity(snapshot.categories.len());
        for (category, measured) in &snapshot.categories {
            let payload = CalibrationPayload {
                category: category.clone(),
                version: snapshot.version,
                sample_count: measured.sample_count as u64,
                ece: measured.curve.ece,
                sufficient: measured.is_sufficient(),
            };
            let draft = NewEvidence::new(
                EvidenceKind::Calibration,
                payload.to_value()?,
                Provenance::new(CALIBRATION_SOURCE).with_method("isotonic"),
            )
            .with_confidence(snapshot.category_confidence(category))
            .at(snapshot.computed_at);
            recorded.push(ledger.append(draft)?);
        }
        Ok(recorded)
    }
}

impl Default for CalibrationEngine {
    fn default() -> Self {
        Self::new(CalibrationConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use attest_domain::VerificationMethod;

    fn samples(category: &str, n: usize, p: f64, held_every: usize) -> Vec<CalibrationSample> {
        (0..n)
            .map(|i| {
                CalibrationSample::new(
                    category,
                    p,
                    i % held_every == 0,
                    VerificationMethod::TestResult,
                    Utc::now(),
                )
            })
            .collect()
    }

    #[test]
    fn test_underpowered_category_errors() {
        let engine = CalibrationEngine::default();
        let result = engine.measure_category("api", &samples("api", 3, 1.0, 1));
        match result {
            Err(CalibrationError::CalibrationUnderpowered {
                samples, required, ..
            }) => {
                assert_eq!(samples, 3);
                assert_eq!(required, 600);
            }
            other => panic!("expected underpowered, got {:?}", other),
        }
    }

    #[test]
    fn test_versions_increase() {
        let engine = CalibrationEngine::new(CalibrationConfig::lenient());
        let first = engine.recompute(&samples("api", 10, 0.5, 2), Utc::now()).unwrap();
        let second = engine.recompute(&samples("api", 10, 0.5, 2), Utc::now()).unwrap();
        assert_eq!(first.version, 1);
        assert_eq!(second.version, 2);
        assert_eq!(engine.snapshot().version, 2);
    }

    #[test]
    fn test_categories_are_independent() {
        let engine = CalibrationEngine::new(CalibrationConfig::lenient());
        let mut all = samples("api", 200, 0.9, 2);
        all.extend(samples("db", 5, 0.9, 1));
        let snapshot = engine.recompute(&all, Utc::now()).unwrap();

        assert_eq!(snapshot.categories.len(), 2);
        assert!(snapshot.get("api").unwrap().is_sufficient());
        assert!(!snapshot.get("db").unwrap().is_sufficient());
        assert!(!snapshot.category_confidence("api").is_absent());
        assert!(snapshot.category_confidence("db").is_absent());
    }

    #[test]
    fn test_empty_recompute_publishes_empty_snapshot() {
        let engine = CalibrationEngine::default();
        let snapshot = engine.recompute(&[], Utc::now()).unwrap();
        assert_eq!(snapshot.version, 1);
        assert!(snapshot.categories.is_empty());
    }
}
