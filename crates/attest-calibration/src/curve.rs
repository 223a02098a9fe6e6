//! Reliability curves and calibration error

use crate::CalibrationError;
use attest_domain::CalibrationSample;
use serde::{Deserialize, Serialize};

/// One non-empty bucket of a reliability curve
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationBucket {
    /// Bucket index in `0..num_buckets`
    pub index: usize,
    /// Mean predicted confidence of the bucket's samples
    pub mean_predicted: f64,
    /// Fraction of the bucket's samples that held
    pub mean_actual: f64,
    /// Samples in the bucket
    pub count: usize,
}

impl CalibrationBucket {
    /// `|mean_predicted - mean_actual|`
    pub fn gap(&self) -> f64 {
        (self.mean_predicted - self.mean_actual).abs()
    }
}

/// Reliability curve with its summary errors
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationCurve {
    /// Non-empty buckets in index order
    pub buckets: Vec<CalibrationBucket>,
    /// Buckets requested
    pub num_buckets: usize,
    /// Samples across all buckets
    pub total: usize,
    /// Expected calibration error, weighted by bucket size
    pub ece: f64,
    /// Maximum calibration error over non-empty buckets
    pub mce: f64,
}

/// Bucket a prediction in `[0, 1]` falls into
pub(crate) fn bucket_index(predicted: f64, num_buckets: usize) -> usize {
    let scaled = (predicted.clamp(0.0, 1.0) * num_buckets as f64).floor() as usize;
    scaled.min(num_buckets - 1)
}

/// Reliability curve over `(predicted, held)` pairs
pub fn compute_curve_from_points(
    points: &[(f64, bool)],
    num_buckets: usize,
) -> Result<CalibrationCurve, CalibrationError> {
    if num_buckets == 0 {
        return Err(CalibrationError::InvalidParameter(
            "num_buckets must be positive".to_string(),
        ));
    }
    if points.is_empty() {
        return Err(CalibrationError::EmptySamples);
    }
    if let Some((p, _)) = points.iter().find(|(p, _)| !p.is_finite()) {
        return Err(CalibrationError::InvalidParameter(format!(
            "predicted confidence must be finite, got {}",
            p
        )));
    }

    // (sum predicted, sum actual, count)
    let mut sums = vec![(0.0, 0.0, 0usize); num_buckets];
    for &(predicted, held) in points {
        let slot = &mut sums[bucket_index(predicted, num_buckets)];
        slot.0 += predicted.clamp(0.0, 1.0);
        slot.1 += if held { 1.0 } else { 0.0 };
        slot.2 += 1;
    }

    let total = points.len();
    let buckets: Vec<CalibrationBucket> = sums
        .into_iter()
        .enumerate()
        .filter(|(_, (_, _, count))| *count > 0)
        .map(|(index, (predicted, actual, count))| CalibrationBucket {
            index,
            mean_predicted: predicted / count as f64,
            mean_actual: actual / count as f64,
            count,
        })
        .collect();

    let ece = buckets
        .iter()
        .map(|b| b.count as f64 / total as f64 * b.gap())
        .sum();
    let mce = buckets.iter().map(CalibrationBucket::gap).fold(0.0, f64::max);

    Ok(CalibrationCurve {
        buckets,
        num_buckets,
        total,
        ece,
        mce,
    })
}

/// Reliability curve over calibration samples
///
/// # Examples
///
/// ```
/// use attest_calibration::compute_calibration_curve;
/// use attest_domain::{CalibrationSample, VerificationMethod};
/// use chrono::Utc;
///
/// let samples: Vec<_> = [(0.9, true), (0.9, false), (0.2, false)]
///     .iter()
///     .map(|&(p, o)| CalibrationSample::new("api", p, o, VerificationMethod::TestResult, Utc::now()))
///     .collect();
/// let curve = compute_calibration_curve(&samples, 10).unwrap();
/// assert_eq!(curve.buckets.len(), 2);
/// assert!((curve.mce - 0.4).abs() < 1e-12);
/// ```
pub fn compute_calibration_curve(
    samples: &[CalibrationSample],
    num_buckets: usize,
) -> Result<CalibrationCurve, CalibrationError> {
    let points: Vec<(f64, bool)> = samples
        .iter()
        .map(|s| (s.predicted_confidence, s.actual_outcome))
        .collect();
    compute_curve_from_points(&points, num_buckets)
}
