//! Wilson score intervals for small samples

use crate::CalibrationError;
use attest_domain::{BoundBasis, ConfidenceValue};
use serde::{Deserialize, Serialize};

/// Binomial proportion interval
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WilsonInterval {
    /// Observed proportion
    pub proportion: f64,
    /// Interval centre
    pub center: f64,
    /// Lower bound
    pub low: f64,
    /// Upper bound
    pub high: f64,
}

/// Wilson score interval for `successes` out of `total` at quantile `z`
///
/// # Examples
///
/// ```
/// use attest_calibration::compute_wilson_interval;
///
/// let interval = compute_wilson_interval(3, 3, 1.96).unwrap();
/// assert_eq!(interval.proportion, 1.0);
/// assert!(interval.low < 0.5);
/// assert!(interval.high > 0.99);
/// ```
pub fn compute_wilson_interval(
    successes: u64,
    total: u64,
    z: f64,
) -> Result<WilsonInterval, CalibrationError> {
    if total == 0 {
        return Err(CalibrationError::EmptySamples);
    }
    if successes > total {
        return Err(CalibrationError::InvalidParameter(format!(
            "{} successes out of {} trials",
            successes, total
        )));
    }
    if !(z.is_finite() && z > 0.0) {
        return Err(CalibrationError::InvalidParameter(format!(
            "z must be positive, got {}",
            z
        )));
    }

    let n = total as f64;
    let p = successes as f64 / n;
    let z2 = z * z;
    let denominator = 1.0 + z2 / n;
    let center = (p + z2 / (2.0 * n)) / denominator;
    let half_width = z * (p * (1.0 - p) / n + z2 / (4.0 * n * n)).sqrt() / denominator;

    Ok(WilsonInterval {
        proportion: p,
        center,
        low: (center - half_width).max(0.0),
        high: (center + half_width).min(1.0),
    })
}

/// Wilson interval as a `Bounded` confidence
pub fn wilson_bounded(
    successes: u64,
    total: u64,
    z: f64,
) -> Result<ConfidenceValue, CalibrationError> {
    let interval = compute_wilson_interval(successes, total, z)?;
    Ok(ConfidenceValue::bounded(
        interval.low,
        interval.high,
        BoundBasis::WilsonInterval,
        format!("{}/{} successes, z = {}", successes, total, z),
    ))
}
