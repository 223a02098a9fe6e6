//! Sample floor for trusting a measured accuracy

use crate::CalibrationError;

/// Smallest sample count for an `epsilon`-accurate estimate with
/// probability `1 - delta`
///
/// Hoeffding bound: `n >= ln(2 / delta) / (2 * epsilon^2)`, rounded up.
///
/// # Examples
///
/// ```
/// use attest_calibration::compute_min_samples_for_calibration;
///
/// assert_eq!(compute_min_samples_for_calibration(0.05, 0.1).unwrap(), 600);
/// ```
pub fn compute_min_samples_for_calibration(
    epsilon: f64,
    delta: f64,
) -> Result<usize, CalibrationError> {
    if !(epsilon > 0.0 && epsilon < 1.0) {
        return Err(CalibrationError::InvalidParameter(format!(
            "epsilon must be in (0, 1), got {}",
            epsilon
        )));
    }
    if !(delta > 0.0 && delta < 1.0) {
        return Err(CalibrationError::InvalidParameter(format!(
            "delta must be in (0, 1), got {}",
            delta
        )));
    }
    let n = (2.0 / delta).ln() / (2.0 * epsilon * epsilon);
    Ok(n.ceil() as usize)
}
