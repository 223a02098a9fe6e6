//! Proper scoring rules
//!
//! Used to compare calibration methods, never to calibrate directly.

use crate::CalibrationError;
use attest_domain::CalibrationSample;

/// Predictions are clipped to `[LOG_LOSS_EPSILON, 1 - LOG_LOSS_EPSILON]`
/// before taking logarithms
pub const LOG_LOSS_EPSILON: f64 = 1e-15;

fn non_empty(samples: &[CalibrationSample]) -> Result<(), CalibrationError> {
    if samples.is_empty() {
        Err(CalibrationError::EmptySamples)
    } else {
        Ok(())
    }
}

/// Mean squared difference between prediction and outcome
///
/// # Examples
///
/// ```
/// use attest_calibration::compute_brier_score;
/// use attest_domain::{CalibrationSample, VerificationMethod};
/// use chrono::Utc;
///
/// let samples = vec![
///     CalibrationSample::new("api", 0.8, true, VerificationMethod::TestResult, Utc::now()),
///     CalibrationSample::new("api", 0.8, false, VerificationMethod::TestResult, Utc::now()),
/// ];
/// // (0.04 + 0.64) / 2
/// assert!((compute_brier_score(&samples).unwrap() - 0.34).abs() < 1e-12);
/// ```
pub fn compute_brier_score(samples: &[CalibrationSample]) -> Result<f64, CalibrationError> {
    non_empty(samples)?;
    let total: f64 = samples
        .iter()
        .map(|s| (s.predicted_confidence - s.outcome_value()).powi(2))
        .sum();
    Ok(total / samples.len() as f64)
}

/// Mean negative log-likelihood of the outcomes
pub fn compute_log_loss(samples: &[CalibrationSample]) -> Result<f64, CalibrationError> {
    non_empty(samples)?;
    let total: f64 = samples
        .iter()
        .map(|s| {
            let p = s
                .predicted_confidence
                .clamp(LOG_LOSS_EPSILON, 1.0 - LOG_LOSS_EPSILON);
            if s.actual_outcome {
                -p.ln()
            } else {
                -(1.0 - p).ln()
            }
        })
        .sum();
    Ok(total / samples.len() as f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use attest_domain::VerificationMethod;
    use chrono::Utc;

    fn sample(p: f64, held: bool) -> CalibrationSample {
        CalibrationSample::new("c", p, held, VerificationMethod::ManualReview, Utc::now())
    }

    #[test]
    fn test_perfect_predictions() {
        let samples = vec![sample(1.0, true), sample(0.0, false)];
        assert_eq!(compute_brier_score(&samples).unwrap(), 0.0);
        assert!(compute_log_loss(&samples).unwrap() < 1e-12);
    }

    #[test]
    fn test_confidently_wrong_is_finite() {
        let samples = vec![sample(1.0, false)];
        let loss = compute_log_loss(&samples).unwrap();
        assert!(loss.is_finite());
        assert!((loss - -(LOG_LOSS_EPSILON.ln())).abs() < 1e-6);
        assert_eq!(compute_brier_score(&samples).unwrap(), 1.0);
    }

    #[test]
    fn test_coin_flip_log_loss() {
        let samples = vec![sample(0.5, true), sample(0.5, false)];
        assert!((compute_log_loss(&samples).unwrap() - 2f64.ln()).abs() < 1e-12);
        assert!((compute_brier_score(&samples).unwrap() - 0.25).abs() < 1e-12);
    }

    #[test]
    fn test_empty_samples() {
        assert!(matches!(compute_brier_score(&[]), Err(CalibrationError::EmptySamples)));
        assert!(matches!(compute_log_loss(&[]), Err(CalibrationError::EmptySamples)));
    }
}
