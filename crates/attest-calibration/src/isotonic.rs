//! Isotonic regression by pool-adjacent-violators

use crate::CalibrationError;
use attest_domain::CalibrationSample;
use serde::{Deserialize, Serialize};

/// A run of inputs mapped to one calibrated value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IsotonicBlock {
    /// Smallest input in the block
    pub x_low: f64,
    /// Largest input in the block
    pub x_high: f64,
    /// Calibrated value, the weighted mean of the pooled outcomes
    pub y: f64,
    /// Total weight pooled
    pub weight: f64,
}

/// Monotone non-decreasing map from predicted to calibrated confidence
///
/// Constant inside a block, linear between neighbouring blocks, and clamped
/// to the end blocks outside the fitted range.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IsotonicMapping {
    blocks: Vec<IsotonicBlock>,
}

impl IsotonicMapping {
    /// Blocks in increasing `x` order
    pub fn blocks(&self) -> &[IsotonicBlock] {
        &self.blocks
    }

    /// Whether nothing was fitted
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Calibrated value for `x`
    ///
    /// An empty mapping is the identity.
    pub fn apply(&self, x: f64) -> f64 {
        let (Some(first), Some(last)) = (self.blocks.first(), self.blocks.last()) else {
            return x.clamp(0.0, 1.0);
        };
        if x <= first.x_low {
            return first.y;
        }
        if x >= last.x_high {
            return last.y;
        }
        for pair in self.blocks.windows(2) {
            let (left, right) = (&pair[0], &pair[1]);
            if x <= left.x_high {
                return left.y;
            }
            if x < right.x_low {
                let t = (x - left.x_high) / (right.x_low - left.x_high);
                return left.y + t * (right.y - left.y);
            }
        }
        last.y
    }
}

/// Fit weighted `(x, y, weight)` points
///
/// Points with equal `x` are pooled before any violator is merged, so the
/// result is a function of `x`. Non-finite points and non-positive weights
/// are ignored.
pub fn pav(points: &[(f64, f64, f64)]) -> IsotonicMapping {
    let mut sorted: Vec<(f64, f64, f64)> = points
        .iter()
        .copied()
        .filter(|(x, y, w)| x.is_finite() && y.is_finite() && w.is_finite() && *w > 0.0)
        .collect();
    sorted.sort_by(|a, b| a.0.total_cmp(&b.0));

    let mut blocks: Vec<IsotonicBlock> = Vec::with_capacity(sorted.len());
    for (x, y, weight) in sorted {
        match blocks.last_mut() {
            Some(last) if last.x_high == x => merge(last, x, y, weight),
            _ => blocks.push(IsotonicBlock {
                x_low: x,
                x_high: x,
                y,
                weight,
            }),
        }
        while blocks.len() > 1 && blocks[blocks.len() - 2].y > blocks[blocks.len() - 1].y {
            if let Some(top) = blocks.pop() {
                if let Some(last) = blocks.last_mut() {
                    merge(last, top.x_high, top.y, top.weight);
                }
            }
        }
    }

    IsotonicMapping { blocks }
}

fn merge(block: &mut IsotonicBlock, x_high: f64, y: f64, weight: f64) {
    let total = block.weight + weight;
    block.y = (block.y * block.weight + y * weight) / total;
    block.weight = total;
    block.x_high = x_high;
}

/// Fit a mapping from predicted confidence to observed accuracy
///
/// # Examples
///
/// ```
/// use attest_calibration::isotonic_calibration;
/// use attest_domain::{CalibrationSample, VerificationMethod};
/// use chrono::Utc;
///
/// // overconfident at 0.9, underconfident at 0.6
/// let samples: Vec<_> = [(0.6, true), (0.6, true), (0.9, true), (0.9, false)]
///     .iter()
///     .map(|&(p, o)| CalibrationSample::new("api", p, o, VerificationMethod::TestResult, Utc::now()))
///     .collect();
/// let mapping = isotonic_calibration(&samples).unwrap();
/// assert_eq!(mapping.blocks().len(), 1);
/// assert!((mapping.apply(0.9) - 0.75).abs() < 1e-12);
/// ```
pub fn isotonic_calibration(
    samples: &[CalibrationSample],
) -> Result<IsotonicMapping, CalibrationError> {
    if samples.is_empty() {
        return Err(CalibrationError::EmptySamples);
    }
    let points: Vec<(f64, f64, f64)> = samples
        .iter()
        .map(|s| (s.predicted_confidence, s.outcome_value(), 1.0))
        .collect();
    Ok(pav(&points))
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    fn points() -> impl Strategy<Value = Vec<(f64, f64, f64)>> {
        prop::collection::vec((0.0f64..=1.0, prop::bool::ANY, 0.1f64..5.0), 1..60).prop_map(
            |v| {
                v.into_iter()
                    .map(|(x, held, w)| (x, if held { 1.0 } else { 0.0 }, w))
                    .collect()
            },
        )
    }

    proptest! {
        /// Property: the fitted map never inverts order
        #[test]
        fn test_mapping_is_monotone(pts in points(), a in 0.0f64..=1.0, b in 0.0f64..=1.0) {
            let mapping = pav(&pts);
            let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
            prop_assert!(mapping.apply(lo) <= mapping.apply(hi) + 1e-12);
        }

        /// Property: block values are non-decreasing and total weight is kept
        #[test]
        fn test_blocks_are_sorted(pts in points()) {
            let mapping = pav(&pts);
            for pair in mapping.blocks().windows(2) {
                prop_assert!(pair[0].y <= pair[1].y);
                prop_assert!(pair[0].x_high < pair[1].x_low);
            }
            let total: f64 = pts.iter().map(|p| p.2).sum();
            let kept: f64 = mapping.blocks().iter().map(|b| b.weight).sum();
            prop_assert!((total - kept).abs() < 1e-9);
        }
    }
}
