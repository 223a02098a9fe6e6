//! Applying an active defeater to a confidence value

use crate::config::{ApplicationMethod, DefeaterConfig};
use attest_domain::algebra::derive;
use attest_domain::{ConfidenceValue, Defeater, DefeaterSeverity, Formula};

/// Lower `confidence` by one active defeater
///
/// - Absent values stay absent and certain falsity stays certain falsity
/// - Full severity always yields `Deterministic(false)`
/// - Otherwise the result is `Derived`, with the pre-defeat value as its only
///   input and the defeater id inside the formula
///
/// # Examples
///
/// ```
/// use attest_defeater::{apply_defeater_to_confidence, DefeaterConfig};
/// use attest_domain::{ClaimId, ConfidenceValue, DefeatTarget, Defeater, DefeaterType};
/// use chrono::Utc;
///
/// let defeater = Defeater::new(
///     DefeaterType::Staleness,
///     DefeatTarget::Claim(ClaimId::new()),
///     vec![],
///     "claim is 40 days old",
///     Utc::now(),
/// );
/// let before = ConfidenceValue::measured(0.8, "review-set", 200, 0.75, 0.85);
/// let after = apply_defeater_to_confidence(&before, &defeater, &DefeaterConfig::default());
/// assert!((after.point_value().unwrap() - 0.4).abs() < 1e-12);
/// ```
pub fn apply_defeater_to_confidence(
    confidence: &ConfidenceValue,
    defeater: &Defeater,
    config: &DefeaterConfig,
) -> ConfidenceValue {
    if confidence.is_absent() || confidence.as_deterministic() == Some(false) {
        return confidence.clone();
    }
    if defeater.severity == DefeaterSeverity::Full {
        return ConfidenceValue::deterministic(
            false,
            format!(
                "defeated by {} defeater {}",
                defeater.defeater_type,
                defeater.id.short()
            ),
        );
    }

    let formula = match config.application_method {
        ApplicationMethod::Severity => Formula::SeverityDefeat {
            defeater: defeater.id.clone(),
            reduction: config.reduction.get(defeater.severity),
        },
        ApplicationMethod::Bayesian => Formula::BetaBinomialDefeat {
            defeater: defeater.id.clone(),
            prior_strength: config.prior_strength.max(0.0),
            pseudo_failures: config
                .pseudo_failures
                .get(defeater.severity)
                .unwrap_or(0.0),
        },
    };
    derive(formula, vec![confidence.clone()])
}
