//! Lattice law checking for the `and`/`or` operators
//!
//! Values are compared by absence and point value only; two results that
//! carry different provenance but the same number are considered equal.

use crate::algebra::{and, approx_eq, or};
use crate::confidence::{AbsentReason, BoundBasis, ConfidenceValue};

/// Algebraic law under test
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Law {
    /// `op(op(a, b), c) = op(a, op(b, c))`
    Associativity,
    /// `op(a, b) = op(b, a)`
    Commutativity,
    /// `op(a, a) = a`
    Idempotence,
    /// `and(a, D1) = a`, `or(a, absent) = a`
    Identity,
    /// `and(a, or(a, b)) = a`, `or(a, and(a, b)) = a`
    Absorption,
}

/// Operator a law was checked against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    /// Meet
    And,
    /// Join
    Or,
}

/// A counterexample to one of the laws
#[derive(Debug, Clone, PartialEq)]
pub struct LawViolation {
    /// Law that failed
    pub law: Law,
    /// Operator it failed for
    pub operator: Operator,
    /// Inputs that produced the failure
    pub inputs: Vec<ConfidenceValue>,
    /// Left-hand side of the equation
    pub left: ConfidenceValue,
    /// Right-hand side of the equation
    pub right: ConfidenceValue,
}

/// Summary of a law check run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LawReport {
    /// Number of equations evaluated
    pub checked: usize,
    /// Every counterexample found
    pub violations: Vec<LawViolation>,
}

impl LawReport {
    /// Whether every law held
    pub fn holds(&self) -> bool {
        self.violations.is_empty()
    }
}

struct Checker {
    tolerance: f64,
    report: LawReport,
}

impl Checker {
    fn expect(
        &mut self,
        law: Law,
        operator: Operator,
        inputs: &[&ConfidenceValue],
        left: ConfidenceValue,
        right: ConfidenceValue,
    ) {
        self.report.checked += 1;
        if !approx_eq(&left, &right, self.tolerance) {
            self.report.violations.push(LawViolation {
                law,
                operator,
                inputs: inputs.iter().map(|v| (*v).clone()).collect(),
                left,
                right,
            });
        }
    }
}

/// Check every law over all pairs and triples drawn from `samples`
pub fn check_laws(samples: &[ConfidenceValue], tolerance: f64) -> LawReport {
    let mut checker = Checker {
        tolerance,
        report: LawReport::default(),
    };
    let top = ConfidenceValue::deterministic(true, "identity");
    let bottom = ConfidenceValue::absent(AbsentReason::NoInputs);

    for a in samples {
        checker.expect(Law::Idempotence, Operator::And, &[a], and(a, a), a.clone());
        checker.expect(Law::Idempotence, Operator::Or, &[a], or(a, a), a.clone());
        checker.expect(Law::Identity, Operator::And, &[a], and(a, &top), a.clone());
        checker.expect(Law::Identity, Operator::Or, &[a], or(a, &bottom), a.clone());

        for b in samples {
            checker.expect(Law::Commutativity, Operator::And, &[a, b], and(a, b), and(b, a));
            checker.expect(Law::Commutativity, Operator::Or, &[a, b], or(a, b), or(b, a));
            checker.expect(
                Law::Absorption,
                Operator::And,
                &[a, b],
                and(a, &or(a, b)),
                a.clone(),
            );
            checker.expect(
                Law::Absorption,
                Operator::Or,
                &[a, b],
                or(a, &and(a, b)),
                a.clone(),
            );

            for c in samples {
                checker.expect(
                    Law::Associativity,
                    Operator::And,
                    &[a, b, c],
                    and(&and(a, b), c),
                    and(a, &and(b, c)),
                );
                checker.expect(
                    Law::Associativity,
                    Operator::Or,
                    &[a, b, c],
                    or(&or(a, b), c),
                    or(a, &or(b, c)),
                );
            }
        }
    }

    checker.report
}

/// A small set covering every confidence variant
pub fn representative_values() -> Vec<ConfidenceValue> {
    vec![
        ConfidenceValue::deterministic(true, "proved"),
        ConfidenceValue::deterministic(false, "refuted"),
        ConfidenceValue::measured(0.72, "fixture", 250, 0.66, 0.77),
        ConfidenceValue::measured(0.35, "fixture", 40, 0.21, 0.51),
        ConfidenceValue::bounded(0.5, 0.9, BoundBasis::Literature, "fixture survey"),
        ConfidenceValue::absent(AbsentReason::Uncalibrated),
        ConfidenceValue::absent(AbsentReason::InsufficientData),
    ]
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    fn confidence_strategy() -> impl Strategy<Value = ConfidenceValue> {
        prop_oneof![
            any::<bool>().prop_map(|b| ConfidenceValue::deterministic(b, "generated")),
            (0.0f64..=1.0, 1u64..1000).prop_map(|(p, n)| {
                ConfidenceValue::measured(p, "generated", n, p, p)
            }),
            (0.0f64..=1.0, 0.0f64..=1.0).prop_map(|(x, y)| {
                ConfidenceValue::bounded(x.min(y), x.max(y), BoundBasis::Theoretical, "generated")
            }),
            Just(ConfidenceValue::absent(AbsentReason::Uncalibrated)),
        ]
    }

    proptest! {
        /// Property: and/or form a lattice with absent as bottom
        #[test]
        fn test_lattice_laws(values in prop::collection::vec(confidence_strategy(), 1..5)) {
            let report = check_laws(&values, 1e-12);
            prop_assert!(report.holds(), "violations: {:?}", report.violations);
        }

        /// Property: derived results of and/or are reproducible
        #[test]
        fn test_operator_results_verify(a in confidence_strategy(), b in confidence_strategy()) {
            prop_assert!(and(&a, &b).verify_derivation().is_ok());
            prop_assert!(or(&a, &b).verify_derivation().is_ok());
        }
    }
}
