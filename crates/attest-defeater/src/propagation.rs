//! Spreading a defeat to the claims that depend on it

use crate::board::ClaimBoard;
use crate::DefeaterError;
use attest_domain::algebra::derive;
use attest_domain::{ClaimId, ClaimStatus, ConfidenceValue, Formula};
use std::collections::{HashSet, VecDeque};

/// One claim marked stale by propagation
#[derive(Debug, Clone, PartialEq)]
pub struct StaleMark {
    /// Claim that was marked
    pub claim_id: ClaimId,
    /// Claims walked from the defeated root to this one, both ends included
    pub path: Vec<ClaimId>,
    /// Edges between the root and this claim
    pub depth: usize,
    /// Status before the mark
    pub previous_status: ClaimStatus,
}

/// Result of one propagation
#[derive(Debug, Clone, PartialEq)]
pub struct PropagationReport {
    /// Claim the walk started from
    pub root: ClaimId,
    /// Claims newly marked stale, in breadth-first order
    pub marks: Vec<StaleMark>,
    /// Whether dependents beyond `max_depth` were left alone
    pub truncated: bool,
}

impl PropagationReport {
    /// Mark recorded for `claim`, if any
    pub fn mark_for(&self, claim: ClaimId) -> Option<&StaleMark> {
        self.marks.iter().find(|m| m.claim_id == claim)
    }
}

/// Walk dependents of `root` breadth-first, marking each one stale
///
/// Confidence is left untouched. Superseded claims are neither marked nor
/// walked through; claims already stale are walked through but not marked
/// again.
pub(crate) fn propagate(
    board: &mut ClaimBoard,
    root: ClaimId,
    max_depth: usize,
) -> Result<PropagationReport, DefeaterError> {
    if board.get(&root).is_none() {
        return Err(DefeaterError::ClaimNotFound(root));
    }

    let mut report = PropagationReport {
        root,
        marks: Vec::new(),
        truncated: false,
    };
    let mut visited = HashSet::from([root]);
    let mut queue = VecDeque::from([vec![root]]);

    while let Some(path) = queue.pop_front() {
        let Some(&current) = path.last() else {
            continue;
        };
        let depth = path.len() - 1;
        let dependents: Vec<ClaimId> = board.dependents_of(&current).copied().collect();

        for dependent in dependents {
            if visited.contains(&dependent) {
                continue;
            }
            if depth + 1 > max_depth {
                report.truncated = true;
                continue;
            }
            visited.insert(dependent);

            let Some(claim) = board.get_mut(&dependent) else {
                continue;
            };
            if claim.status.is_terminal() {
                continue;
            }

            let mut next = path.clone();
            next.push(dependent);
            if claim.status != ClaimStatus::Stale {
                let previous_status = claim.transition(ClaimStatus::Stale)?;
                report.marks.push(StaleMark {
                    claim_id: dependent,
                    path: next.clone(),
                    depth: depth + 1,
                    previous_status,
                });
            }
            queue.push_back(next);
        }
    }

    Ok(report)
}

/// A claim's own value capped by the values of its dependencies
///
/// Falsity and absence in any input win; otherwise the result is
/// `Derived(Dependency)` over the own value followed by the dependencies.
pub(crate) fn dependency_capped(own: &ConfidenceValue, dependencies: &[ConfidenceValue]) -> ConfidenceValue {
    if dependencies.is_empty() {
        return own.clone();
    }
    let mut inputs = Vec::with_capacity(dependencies.len() + 1);
    inputs.push(own.clone());
    inputs.extend(dependencies.iter().cloned());

    if inputs.iter().any(|v| v.as_deterministic() == Some(false)) {
        return ConfidenceValue::deterministic(false, "a dependency is certainly false");
    }
    if let Some(absent) = inputs.iter().find(|v| v.is_absent()) {
        return absent.clone();
    }
    if inputs.iter().all(|v| v.as_deterministic() == Some(true)) {
        return own.clone();
    }
    derive(Formula::Dependency, inputs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use attest_domain::{AbsentReason, Claim};
    use chrono::Utc;

    fn board(n: u128) -> ClaimBoard {
        let mut board = ClaimBoard::new();
        for i in 1..=n {
            board.insert(Claim::new(
                ClaimId::from_value(i),
                format!("s{}", i),
                "behavior",
                "p",
                ConfidenceValue::measured(0.9, "ds", 50, 0.8, 1.0),
                Utc::now(),
            ));
        }
        board
    }

    fn c(n: u128) -> ClaimId {
        ClaimId::from_value(n)
    }

    #[test]
    fn test_chain_is_marked_with_paths() {
        let mut board = board(4);
        board.add_dependency(c(2), c(1));
        board.add_dependency(c(3), c(2));
        board.add_dependency(c(4), c(3));

        let report = propagate(&mut board, c(1), 2).unwrap();
        assert_eq!(report.marks.len(), 2);
        assert_eq!(report.mark_for(c(3)).unwrap().path, vec![c(1), c(2), c(3)]);
        assert_eq!(report.mark_for(c(3)).unwrap().depth, 2);
        assert!(report.truncated);
        assert_eq!(board.get(&c(4)).unwrap().status, ClaimStatus::Active);
        assert_eq!(board.get(&c(1)).unwrap().status, ClaimStatus::Active);
    }

    #[test]
    fn test_diamond_marks_once_and_keeps_confidence() {
        let mut board = board(4);
        board.add_dependency(c(2), c(1));
        board.add_dependency(c(3), c(1));
        board.add_dependency(c(4), c(2));
        board.add_dependency(c(4), c(3));

        let report = propagate(&mut board, c(1), 5).unwrap();
        assert_eq!(report.marks.len(), 3);
        assert!(!report.truncated);
        assert_eq!(report.mark_for(c(4)).unwrap().depth, 2);
        assert_eq!(board.get(&c(4)).unwrap().status, ClaimStatus::Stale);
        assert_eq!(board.get(&c(4)).unwrap().confidence.point_value(), Some(0.9));
    }

    #[test]
    fn test_dependency_cycle_terminates() {
        let mut board = board(2);
        board.add_dependency(c(1), c(2));
        board.add_dependency(c(2), c(1));
        let report = propagate(&mut board, c(1), 10).unwrap();
        assert_eq!(report.marks.len(), 1);
    }

    #[test]
    fn test_unknown_root() {
        let mut board = board(1);
        assert!(matches!(
            propagate(&mut board, c(9), 3),
            Err(DefeaterError::ClaimNotFound(_))
        ));
    }

    #[test]
    fn test_dependency_cap() {
        let own = ConfidenceValue::measured(0.9, "ds", 50, 0.8, 1.0);
        let weak = ConfidenceValue::measured(0.4, "ds", 50, 0.3, 0.5);
        let capped = dependency_capped(&own, &[weak]);
        assert_eq!(capped.point_value(), Some(0.4));
        assert!(matches!(
            capped,
            ConfidenceValue::Derived {
                formula: Formula::Dependency,
                ..
            }
        ));

        let absent = ConfidenceValue::absent(AbsentReason::InsufficientData);
        assert!(dependency_capped(&own, &[absent]).is_absent());
        assert_eq!(dependency_capped(&own, &[]), own);
    }
}
