//! Evidence chain traversal
//!
//! Breadth-first walk over `derived_from` and `supports` relations with a
//! visited set, so cyclic graphs terminate and every entry appears once.
//! Confidence is folded bottom-up over the resulting BFS tree.

use crate::snapshot::LedgerSnapshot;
use crate::LedgerError;
use attest_domain::algebra::{parallel_all, sequence};
use attest_domain::{AbsentReason, ConfidenceValue, EvidenceId, Relation};
use serde::{Deserialize, Serialize};
use std::collections::{HashSet, VecDeque};

/// Rule for folding confidence along a chain
pub trait ChainCombiner {
    /// Combine independent supports of one entry
    fn combine_supports(&self, supports: &[ConfidenceValue]) -> ConfidenceValue;

    /// Combine an entry's own confidence with what it was derived from
    fn combine_derivation(&self, steps: &[ConfidenceValue]) -> ConfidenceValue;
}

/// `parallel_all` across supports, `sequence` along derivations
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultCombiner;

impl ChainCombiner for DefaultCombiner {
    fn combine_supports(&self, supports: &[ConfidenceValue]) -> ConfidenceValue {
        parallel_all(supports)
    }

    fn combine_derivation(&self, steps: &[ConfidenceValue]) -> ConfidenceValue {
        sequence(steps)
    }
}

/// Which way an edge was followed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// From the parent's own relation list
    Outgoing,
    /// From another entry's relation that targets the parent
    Incoming,
}

/// How a node was reached
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainLink {
    /// Parent node
    pub from: EvidenceId,
    /// Relation on the edge
    pub relation: Relation,
    /// Edge direction relative to the parent
    pub direction: Direction,
}

impl ChainLink {
    fn role(&self) -> Role {
        match (self.relation, self.direction) {
            (Relation::DerivedFrom, Direction::Outgoing) => Role::Derivation,
            (Relation::Supports, Direction::Incoming) => Role::Support,
            _ => Role::Context,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Role {
    Derivation,
    Support,
    // reached but not evidence for the parent (the parent supports it)
    Context,
}

/// One visited entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChainNode {
    /// Entry id
    pub id: EvidenceId,
    /// Distance from the root
    pub depth: usize,
    /// Edge that first reached it (`None` for the root)
    pub via: Option<ChainLink>,
}

/// Result of [`crate::EvidenceLedger::get_chain`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvidenceChain {
    /// Starting entry
    pub root: EvidenceId,
    /// Visited entries in BFS order, root first
    pub nodes: Vec<ChainNode>,
    /// Confidence propagated to the root
    pub propagated: ConfidenceValue,
    /// Whether unexplored edges remained at `max_depth`
    pub truncated: bool,
}

impl EvidenceChain {
    /// Whether `id` was visited
    pub fn contains(&self, id: &EvidenceId) -> bool {
        self.nodes.iter().any(|n| &n.id == id)
    }
}

/// Edges out of `id`: derivations, then incoming supports, then what `id` supports
fn neighbours(snapshot: &LedgerSnapshot, id: &EvidenceId) -> Vec<(EvidenceId, Relation, Direction)> {
    let outgoing: Vec<(EvidenceId, Relation)> = snapshot
        .get(id)
        .map(|entry| {
            entry
                .related_entries
                .iter()
                .map(|r| (r.target.clone(), r.relation))
                .collect()
        })
        .unwrap_or_default();

    let mut out: Vec<(EvidenceId, Relation, Direction)> = outgoing
        .iter()
        .filter(|(_, relation)| *relation == Relation::DerivedFrom)
        .map(|(target, relation)| (target.clone(), *relation, Direction::Outgoing))
        .collect();
    out.extend(
        snapshot
            .incoming(id)
            .filter(|(_, relation)| *relation == Relation::Supports)
            .map(|(source, relation)| (source.id.clone(), relation, Direction::Incoming)),
    );
    out.extend(
        outgoing
            .into_iter()
            .filter(|(_, relation)| *relation == Relation::Supports)
            .map(|(target, relation)| (target, relation, Direction::Outgoing)),
    );
    out
}

pub(crate) fn traverse(
    snapshot: &LedgerSnapshot,
    root: &EvidenceId,
    max_depth: usize,
    combiner: &dyn ChainCombiner,
) -> Result<EvidenceChain, LedgerError> {
    if !snapshot.contains(root) {
        return Err(LedgerError::NotFound(root.clone()));
    }

    let mut nodes = vec![ChainNode {
        id: root.clone(),
        depth: 0,
        via: None,
    }];
    // index of each node's parent in `nodes`
    let mut parents: Vec<Option<usize>> = vec![None];
    let mut visited: HashSet<EvidenceId> = HashSet::from([root.clone()]);
    let mut queue = VecDeque::from([0usize]);
    let mut truncated = false;

    while let Some(index) = queue.pop_front() {
        let (id, depth) = (nodes[index].id.clone(), nodes[index].depth);
        for (next, relation, direction) in neighbours(snapshot, &id) {
            if visited.contains(&next) || !snapshot.contains(&next) {
                continue;
            }
            if depth >= max_depth {
                truncated = true;
                continue;
            }
            visited.insert(next.clone());
            nodes.push(ChainNode {
                id: next,
                depth: depth + 1,
                via: Some(ChainLink {
                    from: id.clone(),
                    relation,
                    direction,
                }),
            });
            parents.push(Some(index));
            queue.push_back(nodes.len() - 1);
        }
    }

    let propagated = propagate(snapshot, &nodes, &parents, combiner)
        .unwrap_or_else(|| ConfidenceValue::absent(AbsentReason::InsufficientData));

    Ok(EvidenceChain {
        root: root.clone(),
        nodes,
        propagated,
        truncated,
    })
}

/// Fold values from the leaves up; BFS order guarantees children come after parents
fn propagate(
    snapshot: &LedgerSnapshot,
    nodes: &[ChainNode],
    parents: &[Option<usize>],
    combiner: &dyn ChainCombiner,
) -> Option<ConfidenceValue> {
    let mut values: Vec<Option<ConfidenceValue>> = vec![None; nodes.len()];
    let mut derivations: Vec<Vec<ConfidenceValue>> = vec![Vec::new(); nodes.len()];
    let mut supports: Vec<Vec<ConfidenceValue>> = vec![Vec::new(); nodes.len()];

    for index in (0..nodes.len()).rev() {
        let own = snapshot
            .get(&nodes[index].id)
            .and_then(|e| e.confidence.clone());

        let mut parts: Vec<ConfidenceValue> = own.into_iter().collect();
        parts.append(&mut derivations[index]);
        if !supports[index].is_empty() {
            parts.push(combiner.combine_supports(&supports[index]));
        }

        let value = match parts.len() {
            0 => None,
            1 => parts.pop(),
            _ => Some(combiner.combine_derivation(&parts)),
        };

        if let (Some(value), Some(link), Some(parent)) =
            (&value, &nodes[index].via, parents[index])
        {
            match link.role() {
                Role::Derivation => derivations[parent].push(value.clone()),
                Role::Support => supports[parent].push(value.clone()),
                Role::Context => {}
            }
        }
        values[index] = value;
    }

    values.into_iter().next().flatten()
}

#[cfg(test)]
mod tests {
    use super::*;
    use attest_domain::{EvidenceEntry, EvidenceKind, Provenance, RelatedEntry};
    use chrono::Utc;
    use serde_json::json;

    fn entry(name: &str, sequence: u64, confidence: Option<ConfidenceValue>, related: Vec<RelatedEntry>) -> EvidenceEntry {
        let payload = json!({"content": name});
        let provenance = Provenance::new("test");
        let id = attest_domain::evidence::compute_evidence_id(
            EvidenceKind::Synthesis,
            &payload,
            &provenance,
            confidence.as_ref(),
            &related,
            None,
        )
        .unwrap();
        EvidenceEntry {
            id,
            sequence,
            timestamp: Utc::now(),
            kind: EvidenceKind::Synthesis,
            payload,
            provenance,
            confidence,
            related_entries: related,
            session_id: None,
        }
    }

    fn measured(p: f64) -> Option<ConfidenceValue> {
        Some(ConfidenceValue::measured(p, "ds", 100, 0.0, 1.0))
    }

    #[test]
    fn test_derivation_uses_sequence() {
        let mut snapshot = LedgerSnapshot::new();
        let base = entry("base", 0, measured(0.6), vec![]);
        let derived = entry(
            "derived",
            1,
            measured(0.9),
            vec![RelatedEntry { target: base.id.clone(), relation: Relation::DerivedFrom }],
        );
        let root = derived.id.clone();
        snapshot.insert(base);
        snapshot.insert(derived);

        let chain = traverse(&snapshot, &root, 4, &DefaultCombiner).unwrap();
        assert_eq!(chain.nodes.len(), 2);
        assert!((chain.propagated.point_value().unwrap() - 0.6).abs() < 1e-12);
    }

    #[test]
    fn test_supports_use_product() {
        let mut snapshot = LedgerSnapshot::new();
        let claim = entry("claim", 0, None, vec![]);
        let target = claim.id.clone();
        let s1 = entry("s1", 1, measured(0.9), vec![RelatedEntry { target: target.clone(), relation: Relation::Supports }]);
        let s2 = entry("s2", 2, measured(0.8), vec![RelatedEntry { target: target.clone(), relation: Relation::Supports }]);
        snapshot.insert(claim);
        snapshot.insert(s1);
        snapshot.insert(s2);

        let chain = traverse(&snapshot, &target, 4, &DefaultCombiner).unwrap();
        assert_eq!(chain.nodes.len(), 3);
        assert!((chain.propagated.point_value().unwrap() - 0.72).abs() < 1e-12);
    }

    #[test]
    fn test_no_confidence_anywhere_is_absent() {
        let mut snapshot = LedgerSnapshot::new();
        let lone = entry("lone", 0, None, vec![]);
        let id = lone.id.clone();
        snapshot.insert(lone);

        let chain = traverse(&snapshot, &id, 4, &DefaultCombiner).unwrap();
        assert_eq!(
            chain.propagated.absent_reason(),
            Some(AbsentReason::InsufficientData)
        );
    }

    #[test]
    fn test_depth_limit_truncates() {
        let mut snapshot = LedgerSnapshot::new();
        let a = entry("a", 0, measured(0.5), vec![]);
        let b = entry("b", 1, measured(0.5), vec![RelatedEntry { target: a.id.clone(), relation: Relation::DerivedFrom }]);
        let c = entry("c", 2, measured(0.5), vec![RelatedEntry { target: b.id.clone(), relation: Relation::DerivedFrom }]);
        let root = c.id.clone();
        snapshot.insert(a);
        snapshot.insert(b);
        snapshot.insert(c);

        let chain = traverse(&snapshot, &root, 1, &DefaultCombiner).unwrap();
        assert_eq!(chain.nodes.len(), 2);
        assert!(chain.truncated);
    }

    #[test]
    fn test_unknown_root() {
        let snapshot = LedgerSnapshot::new();
        let ghost = entry("ghost", 0, None, vec![]).id;
        assert!(matches!(
            traverse(&snapshot, &ghost, 3, &DefaultCombiner),
            Err(LedgerError::NotFound(_))
        ));
    }
}
