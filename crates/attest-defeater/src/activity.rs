//! Which defeaters are in force
//!
//! A defeater is active unless at least one active meta-defeater attacks it.
//! The attack graph may contain cycles, so activity is not computed by
//! recursive lookups. Instead:
//!
//! 1. Build a graph with an edge from every attacked defeater to each of its
//!    attackers
//! 2. Split it into strongly connected components (Tarjan). petgraph yields
//!    them attackers-first, so every component sees its external attackers
//!    already labelled
//! 3. Label each cyclic component with bounded grounded labelling: a node is
//!    out when an attacker is in, in when every attacker is out
//! 4. Split whatever is still undecided into strongly connected pieces again.
//!    Pieces smaller than the component are relabelled with the new outside
//!    labels, and acyclic leftovers are labelled from their attackers. A piece
//!    nothing can reduce cancels out when it has no directed odd cycle; one
//!    with an odd cycle is handled by [`OddCyclePolicy`]

use crate::config::{DefeaterConfig, OddCyclePolicy};
use crate::DefeaterError;
use attest_domain::{DefeatTarget, Defeater, DefeaterId};
use petgraph::algo::tarjan_scc;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use tracing::{debug, warn};

/// Outcome of the activity computation for one defeater
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DefeatStatus {
    /// In force
    Active,
    /// Resolved, or beaten by an active attacker
    Inactive,
    /// Part of an even cycle that cancelled out
    Cancelled,
    /// Part of (or attacked only through) an odd cycle left undecided
    Ambiguous,
    /// The iteration cap was reached before the label settled
    Undetermined,
}

impl DefeatStatus {
    /// Whether the defeater bears on its target
    pub fn is_active(&self) -> bool {
        matches!(self, DefeatStatus::Active)
    }

    /// Whether no label could be decided
    pub fn is_unsettled(&self) -> bool {
        matches!(self, DefeatStatus::Ambiguous | DefeatStatus::Undetermined)
    }
}

/// Labels for every defeater, plus the cycles that needed special handling
#[derive(Debug, Clone, Default)]
pub struct ActivityReport {
    /// Status per defeater
    pub statuses: BTreeMap<DefeaterId, DefeatStatus>,
    /// Undecided even components, each cancelled as a whole
    pub cancelled_cycles: Vec<Vec<DefeaterId>>,
    /// Undecided components containing an odd cycle
    pub odd_cycles: Vec<Vec<DefeaterId>>,
    /// Labelling passes run across all components
    pub iterations: usize,
    /// Whether any component hit the iteration cap
    pub fixpoint_exceeded: bool,
}

impl ActivityReport {
    /// Status of one defeater
    pub fn status(&self, id: &DefeaterId) -> Option<DefeatStatus> {
        self.statuses.get(id).copied()
    }

    /// Whether `id` is known and active
    pub fn is_active(&self, id: &DefeaterId) -> bool {
        self.status(id).is_some_and(|s| s.is_active())
    }

    /// Odd cycle containing `id`, if any
    pub fn odd_cycle_of(&self, id: &DefeaterId) -> Option<&[DefeaterId]> {
        self.odd_cycles
            .iter()
            .find(|cycle| cycle.contains(id))
            .map(Vec::as_slice)
    }
}

struct AttackGraph<'a> {
    defeaters: &'a [Defeater],
    graph: DiGraph<usize, ()>,
}

impl<'a> AttackGraph<'a> {
    fn build(defeaters: &'a [Defeater]) -> Self {
        let mut graph = DiGraph::with_capacity(defeaters.len(), defeaters.len());
        let mut nodes: HashMap<&DefeaterId, NodeIndex> = HashMap::new();
        for (i, d) in defeaters.iter().enumerate() {
            nodes.insert(&d.id, graph.add_node(i));
        }

        let mut seen = HashSet::new();
        for d in defeaters {
            let attacker = nodes[&d.id];
            if let DefeatTarget::Defeater(target) = &d.target {
                if let Some(&attacked) = nodes.get(target) {
                    if seen.insert((attacked, attacker)) {
                        graph.add_edge(attacked, attacker, ());
                    }
                }
            }
            for by in &d.defeated_by {
                if let Some(&by_node) = nodes.get(by) {
                    let attacked = nodes[&d.id];
                    if seen.insert((attacked, by_node)) {
                        graph.add_edge(attacked, by_node, ());
                    }
                }
            }
        }

        Self { defeaters, graph }
    }

    fn defeater(&self, node: NodeIndex) -> &Defeater {
        &self.defeaters[self.graph[node]]
    }

    fn attackers(&self, node: NodeIndex) -> impl Iterator<Item = NodeIndex> + '_ {
        self.graph.neighbors_directed(node, Direction::Outgoing)
    }

    fn is_cyclic(&self, scc: &[NodeIndex]) -> bool {
        scc.len() > 1 || self.graph.contains_edge(scc[0], scc[0])
    }

    fn ids(&self, nodes: &[NodeIndex]) -> Vec<DefeaterId> {
        let mut ids: Vec<DefeaterId> = nodes.iter().map(|&n| self.defeater(n).id.clone()).collect();
        ids.sort();
        ids
    }
}

/// Label every defeater in `defeaters`
///
/// Attack links to ids outside the slice are ignored.
pub fn compute_activity(defeaters: &[Defeater], config: &DefeaterConfig) -> ActivityReport {
    let graph = AttackGraph::build(defeaters);
    let mut labels: HashMap<NodeIndex, DefeatStatus> = HashMap::new();
    let mut report = ActivityReport::default();

    for scc in tarjan_scc(&graph.graph) {
        if graph.is_cyclic(&scc) {
            label_cycle(&graph, &scc, config, &mut labels, &mut report);
        } else {
            let node = scc[0];
            let status = label_single(&graph, node, &labels);
            labels.insert(node, status);
        }
    }

    for (node, status) in labels {
        report
            .statuses
            .insert(graph.defeater(node).id.clone(), status);
    }
    report
}

fn label_single(
    graph: &AttackGraph<'_>,
    node: NodeIndex,
    labels: &HashMap<NodeIndex, DefeatStatus>,
) -> DefeatStatus {
    if graph.defeater(node).resolved {
        return DefeatStatus::Inactive;
    }
    let attackers: Vec<DefeatStatus> = graph
        .attackers(node)
        .filter_map(|a| labels.get(&a).copied())
        .collect();
    if attackers.contains(&DefeatStatus::Active) {
        DefeatStatus::Inactive
    } else if attackers.contains(&DefeatStatus::Ambiguous) {
        DefeatStatus::Ambiguous
    } else if attackers.contains(&DefeatStatus::Undetermined) {
        DefeatStatus::Undetermined
    } else {
        DefeatStatus::Active
    }
}

fn label_cycle(
    graph: &AttackGraph<'_>,
    scc: &[NodeIndex],
    config: &DefeaterConfig,
    labels: &mut HashMap<NodeIndex, DefeatStatus>,
    report: &mut ActivityReport,
) {
    let members: HashSet<NodeIndex> = scc.iter().copied().collect();
    // Some(true) = in, Some(false) = out
    let mut current: HashMap<NodeIndex, Option<bool>> = HashMap::new();
    // external attackers nobody could label keep a node from going in
    let mut inherited: HashMap<NodeIndex, DefeatStatus> = HashMap::new();

    for &node in scc {
        let mut label = None;
        if graph.defeater(node).resolved {
            label = Some(false);
        }
        for attacker in graph.attackers(node).filter(|a| !members.contains(a)) {
            match labels.get(&attacker) {
                Some(DefeatStatus::Active) => label = Some(false),
                Some(status) if status.is_unsettled() => {
                    let worst = inherited.entry(node).or_insert(*status);
                    if *status == DefeatStatus::Ambiguous {
                        *worst = DefeatStatus::Ambiguous;
                    }
                }
                _ => {}
            }
        }
        current.insert(node, label);
    }

    let cap = config.max_fixpoint_iterations.max(1);
    let mut passes = 0;
    let mut settled = false;
    while passes < cap {
        passes += 1;
        let mut next = current.clone();
        for &node in scc {
            if current[&node].is_some() {
                continue;
            }
            let internal: Vec<Option<bool>> = graph
                .attackers(node)
                .filter(|a| members.contains(a))
                .map(|a| current[&a])
                .collect();
            if internal.contains(&Some(true)) {
                next.insert(node, Some(false));
            } else if !inherited.contains_key(&node)
                && internal.iter().all(|l| *l == Some(false))
            {
                next.insert(node, Some(true));
            }
        }
        if next == current {
            settled = true;
            break;
        }
        current = next;
    }
    report.iterations += passes;

    let mut undecided = Vec::new();
    for &node in scc {
        match current[&node] {
            Some(true) => {
                labels.insert(node, DefeatStatus::Active);
            }
            Some(false) => {
                labels.insert(node, DefeatStatus::Inactive);
            }
            None => undecided.push(node),
        }
    }
    if undecided.is_empty() {
        return;
    }

    if !settled {
        warn!(
            defeaters = undecided.len(),
            passes, "Defeater activity did not converge; leaving labels undetermined"
        );
        report.fixpoint_exceeded = true;
        for node in undecided {
            labels.insert(node, DefeatStatus::Undetermined);
        }
        return;
    }

    for piece in undecided_components(graph, &undecided) {
        if !graph.is_cyclic(&piece) {
            let status = label_single(graph, piece[0], labels);
            labels.insert(piece[0], status);
        } else if piece.len() < scc.len() {
            // part of the component settled, so outside pressure on this piece changed
            label_cycle(graph, &piece, config, labels, report);
        } else {
            settle_stuck_cycle(graph, &piece, &inherited, config, labels, report);
        }
    }
}

/// Label a strongly connected component that labelling could not reduce
fn settle_stuck_cycle(
    graph: &AttackGraph<'_>,
    members: &[NodeIndex],
    inherited: &HashMap<NodeIndex, DefeatStatus>,
    config: &DefeaterConfig,
    labels: &mut HashMap<NodeIndex, DefeatStatus>,
    report: &mut ActivityReport,
) {
    if let Some(status) = members
        .iter()
        .filter_map(|n| inherited.get(n))
        .max_by_key(|s| matches!(s, DefeatStatus::Ambiguous))
    {
        let status = *status;
        for &node in members {
            labels.insert(node, status);
        }
        return;
    }

    let ids = graph.ids(members);
    if !has_odd_cycle(graph, members) {
        debug!(defeaters = ids.len(), "Even defeat cycle cancelled");
        for &node in members {
            labels.insert(node, DefeatStatus::Cancelled);
        }
        report.cancelled_cycles.push(ids);
        return;
    }

    let status = match config.odd_cycle_policy {
        OddCyclePolicy::SurfaceAmbiguity => DefeatStatus::Ambiguous,
        OddCyclePolicy::AssumeActive => DefeatStatus::Active,
        OddCyclePolicy::AssumeInactive => DefeatStatus::Inactive,
    };
    warn!(
        defeaters = ids.len(),
        policy = ?config.odd_cycle_policy,
        "Odd defeat cycle"
    );
    for &node in members {
        labels.insert(node, status);
    }
    report.odd_cycles.push(ids);
}

/// Strongly connected pieces of the subgraph induced by `nodes`, attackers first
fn undecided_components(graph: &AttackGraph<'_>, nodes: &[NodeIndex]) -> Vec<Vec<NodeIndex>> {
    let mut sub: DiGraph<NodeIndex, ()> = DiGraph::with_capacity(nodes.len(), nodes.len());
    let local: HashMap<NodeIndex, NodeIndex> =
        nodes.iter().map(|&n| (n, sub.add_node(n))).collect();
    for &node in nodes {
        for attacker in graph.attackers(node) {
            if let Some(&to) = local.get(&attacker) {
                sub.add_edge(local[&node], to, ());
            }
        }
    }
    tarjan_scc(&sub)
        .into_iter()
        .map(|scc| scc.into_iter().map(|n| sub[n]).collect())
        .collect()
}

/// Whether the strongly connected `members` contain a directed odd cycle
///
/// Walks attack edges breadth-first from one member, tracking depth parity.
/// Every member is reachable, so an odd cycle exists exactly when some
/// internal edge joins two members of equal parity. Self-loops count.
fn has_odd_cycle(graph: &AttackGraph<'_>, members: &[NodeIndex]) -> bool {
    let Some(&root) = members.first() else {
        return false;
    };
    let within: HashSet<NodeIndex> = members.iter().copied().collect();
    let mut parity: HashMap<NodeIndex, bool> = HashMap::from([(root, false)]);
    let mut queue = VecDeque::from([root]);

    while let Some(node) = queue.pop_front() {
        let side = parity[&node];
        for next in graph.attackers(node).filter(|n| within.contains(n)) {
            match parity.get(&next) {
                Some(&p) if p == side => return true,
                Some(_) => {}
                None => {
                    parity.insert(next, !side);
                    queue.push_back(next);
                }
            }
        }
    }
    false
}

/// Whether `defeater` is in force among `all`
///
/// `defeater` is added to the set if it is not already part of it.
///
/// # Errors
///
/// - `DefeatCycleAmbiguous` when it sits in (or behind) an odd cycle left
///   undecided by the policy
/// - `FixpointExceeded` when labelling did not converge
pub fn is_defeater_active(
    defeater: &Defeater,
    all: &[Defeater],
    config: &DefeaterConfig,
) -> Result<bool, DefeaterError> {
    let report = if all.iter().any(|d| d.id == defeater.id) {
        compute_activity(all, config)
    } else {
        let mut with = all.to_vec();
        with.push(defeater.clone());
        compute_activity(&with, config)
    };
    status_to_result(&report, &defeater.id, config)
}

pub(crate) fn status_to_result(
    report: &ActivityReport,
    id: &DefeaterId,
    config: &DefeaterConfig,
) -> Result<bool, DefeaterError> {
    match report.status(id) {
        Some(DefeatStatus::Active) => Ok(true),
        Some(DefeatStatus::Inactive) | Some(DefeatStatus::Cancelled) => Ok(false),
        Some(DefeatStatus::Ambiguous) => Err(DefeaterError::DefeatCycleAmbiguous {
            cycle: report
                .odd_cycle_of(id)
                .map(<[DefeaterId]>::to_vec)
                .unwrap_or_else(|| vec![id.clone()]),
        }),
        Some(DefeatStatus::Undetermined) => Err(DefeaterError::FixpointExceeded {
            iterations: config.max_fixpoint_iterations,
        }),
        None => Err(DefeaterError::DefeaterNotFound(id.clone())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use attest_domain::{ClaimId, DefeaterType};
    use chrono::Utc;

    fn id(tag: &str) -> DefeaterId {
        DefeaterId::derive(&[tag])
    }

    fn on_claim(tag: &str) -> Defeater {
        Defeater::with_id(
            id(tag),
            DefeaterType::Rebutting,
            DefeatTarget::Claim(ClaimId::from_value(1)),
            vec![],
            tag,
            Utc::now(),
        )
    }

    fn on_defeater(tag: &str, target: &str) -> Defeater {
        Defeater::with_id(
            id(tag),
            DefeaterType::Undercutting,
            DefeatTarget::Defeater(id(target)),
            vec![],
            tag,
            Utc::now(),
        )
    }

    fn attacked_by(mut d: Defeater, attacker: &str) -> Defeater {
        d.add_defeated_by(id(attacker));
        d
    }

    #[test]
    fn test_unattacked_defeater_is_active() {
        let all = vec![on_claim("a")];
        let report = compute_activity(&all, &DefeaterConfig::default());
        assert_eq!(report.status(&id("a")), Some(DefeatStatus::Active));
        assert!(report.odd_cycles.is_empty());
    }

    #[test]
    fn test_chain_alternates() {
        // c attacks b attacks a
        let all = vec![on_claim("a"), on_defeater("b", "a"), on_defeater("c", "b")];
        let report = compute_activity(&all, &DefeaterConfig::default());
        assert_eq!(report.status(&id("c")), Some(DefeatStatus::Active));
        assert_eq!(report.status(&id("b")), Some(DefeatStatus::Inactive));
        assert_eq!(report.status(&id("a")), Some(DefeatStatus::Active));
    }

    #[test]
    fn test_resolved_attacker_does_not_defeat() {
        let mut b = on_defeater("b", "a");
        b.resolved = true;
        let all = vec![on_claim("a"), b];
        let report = compute_activity(&all, &DefeaterConfig::default());
        assert_eq!(report.status(&id("b")), Some(DefeatStatus::Inactive));
        assert_eq!(report.status(&id("a")), Some(DefeatStatus::Active));
    }

    #[test]
    fn test_even_cycle_cancels() {
        let all = vec![
            attacked_by(on_claim("a"), "b"),
            attacked_by(on_defeater("b", "a"), "a"),
        ];
        let report = compute_activity(&all, &DefeaterConfig::default());
        assert_eq!(report.status(&id("a")), Some(DefeatStatus::Cancelled));
        assert_eq!(report.status(&id("b")), Some(DefeatStatus::Cancelled));
        assert_eq!(report.cancelled_cycles.len(), 1);
    }

    #[test]
    fn test_even_cycle_broken_from_outside() {
        // x attacks b, so b is out and a is in
        let all = vec![
            attacked_by(on_claim("a"), "b"),
            attacked_by(on_defeater("b", "a"), "a"),
            on_defeater("x", "b"),
        ];
        let report = compute_activity(&all, &DefeaterConfig::default());
        assert_eq!(report.status(&id("x")), Some(DefeatStatus::Active));
        assert_eq!(report.status(&id("b")), Some(DefeatStatus::Inactive));
        assert_eq!(report.status(&id("a")), Some(DefeatStatus::Active));
        assert!(report.cancelled_cycles.is_empty());
    }

    #[test]
    fn test_odd_cycle_policies() {
        // b attacks a, c attacks b, a attacks c
        let all = vec![
            attacked_by(on_claim("a"), "b"),
            attacked_by(on_defeater("b", "a"), "c"),
            attacked_by(on_defeater("c", "b"), "a"),
        ];

        let surfaced = compute_activity(&all, &DefeaterConfig::default());
        assert_eq!(surfaced.status(&id("a")), Some(DefeatStatus::Ambiguous));
        assert_eq!(surfaced.odd_cycles.len(), 1);
        assert_eq!(surfaced.odd_cycles[0].len(), 3);

        let err = is_defeater_active(&all[0], &all, &DefeaterConfig::default()).unwrap_err();
        assert!(matches!(err, DefeaterError::DefeatCycleAmbiguous { cycle } if cycle.len() == 3));

        let assume_active = DefeaterConfig {
            odd_cycle_policy: OddCyclePolicy::AssumeActive,
            ..DefeaterConfig::default()
        };
        assert!(is_defeater_active(&all[0], &all, &assume_active).unwrap());

        let assume_inactive = DefeaterConfig {
            odd_cycle_policy: OddCyclePolicy::AssumeInactive,
            ..DefeaterConfig::default()
        };
        assert!(!is_defeater_active(&all[0], &all, &assume_inactive).unwrap());
    }

    #[test]
    fn test_self_attack_is_odd() {
        let all = vec![attacked_by(on_claim("a"), "a")];
        let report = compute_activity(&all, &DefeaterConfig::default());
        assert_eq!(report.status(&id("a")), Some(DefeatStatus::Ambiguous));
    }

    #[test]
    fn test_ambiguity_flows_to_defeaters_it_attacks() {
        // odd loop b -> c -> d -> b, and b also attacks a
        let all = vec![
            attacked_by(on_claim("a"), "b"),
            attacked_by(on_defeater("b", "a"), "d"),
            attacked_by(on_defeater("c", "b"), "b"),
            attacked_by(on_defeater("d", "c"), "c"),
        ];
        let report = compute_activity(&all, &DefeaterConfig::default());
        assert_eq!(report.status(&id("a")), Some(DefeatStatus::Ambiguous));
        assert!(report.odd_cycle_of(&id("a")).is_none());
    }

    #[test]
    fn test_even_pair_left_after_odd_cycle_is_broken() {
        // a -> e -> c -> a is the only odd loop and x knocks out e; what is
        // left is b and c attacking each other and both attacking a
        let all = vec![
            on_claim("a"),
            attacked_by(on_defeater("b", "a"), "c"),
            attacked_by(on_defeater("c", "a"), "b"),
            attacked_by(on_defeater("e", "c"), "a"),
            on_defeater("x", "e"),
        ];
        let report = compute_activity(&all, &DefeaterConfig::default());
        assert_eq!(report.status(&id("x")), Some(DefeatStatus::Active));
        assert_eq!(report.status(&id("e")), Some(DefeatStatus::Inactive));
        assert_eq!(report.status(&id("b")), Some(DefeatStatus::Cancelled));
        assert_eq!(report.status(&id("c")), Some(DefeatStatus::Cancelled));
        assert_eq!(report.status(&id("a")), Some(DefeatStatus::Active));
        assert!(report.odd_cycles.is_empty());
        assert_eq!(report.cancelled_cycles.len(), 1);
        assert_eq!(report.cancelled_cycles[0].len(), 2);
        assert!(is_defeater_active(&all[0], &all, &DefeaterConfig::default()).unwrap());
    }

    #[test]
    fn test_odd_cycle_kept_when_outside_attack_settles_nothing() {
        // the odd loop a -> b -> c -> a sits next to an even pair d <-> e
        // that also attacks a; nothing outside decides either
        let all = vec![
            attacked_by(attacked_by(on_claim("a"), "b"), "d"),
            attacked_by(on_defeater("b", "a"), "c"),
            attacked_by(on_defeater("c", "b"), "a"),
            attacked_by(on_defeater("d", "a"), "e"),
            attacked_by(on_defeater("e", "d"), "d"),
        ];
        let report = compute_activity(&all, &DefeaterConfig::default());
        assert_eq!(report.status(&id("d")), Some(DefeatStatus::Cancelled));
        assert_eq!(report.status(&id("e")), Some(DefeatStatus::Cancelled));
        assert_eq!(report.status(&id("a")), Some(DefeatStatus::Ambiguous));
        assert_eq!(report.odd_cycles.len(), 1);
        assert_eq!(report.odd_cycles[0].len(), 3);
    }

    #[test]
    fn test_iteration_cap_leaves_labels_undetermined() {
        // b attacks a, c attacks b, a attacks c; x knocks out c, after which
        // b goes in on the first pass and a goes out on the second
        let all = vec![
            attacked_by(on_claim("a"), "b"),
            attacked_by(on_defeater("b", "a"), "c"),
            attacked_by(attacked_by(on_defeater("c", "b"), "a"), "x"),
            on_defeater("x", "c"),
        ];
        let capped = DefeaterConfig {
            max_fixpoint_iterations: 1,
            ..DefeaterConfig::default()
        };
        let report = compute_activity(&all, &capped);
        assert!(report.fixpoint_exceeded);
        assert_eq!(report.status(&id("b")), Some(DefeatStatus::Active));
        assert_eq!(report.status(&id("a")), Some(DefeatStatus::Undetermined));
        assert!(matches!(
            status_to_result(&report, &id("a"), &capped),
            Err(DefeaterError::FixpointExceeded { iterations: 1 })
        ));

        let report = compute_activity(&all, &DefeaterConfig::default());
        assert!(!report.fixpoint_exceeded);
        assert_eq!(report.status(&id("a")), Some(DefeatStatus::Inactive));
        assert_eq!(report.status(&id("c")), Some(DefeatStatus::Inactive));
    }
}
