//! The defeater engine
//!
//! Keeps a claim board and defeater registry in step with a ledger, decides
//! which defeaters are in force, and writes what it decided back to the
//! ledger as `verification` entries so a restarted engine replays to the
//! same state.

use crate::activity::{compute_activity, status_to_result, ActivityReport, DefeatStatus};
use crate::application::apply_defeater_to_confidence;
use crate::board::{ClaimBoard, DefeaterRegistry};
use crate::config::DefeaterConfig;
use crate::detection::{detect_defeaters, DetectionContext};
use crate::metrics::DefeaterMetrics;
use crate::propagation::{dependency_capped, propagate, PropagationReport, StaleMark};
use crate::DefeaterError;
use attest_domain::payload::{ClaimPayload, DefeatEventPayload, Verdict};
use attest_domain::{
    AbsentReason, Claim, ClaimId, ClaimStatus, ConfidenceValue, DefeatAmbiguity, Defeater,
    DefeaterId, DefeaterSeverity, DefeaterType, EvidenceEntry, EvidenceId, EvidenceKind,
    EvidenceStorage, NewEvidence, Provenance, Relation, ResolutionAction, TraceGap,
};
use attest_ledger::{EvidenceLedger, LedgerSnapshot};
use chrono::{DateTime, Utc};
use std::collections::{BTreeSet, HashMap};
use std::fmt::Display;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Provenance source of every event the engine writes
pub const EVENT_SOURCE: &str = "attest:defeater";

/// Claim status changes made by one evaluation
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Evaluation {
    /// Claims that lost to a full defeater, with that defeater
    pub defeated: Vec<(ClaimId, DefeaterId)>,
    /// Claims back to active
    pub reinstated: Vec<ClaimId>,
    /// Claims whose defeat state newly became undecidable
    pub unverified: Vec<(ClaimId, TraceGap)>,
}

/// What a sweep did
#[derive(Debug, Clone, Default)]
pub struct SweepReport {
    /// Newly registered defeaters
    pub detected: Vec<DefeaterId>,
    /// Claims newly defeated or contradicted
    pub defeated: Vec<ClaimId>,
    /// Claims reinstated
    pub reinstated: Vec<ClaimId>,
    /// Claims newly left undecided by a cycle or the iteration cap
    pub unverified: Vec<ClaimId>,
    /// Dependents marked stale after new defeats
    pub stale: Vec<StaleMark>,
    /// Whether any propagation stopped at the depth limit
    pub propagation_truncated: bool,
    /// Even cycles cancelled in this evaluation
    pub cancelled_cycles: usize,
    /// Odd cycles found in this evaluation
    pub odd_cycles: usize,
    /// Whether activity hit the iteration cap
    pub fixpoint_exceeded: bool,
    /// Event entries written
    pub recorded: Vec<EvidenceId>,
}

/// Outcome of resolving a defeater
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    /// Defeater that was resolved
    pub defeater_id: DefeaterId,
    /// Claim at the root of its target chain
    pub claim_id: Option<ClaimId>,
    /// Whether this call changed anything
    pub changed: bool,
    /// Claims reinstated as a result
    pub reinstated: Vec<ClaimId>,
    /// Event entries written
    pub recorded: Vec<EvidenceId>,
}

struct Assessment {
    confidence: ConfidenceValue,
    ambiguity: Option<DefeatAmbiguity>,
    gap: Option<TraceGap>,
    full: Option<(DefeaterId, DefeaterType)>,
}

/// Defeater engine over one ledger
///
/// # Examples
///
/// ```
/// use attest_defeater::{DefeaterConfig, DefeaterEngine, DetectionContext};
/// use attest_domain::payload::{ClaimPayload, FeedbackPayload};
/// use attest_domain::{ClaimId, ClaimStatus, EvidenceKind, NewEvidence, Provenance};
/// use attest_ledger::{EvidenceLedger, MemoryStorage};
///
/// let ledger = EvidenceLedger::new(MemoryStorage::new()).unwrap();
/// let id = ClaimId::new();
/// let claim = ClaimPayload::new(id, "cache::get", "behavior", "get never blocks");
/// ledger
///     .append(NewEvidence::new(EvidenceKind::Claim, claim.to_value().unwrap(), Provenance::new("agent")))
///     .unwrap();
/// let rebuttal = FeedbackPayload::new(id.to_string(), "rebuttal");
/// ledger
///     .append(NewEvidence::new(EvidenceKind::Feedback, rebuttal.to_value().unwrap(), Provenance::new("user")))
///     .unwrap();
///
/// let mut engine = DefeaterEngine::new(DefeaterConfig::default());
/// let report = engine.sweep(&ledger, &DetectionContext::now()).unwrap();
/// assert_eq!(report.defeated, vec![id]);
/// assert_eq!(engine.claim(&id).unwrap().status, ClaimStatus::Defeated);
/// ```
pub struct DefeaterEngine {
    config: DefeaterConfig,
    board: ClaimBoard,
    registry: DefeaterRegistry,
    activity: ActivityReport,
    metrics: DefeaterMetrics,
    synced: Option<u64>,
    recorded_in: HashMap<DefeaterId, EvidenceId>,
    superseded_by: HashMap<ClaimId, ClaimId>,
    capped: BTreeSet<ClaimId>,
}

impl DefeaterEngine {
    /// Engine with nothing synced yet
    pub fn new(config: DefeaterConfig) -> Self {
        Self {
            config,
            board: ClaimBoard::new(),
            registry: DefeaterRegistry::new(),
            activity: ActivityReport::default(),
            metrics: DefeaterMetrics::new(),
            synced: None,
            recorded_in: HashMap::new(),
            superseded_by: HashMap::new(),
            capped: BTreeSet::new(),
        }
    }

    /// Current configuration
    pub fn config(&self) -> &DefeaterConfig {
        &self.config
    }

    /// Claims seen so far
    pub fn board(&self) -> &ClaimBoard {
        &self.board
    }

    /// Defeaters seen so far
    pub fn registry(&self) -> &DefeaterRegistry {
        &self.registry
    }

    /// Labels from the last evaluation
    pub fn activity(&self) -> &ActivityReport {
        &self.activity
    }

    /// Accumulated metrics
    pub fn metrics(&self) -> &DefeaterMetrics {
        &self.metrics
    }

    /// Reset metrics
    pub fn reset_metrics(&mut self) {
        self.metrics.reset();
    }

    /// Look up a claim
    pub fn claim(&self, id: &ClaimId) -> Option<&Claim> {
        self.board.get(id)
    }

    /// Read entries committed since the last sync
    ///
    /// Claims are added to the board with their dependencies, and defeat
    /// events are replayed. Returns the number of entries read.
    ///
    /// The evaluation that follows only rebuilds in-memory state: the status
    /// changes it reproduces were recorded by whoever caused them, so nothing
    /// is appended and nothing is propagated here. Changes brought in by new
    /// evidence are recorded by the next [`sweep`](Self::sweep).
    pub fn sync(&mut self, snapshot: &LedgerSnapshot) -> usize {
        let mut read = 0;
        for entry in snapshot.entries_after(self.synced) {
            match entry.kind {
                EvidenceKind::Claim => self.load_claim(entry),
                EvidenceKind::Verification => self.replay_event(entry),
                _ => {}
            }
            self.synced = Some(entry.sequence);
            read += 1;
        }
        if read > 0 {
            let rebuilt = self.evaluate();
            debug!(
                entries = read,
                claims = self.board.len(),
                defeated = rebuilt.defeated.len(),
                reinstated = rebuilt.reinstated.len(),
                unverified = rebuilt.unverified.len(),
                "Defeater engine synced"
            );
        }
        read
    }

    fn load_claim(&mut self, entry: &EvidenceEntry) {
        let Some(claim) = Claim::from_entry(entry) else {
            return;
        };
        let id = claim.id;
        if !self.board.insert(claim) {
            return;
        }
        if let Ok(payload) = ClaimPayload::from_value(&entry.payload) {
            for dependency in payload.depends_on.into_iter().chain(payload.assumes) {
                self.board.add_dependency(id, dependency);
            }
        }
        for related in &entry.related_entries {
            let Some(other) = self.board.by_entry(&related.target) else {
                continue;
            };
            if related.relation.is_dependency() {
                self.board.add_dependency(id, other);
            } else if related.relation == Relation::Supersedes {
                self.superseded_by.insert(other, id);
            }
        }
    }

    fn replay_event(&mut self, entry: &EvidenceEntry) {
        let Ok(event) = DefeatEventPayload::from_value(&entry.payload) else {
            return;
        };
        match event.verdict {
            Verdict::DefeaterDetected => {
                if let Some(defeater) = event.defeater {
                    self.recorded_in
                        .insert(defeater.id.clone(), entry.id.clone());
                    self.registry.insert(defeater);
                }
            }
            Verdict::DefeaterResolved => {
                let Some(id) = event.defeater_id else {
                    return;
                };
                if let Some(defeater) = self.registry.get_mut(&id) {
                    defeater.resolved = true;
                    defeater.resolution = event.action;
                }
            }
            Verdict::ClaimStale => {
                if let Some(claim) = self.board.get_mut(&event.claim_id) {
                    if claim.status.can_transition_to(ClaimStatus::Stale) {
                        claim.status = ClaimStatus::Stale;
                    }
                }
            }
            Verdict::ClaimDefeated | Verdict::ClaimReinstated | Verdict::UnverifiedByTrace => {}
        }
    }

    /// Scan a snapshot for defeaters without registering them
    ///
    /// Call [`sync`](Self::sync) with the same snapshot first so the board
    /// holds its claims.
    pub fn detect_defeaters(
        &self,
        snapshot: &LedgerSnapshot,
        context: &DetectionContext,
    ) -> Vec<Defeater> {
        detect_defeaters(snapshot, &self.board, &self.registry, context, &self.config)
    }

    /// Register a defeater; returns false if it was already known
    pub fn register(&mut self, defeater: Defeater) -> bool {
        let defeater_type = defeater.defeater_type;
        let added = self.registry.insert(defeater);
        if added {
            self.metrics.record_detection(defeater_type);
        }
        added
    }

    /// Whether a registered defeater is in force
    ///
    /// Reflects the last evaluation.
    pub fn is_defeater_active(&self, id: &DefeaterId) -> Result<bool, DefeaterError> {
        status_to_result(&self.activity, id, &self.config)
    }

    fn assess(&self, claim: &Claim) -> Assessment {
        let mut defeaters: Vec<&Defeater> = self.registry.for_claim(claim.id).collect();
        defeaters.sort_by(|a, b| a.id.cmp(&b.id));

        let with_status = |status: DefeatStatus| -> Vec<DefeaterId> {
            defeaters
                .iter()
                .filter(|d| self.activity.status(&d.id) == Some(status))
                .map(|d| d.id.clone())
                .collect()
        };

        let ambiguous = with_status(DefeatStatus::Ambiguous);
        if !ambiguous.is_empty() {
            let gap = TraceGap::DefeatCycleAmbiguous;
            return Assessment {
                confidence: ConfidenceValue::absent(AbsentReason::UnverifiedByTrace(gap)),
                ambiguity: Some(DefeatAmbiguity::CycleUnresolved(ambiguous)),
                gap: Some(gap),
                full: None,
            };
        }
        let undetermined = with_status(DefeatStatus::Undetermined);
        if !undetermined.is_empty() {
            let gap = TraceGap::DefeatFixpointExceeded;
            return Assessment {
                confidence: ConfidenceValue::absent(AbsentReason::UnverifiedByTrace(gap)),
                ambiguity: Some(DefeatAmbiguity::FixpointExceeded(undetermined)),
                gap: Some(gap),
                full: None,
            };
        }

        let mut confidence = claim.base_confidence.clone();
        let mut full = None;
        for defeater in defeaters
            .iter()
            .filter(|d| self.activity.is_active(&d.id))
        {
            confidence = apply_defeater_to_confidence(&confidence, defeater, &self.config);
            if full.is_none() && defeater.severity == DefeaterSeverity::Full {
                full = Some((defeater.id.clone(), defeater.defeater_type));
            }
        }

        let cancelled = with_status(DefeatStatus::Cancelled);
        Assessment {
            confidence,
            ambiguity: (!cancelled.is_empty()).then(|| DefeatAmbiguity::MutuallyCancelled(cancelled)),
            gap: None,
            full,
        }
    }

    /// Recompute activity and bring every claim in line with it
    ///
    /// Effective confidence is always refolded from the base value, so a
    /// claim whose defeaters all lapse gets its asserted value back.
    pub fn evaluate(&mut self) -> Evaluation {
        self.activity = compute_activity(self.registry.as_slice(), &self.config);
        let mut evaluation = Evaluation::default();

        for id in self.board.ids() {
            let Some(claim) = self.board.get(&id) else {
                continue;
            };
            if claim.status.is_terminal() {
                continue;
            }
            let assessment = self.assess(claim);
            let Some(claim) = self.board.get_mut(&id) else {
                continue;
            };

            let newly_unsettled = assessment.gap.is_some() && claim.ambiguity != assessment.ambiguity;
            claim.confidence = assessment.confidence;
            claim.ambiguity = assessment.ambiguity;
            if newly_unsettled {
                if let Some(gap) = assessment.gap {
                    evaluation.unverified.push((id, gap));
                }
                continue;
            }
            if assessment.gap.is_some() {
                continue;
            }

            match assessment.full {
                Some((defeater, defeater_type)) if !claim.status.is_defeated() => {
                    let to = if defeater_type == DefeaterType::Contradiction {
                        ClaimStatus::Contradicted
                    } else {
                        ClaimStatus::Defeated
                    };
                    if claim.transition(to).is_ok() {
                        evaluation.defeated.push((id, defeater));
                    }
                }
                None if claim.status.is_defeated() => {
                    if claim.transition(ClaimStatus::Active).is_ok() {
                        evaluation.reinstated.push(id);
                    }
                }
                _ => {}
            }
        }

        for id in self.capped.clone() {
            let dependencies: Vec<ConfidenceValue> = self
                .board
                .dependencies_of(&id)
                .filter_map(|d| self.board.get(d))
                .map(|c| c.confidence.clone())
                .collect();
            if let Some(claim) = self.board.get_mut(&id) {
                claim.confidence = dependency_capped(&claim.confidence, &dependencies);
            }
        }

        for (old, new) in self.superseded_by.clone() {
            if let Some(claim) = self.board.get_mut(&old) {
                if claim.status.can_transition_to(ClaimStatus::Superseded) {
                    claim.status = ClaimStatus::Superseded;
                    debug!(claim = %old, by = %new, "Claim superseded");
                }
            }
        }

        evaluation
    }

    /// Mark every claim depending on `claim` stale, up to `max_depth` edges away
    ///
    /// Confidence is not touched; see [`recompute_confidence`](Self::recompute_confidence).
    pub fn propagate_defeat(
        &mut self,
        claim: ClaimId,
        max_depth: usize,
    ) -> Result<PropagationReport, DefeaterError> {
        let report = propagate(&mut self.board, claim, max_depth)?;
        self.metrics.record_stale(report.marks.len());
        if report.truncated {
            debug!(claim = %claim, max_depth, "Defeat propagation truncated");
        }
        Ok(report)
    }

    /// Cap a claim's effective confidence by its dependencies
    ///
    /// The cap is kept for later evaluations.
    pub fn recompute_confidence(&mut self, claim: ClaimId) -> Result<ConfidenceValue, DefeaterError> {
        let current = self
            .board
            .get(&claim)
            .ok_or(DefeaterError::ClaimNotFound(claim))?;
        let own = self.assess(current).confidence;
        let dependencies: Vec<ConfidenceValue> = self
            .board
            .dependencies_of(&claim)
            .filter_map(|d| self.board.get(d))
            .map(|c| c.confidence.clone())
            .collect();
        let value = dependency_capped(&own, &dependencies);

        self.capped.insert(claim);
        if let Some(current) = self.board.get_mut(&claim) {
            current.confidence = value.clone();
        }
        Ok(value)
    }

    /// Resolve a defeater and record the resolution
    ///
    /// Resolving an already resolved defeater changes nothing.
    pub fn resolve_defeater<S>(
        &mut self,
        ledger: &EvidenceLedger<S>,
        id: &DefeaterId,
        action: ResolutionAction,
    ) -> Result<Resolution, DefeaterError>
    where
        S: EvidenceStorage,
        S::Error: Display,
    {
        self.sync(&ledger.snapshot());
        if !self.registry.contains(id) {
            return Err(DefeaterError::DefeaterNotFound(id.clone()));
        }
        let claim_id = self.registry.root_claim(id);

        let mut resolution = Resolution {
            defeater_id: id.clone(),
            claim_id,
            changed: false,
            reinstated: Vec::new(),
            recorded: Vec::new(),
        };
        let Some(defeater) = self.registry.get_mut(id) else {
            return Ok(resolution);
        };
        if defeater.resolved {
            return Ok(resolution);
        }
        defeater.resolved = true;
        defeater.resolution = Some(action);
        resolution.changed = true;
        self.metrics.record_resolution(action);

        let evaluation = self.evaluate();
        self.metrics.record_reinstatements(evaluation.reinstated.len());
        info!(
            defeater = %id.short(),
            action = action.as_str(),
            reinstated = evaluation.reinstated.len(),
            "Defeater resolved"
        );

        if self.config.record_events {
            if let Some(claim) = claim_id {
                let mut event =
                    DefeatEventPayload::new(claim, Verdict::DefeaterResolved).with_defeater_id(id.clone());
                event.action = Some(action);
                let mut related = self.claim_reference(claim);
                if let Some(detection) = self.recorded_in.get(id) {
                    related.push((detection.clone(), Relation::Resolves));
                }
                resolution
                    .recorded
                    .push(self.record(ledger, event, related, None)?);
            }
            for claim in &evaluation.reinstated {
                let event = DefeatEventPayload::new(*claim, Verdict::ClaimReinstated)
                    .with_defeater_id(id.clone());
                let related = self.claim_reference(*claim);
                resolution
                    .recorded
                    .push(self.record(ledger, event, related, None)?);
            }
        }

        resolution.reinstated = evaluation.reinstated;
        Ok(resolution)
    }

    /// One full pass: sync, detect, register, evaluate, propagate, record
    pub fn sweep<S>(
        &mut self,
        ledger: &EvidenceLedger<S>,
        context: &DetectionContext,
    ) -> Result<SweepReport, DefeaterError>
    where
        S: EvidenceStorage,
        S::Error: Display,
    {
        let start = Instant::now();
        let snapshot = ledger.snapshot();
        self.sync(&snapshot);

        let mut report = SweepReport::default();
        for defeater in self.detect_defeaters(&snapshot, context) {
            let id = defeater.id.clone();
            if self.register(defeater) {
                report.detected.push(id);
            }
        }

        let evaluation = self.evaluate();
        report.cancelled_cycles = self.activity.cancelled_cycles.len();
        report.odd_cycles = self.activity.odd_cycles.len();
        report.fixpoint_exceeded = self.activity.fixpoint_exceeded;

        for (claim, _) in &evaluation.defeated {
            let propagation = self.propagate_defeat(*claim, self.config.max_propagation_depth)?;
            report.propagation_truncated |= propagation.truncated;
            report.stale.extend(propagation.marks);
        }

        if self.config.record_events {
            report.recorded = self.record_sweep(ledger, &report, &evaluation, context.timestamp)?;
        }

        report.defeated = evaluation.defeated.iter().map(|(c, _)| *c).collect();
        report.reinstated = evaluation.reinstated;
        report.unverified = evaluation.unverified.iter().map(|(c, _)| *c).collect();

        self.metrics.record_defeats(report.defeated.len());
        self.metrics.record_reinstatements(report.reinstated.len());
        self.metrics.record_unverified(report.unverified.len());
        self.metrics
            .record_sweep(start.elapsed().as_millis() as u64, report.fixpoint_exceeded);

        if report.odd_cycles > 0 {
            warn!(
                cycles = report.odd_cycles,
                policy = ?self.config.odd_cycle_policy,
                "Odd defeat cycles present"
            );
        }
        info!(
            detected = report.detected.len(),
            defeated = report.defeated.len(),
            reinstated = report.reinstated.len(),
            stale = report.stale.len(),
            unverified = report.unverified.len(),
            "Defeater sweep completed"
        );
        Ok(report)
    }

    fn record_sweep<S>(
        &mut self,
        ledger: &EvidenceLedger<S>,
        report: &SweepReport,
        evaluation: &Evaluation,
        at: DateTime<Utc>,
    ) -> Result<Vec<EvidenceId>, DefeaterError>
    where
        S: EvidenceStorage,
        S::Error: Display,
    {
        let mut recorded = Vec::new();

        for id in &report.detected {
            let Some(defeater) = self.registry.get(id).cloned() else {
                continue;
            };
            let Some(claim) = self.registry.root_claim(id) else {
                debug!(defeater = %id.short(), "Defeater has no root claim; not recorded");
                continue;
            };
            let mut related = self.claim_reference(claim);
            related.extend(
                defeater
                    .evidence
                    .iter()
                    .map(|e| (e.clone(), Relation::References)),
            );
            if let Some(target) = defeater
                .target_defeater()
                .and_then(|t| self.recorded_in.get(t))
            {
                related.push((target.clone(), Relation::References));
            }
            let event = DefeatEventPayload::new(claim, Verdict::DefeaterDetected).with_defeater(defeater);
            let entry = self.record(ledger, event, related, Some(at))?;
            self.recorded_in.insert(id.clone(), entry.clone());
            recorded.push(entry);
        }

        for (claim, defeater) in &evaluation.defeated {
            let mut related = self.claim_reference(*claim);
            if let Some(detection) = self.recorded_in.get(defeater) {
                related.push((detection.clone(), Relation::References));
            }
            let event =
                DefeatEventPayload::new(*claim, Verdict::ClaimDefeated).with_defeater_id(defeater.clone());
            recorded.push(self.record(ledger, event, related, Some(at))?);
        }

        for claim in &evaluation.reinstated {
            let event = DefeatEventPayload::new(*claim, Verdict::ClaimReinstated);
            let related = self.claim_reference(*claim);
            recorded.push(self.record(ledger, event, related, Some(at))?);
        }

        for (claim, gap) in &evaluation.unverified {
            let event =
                DefeatEventPayload::new(*claim, Verdict::UnverifiedByTrace).with_detail(gap.as_str());
            let related = self.claim_reference(*claim);
            recorded.push(self.record(ledger, event, related, Some(at))?);
        }

        for mark in &report.stale {
            let mut event = DefeatEventPayload::new(mark.claim_id, Verdict::ClaimStale)
                .with_detail(format!("was {}", mark.previous_status));
            event.path = mark.path.clone();
            event.depth = Some(mark.depth);
            let related = self.claim_reference(mark.claim_id);
            recorded.push(self.record(ledger, event, related, Some(at))?);
        }

        Ok(recorded)
    }

    fn claim_reference(&self, claim: ClaimId) -> Vec<(EvidenceId, Relation)> {
        self.board
            .get(&claim)
            .and_then(|c| c.evidence.clone())
            .map(|e| vec![(e, Relation::References)])
            .unwrap_or_default()
    }

    fn record<S>(
        &self,
        ledger: &EvidenceLedger<S>,
        event: DefeatEventPayload,
        related: Vec<(EvidenceId, Relation)>,
        at: Option<DateTime<Utc>>,
    ) -> Result<EvidenceId, DefeaterError>
    where
        S: EvidenceStorage,
        S::Error: Display,
    {
        let verdict = event.verdict;
        let mut draft = NewEvidence::new(
            EvidenceKind::Verification,
            event.to_value()?,
            Provenance::new(EVENT_SOURCE).with_method(verdict.as_str()),
        );
        let mut seen = BTreeSet::new();
        for (target, relation) in related {
            if seen.insert((target.clone(), relation.as_str())) {
                draft = draft.related(target, relation);
            }
        }
        if let Some(at) = at {
            draft = draft.at(at);
        }
        let id = ledger.append(draft)?;
        debug!(verdict = verdict.as_str(), entry = %id.short(), "Defeat event recorded");
        Ok(id)
    }
}

impl Default for DefeaterEngine {
    fn default() -> Self {
        Self::new(DefeaterConfig::default())
    }
}
