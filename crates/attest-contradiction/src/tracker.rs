//! Detection and auditable resolution of contradictions
//!
//! The tracker only ever appends. A detection is a `contradiction` entry
//! pointing at both claim entries; a resolution is a second `contradiction`
//! entry carrying the action and rationale and pointing at the detection.
//! Neither claim is touched, so deciding which side wins stays with whoever
//! reads the resolution.

use crate::{ContradictionError, TrackerConfig};
use attest_domain::algebra::get_effective_confidence;
use attest_domain::payload::ContradictionPayload;
use attest_domain::proposition::{conflict, Conflict};
use attest_domain::{
    Claim, ClaimId, Contradiction, ContradictionAction, ContradictionId, ContradictionKind,
    ContradictionStatus, EvidenceEntry, EvidenceId, EvidenceKind, EvidenceStorage, NewEvidence,
    Provenance, Relation,
};
use attest_ledger::{EvidenceLedger, LedgerSnapshot};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt::Display;
use tracing::{debug, info};

/// Provenance source of every entry the tracker writes
pub const TRACKER_SOURCE: &str = "attest:contradiction";

/// A contradiction found in a snapshot, with the entries of both claims
struct Candidate {
    contradiction: Contradiction,
    entry_a: EvidenceId,
    entry_b: EvidenceId,
}

/// Keeps the set of known contradictions in step with a ledger
#[derive(Debug, Default)]
pub struct ContradictionTracker {
    config: TrackerConfig,
    contradictions: BTreeMap<ContradictionId, Contradiction>,
    recorded_in: HashMap<ContradictionId, EvidenceId>,
    synced: Option<u64>,
}

impl ContradictionTracker {
    /// Create a tracker with the given configuration
    pub fn new(config: TrackerConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    /// Configuration in use
    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    /// A known contradiction
    pub fn get(&self, id: &ContradictionId) -> Option<&Contradiction> {
        self.contradictions.get(id)
    }

    /// Every known contradiction, in id order
    pub fn all(&self) -> impl Iterator<Item = &Contradiction> {
        self.contradictions.values()
    }

    /// Contradictions still awaiting a decision
    pub fn unresolved(&self) -> impl Iterator<Item = &Contradiction> {
        self.all().filter(|c| c.is_unresolved())
    }

    /// Contradictions with `claim` on either side
    pub fn involving(&self, claim: ClaimId) -> Vec<&Contradiction> {
        self.all().filter(|c| c.involves(claim)).collect()
    }

    /// Entry that recorded the detection of `id`
    pub fn detection_entry(&self, id: &ContradictionId) -> Option<&EvidenceId> {
        self.recorded_in.get(id)
    }

    /// Number of known contradictions
    pub fn len(&self) -> usize {
        self.contradictions.len()
    }

    /// Whether no contradiction is known
    pub fn is_empty(&self) -> bool {
        self.contradictions.is_empty()
    }

    /// Replay `contradiction` entries not seen yet
    ///
    /// Returns how many were read.
    pub fn sync(&mut self, snapshot: &LedgerSnapshot) -> usize {
        let mut read = 0;
        for entry in snapshot.entries_after(self.synced) {
            self.synced = Some(entry.sequence);
            if entry.kind != EvidenceKind::Contradiction {
                continue;
            }
            match ContradictionPayload::from_value(&entry.payload) {
                Ok(payload) => {
                    self.replay(entry, payload);
                    read += 1;
                }
                Err(e) => {
                    debug!(entry = %entry.id.short(), error = %e, "Skipping malformed contradiction");
                }
            }
        }
        read
    }

    fn replay(&mut self, entry: &EvidenceEntry, payload: ContradictionPayload) {
        let id = payload.contradiction_id.clone();
        let record = self
            .contradictions
            .entry(id.clone())
            .or_insert_with(|| from_payload(&payload, entry));
        match payload.action {
            None => {
                self.recorded_in.entry(id).or_insert_with(|| entry.id.clone());
            }
            Some(action) => {
                record.status = ContradictionStatus::Resolved;
                record.resolution_action = Some(action);
                record.rationale = payload.rationale;
            }
        }
    }

    /// Contradictions present in `snapshot` that the tracker does not know yet
    ///
    /// Pairs claims sharing subject and type, oldest first, and keeps the
    /// pairs whose propositions conflict. Claim entries that were superseded
    /// take no part.
    pub fn find_contradictions(&self, snapshot: &LedgerSnapshot) -> Vec<Contradiction> {
        self.candidates(snapshot)
            .into_iter()
            .map(|c| c.contradiction)
            .collect()
    }

    fn candidates(&self, snapshot: &LedgerSnapshot) -> Vec<Candidate> {
        // latest entry per claim id, then back into ledger order
        let mut latest: HashMap<ClaimId, (u64, Claim)> = HashMap::new();
        for entry in snapshot.by_kind(EvidenceKind::Claim) {
            let superseded = snapshot
                .incoming(&entry.id)
                .any(|(_, relation)| relation == Relation::Supersedes);
            if superseded {
                continue;
            }
            if let Some(claim) = Claim::from_entry(entry) {
                latest.insert(claim.id, (entry.sequence, claim));
            }
        }
        let mut ordered: Vec<(u64, Claim)> = latest.into_values().collect();
        ordered.sort_by_key(|(sequence, _)| *sequence);

        let mut topics: BTreeMap<(String, String), Vec<Claim>> = BTreeMap::new();
        for (_, claim) in ordered {
            topics
                .entry((claim.subject.clone(), claim.claim_type.clone()))
                .or_default()
                .push(claim);
        }

        let mut seen = HashSet::new();
        let mut found = Vec::new();
        for claims in topics.values() {
            for (i, older) in claims.iter().enumerate() {
                for newer in &claims[i + 1..] {
                    let id = ContradictionId::for_pair(older.id, newer.id);
                    if self.contradictions.contains_key(&id) || !seen.insert(id) {
                        continue;
                    }
                    if let Some(candidate) = self.assess(older, newer) {
                        found.push(candidate);
                    }
                }
            }
        }
        found
    }

    fn assess(&self, older: &Claim, newer: &Claim) -> Option<Candidate> {
        let (kind, explanation) = match conflict(&older.proposition, &newer.proposition)? {
            Conflict::Negation if self.config.detect_negation => (
                ContradictionKind::Negation,
                format!(
                    "claim {} ('{}') negates claim {} ('{}')",
                    newer.id, newer.proposition, older.id, older.proposition
                ),
            ),
            Conflict::ConflictingValue { left, right } if self.config.detect_conflicting_values => (
                ContradictionKind::ConflictingValue,
                format!(
                    "claim {} asserts {} where claim {} asserts {}",
                    newer.id, right, older.id, left
                ),
            ),
            _ => return None,
        };

        let severity = self
            .config
            .severity_for(effective(older).min(effective(newer)));
        Some(Candidate {
            contradiction: Contradiction::new(
                older.id,
                newer.id,
                kind,
                severity,
                explanation,
                newer.created_at,
            ),
            entry_a: older.evidence.clone()?,
            entry_b: newer.evidence.clone()?,
        })
    }

    /// Find and record new contradictions
    ///
    /// Each new contradiction becomes a `contradiction` entry related
    /// `contradicts` to both claim entries. Returns the new contradictions,
    /// all unresolved.
    pub fn detect_contradictions<S>(
        &mut self,
        ledger: &EvidenceLedger<S>,
    ) -> Result<Vec<Contradiction>, ContradictionError>
    where
        S: EvidenceStorage,
        S::Error: Display,
    {
        let snapshot = ledger.snapshot();
        self.sync(&snapshot);

        let mut detected = Vec::new();
        for Candidate {
            contradiction,
            entry_a,
            entry_b,
        } in self.candidates(&snapshot)
        {
            let draft = NewEvidence::new(
                EvidenceKind::Contradiction,
                to_payload(&contradiction, None, None).to_value()?,
                Provenance::new(TRACKER_SOURCE).with_method("proposition_match"),
            )
            .related(entry_a, Relation::Contradicts)
            .related(entry_b, Relation::Contradicts)
            .at(contradiction.detected_at);
            let entry = ledger.append(draft)?;

            debug!(
                contradiction = %contradiction.id,
                claim_a = %contradiction.claim_a,
                claim_b = %contradiction.claim_b,
                entry = %entry.short(),
                "Contradiction recorded"
            );
            self.recorded_in.insert(contradiction.id.clone(), entry);
            self.contradictions
                .insert(contradiction.id.clone(), contradiction.clone());
            detected.push(contradiction);
        }

        if !detected.is_empty() {
            info!(
                detected = detected.len(),
                unresolved = self.unresolved().count(),
                "Contradiction scan complete"
            );
        }
        Ok(detected)
    }

    /// Record a decision on a contradiction
    ///
    /// Appends a `contradiction` entry with the action and rationale,
    /// related `resolves` to the detection entry. The claims themselves are
    /// left as they are.
    ///
    /// # Errors
    ///
    /// `NotFound` for an unknown id, `AlreadyResolved` if a decision exists.
    pub fn resolve_contradiction<S>(
        &mut self,
        ledger: &EvidenceLedger<S>,
        id: &ContradictionId,
        action: ContradictionAction,
        rationale: impl Into<String>,
    ) -> Result<Contradiction, ContradictionError>
    where
        S: EvidenceStorage,
        S::Error: Display,
    {
        self.sync(&ledger.snapshot());

        let record = self
            .contradictions
            .get(id)
            .ok_or_else(|| ContradictionError::NotFound(id.clone()))?;
        if !record.is_unresolved() {
            return Err(ContradictionError::AlreadyResolved(id.clone()));
        }

        let rationale = rationale.into();
        let mut draft = NewEvidence::new(
            EvidenceKind::Contradiction,
            to_payload(record, Some(action), Some(rationale.clone())).to_value()?,
            Provenance::new(TRACKER_SOURCE).with_method("resolution"),
        );
        if let Some(detection) = self.recorded_in.get(id) {
            draft = draft.related(detection.clone(), Relation::Resolves);
        }
        let entry = ledger.append(draft)?;

        let Some(record) = self.contradictions.get_mut(id) else {
            return Err(ContradictionError::NotFound(id.clone()));
        };
        record.status = ContradictionStatus::Resolved;
        record.resolution_action = Some(action);
        record.rationale = Some(rationale);
        info!(
            contradiction = %id,
            action = action.as_str(),
            entry = %entry.short(),
            "Contradiction resolved"
        );
        Ok(record.clone())
    }
}

fn effective(claim: &Claim) -> f64 {
    get_effective_confidence(&claim.confidence).value()
}

fn to_payload(
    contradiction: &Contradiction,
    action: Option<ContradictionAction>,
    rationale: Option<String>,
) -> ContradictionPayload {
    ContradictionPayload {
        contradiction_id: contradiction.id.clone(),
        claim_a: contradiction.claim_a,
        claim_b: contradiction.claim_b,
        kind: contradiction.kind,
        severity: contradiction.severity,
        explanation: contradiction.explanation.clone(),
        action,
        rationale,
    }
}

fn from_payload(payload: &ContradictionPayload, entry: &EvidenceEntry) -> Contradiction {
    let mut contradiction = Contradiction::new(
        payload.claim_a,
        payload.claim_b,
        payload.kind,
        payload.severity,
        payload.explanation.clone(),
        entry.timestamp,
    );
    contradiction.id = payload.contradiction_id.clone();
    contradiction
}

#[cfg(test)]
mod tests {
    use super::*;
    use attest_domain::payload::ClaimPayload;
    use attest_domain::{ConfidenceValue, ContradictionSeverity};
    use attest_ledger::MemoryStorage;

    fn add_claim(
        ledger: &EvidenceLedger<MemoryStorage>,
        n: u128,
        proposition: &str,
        confidence: Option<f64>,
    ) -> EvidenceId {
        let payload = ClaimPayload::new(ClaimId::from_value(n), "fn:parse", "behavior", proposition);
        let mut draft = NewEvidence::new(
            EvidenceKind::Claim,
            payload.to_value().unwrap(),
            Provenance::new("agent:reader"),
        );
        if let Some(p) = confidence {
            draft = draft.with_confidence(ConfidenceValue::measured(p, "d", 50, p, p));
        }
        ledger.append(draft).unwrap()
    }

    #[test]
    fn test_severity_follows_weaker_claim() {
        let ledger = EvidenceLedger::new(MemoryStorage::new()).unwrap();
        add_claim(&ledger, 1, "parse returns None", Some(0.9));
        add_claim(&ledger, 2, "parse does not return None", Some(0.5));

        let tracker = ContradictionTracker::default();
        let found = tracker.find_contradictions(&ledger.snapshot());
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].kind, ContradictionKind::Negation);
        assert_eq!(found[0].severity, ContradictionSeverity::Significant);
        assert_eq!(found[0].claim_a, ClaimId::from_value(1));
    }

    #[test]
    fn test_absent_confidence_is_minor() {
        let ledger = EvidenceLedger::new(MemoryStorage::new()).unwrap();
        add_claim(&ledger, 1, "parse returns None", Some(0.95));
        add_claim(&ledger, 2, "parse returns Some", None);

        let found = ContradictionTracker::default().find_contradictions(&ledger.snapshot());
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].severity, ContradictionSeverity::Minor);
    }

    #[test]
    fn test_disabled_kind_is_not_flagged() {
        let ledger = EvidenceLedger::new(MemoryStorage::new()).unwrap();
        add_claim(&ledger, 1, "parse returns None", Some(0.9));
        add_claim(&ledger, 2, "parse returns Some", Some(0.9));

        let tracker = ContradictionTracker::new(TrackerConfig::lenient());
        assert!(tracker.find_contradictions(&ledger.snapshot()).is_empty());
    }

    #[test]
    fn test_different_topics_do_not_pair() {
        let ledger = EvidenceLedger::new(MemoryStorage::new()).unwrap();
        add_claim(&ledger, 1, "parse returns None", Some(0.9));
        let payload = ClaimPayload::new(ClaimId::from_value(2), "fn:lex", "behavior", "parse returns Some");
        ledger
            .append(NewEvidence::new(
                EvidenceKind::Claim,
                payload.to_value().unwrap(),
                Provenance::new("agent:reader"),
            ))
            .unwrap();

        assert!(ContradictionTracker::default()
            .find_contradictions(&ledger.snapshot())
            .is_empty());
    }

    #[test]
    fn test_superseded_claims_are_skipped() {
        let ledger = EvidenceLedger::new(MemoryStorage::new()).unwrap();
        let old = add_claim(&ledger, 1, "parse returns None", Some(0.9));
        let payload = ClaimPayload::new(ClaimId::from_value(2), "fn:parse", "behavior", "parse returns Some");
        ledger
            .append(
                NewEvidence::new(
                    EvidenceKind::Claim,
                    payload.to_value().unwrap(),
                    Provenance::new("agent:reader"),
                )
                .related(old, Relation::Supersedes),
            )
            .unwrap();

        assert!(ContradictionTracker::default()
            .find_contradictions(&ledger.snapshot())
            .is_empty());
    }

    #[test]
    fn test_resolve_unknown_is_not_found() {
        let ledger = EvidenceLedger::new(MemoryStorage::new()).unwrap();
        let mut tracker = ContradictionTracker::default();
        let id = ContradictionId::for_pair(ClaimId::from_value(1), ClaimId::from_value(2));
        let result = tracker.resolve_contradiction(&ledger, &id, ContradictionAction::Merge, "");
        assert!(matches!(result, Err(ContradictionError::NotFound(_))));
    }
}
