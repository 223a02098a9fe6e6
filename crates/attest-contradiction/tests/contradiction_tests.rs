//! Integration tests for attest-contradiction

use attest_contradiction::{ContradictionError, ContradictionTracker, TrackerConfig, TRACKER_SOURCE};
use attest_domain::payload::{ClaimPayload, ContradictionPayload};
use attest_domain::{
    Claim, ClaimId, ClaimStatus, ConfidenceValue, ContradictionAction, ContradictionKind,
    ContradictionSeverity, ContradictionStatus, EvidenceId, EvidenceKind, NewEvidence, Provenance,
    Relation,
};
use attest_ledger::{EvidenceLedger, MemoryStorage};
use chrono::{DateTime, TimeZone, Utc};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap()
}

fn c(n: u128) -> ClaimId {
    ClaimId::from_value(n)
}

fn add_claim(
    ledger: &EvidenceLedger<MemoryStorage>,
    n: u128,
    subject: &str,
    proposition: &str,
    p: f64,
) -> EvidenceId {
    let payload = ClaimPayload::new(c(n), subject, "behavior", proposition);
    ledger
        .append(
            NewEvidence::new(
                EvidenceKind::Claim,
                payload.to_value().unwrap(),
                Provenance::new("agent:reader"),
            )
            .with_confidence(ConfidenceValue::measured(p, "review-set", 100, p, p))
            .at(t0()),
        )
        .unwrap()
}

#[test]
fn test_conflicting_return_values_are_flagged_not_merged() {
    init_tracing();
    let ledger = EvidenceLedger::new(MemoryStorage::new()).unwrap();
    let entry_a = add_claim(&ledger, 1, "fn:x", "function X returns A", 0.8);
    let entry_b = add_claim(&ledger, 2, "fn:x", "function X returns B", 0.9);

    let mut tracker = ContradictionTracker::new(TrackerConfig::default());
    let found = tracker.detect_contradictions(&ledger).unwrap();
    assert_eq!(found.len(), 1);
    let contradiction = &found[0];
    assert_eq!(contradiction.claim_a, c(1));
    assert_eq!(contradiction.claim_b, c(2));
    assert_eq!(contradiction.kind, ContradictionKind::ConflictingValue);
    assert_eq!(contradiction.severity, ContradictionSeverity::Blocking);
    assert_eq!(contradiction.status, ContradictionStatus::Unresolved);
    assert!(contradiction.resolution_action.is_none());

    // one detection entry, pointing at both claims
    let snapshot = ledger.snapshot();
    assert_eq!(snapshot.len(), 3);
    let recorded: Vec<_> = snapshot.by_kind(EvidenceKind::Contradiction).collect();
    assert_eq!(recorded.len(), 1);
    assert_eq!(recorded[0].provenance.source, TRACKER_SOURCE);
    let targets: Vec<_> = recorded[0].related_by(Relation::Contradicts).collect();
    assert_eq!(targets, vec![&entry_a, &entry_b]);

    // both claims still read back untouched
    for entry in snapshot.by_kind(EvidenceKind::Claim) {
        let claim = Claim::from_entry(entry).unwrap();
        assert_eq!(claim.status, ClaimStatus::Active);
    }
}

#[test]
fn test_detection_is_idempotent() {
    let ledger = EvidenceLedger::new(MemoryStorage::new()).unwrap();
    add_claim(&ledger, 1, "fn:x", "function X returns A", 0.8);
    add_claim(&ledger, 2, "fn:x", "function X returns B", 0.8);

    let mut tracker = ContradictionTracker::default();
    assert_eq!(tracker.detect_contradictions(&ledger).unwrap().len(), 1);
    assert!(tracker.detect_contradictions(&ledger).unwrap().is_empty());

    // a second tracker learns the existing record instead of writing another
    let mut other = ContradictionTracker::default();
    assert!(other.detect_contradictions(&ledger).unwrap().is_empty());
    assert_eq!(other.len(), 1);
    assert_eq!(ledger.snapshot().by_kind(EvidenceKind::Contradiction).count(), 1);
}

#[test]
fn test_three_way_conflict_gives_each_pair() {
    let ledger = EvidenceLedger::new(MemoryStorage::new()).unwrap();
    add_claim(&ledger, 1, "fn:x", "function X returns A", 0.8);
    add_claim(&ledger, 2, "fn:x", "function X returns B", 0.8);
    add_claim(&ledger, 3, "fn:x", "function X returns C", 0.3);

    let mut tracker = ContradictionTracker::default();
    let found = tracker.detect_contradictions(&ledger).unwrap();
    assert_eq!(found.len(), 3);
    assert_eq!(tracker.involving(c(3)).len(), 2);
    assert!(tracker
        .involving(c(3))
        .iter()
        .all(|x| x.severity == ContradictionSeverity::Minor));
}

#[test]
fn test_resolution_is_recorded_as_new_evidence() {
    init_tracing();
    let ledger = EvidenceLedger::new(MemoryStorage::new()).unwrap();
    add_claim(&ledger, 1, "fn:parse", "parse returns None", 0.8);
    add_claim(&ledger, 2, "fn:parse", "parse does not return None", 0.8);

    let mut tracker = ContradictionTracker::default();
    let found = tracker.detect_contradictions(&ledger).unwrap();
    let id = found[0].id.clone();
    let detection = tracker.detection_entry(&id).unwrap().clone();

    let resolved = tracker
        .resolve_contradiction(
            &ledger,
            &id,
            ContradictionAction::PreferB,
            "the None path was removed in the refactor",
        )
        .unwrap();
    assert_eq!(resolved.status, ContradictionStatus::Resolved);
    assert_eq!(resolved.resolution_action, Some(ContradictionAction::PreferB));
    assert_eq!(tracker.unresolved().count(), 0);

    let snapshot = ledger.snapshot();
    let entries: Vec<_> = snapshot.by_kind(EvidenceKind::Contradiction).collect();
    assert_eq!(entries.len(), 2);
    // the detection entry is still there as written
    let original = ContradictionPayload::from_value(&entries[0].payload).unwrap();
    assert!(original.action.is_none());
    let resolution = ContradictionPayload::from_value(&entries[1].payload).unwrap();
    assert_eq!(resolution.action, Some(ContradictionAction::PreferB));
    assert_eq!(
        resolution.rationale.as_deref(),
        Some("the None path was removed in the refactor")
    );
    assert!(entries[1]
        .related_by(Relation::Resolves)
        .any(|target| target == &detection));

    let again = tracker.resolve_contradiction(&ledger, &id, ContradictionAction::PreferA, "changed my mind");
    assert!(matches!(again, Err(ContradictionError::AlreadyResolved(_))));
    assert_eq!(ledger.snapshot().by_kind(EvidenceKind::Contradiction).count(), 2);
}

#[test]
fn test_restart_replays_resolutions() {
    let ledger = EvidenceLedger::new(MemoryStorage::new()).unwrap();
    add_claim(&ledger, 1, "fn:x", "function X returns A", 0.8);
    add_claim(&ledger, 2, "fn:x", "function X returns B", 0.8);
    add_claim(&ledger, 3, "fn:y", "cache is thread-safe", 0.6);
    add_claim(&ledger, 4, "fn:y", "cache isn't thread-safe", 0.6);

    let mut tracker = ContradictionTracker::default();
    let found = tracker.detect_contradictions(&ledger).unwrap();
    assert_eq!(found.len(), 2);
    let first = found[0].id.clone();
    tracker
        .resolve_contradiction(&ledger, &first, ContradictionAction::Merge, "same value, renamed")
        .unwrap();

    let mut restarted = ContradictionTracker::default();
    assert_eq!(restarted.sync(&ledger.snapshot()), 3);
    assert_eq!(restarted.len(), 2);
    assert_eq!(restarted.unresolved().count(), 1);
    let replayed = restarted.get(&first).unwrap();
    assert_eq!(replayed.resolution_action, Some(ContradictionAction::Merge));
    assert_eq!(replayed.rationale.as_deref(), Some("same value, renamed"));
    let original: Vec<_> = tracker.all().cloned().collect();
    let rebuilt: Vec<_> = restarted.all().cloned().collect();
    assert_eq!(original.len(), rebuilt.len());
    for (a, b) in original.iter().zip(&rebuilt) {
        assert_eq!(a.id, b.id);
        assert_eq!(a.status, b.status);
        assert_eq!(a.severity, b.severity);
    }
}
