//! Integration tests for attest-defeater
//!
//! Ledgers are built either through the public append API or, for cyclic
//! `defeats` graphs that no append order can produce, from hand-made entries.

use attest_defeater::{
    DefeatStatus, DefeaterConfig, DefeaterEngine, DefeaterError, DetectionContext, EVENT_SOURCE,
};
use attest_domain::payload::{ClaimPayload, DefeatEventPayload, FeedbackPayload, Verdict};
use attest_domain::{
    AbsentReason, ClaimId, ClaimStatus, ConfidenceValue, DefeatAmbiguity, DefeatTarget, Defeater,
    DefeaterId, DefeaterType, EvidenceEntry, EvidenceId, EvidenceKind, NewEvidence, Provenance,
    RelatedEntry, Relation, ResolutionAction, TraceGap,
};
use attest_ledger::{EvidenceLedger, LedgerConfig, MemoryStorage};
use chrono::{DateTime, TimeZone, Utc};
use serde_json::json;

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

fn measured(p: f64) -> ConfidenceValue {
    ConfidenceValue::measured(p, "review-set", 200, p - 0.05, p + 0.05)
}

fn claim_draft(payload: ClaimPayload, p: f64) -> NewEvidence {
    NewEvidence::new(
        EvidenceKind::Claim,
        payload.to_value().unwrap(),
        Provenance::new("agent:reviewer"),
    )
    .with_confidence(measured(p))
    .at(t0())
}

fn feedback_draft(target: ClaimId, signal: &str) -> NewEvidence {
    NewEvidence::new(
        EvidenceKind::Feedback,
        FeedbackPayload::new(target.to_string(), signal)
            .to_value()
            .unwrap(),
        Provenance::new("user"),
    )
    .at(t0())
}

/// C1..C10, each one depending on the one before
fn chain_ledger() -> EvidenceLedger<MemoryStorage> {
    let ledger = EvidenceLedger::new(MemoryStorage::new()).unwrap();
    for n in 1..=10 {
        let mut payload = ClaimPayload::new(
            c(n),
            format!("module{}", n),
            "behavior",
            format!("step {} completes", n),
        );
        if n > 1 {
            payload = payload.depends_on(c(n - 1));
        }
        ledger.append(claim_draft(payload, 0.9)).unwrap();
    }
    ledger
}

fn hex(n: u64) -> EvidenceId {
    EvidenceId::from_hex(&format!("{:064x}", n)).unwrap()
}

fn entry(
    id: u64,
    sequence: u64,
    kind: EvidenceKind,
    payload: serde_json::Value,
    confidence: Option<ConfidenceValue>,
    defeats: &[u64],
) -> EvidenceEntry {
    EvidenceEntry {
        id: hex(id),
        sequence,
        timestamp: t0(),
        kind,
        payload,
        provenance: Provenance::new("test"),
        confidence,
        related_entries: defeats
            .iter()
            .map(|&t| RelatedEntry {
                target: hex(t),
                relation: Relation::Defeats,
            })
            .collect(),
        session_id: None,
    }
}

/// One claim entry (id 1) plus entries attacking it and each other
fn defeat_graph(edges: &[(u64, &[u64])]) -> EvidenceLedger<MemoryStorage> {
    let mut entries = vec![entry(
        1,
        0,
        EvidenceKind::Claim,
        ClaimPayload::new(c(1), "scheduler", "behavior", "jobs run in order")
            .to_value()
            .unwrap(),
        Some(measured(0.8)),
        &[],
    )];
    for (sequence, (id, defeats)) in edges.iter().enumerate() {
        entries.push(entry(
            *id,
            sequence as u64 + 1,
            EvidenceKind::Synthesis,
            json!({"content": format!("objection {}", id)}),
            None,
            defeats,
        ));
    }
    EvidenceLedger::open(MemoryStorage::with_entries(entries), LedgerConfig::default()).unwrap()
}

#[test]
fn test_defeat_propagates_along_dependency_chain() {
    init_tracing();
    let ledger = chain_ledger();
    ledger.append(feedback_draft(c(1), "rebuttal")).unwrap();

    let config = DefeaterConfig {
        max_propagation_depth: 5,
        ..DefeaterConfig::default()
    };
    let mut engine = DefeaterEngine::new(config);
    let report = engine.sweep(&ledger, &DetectionContext::at(t0())).unwrap();

    assert_eq!(report.defeated, vec![c(1)]);
    assert_eq!(engine.claim(&c(1)).unwrap().status, ClaimStatus::Defeated);
    assert_eq!(engine.claim(&c(1)).unwrap().confidence.as_deterministic(), Some(false));

    let c5 = report.stale.iter().find(|m| m.claim_id == c(5)).unwrap();
    assert_eq!(c5.path, vec![c(1), c(2), c(3), c(4), c(5)]);
    assert_eq!(c5.depth, 4);
    assert_eq!(engine.claim(&c(5)).unwrap().status, ClaimStatus::Stale);

    // C6 is five edges away, C7 is past the limit
    assert_eq!(engine.claim(&c(6)).unwrap().status, ClaimStatus::Stale);
    assert_eq!(engine.claim(&c(7)).unwrap().status, ClaimStatus::Active);
    assert!(report.propagation_truncated);

    // marking stale leaves confidence alone
    assert_eq!(engine.claim(&c(5)).unwrap().confidence.point_value(), Some(0.9));
}

#[test]
fn test_explicit_propagation_call() {
    let ledger = chain_ledger();
    let mut engine = DefeaterEngine::default();
    engine.sync(&ledger.snapshot());

    let report = engine.propagate_defeat(c(1), 5).unwrap();
    assert_eq!(report.mark_for(c(5)).unwrap().path.len(), 5);
    assert_eq!(report.marks.len(), 5);
    assert_eq!(engine.metrics().marked_stale, 5);
}

#[test]
fn test_recompute_after_defeat_caps_dependents() {
    let ledger = chain_ledger();
    ledger.append(feedback_draft(c(1), "rebuttal")).unwrap();
    let mut engine = DefeaterEngine::default();
    engine.sweep(&ledger, &DetectionContext::at(t0())).unwrap();

    let value = engine.recompute_confidence(c(2)).unwrap();
    assert_eq!(value.as_deterministic(), Some(false));
}

#[test]
fn test_informational_defeater_never_raises_confidence() {
    let ledger = EvidenceLedger::new(MemoryStorage::new()).unwrap();
    ledger
        .append(claim_draft(
            ClaimPayload::new(c(1), "cache", "behavior", "entries expire"),
            0.7,
        ))
        .unwrap();
    ledger.append(feedback_draft(c(1), "new_information")).unwrap();
    ledger.append(feedback_draft(c(1), "coverage_gap")).unwrap();

    let mut engine = DefeaterEngine::default();
    let report = engine.sweep(&ledger, &DetectionContext::at(t0())).unwrap();
    assert_eq!(report.detected.len(), 2);

    let claim = engine.claim(&c(1)).unwrap();
    assert_eq!(claim.status, ClaimStatus::Active);
    let p = claim.confidence.point_value().unwrap();
    assert!(p <= 0.7);
    assert!((p - 0.63).abs() < 1e-12);
}

#[test]
fn test_even_cycle_cancels_and_discloses() {
    init_tracing();
    // 2 defeats the claim and 3; 3 defeats 2
    let ledger = defeat_graph(&[(2, &[1, 3]), (3, &[2])]);
    let mut engine = DefeaterEngine::default();
    let report = engine.sweep(&ledger, &DetectionContext::at(t0())).unwrap();

    assert_eq!(report.detected.len(), 2);
    assert_eq!(report.cancelled_cycles, 1);
    assert!(report.defeated.is_empty());
    for id in &report.detected {
        assert_eq!(engine.activity().status(id), Some(DefeatStatus::Cancelled));
        assert!(!engine.is_defeater_active(id).unwrap());
    }

    let claim = engine.claim(&c(1)).unwrap();
    assert_eq!(claim.status, ClaimStatus::Active);
    assert_eq!(claim.confidence.point_value(), Some(0.8));
    assert!(matches!(claim.ambiguity, Some(DefeatAmbiguity::MutuallyCancelled(_))));
}

#[test]
fn test_odd_cycle_surfaces_unverified_by_trace() {
    init_tracing();
    // 2 defeats the claim and 4; 3 defeats 2; 4 defeats 3
    let ledger = defeat_graph(&[(2, &[1, 4]), (3, &[2]), (4, &[3])]);
    let mut engine = DefeaterEngine::default();
    let report = engine.sweep(&ledger, &DetectionContext::at(t0())).unwrap();

    assert_eq!(report.odd_cycles, 1);
    assert_eq!(report.unverified, vec![c(1)]);

    let claim = engine.claim(&c(1)).unwrap();
    assert_eq!(claim.status, ClaimStatus::Active);
    assert_eq!(
        claim.confidence.absent_reason(),
        Some(AbsentReason::UnverifiedByTrace(TraceGap::DefeatCycleAmbiguous))
    );
    assert!(matches!(claim.ambiguity, Some(DefeatAmbiguity::CycleUnresolved(_))));

    let on_claim = engine.registry().for_claim(c(1)).next().unwrap().id.clone();
    assert!(matches!(
        engine.is_defeater_active(&on_claim),
        Err(DefeaterError::DefeatCycleAmbiguous { .. })
    ));

    // the gap is written to the ledger
    let snapshot = ledger.snapshot();
    let unverified = snapshot
        .by_kind(EvidenceKind::Verification)
        .filter_map(|e| DefeatEventPayload::from_value(&e.payload).ok())
        .filter(|p| p.verdict == Verdict::UnverifiedByTrace)
        .count();
    assert_eq!(unverified, 1);
}

#[test]
fn test_iteration_cap_marks_claim_unverified() {
    let ledger = EvidenceLedger::new(MemoryStorage::new()).unwrap();
    ledger
        .append(claim_draft(
            ClaimPayload::new(c(1), "router", "behavior", "routes are matched longest first"),
            0.8,
        ))
        .unwrap();

    let config = DefeaterConfig {
        max_fixpoint_iterations: 1,
        ..DefeaterConfig::default()
    };
    let mut engine = DefeaterEngine::new(config);
    engine.sync(&ledger.snapshot());

    let id = |tag: &str| DefeaterId::derive(&[tag]);
    let defeater = |tag: &str, target: DefeatTarget, attackers: &[&str]| {
        let mut d = Defeater::with_id(id(tag), DefeaterType::Rebutting, target, vec![], tag, t0());
        for attacker in attackers {
            d.add_defeated_by(id(attacker));
        }
        d
    };
    // b attacks a, c attacks b, a and x attack c
    engine.register(defeater("a", DefeatTarget::Claim(c(1)), &["b"]));
    engine.register(defeater("b", DefeatTarget::Defeater(id("a")), &["c"]));
    engine.register(defeater("c", DefeatTarget::Defeater(id("b")), &["a", "x"]));
    engine.register(defeater("x", DefeatTarget::Defeater(id("c")), &[]));

    let evaluation = engine.evaluate();
    assert_eq!(evaluation.unverified, vec![(c(1), TraceGap::DefeatFixpointExceeded)]);
    assert!(engine.activity().fixpoint_exceeded);
    assert!(matches!(
        engine.is_defeater_active(&id("a")),
        Err(DefeaterError::FixpointExceeded { iterations: 1 })
    ));
    assert_eq!(
        engine.claim(&c(1)).unwrap().confidence.absent_reason(),
        Some(AbsentReason::UnverifiedByTrace(TraceGap::DefeatFixpointExceeded))
    );

    // a second evaluation reports nothing new
    assert!(engine.evaluate().unverified.is_empty());
}

#[test]
fn test_resolving_the_only_defeater_reinstates() {
    init_tracing();
    let ledger = EvidenceLedger::new(MemoryStorage::new()).unwrap();
    let claim_entry = ledger
        .append(claim_draft(
            ClaimPayload::new(c(1), "auth::login", "behavior", "login rejects empty passwords"),
            0.85,
        ))
        .unwrap();
    ledger.append(feedback_draft(c(1), "rebuttal")).unwrap();

    let mut engine = DefeaterEngine::default();
    let report = engine.sweep(&ledger, &DetectionContext::at(t0())).unwrap();
    assert_eq!(engine.claim(&c(1)).unwrap().status, ClaimStatus::Defeated);
    let defeater = report.detected[0].clone();

    let resolution = engine
        .resolve_defeater(&ledger, &defeater, ResolutionAction::Revalidate)
        .unwrap();
    assert!(resolution.changed);
    assert_eq!(resolution.claim_id, Some(c(1)));
    assert_eq!(resolution.reinstated, vec![c(1)]);
    assert_eq!(resolution.recorded.len(), 2);

    let claim = engine.claim(&c(1)).unwrap();
    assert_eq!(claim.status, ClaimStatus::Active);
    assert_eq!(claim.confidence.point_value(), Some(0.85));

    let resolved = ledger.get(&resolution.recorded[0]).unwrap();
    assert_eq!(resolved.provenance.source, EVENT_SOURCE);
    assert!(resolved.references(&claim_entry));
    assert_eq!(resolved.related_by(Relation::Resolves).count(), 1);
    assert_eq!(engine.metrics().total_resolved(), 1);

    // resolving again is a no-op
    let again = engine
        .resolve_defeater(&ledger, &defeater, ResolutionAction::Accept)
        .unwrap();
    assert!(!again.changed);
    assert!(again.recorded.is_empty());
}

#[test]
fn test_second_sweep_is_idempotent() {
    let ledger = chain_ledger();
    ledger.append(feedback_draft(c(3), "rebuttal")).unwrap();
    let mut engine = DefeaterEngine::default();
    let context = DetectionContext::at(t0());

    let first = engine.sweep(&ledger, &context).unwrap();
    assert!(!first.recorded.is_empty());
    let entries = ledger.len();

    let second = engine.sweep(&ledger, &context).unwrap();
    assert!(second.detected.is_empty());
    assert!(second.defeated.is_empty());
    assert!(second.stale.is_empty());
    assert!(second.recorded.is_empty());
    assert_eq!(ledger.len(), entries);
    assert_eq!(engine.metrics().sweep_count, 2);
}

#[test]
fn test_restarted_engine_replays_to_same_state() {
    let ledger = chain_ledger();
    ledger.append(feedback_draft(c(2), "rebuttal")).unwrap();
    ledger.append(feedback_draft(c(8), "undercut")).unwrap();

    let mut first = DefeaterEngine::default();
    first.sweep(&ledger, &DetectionContext::at(t0())).unwrap();

    let entries = ledger.len();
    let mut second = DefeaterEngine::default();
    second.sync(&ledger.snapshot());
    // replay rebuilds state without writing
    assert_eq!(ledger.len(), entries);

    assert_eq!(second.registry().len(), first.registry().len());
    for n in 1..=10 {
        let a = first.claim(&c(n)).unwrap();
        let b = second.claim(&c(n)).unwrap();
        assert_eq!(a.status, b.status, "status of C{}", n);
        assert_eq!(a.confidence, b.confidence, "confidence of C{}", n);
    }
    assert_eq!(second.claim(&c(2)).unwrap().status, ClaimStatus::Defeated);
    assert_eq!(second.claim(&c(4)).unwrap().status, ClaimStatus::Stale);

    // nothing left to record after the replay
    let report = second.sweep(&ledger, &DetectionContext::at(t0())).unwrap();
    assert!(report.recorded.is_empty());
}

#[test]
fn test_events_can_be_switched_off() {
    let ledger = chain_ledger();
    ledger.append(feedback_draft(c(1), "rebuttal")).unwrap();
    let entries = ledger.len();

    let config = DefeaterConfig {
        record_events: false,
        ..DefeaterConfig::default()
    };
    let mut engine = DefeaterEngine::new(config);
    let report = engine.sweep(&ledger, &DetectionContext::at(t0())).unwrap();
    assert_eq!(report.defeated, vec![c(1)]);
    assert!(report.recorded.is_empty());
    assert_eq!(ledger.len(), entries);
}
