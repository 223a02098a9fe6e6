//! Scanning a ledger snapshot for defeaters
//!
//! Detection is a pure function of the snapshot, the claim board, the
//! registry and the context. Defeater ids are content hashes of type, target
//! and triggering evidence, so scanning the same snapshot twice yields the
//! same defeaters.

use crate::board::{ClaimBoard, DefeaterRegistry};
use crate::config::DefeaterConfig;
use attest_domain::payload::{ExtractionPayload, FeedbackPayload};
use attest_domain::proposition::{conflict, Conflict};
use attest_domain::{
    Claim, ClaimId, ClaimStatus, DefeatTarget, Defeater, DefeaterId, DefeaterType,
    EvidenceEntry, EvidenceId, EvidenceKind, Relation,
};
use attest_ledger::LedgerSnapshot;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap, HashSet};

/// What the scan compares the ledger against
#[derive(Debug, Clone)]
pub struct DetectionContext {
    /// "Now" for staleness and for `detected_at`
    pub timestamp: DateTime<Utc>,
    /// Current code hash per subject, overriding extraction entries
    pub current_hashes: HashMap<String, String>,
}

impl DetectionContext {
    /// Context at a fixed instant
    pub fn at(timestamp: DateTime<Utc>) -> Self {
        Self {
            timestamp,
            current_hashes: HashMap::new(),
        }
    }

    /// Context at the current time
    pub fn now() -> Self {
        Self::at(Utc::now())
    }

    /// Add the current hash of a subject
    pub fn with_hash(mut self, subject: impl Into<String>, hash: impl Into<String>) -> Self {
        self.current_hashes.insert(subject.into(), hash.into());
        self
    }
}

/// Map a feedback signal to a defeater type and whether it targets a defeater
fn signal_type(signal: &str) -> Option<(DefeaterType, bool)> {
    match signal {
        "defeater_rebutted" => Some((DefeaterType::Rebutting, true)),
        "defeater_undercut" => Some((DefeaterType::Undercutting, true)),
        "rebuttal" => Some((DefeaterType::Rebutting, false)),
        "undercut" => Some((DefeaterType::Undercutting, false)),
        "undermine" => Some((DefeaterType::Undermining, false)),
        other => DefeaterType::parse(other).map(|t| (t, false)),
    }
}

fn claim_evidence(claim: &Claim) -> Vec<EvidenceId> {
    claim.evidence.iter().cloned().collect()
}

/// Collects defeaters, merging attack links on repeated ids
#[derive(Default)]
struct Found {
    order: Vec<DefeaterId>,
    by_id: HashMap<DefeaterId, Defeater>,
}

impl Found {
    fn push(&mut self, defeater: Defeater) {
        match self.by_id.get_mut(&defeater.id) {
            Some(existing) => {
                for attacker in defeater.defeated_by {
                    existing.add_defeated_by(attacker);
                }
            }
            None => {
                self.order.push(defeater.id.clone());
                self.by_id.insert(defeater.id.clone(), defeater);
            }
        }
    }

    fn into_vec(mut self) -> Vec<Defeater> {
        self.order
            .iter()
            .filter_map(|id| self.by_id.remove(id))
            .collect()
    }
}

/// Scan `snapshot` for every defeater it currently supports
///
/// `board` must already hold the snapshot's claims. Meta-defeaters whose
/// target is neither detected here nor in `known` are dropped.
pub fn detect_defeaters(
    snapshot: &LedgerSnapshot,
    board: &ClaimBoard,
    known: &DefeaterRegistry,
    context: &DetectionContext,
    config: &DefeaterConfig,
) -> Vec<Defeater> {
    let mut found = Found::default();
    let now = context.timestamp;

    detect_staleness(board, now, config, &mut found);
    detect_hash_mismatch(snapshot, board, context, &mut found);
    detect_contradictions(board, now, &mut found);

    for entry in snapshot.entries() {
        match entry.kind {
            EvidenceKind::Verification => detect_test_failure(entry, board, now, &mut found),
            EvidenceKind::Feedback => detect_feedback(entry, board, now, &mut found),
            _ => {}
        }
    }

    detect_relation_defeats(snapshot, board, known, now, &mut found);

    let mut defeaters = found.into_vec();
    drop_orphaned_meta_defeaters(&mut defeaters, known);
    defeaters
}

fn detect_staleness(
    board: &ClaimBoard,
    now: DateTime<Utc>,
    config: &DefeaterConfig,
    found: &mut Found,
) {
    let max_age = config.max_claim_age();
    for claim in board.iter() {
        if claim.status == ClaimStatus::Superseded {
            continue;
        }
        let age = now - claim.created_at;
        if age > max_age {
            found.push(Defeater::new(
                DefeaterType::Staleness,
                DefeatTarget::Claim(claim.id),
                claim_evidence(claim),
                format!(
                    "claim is {} hours old, limit is {}",
                    age.num_hours(),
                    config.max_claim_age_hours
                ),
                now,
            ));
        }
    }
}

fn detect_hash_mismatch(
    snapshot: &LedgerSnapshot,
    board: &ClaimBoard,
    context: &DetectionContext,
    found: &mut Found,
) {
    // newest extraction per entity wins
    let mut extracted: HashMap<String, (String, EvidenceId)> = HashMap::new();
    for entry in snapshot.by_kind(EvidenceKind::Extraction) {
        if let Ok(payload) = ExtractionPayload::from_value(&entry.payload) {
            extracted.insert(payload.entity, (payload.content_hash, entry.id.clone()));
        }
    }

    for claim in board.iter() {
        let Some(recorded) = &claim.code_hash else {
            continue;
        };
        if claim.status == ClaimStatus::Superseded {
            continue;
        }
        let mut evidence = claim_evidence(claim);
        let current = match context.current_hashes.get(&claim.subject) {
            Some(hash) => hash.as_str(),
            None => match extracted.get(&claim.subject) {
                Some((hash, entry)) => {
                    evidence.push(entry.clone());
                    hash.as_str()
                }
                None => continue,
            },
        };
        if current != recorded {
            found.push(Defeater::new(
                DefeaterType::HashMismatch,
                DefeatTarget::Claim(claim.id),
                evidence,
                format!(
                    "code hash of {} changed from {} to {}",
                    claim.subject, recorded, current
                ),
                context.timestamp,
            ));
        }
    }
}

fn detect_contradictions(board: &ClaimBoard, now: DateTime<Utc>, found: &mut Found) {
    let mut topics: BTreeMap<(&str, &str), Vec<&Claim>> = BTreeMap::new();
    for claim in board.iter() {
        if claim.status == ClaimStatus::Superseded {
            continue;
        }
        topics
            .entry((claim.subject.as_str(), claim.claim_type.as_str()))
            .or_default()
            .push(claim);
    }

    for claims in topics.values() {
        for (i, older) in claims.iter().enumerate() {
            for newer in &claims[i + 1..] {
                let Some(kind) = conflict(&older.proposition, &newer.proposition) else {
                    continue;
                };
                let how = match kind {
                    Conflict::Negation => "negates".to_string(),
                    Conflict::ConflictingValue { left, right } => {
                        format!("asserts {} instead of {} in", right, left)
                    }
                };
                let mut evidence = claim_evidence(newer);
                evidence.extend(claim_evidence(older));
                found.push(Defeater::new(
                    DefeaterType::Contradiction,
                    DefeatTarget::Claim(older.id),
                    evidence,
                    format!("claim {} {} claim {}", newer.id, how, older.id),
                    now,
                ));
            }
        }
    }
}

fn detect_test_failure(
    entry: &EvidenceEntry,
    board: &ClaimBoard,
    now: DateTime<Utc>,
    found: &mut Found,
) {
    // defeat events carry a verdict and are replayed elsewhere
    if entry.payload.get("verdict").is_some() {
        return;
    }
    if entry.payload.get("verified").and_then(|v| v.as_bool()) != Some(false) {
        return;
    }
    let Some(claim_id) = entry.payload_claim_id() else {
        return;
    };
    if board.get(&claim_id).is_none() {
        return;
    }
    let description = entry
        .payload_str("detail")
        .map(String::from)
        .unwrap_or_else(|| format!("verification {} failed", entry.id.short()));
    found.push(Defeater::new(
        DefeaterType::TestFailure,
        DefeatTarget::Claim(claim_id),
        vec![entry.id.clone()],
        description,
        now,
    ));
}

fn detect_feedback(
    entry: &EvidenceEntry,
    board: &ClaimBoard,
    now: DateTime<Utc>,
    found: &mut Found,
) {
    let Ok(feedback) = FeedbackPayload::from_value(&entry.payload) else {
        return;
    };
    let Some((defeater_type, meta)) = signal_type(&feedback.signal) else {
        return;
    };
    let target = if meta {
        DefeatTarget::Defeater(DefeaterId::from_string(feedback.target.as_str()))
    } else {
        match ClaimId::from_string(&feedback.target) {
            Ok(id) if board.get(&id).is_some() => DefeatTarget::Claim(id),
            _ => return,
        }
    };
    let description = feedback
        .detail
        .unwrap_or_else(|| format!("feedback signal {}", feedback.signal));
    found.push(Defeater::new(
        defeater_type,
        target,
        vec![entry.id.clone()],
        description,
        now,
    ));
}

/// `defeats` relations between entries
///
/// Every entry with outgoing `defeats` relations raises one defeater. It
/// targets the first claim entry it defeats; failing that, the smallest
/// defeater raised by the first entry it defeats. It also attacks every
/// defeater raised by each non-claim entry it defeats.
fn detect_relation_defeats(
    snapshot: &LedgerSnapshot,
    board: &ClaimBoard,
    known: &DefeaterRegistry,
    now: DateTime<Utc>,
    found: &mut Found,
) {
    let attackers: Vec<&EvidenceEntry> = snapshot
        .entries()
        .filter(|e| e.related_by(Relation::Defeats).next().is_some())
        .collect();
    if attackers.is_empty() {
        return;
    }

    let relation_id = |entry: &EvidenceId| DefeaterId::derive(&["defeats", entry.as_str()]);

    // defeaters raised per entry, keyed by their primary evidence
    let mut raised: HashMap<EvidenceId, Vec<DefeaterId>> = HashMap::new();
    let existing = found
        .by_id
        .values()
        .chain(known.as_slice().iter());
    for defeater in existing {
        if let Some(primary) = defeater.evidence.first() {
            raised
                .entry(primary.clone())
                .or_default()
                .push(defeater.id.clone());
        }
    }
    for entry in &attackers {
        raised
            .entry(entry.id.clone())
            .or_default()
            .push(relation_id(&entry.id));
    }
    for ids in raised.values_mut() {
        ids.sort();
        ids.dedup();
    }

    let mut attacks: Vec<(DefeaterId, DefeaterId)> = Vec::new();
    for entry in attackers {
        let id = relation_id(&entry.id);
        let targets: Vec<&EvidenceId> = entry.related_by(Relation::Defeats).collect();

        let claim_target = targets.iter().find_map(|t| board.by_entry(t));
        let target = match claim_target {
            Some(claim) => DefeatTarget::Claim(claim),
            None => {
                let first = targets
                    .iter()
                    .find_map(|t| raised.get(*t).and_then(|ids| ids.iter().find(|d| **d != id)));
                match first {
                    Some(defeater) => DefeatTarget::Defeater(defeater.clone()),
                    None => continue,
                }
            }
        };

        for t in targets.iter().filter(|t| board.by_entry(t).is_none()) {
            for attacked in raised.get(*t).into_iter().flatten() {
                if *attacked != id {
                    attacks.push((attacked.clone(), id.clone()));
                }
            }
        }

        let defeater_type = entry
            .payload_str("defeater_type")
            .and_then(DefeaterType::parse)
            .unwrap_or(DefeaterType::Rebutting);
        let description = entry
            .payload_str("description")
            .map(String::from)
            .unwrap_or_else(|| {
                format!("{} entry {} defeats {}", entry.kind, entry.id.short(), target.key())
            });
        found.push(Defeater::with_id(
            id,
            defeater_type,
            target,
            vec![entry.id.clone()],
            description,
            now,
        ));
    }

    for (attacked, attacker) in attacks {
        if let Some(defeater) = found.by_id.get_mut(&attacked) {
            defeater.add_defeated_by(attacker);
        } else if let Some(defeater) = known.get(&attacked) {
            let mut defeater = defeater.clone();
            defeater.add_defeated_by(attacker);
            found.push(defeater);
        }
    }
}

/// Drop meta-defeaters whose target is unknown, repeating until stable
fn drop_orphaned_meta_defeaters(defeaters: &mut Vec<Defeater>, known: &DefeaterRegistry) {
    loop {
        let present: HashSet<DefeaterId> = defeaters.iter().map(|d| d.id.clone()).collect();
        let before = defeaters.len();
        defeaters.retain(|d| match d.target_defeater() {
            Some(target) => present.contains(target) || known.contains(target),
            None => true,
        });
        if defeaters.len() == before {
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use attest_domain::payload::ClaimPayload;
    use attest_domain::{ConfidenceValue, NewEvidence, Provenance};
    use attest_ledger::{EvidenceLedger, MemoryStorage};
    use chrono::{Duration, TimeZone};
    use serde_json::json;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    fn claim_draft(id: ClaimId, subject: &str, proposition: &str) -> NewEvidence {
        NewEvidence::new(
            EvidenceKind::Claim,
            ClaimPayload::new(id, subject, "behavior", proposition)
                .to_value()
                .unwrap(),
            Provenance::new("agent:reviewer"),
        )
        .with_confidence(ConfidenceValue::measured(0.8, "ds", 100, 0.7, 0.9))
        .at(t0())
    }

    fn board_of(ledger: &EvidenceLedger<MemoryStorage>) -> ClaimBoard {
        let mut board = ClaimBoard::new();
        for entry in ledger.snapshot().entries() {
            if let Some(claim) = Claim::from_entry(entry) {
                board.insert(claim);
            }
        }
        board
    }

    fn scan(ledger: &EvidenceLedger<MemoryStorage>, context: &DetectionContext) -> Vec<Defeater> {
        detect_defeaters(
            &ledger.snapshot(),
            &board_of(ledger),
            &DefeaterRegistry::new(),
            context,
            &DefeaterConfig::default(),
        )
    }

    #[test]
    fn test_staleness_after_window() {
        let ledger = EvidenceLedger::new(MemoryStorage::new()).unwrap();
        ledger
            .append(claim_draft(ClaimId::from_value(1), "cache::get", "get returns None on miss"))
            .unwrap();

        assert!(scan(&ledger, &DetectionContext::at(t0() + Duration::hours(10))).is_empty());

        let late = scan(&ledger, &DetectionContext::at(t0() + Duration::hours(721)));
        assert_eq!(late.len(), 1);
        assert_eq!(late[0].defeater_type, DefeaterType::Staleness);
    }

    #[test]
    fn test_hash_mismatch_from_context_and_extraction() {
        let ledger = EvidenceLedger::new(MemoryStorage::new()).unwrap();
        let id = ClaimId::from_value(1);
        let payload = ClaimPayload::new(id, "parse", "behavior", "parse rejects empty input")
            .with_code_hash("h1")
            .to_value()
            .unwrap();
        ledger
            .append(NewEvidence::new(EvidenceKind::Claim, payload, Provenance::new("agent")).at(t0()))
            .unwrap();

        let ctx = DetectionContext::at(t0());
        assert!(scan(&ledger, &ctx.clone().with_hash("parse", "h1")).is_empty());
        assert_eq!(scan(&ledger, &ctx.clone().with_hash("parse", "h2")).len(), 1);

        ledger
            .append(NewEvidence::new(
                EvidenceKind::Extraction,
                json!({"entity": "parse", "content_hash": "h3"}),
                Provenance::new("tool:indexer"),
            ))
            .unwrap();
        let found = scan(&ledger, &ctx);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].defeater_type, DefeaterType::HashMismatch);
        assert_eq!(found[0].evidence.len(), 2);
    }

    #[test]
    fn test_newer_conflicting_claim_defeats_older() {
        let ledger = EvidenceLedger::new(MemoryStorage::new()).unwrap();
        let older = ClaimId::from_value(1);
        ledger
            .append(claim_draft(older, "X", "function X returns A"))
            .unwrap();
        ledger
            .append(claim_draft(ClaimId::from_value(2), "X", "function X returns B"))
            .unwrap();
        ledger
            .append(claim_draft(ClaimId::from_value(3), "Y", "function Y returns C"))
            .unwrap();

        let found = scan(&ledger, &DetectionContext::at(t0()));
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].defeater_type, DefeaterType::Contradiction);
        assert_eq!(found[0].target_claim(), Some(older));
    }

    #[test]
    fn test_feedback_and_failed_verification() {
        let ledger = EvidenceLedger::new(MemoryStorage::new()).unwrap();
        let id = ClaimId::from_value(1);
        ledger.append(claim_draft(id, "io", "read retries on EINTR")).unwrap();
        ledger
            .append(NewEvidence::new(
                EvidenceKind::Feedback,
                json!({"target": id.to_string(), "signal": "provider_unavailable"}),
                Provenance::new("router"),
            ))
            .unwrap();
        ledger
            .append(NewEvidence::new(
                EvidenceKind::Verification,
                json!({"claim_id": id.to_string(), "verified": false, "detail": "test_read_eintr failed"}),
                Provenance::new("tool:pytest"),
            ))
            .unwrap();
        ledger
            .append(NewEvidence::new(
                EvidenceKind::Feedback,
                json!({"target": id.to_string(), "signal": "applause"}),
                Provenance::new("user"),
            ))
            .unwrap();

        let types: Vec<DefeaterType> = scan(&ledger, &DetectionContext::at(t0()))
            .iter()
            .map(|d| d.defeater_type)
            .collect();
        assert_eq!(
            types,
            vec![DefeaterType::ProviderUnavailable, DefeaterType::TestFailure]
        );
    }

    #[test]
    fn test_meta_feedback_needs_a_known_target() {
        let ledger = EvidenceLedger::new(MemoryStorage::new()).unwrap();
        ledger
            .append(NewEvidence::new(
                EvidenceKind::Feedback,
                json!({"target": DefeaterId::derive(&["nobody"]).to_string(), "signal": "defeater_rebutted"}),
                Provenance::new("user"),
            ))
            .unwrap();
        assert!(scan(&ledger, &DetectionContext::at(t0())).is_empty());
    }

    #[test]
    fn test_relation_defeats_target_claims_and_defeaters() {
        let ledger = EvidenceLedger::new(MemoryStorage::new()).unwrap();
        let id = ClaimId::from_value(1);
        let claim_entry = ledger.append(claim_draft(id, "auth", "login hashes passwords")).unwrap();
        let attack = ledger
            .append(
                NewEvidence::new(
                    EvidenceKind::Synthesis,
                    json!({"content": "login stores plaintext", "defeater_type": "undermining"}),
                    Provenance::new("llm:review"),
                )
                .related(claim_entry, Relation::Defeats),
            )
            .unwrap();
        ledger
            .append(
                NewEvidence::new(
                    EvidenceKind::Synthesis,
                    json!({"content": "the plaintext path is dead code"}),
                    Provenance::new("llm:review"),
                )
                .related(attack, Relation::Defeats),
            )
            .unwrap();

        let found = scan(&ledger, &DetectionContext::at(t0()));
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].defeater_type, DefeaterType::Undermining);
        assert_eq!(found[0].target_claim(), Some(id));
        assert_eq!(found[1].target_defeater(), Some(&found[0].id));
        assert_eq!(found[0].defeated_by, vec![found[1].id.clone()]);
    }

    #[test]
    fn test_detection_is_deterministic() {
        let ledger = EvidenceLedger::new(MemoryStorage::new()).unwrap();
        ledger
            .append(claim_draft(ClaimId::from_value(1), "X", "X is thread safe"))
            .unwrap();
        ledger
            .append(claim_draft(ClaimId::from_value(2), "X", "X is not thread safe"))
            .unwrap();
        let first = scan(&ledger, &DetectionContext::at(t0() + Duration::hours(800)));
        let second = scan(&ledger, &DetectionContext::at(t0() + Duration::hours(900)));
        let ids = |v: &[Defeater]| v.iter().map(|d| d.id.clone()).collect::<Vec<_>>();
        assert_eq!(ids(&first), ids(&second));
        assert_eq!(first.len(), 3);
    }
}
