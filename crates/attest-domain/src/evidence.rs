//! Evidence entries - the unit of record in the ledger
//!
//! An [`EvidenceEntry`] is committed once and never changes. Its id is a
//! content hash over everything except the timestamp, so replaying the same
//! draft yields the same id.

use crate::canonical::{content_hash, is_digest, EVIDENCE_DOMAIN};
use crate::claim::ClaimId;
use crate::confidence::ConfidenceValue;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;

/// Content-addressed identifier of an evidence entry (hex blake3)
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EvidenceId(String);

impl EvidenceId {
    /// Parse an id from its hex form
    pub fn from_hex(s: &str) -> Result<Self, String> {
        if is_digest(s) {
            Ok(Self(s.to_string()))
        } else {
            Err(format!("Invalid evidence id: {}", s))
        }
    }

    /// Full hex form
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First twelve hex characters, for logs
    pub fn short(&self) -> &str {
        &self.0[..self.0.len().min(12)]
    }

    pub(crate) fn from_digest(digest: String) -> Self {
        Self(digest)
    }
}

impl fmt::Display for EvidenceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Kind of evidence, which fixes the payload shape
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvidenceKind {
    /// Facts pulled from source artifacts
    Extraction,
    /// A retrieval query and its results
    Retrieval,
    /// Content synthesized from other entries
    Synthesis,
    /// A claim about a subject
    Claim,
    /// A check of a claim (test run, review, defeat event)
    Verification,
    /// A detected or resolved contradiction
    Contradiction,
    /// A signal from a user or system about a target
    Feedback,
    /// Observed outcome for a prediction, used for calibration
    Outcome,
    /// A tool invocation
    ToolCall,
    /// An agent episode boundary
    Episode,
    /// A published calibration snapshot
    Calibration,
}

impl EvidenceKind {
    /// Every kind, in declaration order
    pub const ALL: [EvidenceKind; 11] = [
        EvidenceKind::Extraction,
        EvidenceKind::Retrieval,
        EvidenceKind::Synthesis,
        EvidenceKind::Claim,
        EvidenceKind::Verification,
        EvidenceKind::Contradiction,
        EvidenceKind::Feedback,
        EvidenceKind::Outcome,
        EvidenceKind::ToolCall,
        EvidenceKind::Episode,
        EvidenceKind::Calibration,
    ];

    /// Wire name
    pub fn as_str(&self) -> &'static str {
        match self {
            EvidenceKind::Extraction => "extraction",
            EvidenceKind::Retrieval => "retrieval",
            EvidenceKind::Synthesis => "synthesis",
            EvidenceKind::Claim => "claim",
            EvidenceKind::Verification => "verification",
            EvidenceKind::Contradiction => "contradiction",
            EvidenceKind::Feedback => "feedback",
            EvidenceKind::Outcome => "outcome",
            EvidenceKind::ToolCall => "tool_call",
            EvidenceKind::Episode => "episode",
            EvidenceKind::Calibration => "calibration",
        }
    }

    /// Parse a kind from its wire name
    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.as_str() == s)
    }
}

impl fmt::Display for EvidenceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for EvidenceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| format!("Invalid evidence kind: {}", s))
    }
}

/// Who or what produced an entry
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Provenance {
    /// Source identifier (e.g. "agent:reviewer", "tool:pytest", "user:ops")
    pub source: String,

    /// Agent that acted, when different from the source
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<String>,

    /// How the evidence was obtained
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
}

impl Provenance {
    /// Provenance with only a source
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            agent_id: None,
            method: None,
        }
    }

    /// Attach the acting agent
    pub fn with_agent(mut self, agent_id: impl Into<String>) -> Self {
        self.agent_id = Some(agent_id.into());
        self
    }

    /// Attach the method used
    pub fn with_method(mut self, method: impl Into<String>) -> Self {
        self.method = Some(method.into());
        self
    }
}

/// Typed relation from one entry to another
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Relation {
    /// This entry was derived from the target
    DerivedFrom,
    /// This entry supports the target
    Supports,
    /// This entry contradicts the target
    Contradicts,
    /// This entry defeats the target
    Defeats,
    /// This entry's claim depends on the target's claim
    DependsOn,
    /// This entry's claim assumes the target's claim
    Assumes,
    /// This entry resolves the target (a defeater or contradiction record)
    Resolves,
    /// This entry replaces the target
    Supersedes,
    /// Plain reference
    References,
}

impl Relation {
    /// Wire name
    pub fn as_str(&self) -> &'static str {
        match self {
            Relation::DerivedFrom => "derived_from",
            Relation::Supports => "supports",
            Relation::Contradicts => "contradicts",
            Relation::Defeats => "defeats",
            Relation::DependsOn => "depends_on",
            Relation::Assumes => "assumes",
            Relation::Resolves => "resolves",
            Relation::Supersedes => "supersedes",
            Relation::References => "references",
        }
    }

    /// Parse from the wire name
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "derived_from" => Some(Relation::DerivedFrom),
            "supports" => Some(Relation::Supports),
            "contradicts" => Some(Relation::Contradicts),
            "defeats" => Some(Relation::Defeats),
            "depends_on" => Some(Relation::DependsOn),
            "assumes" => Some(Relation::Assumes),
            "resolves" => Some(Relation::Resolves),
            "supersedes" => Some(Relation::Supersedes),
            "references" => Some(Relation::References),
            _ => None,
        }
    }

    /// Whether a claim linked by this relation is a dependency of the source
    pub fn is_dependency(&self) -> bool {
        matches!(self, Relation::DependsOn | Relation::Assumes)
    }
}

impl fmt::Display for Relation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An outgoing relation of an entry
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RelatedEntry {
    /// Entry the relation points at
    pub target: EvidenceId,
    /// Kind of relation
    pub relation: Relation,
}

/// An evidence draft, before the ledger assigns id, sequence and timestamp
#[derive(Debug, Clone, PartialEq)]
pub struct NewEvidence {
    /// Kind of evidence
    pub kind: EvidenceKind,
    /// Kind-specific JSON payload
    pub payload: Value,
    /// Who produced it
    pub provenance: Provenance,
    /// Optional confidence attached to the evidence
    pub confidence: Option<ConfidenceValue>,
    /// Outgoing relations
    pub related_entries: Vec<RelatedEntry>,
    /// Session the evidence belongs to
    pub session_id: Option<String>,
    /// Explicit timestamp (defaults to commit time)
    pub timestamp: Option<DateTime<Utc>>,
}

impl NewEvidence {
    /// Start a draft
    pub fn new(kind: EvidenceKind, payload: Value, provenance: Provenance) -> Self {
        Self {
            kind,
            payload,
            provenance,
            confidence: None,
            related_entries: Vec::new(),
            session_id: None,
            timestamp: None,
        }
    }

    /// Attach a confidence
    pub fn with_confidence(mut self, confidence: ConfidenceValue) -> Self {
        self.confidence = Some(confidence);
        self
    }

    /// Add an outgoing relation
    pub fn related(mut self, target: EvidenceId, relation: Relation) -> Self {
        self.related_entries.push(RelatedEntry { target, relation });
        self
    }

    /// Place the draft in a session
    pub fn in_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    /// Pin the timestamp
    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// Content-addressed id this draft will commit under
    pub fn compute_id(&self) -> Result<EvidenceId, serde_json::Error> {
        compute_evidence_id(
            self.kind,
            &self.payload,
            &self.provenance,
            self.confidence.as_ref(),
            &self.related_entries,
            self.session_id.as_deref(),
        )
    }
}

/// Hash the identity-bearing fields of an entry
pub fn compute_evidence_id(
    kind: EvidenceKind,
    payload: &Value,
    provenance: &Provenance,
    confidence: Option<&ConfidenceValue>,
    related_entries: &[RelatedEntry],
    session_id: Option<&str>,
) -> Result<EvidenceId, serde_json::Error> {
    let identity = json!({
        "kind": kind,
        "payload": payload,
        "provenance": serde_json::to_value(provenance)?,
        "confidence": serde_json::to_value(confidence)?,
        "related_entries": serde_json::to_value(related_entries)?,
        "session_id": session_id,
    });
    Ok(EvidenceId::from_digest(content_hash(
        EVIDENCE_DOMAIN,
        &identity,
    )))
}

/// A committed, immutable evidence entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvidenceEntry {
    /// Content hash
    pub id: EvidenceId,
    /// Position in the ledger (0-based, gap-free)
    pub sequence: u64,
    /// Commit time
    pub timestamp: DateTime<Utc>,
    /// Kind of evidence
    pub kind: EvidenceKind,
    /// Kind-specific payload
    pub payload: Value,
    /// Who produced it
    pub provenance: Provenance,
    /// Optional confidence
    pub confidence: Option<ConfidenceValue>,
    /// Outgoing relations
    pub related_entries: Vec<RelatedEntry>,
    /// Session, if any
    pub session_id: Option<String>,
}

impl EvidenceEntry {
    /// Recompute the id from content and compare
    pub fn verify_id(&self) -> Result<bool, serde_json::Error> {
        let expected = compute_evidence_id(
            self.kind,
            &self.payload,
            &self.provenance,
            self.confidence.as_ref(),
            &self.related_entries,
            self.session_id.as_deref(),
        )?;
        Ok(expected == self.id)
    }

    /// Targets of outgoing relations of one type
    pub fn related_by(&self, relation: Relation) -> impl Iterator<Item = &EvidenceId> {
        self.related_entries
            .iter()
            .filter(move |r| r.relation == relation)
            .map(|r| &r.target)
    }

    /// Whether any outgoing relation points at `id`
    pub fn references(&self, id: &EvidenceId) -> bool {
        self.related_entries.iter().any(|r| &r.target == id)
    }

    /// String field of the payload
    pub fn payload_str(&self, field: &str) -> Option<&str> {
        self.payload.get(field).and_then(Value::as_str)
    }

    /// `claim_id` field of the payload, parsed
    pub fn payload_claim_id(&self) -> Option<ClaimId> {
        self.payload_str("claim_id")
            .and_then(|s| ClaimId::from_string(s).ok())
    }
}
