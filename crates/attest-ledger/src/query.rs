//! Query filters over the ledger

use attest_domain::{EvidenceEntry, EvidenceId, EvidenceKind};
use chrono::{DateTime, Utc};

/// Result ordering
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum QueryOrder {
    /// Commit order (default)
    #[default]
    Insertion,
    /// Reverse commit order
    NewestFirst,
    /// Highest point confidence first; entries without one go last
    ConfidenceDesc,
}

/// Filter for [`crate::EvidenceLedger::query`]
///
/// Empty fields do not filter. `kinds` matches any listed kind.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EvidenceQuery {
    /// Only entries in this session
    pub session_id: Option<String>,

    /// Only entries of these kinds
    pub kinds: Vec<EvidenceKind>,

    /// Only entries whose confidence has a point value of at least this
    pub min_confidence: Option<f64>,

    /// Only entries that reference this id or are referenced by it
    pub related_to: Option<EvidenceId>,

    /// Only entries committed at or after this time
    pub since: Option<DateTime<Utc>>,

    /// Only entries committed before this time
    pub until: Option<DateTime<Utc>>,

    /// Result ordering
    pub order: QueryOrder,

    /// Maximum results to return
    pub limit: Option<usize>,
}

impl EvidenceQuery {
    /// Match everything
    pub fn new() -> Self {
        Self::default()
    }

    /// Restrict to a session
    pub fn session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    /// Restrict to a kind (may be called repeatedly)
    pub fn kind(mut self, kind: EvidenceKind) -> Self {
        self.kinds.push(kind);
        self
    }

    /// Require a minimum confidence
    pub fn min_confidence(mut self, min: f64) -> Self {
        self.min_confidence = Some(min);
        self
    }

    /// Restrict to entries linked with `id`
    pub fn related_to(mut self, id: EvidenceId) -> Self {
        self.related_to = Some(id);
        self
    }

    /// Restrict to a time window `[since, until)`
    pub fn between(mut self, since: DateTime<Utc>, until: DateTime<Utc>) -> Self {
        self.since = Some(since);
        self.until = Some(until);
        self
    }

    /// Set ordering
    pub fn order(mut self, order: QueryOrder) -> Self {
        self.order = order;
        self
    }

    /// Cap result count
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Entry-local checks (session, kinds, confidence, time window)
    ///
    /// `related_to` needs the rest of the ledger and is checked by the snapshot.
    pub fn matches(&self, entry: &EvidenceEntry) -> bool {
        if let Some(session) = &self.session_id {
            if entry.session_id.as_ref() != Some(session) {
                return false;
            }
        }
        if !self.kinds.is_empty() && !self.kinds.contains(&entry.kind) {
            return false;
        }
        if let Some(min) = self.min_confidence {
            let point = entry.confidence.as_ref().and_then(|c| c.point_value());
            if !point.is_some_and(|p| p >= min) {
                return false;
            }
        }
        if self.since.is_some_and(|since| entry.timestamp < since) {
            return false;
        }
        if self.until.is_some_and(|until| entry.timestamp >= until) {
            return false;
        }
        true
    }
}
