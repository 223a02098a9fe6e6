//! Immutable point-in-time view of the ledger
//!
//! Readers hold an `Arc<LedgerSnapshot>`; the writer clones-on-write and
//! swaps the pointer, so a snapshot never changes after it is handed out.

use crate::query::{EvidenceQuery, QueryOrder};
use attest_domain::{EvidenceEntry, EvidenceId, EvidenceKind, Relation};
use std::collections::HashMap;
use std::sync::Arc;

/// Indexed view of every committed entry
#[derive(Debug, Clone, Default)]
pub struct LedgerSnapshot {
    entries: Vec<Arc<EvidenceEntry>>,
    by_id: HashMap<EvidenceId, usize>,
    incoming: HashMap<EvidenceId, Vec<(usize, Relation)>>,
    by_kind: HashMap<EvidenceKind, Vec<usize>>,
    by_session: HashMap<String, Vec<usize>>,
}

impl LedgerSnapshot {
    /// Empty snapshot
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of committed entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing has been committed
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Sequence number the next entry will receive
    pub fn next_sequence(&self) -> u64 {
        self.entries.last().map(|e| e.sequence + 1).unwrap_or(0)
    }

    /// Whether `id` is committed
    pub fn contains(&self, id: &EvidenceId) -> bool {
        self.by_id.contains_key(id)
    }

    /// Entry by id
    pub fn get(&self, id: &EvidenceId) -> Option<&EvidenceEntry> {
        self.by_id.get(id).map(|&i| self.entries[i].as_ref())
    }

    /// Every entry in sequence order
    pub fn entries(&self) -> impl Iterator<Item = &EvidenceEntry> {
        self.entries.iter().map(|e| e.as_ref())
    }

    /// Entries after `sequence` (exclusive), in order
    pub fn entries_after(&self, sequence: Option<u64>) -> impl Iterator<Item = &EvidenceEntry> {
        let start = match sequence {
            None => 0,
            Some(s) => self.entries.partition_point(|e| e.sequence <= s),
        };
        self.entries[start..].iter().map(|e| e.as_ref())
    }

    /// Entries of one kind, in sequence order
    pub fn by_kind(&self, kind: EvidenceKind) -> impl Iterator<Item = &EvidenceEntry> {
        self.by_kind
            .get(&kind)
            .into_iter()
            .flatten()
            .map(|&i| self.entries[i].as_ref())
    }

    /// Entries that relate to `id`, with the relation they use
    pub fn incoming(&self, id: &EvidenceId) -> impl Iterator<Item = (&EvidenceEntry, Relation)> {
        self.incoming
            .get(id)
            .into_iter()
            .flatten()
            .map(|&(i, relation)| (self.entries[i].as_ref(), relation))
    }

    /// Entries matching `query`
    pub fn query(&self, query: &EvidenceQuery) -> Vec<&EvidenceEntry> {
        let candidates: Box<dyn Iterator<Item = usize>> = match &query.session_id {
            Some(session) => Box::new(self.by_session.get(session).into_iter().flatten().copied()),
            None => Box::new(0..self.entries.len()),
        };

        let mut matches: Vec<&EvidenceEntry> = candidates
            .map(|i| self.entries[i].as_ref())
            .filter(|entry| query.matches(entry))
            .filter(|entry| match &query.related_to {
                Some(target) => self.is_related(entry, target),
                None => true,
            })
            .collect();

        match query.order {
            QueryOrder::Insertion => {}
            QueryOrder::NewestFirst => matches.reverse(),
            QueryOrder::ConfidenceDesc => {
                // stable sort keeps insertion order among equal confidences
                matches.sort_by(|a, b| {
                    let pa = a.confidence.as_ref().and_then(|c| c.point_value());
                    let pb = b.confidence.as_ref().and_then(|c| c.point_value());
                    pb.partial_cmp(&pa).unwrap_or(std::cmp::Ordering::Equal)
                });
            }
        }

        if let Some(limit) = query.limit {
            matches.truncate(limit);
        }
        matches
    }

    fn is_related(&self, entry: &EvidenceEntry, target: &EvidenceId) -> bool {
        entry.references(target)
            || self
                .get(target)
                .is_some_and(|t| t.references(&entry.id))
    }

    /// Add a committed entry (writer side only)
    pub(crate) fn insert(&mut self, entry: EvidenceEntry) {
        let index = self.entries.len();
        for related in &entry.related_entries {
            self.incoming
                .entry(related.target.clone())
                .or_default()
                .push((index, related.relation));
        }
        self.by_kind.entry(entry.kind).or_default().push(index);
        if let Some(session) = &entry.session_id {
            self.by_session.entry(session.clone()).or_default().push(index);
        }
        self.by_id.insert(entry.id.clone(), index);
        self.entries.push(Arc::new(entry));
    }
}
