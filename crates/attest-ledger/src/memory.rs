//! In-memory storage

use attest_domain::{EvidenceEntry, EvidenceId, EvidenceStorage, StorageFilter};
use std::collections::HashMap;
use std::convert::Infallible;

/// Arena of entries plus an id index; nothing survives the process
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    entries: Vec<EvidenceEntry>,
    index: HashMap<EvidenceId, usize>,
}

impl MemoryStorage {
    /// Empty storage
    pub fn new() -> Self {
        Self::default()
    }

    /// Storage pre-filled with entries built outside a ledger
    ///
    /// Entries are kept in sequence order and duplicate ids are dropped.
    /// Relations are not checked, which is how tests build cyclic graphs.
    pub fn with_entries(entries: Vec<EvidenceEntry>) -> Self {
        let mut storage = Self::new();
        let mut entries = entries;
        entries.sort_by_key(|e| e.sequence);
        for entry in entries {
            storage.insert(entry);
        }
        storage
    }

    /// Number of stored entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing is stored
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn insert(&mut self, entry: EvidenceEntry) {
        if self.index.contains_key(&entry.id) {
            return;
        }
        self.index.insert(entry.id.clone(), self.entries.len());
        self.entries.push(entry);
    }
}

impl EvidenceStorage for MemoryStorage {
    type Error = Infallible;

    fn append_raw(&mut self, entry: &EvidenceEntry) -> Result<EvidenceId, Self::Error> {
        self.insert(entry.clone());
        Ok(entry.id.clone())
    }

    fn read_range(&self, filter: &StorageFilter) -> Result<Vec<EvidenceEntry>, Self::Error> {
        let matches = self.entries.iter().filter(|e| filter.matches(e)).cloned();
        Ok(match filter.limit {
            Some(limit) => matches.take(limit).collect(),
            None => matches.collect(),
        })
    }

    fn read_by_id(&self, id: &EvidenceId) -> Result<Option<EvidenceEntry>, Self::Error> {
        Ok(self.index.get(id).map(|&i| self.entries[i].clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use attest_domain::{EvidenceKind, NewEvidence, Provenance};
    use chrono::Utc;
    use serde_json::json;

    fn entry(n: u64, session: Option<&str>) -> EvidenceEntry {
        let mut draft = NewEvidence::new(
            EvidenceKind::ToolCall,
            json!({"tool": format!("t{}", n)}),
            Provenance::new("agent"),
        );
        draft.session_id = session.map(String::from);
        EvidenceEntry {
            id: draft.compute_id().unwrap(),
            sequence: n,
            timestamp: Utc::now(),
            kind: draft.kind,
            payload: draft.payload,
            provenance: draft.provenance,
            confidence: None,
            related_entries: vec![],
            session_id: draft.session_id,
        }
    }

    #[test]
    fn test_append_is_idempotent() {
        let mut storage = MemoryStorage::new();
        let e = entry(0, None);
        storage.append_raw(&e).unwrap();
        storage.append_raw(&e).unwrap();
        assert_eq!(storage.len(), 1);
        assert_eq!(storage.read_by_id(&e.id).unwrap(), Some(e));
    }

    #[test]
    fn test_read_range_filters() {
        let storage = MemoryStorage::with_entries(vec![
            entry(2, Some("b")),
            entry(0, Some("a")),
            entry(1, Some("a")),
        ]);

        let all = storage.read_range(&StorageFilter::all()).unwrap();
        assert_eq!(all.iter().map(|e| e.sequence).collect::<Vec<_>>(), vec![0, 1, 2]);

        let filter = StorageFilter {
            session_id: Some("a".to_string()),
            from_sequence: Some(1),
            ..StorageFilter::default()
        };
        let some = storage.read_range(&filter).unwrap();
        assert_eq!(some.len(), 1);
        assert_eq!(some[0].sequence, 1);
    }
}
