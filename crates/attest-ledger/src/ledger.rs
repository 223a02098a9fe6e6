//! The append-only evidence ledger

use crate::audit::{export_to_audit_format, AuditExport};
use crate::chain::{traverse, ChainCombiner, DefaultCombiner, EvidenceChain};
use crate::query::EvidenceQuery;
use crate::snapshot::LedgerSnapshot;
use crate::validation::PayloadValidator;
use crate::{LedgerConfig, LedgerError};
use attest_domain::{EvidenceEntry, EvidenceId, EvidenceStorage, NewEvidence, StorageFilter};
use chrono::Utc;
use std::fmt::Display;
use std::sync::{Arc, Mutex, RwLock};
use tracing::{debug, info};

/// Append-only evidence ledger over an injected storage backend
///
/// One writer at a time: `append` holds the storage lock for the whole
/// validate, hash, persist and publish sequence, so sequence numbers are
/// gap-free and relations only ever point at committed entries. Readers
/// work on an [`Arc<LedgerSnapshot>`] and never wait on the writer beyond
/// the pointer swap.
pub struct EvidenceLedger<S> {
    storage: Mutex<S>,
    state: RwLock<Arc<LedgerSnapshot>>,
    validator: PayloadValidator,
    config: LedgerConfig,
}

impl<S> EvidenceLedger<S>
where
    S: EvidenceStorage,
    S::Error: Display,
{
    /// Open a ledger with the default configuration
    pub fn new(storage: S) -> Result<Self, LedgerError> {
        Self::open(storage, LedgerConfig::default())
    }

    /// Open a ledger, rebuilding the index from whatever the storage holds
    ///
    /// Stored relations are not re-checked on replay.
    pub fn open(storage: S, config: LedgerConfig) -> Result<Self, LedgerError> {
        let entries = storage
            .read_range(&StorageFilter::all())
            .map_err(|e| LedgerError::Storage(e.to_string()))?;

        let mut snapshot = LedgerSnapshot::new();
        for entry in entries {
            if snapshot.contains(&entry.id) {
                continue;
            }
            snapshot.insert(entry);
        }
        info!("Opened evidence ledger with {} entries", snapshot.len());

        Ok(Self {
            storage: Mutex::new(storage),
            state: RwLock::new(Arc::new(snapshot)),
            validator: PayloadValidator::new(config.validation.clone()),
            config,
        })
    }

    /// Configuration in effect
    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    /// Validate, hash and commit a draft
    ///
    /// Appending a draft whose content is already committed returns the
    /// existing id and writes nothing.
    pub fn append(&self, draft: NewEvidence) -> Result<EvidenceId, LedgerError> {
        let mut storage = self
            .storage
            .lock()
            .map_err(|_| LedgerError::Storage("storage lock poisoned".to_string()))?;

        self.validator.validate(&draft)?;
        let id = draft.compute_id()?;

        let current = self.snapshot();
        if current.contains(&id) {
            debug!(id = %id.short(), "Evidence already committed");
            return Ok(id);
        }

        if self.config.enforce_committed_relations {
            if let Some(missing) = draft
                .related_entries
                .iter()
                .find(|r| !current.contains(&r.target))
            {
                return Err(LedgerError::DanglingRelation {
                    target: missing.target.clone(),
                });
            }
        }

        let entry = EvidenceEntry {
            id: id.clone(),
            sequence: current.next_sequence(),
            timestamp: draft.timestamp.unwrap_or_else(Utc::now),
            kind: draft.kind,
            payload: draft.payload,
            provenance: draft.provenance,
            confidence: draft.confidence,
            related_entries: draft.related_entries,
            session_id: draft.session_id,
        };
        drop(current);

        storage
            .append_raw(&entry)
            .map_err(|e| LedgerError::Storage(e.to_string()))?;

        let sequence = entry.sequence;
        let kind = entry.kind;
        {
            let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
            Arc::make_mut(&mut state).insert(entry);
        }
        debug!(id = %id.short(), sequence, kind = %kind, "Appended evidence");

        Ok(id)
    }

    /// Current point-in-time view
    pub fn snapshot(&self) -> Arc<LedgerSnapshot> {
        let state = self.state.read().unwrap_or_else(|e| e.into_inner());
        Arc::clone(&state)
    }

    /// Entry by id
    pub fn get(&self, id: &EvidenceId) -> Option<EvidenceEntry> {
        self.snapshot().get(id).cloned()
    }

    /// Entries matching `query`
    pub fn query(&self, query: &EvidenceQuery) -> Vec<EvidenceEntry> {
        self.snapshot().query(query).into_iter().cloned().collect()
    }

    /// Number of committed entries
    pub fn len(&self) -> usize {
        self.snapshot().len()
    }

    /// Whether nothing has been committed
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Walk the support/derivation graph from `id` with the default combiner
    pub fn get_chain(&self, id: &EvidenceId, max_depth: usize) -> Result<EvidenceChain, LedgerError> {
        self.get_chain_with(id, max_depth, &DefaultCombiner)
    }

    /// [`Self::get_chain`] to the configured `default_chain_depth`
    pub fn get_chain_default(&self, id: &EvidenceId) -> Result<EvidenceChain, LedgerError> {
        self.get_chain(id, self.config.default_chain_depth)
    }

    /// Walk the support/derivation graph from `id` with a custom combiner
    pub fn get_chain_with(
        &self,
        id: &EvidenceId,
        max_depth: usize,
        combiner: &dyn ChainCombiner,
    ) -> Result<EvidenceChain, LedgerError> {
        traverse(&self.snapshot(), id, max_depth, combiner)
    }

    /// Recompute every id from content; the first mismatch is an error
    pub fn verify_integrity(&self) -> Result<usize, LedgerError> {
        let snapshot = self.snapshot();
        for entry in snapshot.entries() {
            if !entry.verify_id()? {
                return Err(LedgerError::Integrity {
                    id: entry.id.clone(),
                    sequence: entry.sequence,
                });
            }
        }
        Ok(snapshot.len())
    }

    /// Audit export of every entry matching `query`
    pub fn export_audit(&self, query: &EvidenceQuery) -> AuditExport {
        let snapshot = self.snapshot();
        let entries: Vec<EvidenceEntry> = snapshot.query(query).into_iter().cloned().collect();
        export_to_audit_format(&entries)
    }

    /// Run `f` against the underlying storage
    pub fn with_storage<R>(&self, f: impl FnOnce(&S) -> R) -> Result<R, LedgerError> {
        let storage = self
            .storage
            .lock()
            .map_err(|_| LedgerError::Storage("storage lock poisoned".to_string()))?;
        Ok(f(&storage))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemoryStorage;
    use attest_domain::{EvidenceKind, Provenance};
    use serde_json::json;

    fn extraction(entity: &str) -> NewEvidence {
        NewEvidence::new(
            EvidenceKind::Extraction,
            json!({"entity": entity, "content_hash": "h1"}),
            Provenance::new("tool:indexer"),
        )
    }

    #[test]
    fn test_sequences_are_gap_free() {
        let ledger = EvidenceLedger::new(MemoryStorage::new()).unwrap();
        ledger.append(extraction("a")).unwrap();
        ledger.append(extraction("a")).unwrap();
        ledger.append(extraction("b")).unwrap();

        let sequences: Vec<u64> = ledger.snapshot().entries().map(|e| e.sequence).collect();
        assert_eq!(sequences, vec![0, 1]);
    }

    #[test]
    fn test_storage_sees_one_row_per_id() {
        let ledger = EvidenceLedger::new(MemoryStorage::new()).unwrap();
        let first = ledger.append(extraction("a")).unwrap();
        let second = ledger.append(extraction("a")).unwrap();
        assert_eq!(first, second);
        assert_eq!(ledger.with_storage(|s| s.len()).unwrap(), 1);
    }

    #[test]
    fn test_lenient_config_allows_forward_references() {
        let ledger = EvidenceLedger::open(MemoryStorage::new(), LedgerConfig::lenient()).unwrap();
        let ghost = extraction("ghost").compute_id().unwrap();
        let draft = extraction("a").related(ghost, attest_domain::Relation::Supports);
        assert!(ledger.append(draft).is_ok());
    }
}
