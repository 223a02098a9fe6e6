//! Trait definitions for external interactions
//!
//! The ledger is written against [`EvidenceStorage`]; durability and
//! indexing strategy belong to the implementation.

use crate::evidence::{EvidenceEntry, EvidenceId, EvidenceKind};

/// Append-only persistence for evidence entries
///
/// Implemented by the infrastructure layer (`attest-ledger` ships an
/// in-memory and a SQLite implementation). Implementations must:
/// - be durable once `append_raw` returns
/// - ignore a second append of an id that is already stored
/// - return `read_range` results in sequence order
pub trait EvidenceStorage {
    /// Error type for storage operations
    type Error;

    /// Persist a committed entry, returning its id
    fn append_raw(&mut self, entry: &EvidenceEntry) -> Result<EvidenceId, Self::Error>;

    /// Entries matching a filter, in sequence order
    fn read_range(&self, filter: &StorageFilter) -> Result<Vec<EvidenceEntry>, Self::Error>;

    /// Entry by id
    fn read_by_id(&self, id: &EvidenceId) -> Result<Option<EvidenceEntry>, Self::Error>;
}

/// Range filter understood by every storage implementation
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StorageFilter {
    /// Only entries in this session
    pub session_id: Option<String>,

    /// Only entries of this kind
    pub kind: Option<EvidenceKind>,

    /// Only entries with `sequence >= from_sequence`
    pub from_sequence: Option<u64>,

    /// Maximum results to return
    pub limit: Option<usize>,
}

impl StorageFilter {
    /// Everything
    pub fn all() -> Self {
        Self::default()
    }

    /// Whether `entry` passes the filter (ignoring `limit`)
    pub fn matches(&self, entry: &EvidenceEntry) -> bool {
        if let Some(session) = &self.session_id {
            if entry.session_id.as_ref() != Some(session) {
                return false;
            }
        }
        if let Some(kind) = self.kind {
            if entry.kind != kind {
                return false;
            }
        }
        if let Some(from) = self.from_sequence {
            if entry.sequence < from {
                return false;
            }
        }
        true
    }
}
