//! Attest Evidence Ledger
//!
//! Append-only, content-addressed store of evidence entries over an injected
//! [`EvidenceStorage`](attest_domain::EvidenceStorage).
//!
//! # Guarantees
//!
//! - Drafts are shape-checked against their kind before anything is written
//! - Ids are blake3 hashes of canonical content, so appends are idempotent
//! - Sequence numbers are gap-free and relations only point backwards
//! - Readers work on immutable snapshots and never block the writer
//!
//! # Examples
//!
//! ```
//! use attest_domain::{EvidenceKind, NewEvidence, Provenance};
//! use attest_ledger::{EvidenceLedger, EvidenceQuery, MemoryStorage};
//! use serde_json::json;
//!
//! let ledger = EvidenceLedger::new(MemoryStorage::new()).unwrap();
//! let draft = NewEvidence::new(
//!     EvidenceKind::Retrieval,
//!     json!({"query": "who calls parse_config"}),
//!     Provenance::new("agent:explorer"),
//! );
//! let id = ledger.append(draft.clone()).unwrap();
//! assert_eq!(ledger.append(draft).unwrap(), id);
//! assert_eq!(ledger.query(&EvidenceQuery::new()).len(), 1);
//! ```

#![warn(missing_docs)]

mod audit;
mod chain;
mod config;
mod error;
mod ledger;
mod memory;
mod query;
mod snapshot;
mod sqlite;
mod validation;

pub use audit::{
    export_to_audit_format, AuditExport, AuditRecord, AuditRelation, AUDIT_FORMAT, AUDIT_VERSION,
};
pub use chain::{ChainCombiner, ChainLink, ChainNode, DefaultCombiner, Direction, EvidenceChain};
pub use config::{LedgerConfig, ValidationConfig};
pub use error::LedgerError;
pub use ledger::EvidenceLedger;
pub use memory::MemoryStorage;
pub use query::{EvidenceQuery, QueryOrder};
pub use snapshot::LedgerSnapshot;
pub use sqlite::{SqliteStorage, StoreError};
pub use validation::PayloadValidator;
