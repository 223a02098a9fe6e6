//! SQLite storage adapter
//!
//! # Examples
//!
//! ```no_run
//! use attest_ledger::{EvidenceLedger, SqliteStorage};
//!
//! let storage = SqliteStorage::new("attest.db").unwrap();
//! let ledger = EvidenceLedger::new(storage).unwrap();
//! ```

use attest_domain::{
    ConfidenceValue, EvidenceEntry, EvidenceId, EvidenceKind, EvidenceStorage, Provenance,
    RelatedEntry, StorageFilter,
};
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use thiserror::Error;

/// Errors that can occur in the SQLite adapter
#[derive(Error, Debug)]
pub enum StoreError {
    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// A stored row could not be decoded
    #[error("Invalid data: {0}")]
    InvalidData(String),

    /// JSON column could not be encoded or decoded
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// SQLite-backed evidence storage
///
/// Rows are keyed by evidence id and written with `INSERT OR IGNORE`, so a
/// replayed append never produces a second row.
///
/// # Thread Safety
///
/// SQLite connections are not thread-safe. The ledger wraps its storage in a
/// mutex, which is the only supported way to share one.
pub struct SqliteStorage {
    conn: Connection,
}

const SELECT_COLUMNS: &str =
    "SELECT id, sequence, timestamp, kind, payload, provenance, confidence, related, session_id FROM evidence";

/// Columns as stored, before decoding
struct RawRow {
    id: String,
    sequence: i64,
    timestamp: String,
    kind: String,
    payload: String,
    provenance: String,
    confidence: Option<String>,
    related: String,
    session_id: Option<String>,
}

impl RawRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            sequence: row.get(1)?,
            timestamp: row.get(2)?,
            kind: row.get(3)?,
            payload: row.get(4)?,
            provenance: row.get(5)?,
            confidence: row.get(6)?,
            related: row.get(7)?,
            session_id: row.get(8)?,
        })
    }

    fn decode(self) -> Result<EvidenceEntry, StoreError> {
        let id = EvidenceId::from_hex(&self.id).map_err(StoreError::InvalidData)?;
        let kind = EvidenceKind::parse(&self.kind)
            .ok_or_else(|| StoreError::InvalidData(format!("Unknown evidence kind: {}", self.kind)))?;
        let timestamp = DateTime::parse_from_rfc3339(&self.timestamp)
            .map_err(|e| StoreError::InvalidData(format!("Bad timestamp {}: {}", self.timestamp, e)))?
            .with_timezone(&Utc);
        let sequence = u64::try_from(self.sequence)
            .map_err(|_| StoreError::InvalidData(format!("Negative sequence: {}", self.sequence)))?;
        let confidence: Option<ConfidenceValue> = self
            .confidence
            .as_deref()
            .map(|c| serde_json::from_str(c))
            .transpose()?;
        let related: Vec<RelatedEntry> = serde_json::from_str(&self.related)?;
        let provenance: Provenance = serde_json::from_str(&self.provenance)?;

        Ok(EvidenceEntry {
            id,
            sequence,
            timestamp,
            kind,
            payload: serde_json::from_str(&self.payload)?,
            provenance,
            confidence,
            related_entries: related,
            session_id: self.session_id,
        })
    }
}

impl SqliteStorage {
    /// Open (or create) a database at `path`
    ///
    /// Use `:memory:` for a throwaway database.
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        let mut storage = Self { conn };
        storage.initialize_schema()?;
        Ok(storage)
    }

    fn initialize_schema(&mut self) -> Result<(), StoreError> {
        self.conn.execute_batch(include_str!("schema.sql"))?;
        Ok(())
    }

    /// Number of stored rows
    pub fn count(&self) -> Result<u64, StoreError> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM evidence", [], |row| row.get(0))?;
        Ok(count.max(0) as u64)
    }
}

impl EvidenceStorage for SqliteStorage {
    type Error = StoreError;

    fn append_raw(&mut self, entry: &EvidenceEntry) -> Result<EvidenceId, Self::Error> {
        let confidence = entry
            .confidence
            .as_ref()
            .map(|c| serde_json::to_string(c))
            .transpose()?;

        self.conn.execute(
            "INSERT OR IGNORE INTO evidence
             (id, sequence, timestamp, kind, payload, provenance, confidence, related, session_id)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                entry.id.as_str(),
                entry.sequence as i64,
                entry.timestamp.to_rfc3339_opts(SecondsFormat::Nanos, true),
                entry.kind.as_str(),
                serde_json::to_string(&entry.payload)?,
                serde_json::to_string(&entry.provenance)?,
                confidence,
                serde_json::to_string(&entry.related_entries)?,
                entry.session_id,
            ],
        )?;

        Ok(entry.id.clone())
    }

    fn read_range(&self, filter: &StorageFilter) -> Result<Vec<EvidenceEntry>, Self::Error> {
        let mut sql = format!("{} WHERE 1=1", SELECT_COLUMNS);
        let mut params: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if let Some(session) = &filter.session_id {
            sql.push_str(" AND session_id = ?");
            params.push(Box::new(session.clone()));
        }

        if let Some(kind) = filter.kind {
            sql.push_str(" AND kind = ?");
            params.push(Box::new(kind.as_str()));
        }

        if let Some(from) = filter.from_sequence {
            sql.push_str(" AND sequence >= ?");
            params.push(Box::new(from as i64));
        }

        sql.push_str(" ORDER BY sequence ASC");

        if let Some(limit) = filter.limit {
            sql.push_str(" LIMIT ?");
            params.push(Box::new(limit as i64));
        }

        let mut stmt = self.conn.prepare(&sql)?;
        let param_refs: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();

        let rows = stmt
            .query_map(&param_refs[..], RawRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter().map(RawRow::decode).collect()
    }

    fn read_by_id(&self, id: &EvidenceId) -> Result<Option<EvidenceEntry>, Self::Error> {
        let raw = self
            .conn
            .query_row(
                &format!("{} WHERE id = ?1", SELECT_COLUMNS),
                params![id.as_str()],
                RawRow::from_row,
            )
            .optional()?;

        raw.map(RawRow::decode).transpose()
    }
}
