//! Versioned audit export
//!
//! The record shape here is the only one downstream consumers may rely on.
//! Field names are camelCase and timestamps are RFC 3339 in UTC with
//! millisecond precision. Bump [`AUDIT_VERSION`] on any shape change.

use crate::LedgerError;
use attest_domain::{ConfidenceValue, EvidenceEntry, Provenance};
use chrono::SecondsFormat;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Format tag carried by every export
pub const AUDIT_FORMAT: &str = "attest.audit";

/// Current export version
pub const AUDIT_VERSION: u32 = 1;

/// One relation in an audit record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditRelation {
    /// Target entry id
    pub target_id: String,
    /// Relation name
    pub relation: String,
}

/// One exported entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditRecord {
    /// Entry id
    pub id: String,
    /// Ledger position
    pub sequence: u64,
    /// Commit time, RFC 3339
    pub timestamp: String,
    /// Evidence kind
    pub kind: String,
    /// Payload as committed
    pub payload: Value,
    /// Provenance as committed
    pub provenance: Provenance,
    /// Confidence, if the entry carried one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<ConfidenceValue>,
    /// Outgoing relations
    pub related_entries: Vec<AuditRelation>,
    /// Session, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

impl From<&EvidenceEntry> for AuditRecord {
    fn from(entry: &EvidenceEntry) -> Self {
        Self {
            id: entry.id.to_string(),
            sequence: entry.sequence,
            timestamp: entry.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true),
            kind: entry.kind.as_str().to_string(),
            payload: entry.payload.clone(),
            provenance: entry.provenance.clone(),
            confidence: entry.confidence.clone(),
            related_entries: entry
                .related_entries
                .iter()
                .map(|r| AuditRelation {
                    target_id: r.target.to_string(),
                    relation: r.relation.as_str().to_string(),
                })
                .collect(),
            session_id: entry.session_id.clone(),
        }
    }
}

/// A complete export
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditExport {
    /// Always [`AUDIT_FORMAT`]
    pub format: String,
    /// Shape version
    pub version: u32,
    /// Records in sequence order
    pub records: Vec<AuditRecord>,
}

impl AuditExport {
    /// Pretty-printed JSON document
    pub fn to_json(&self) -> Result<String, LedgerError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// One compact record per line, no envelope
    pub fn to_json_lines(&self) -> Result<String, LedgerError> {
        let mut out = String::new();
        for record in &self.records {
            out.push_str(&serde_json::to_string(record)?);
            out.push('\n');
        }
        Ok(out)
    }

    /// Parse a JSON document, rejecting unknown formats and newer versions
    pub fn from_json(json: &str) -> Result<Self, LedgerError> {
        let export: AuditExport = serde_json::from_str(json)?;
        if export.format != AUDIT_FORMAT {
            return Err(LedgerError::Serialization(format!(
                "Unknown audit format: {}",
                export.format
            )));
        }
        if export.version > AUDIT_VERSION {
            return Err(LedgerError::Serialization(format!(
                "Unsupported audit version: {}",
                export.version
            )));
        }
        Ok(export)
    }
}

/// Export entries in the versioned audit shape
pub fn export_to_audit_format(entries: &[EvidenceEntry]) -> AuditExport {
    AuditExport {
        format: AUDIT_FORMAT.to_string(),
        version: AUDIT_VERSION,
        records: entries.iter().map(AuditRecord::from).collect(),
    }
}
