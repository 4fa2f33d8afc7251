//! Wire and durable-state types shared by every rowvault crate.
//!
//! Keeping a single definition of each type here means the serializer, the
//! object-store client, the verifier, and the restore engine all agree on
//! shape without needing to re-derive it from JSON at each boundary.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Canonical column type as reported by schema introspection and
/// recorded in [`MetadataRecord`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnType {
    Integer,
    Boolean,
    Text,
    Uuid,
    Decimal,
    Binary,
    TimestampTz,
    TimestampNaive,
    Json,
    Range,
    Composite,
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ColumnType::Integer => "integer",
            ColumnType::Boolean => "boolean",
            ColumnType::Text => "text",
            ColumnType::Uuid => "uuid",
            ColumnType::Decimal => "decimal",
            ColumnType::Binary => "binary",
            ColumnType::TimestampTz => "timestamptz",
            ColumnType::TimestampNaive => "timestamp",
            ColumnType::Json => "json",
            ColumnType::Range => "range",
            ColumnType::Composite => "composite",
        };
        f.write_str(s)
    }
}

/// A single column's description, as produced by introspection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnInfo {
    pub name: String,
    pub column_type: ColumnType,
    pub nullable: bool,
}

/// A single typed cell value, pre-encoding. The codec converts these
/// into their reserved JSON shapes; the restore engine inverts the mapping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RowValue {
    Null,
    Integer(i64),
    Boolean(bool),
    Text(String),
    Uuid(String),
    /// Preserves every digit exactly as returned by the driver.
    Decimal(String),
    Binary(Vec<u8>),
    /// Always normalized to UTC by the adapter before reaching the codec.
    Timestamp {
        value: DateTime<Utc>,
        /// Whether the source column itself carried a time zone.
        source_has_tz: bool,
    },
    Json(serde_json::Value),
    /// Range/composite types: emitted as a fixed-shape JSON object.
    Structured(serde_json::Value),
}

/// One fetched row: ordered column name -> value, in schema column order.
pub type Row = Vec<(String, RowValue)>;

/// Identifies a source table by (database, schema, table) plus the
/// configuration that governs its archival.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableTarget {
    pub database: String,
    pub schema: String,
    pub table: String,
    pub timestamp_column: String,
    pub primary_key_column: String,
    pub retention_days: u32,
    pub classification: String,
    pub critical: bool,
    pub batch_size: usize,
    #[serde(default)]
    pub schema_hash_at_last_run: Option<String>,
}

impl TableTarget {
    pub fn qualified_name(&self) -> String {
        format!("{}.{}.{}", self.database, self.schema, self.table)
    }
}

/// The exclusive upper bound for archivable rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CutoffTime(pub DateTime<Utc>);

impl CutoffTime {
    /// Only rows with `ts < cutoff` are eligible — never `<=`.
    pub fn row_is_eligible(&self, ts: DateTime<Utc>) -> bool {
        ts < self.0
    }
}

/// A `(timestamp, primary key)` cursor position; orders batches and rows.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Cursor {
    pub ts: DateTime<Utc>,
    pub pk: PrimaryKey,
}

/// A scalar primary-key value. The source table's PK is a single unique
/// column.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PrimaryKey {
    Integer(i64),
    Text(String),
    Uuid(String),
}

impl fmt::Display for PrimaryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PrimaryKey::Integer(v) => write!(f, "{v}"),
            PrimaryKey::Text(v) => write!(f, "{v}"),
            PrimaryKey::Uuid(v) => write!(f, "{v}"),
        }
    }
}

/// The inputs to one batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchPlan {
    pub database: String,
    pub schema: String,
    pub table: String,
    pub cutoff: CutoffTime,
    /// Exclusive lower bound; `None` on a table's first-ever batch.
    pub lower_bound: Option<Cursor>,
    pub limit: usize,
    pub batch_ordinal: u64,
    pub fingerprint: String,
    /// Record-level legal-hold predicates, ANDed into the batch select
    ///. Never included in the fingerprint: the same rows are still
    /// the same rows whether or not a hold happens to be active this run.
    #[serde(default)]
    pub extra_where_predicates: Vec<String>,
}

/// The uploaded representation of a batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchArtifact {
    pub object_key: String,
    pub uncompressed_len: u64,
    pub compressed_len: u64,
    pub uncompressed_sha256: String,
    pub compressed_sha256: String,
    pub record_count: u64,
    pub min_ts: DateTime<Utc>,
    pub max_ts: DateTime<Utc>,
    pub min_pk: PrimaryKey,
    pub max_pk: PrimaryKey,
}

/// Per-batch sidecar listing deleted primary keys.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeletionManifest {
    pub fingerprint: String,
    pub database: String,
    pub schema: String,
    pub table: String,
    pub delete_time: DateTime<Utc>,
    pub primary_keys: Vec<PrimaryKey>,
    pub primary_keys_sha256: String,
    pub delete_statement_digest: String,
    pub committed_row_count: u64,
}

/// Per-batch JSON sidecar describing the artifact and schema snapshot
///.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetadataRecord {
    pub schema_version: u32,
    pub database: String,
    pub schema: String,
    pub table: String,
    pub batch_ordinal: u64,
    pub fingerprint: String,
    pub archive_time: DateTime<Utc>,
    pub min_ts: DateTime<Utc>,
    pub max_ts: DateTime<Utc>,
    pub record_count: u64,
    pub uncompressed_len: u64,
    pub compressed_len: u64,
    pub uncompressed_sha256: String,
    pub compression_algorithm: String,
    pub compression_level: u32,
    pub columns: Vec<ColumnInfo>,
    pub primary_key_column: String,
    pub indexes: Vec<String>,
    pub source_server_version: String,
    pub archiver_version: String,
    pub deletion_manifest_path: String,
}

/// One committed batch's entry in a `TableManifest`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableManifestEntry {
    pub fingerprint: String,
    pub artifact: BatchArtifact,
}

/// Append-only index of committed batch fingerprints for one table
///. Updated by conditional write; see `rowvault-storage`. A fingerprint's
/// presence here means the batch's delete was committed to the source
/// database, not merely that it was uploaded.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TableManifest {
    pub entries: Vec<TableManifestEntry>,
}

impl TableManifest {
    pub fn contains(&self, fingerprint: &str) -> bool {
        self.entries.iter().any(|e| e.fingerprint == fingerprint)
    }

    pub fn get(&self, fingerprint: &str) -> Option<&BatchArtifact> {
        self.entries.iter().find(|e| e.fingerprint == fingerprint).map(|e| &e.artifact)
    }

    pub fn record(&mut self, fingerprint: String, artifact: BatchArtifact) {
        if !self.contains(&fingerprint) {
            self.entries.push(TableManifestEntry { fingerprint, artifact });
        }
    }
}

/// Durable `(timestamp, primary key)` progress cursor per (database, table)
///.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Watermark {
    pub last_ts: DateTime<Utc>,
    pub last_pk: PrimaryKey,
    pub cumulative_rows: u64,
    pub content_sha256: String,
}

impl Watermark {
    /// `(ts_new, pk_new) >= (ts_old, pk_old)`.
    pub fn is_monotonic_successor_of(&self, prior: &Watermark) -> bool {
        (self.last_ts, &self.last_pk) >= (prior.last_ts, &prior.last_pk)
    }
}

/// In-flight resume state persisted every N batches.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    pub database: String,
    pub schema: String,
    pub table: String,
    pub batch_ordinal: u64,
    pub watermark: Watermark,
    pub completed_fingerprints: Vec<String>,
    pub open_multipart_uploads: Vec<MultipartUploadState>,
    pub created_at: DateTime<Utc>,
}

/// One in-flight part of a multipart upload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadPart {
    pub part_number: u32,
    pub length: u64,
    pub etag: String,
}

/// Persisted before the first attempt of each part; cleared on completion
/// or explicit abort.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MultipartUploadState {
    pub upload_id: String,
    pub object_key: String,
    pub parts: Vec<UploadPart>,
}

/// Audit event kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditEventKind {
    ArchiveStart,
    ArchiveBatchSuccess,
    ArchiveSuccess,
    ArchiveFailure,
    SkipLegalHold,
    RestoreStart,
    RestoreSuccess,
    RestoreFailure,
    SampleAbsenceFailed,
    Error,
}

/// Immutable append-only audit record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    pub timestamp: DateTime<Utc>,
    pub actor: String,
    pub kind: AuditEventKind,
    pub database: String,
    pub schema: String,
    pub table: String,
    pub row_count: u64,
    pub duration_ms: u64,
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_summary: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, serde_json::Value>,
}

/// A legal hold narrowing or blocking archival of a table or row predicate
///.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LegalHold {
    pub database: String,
    pub schema: String,
    pub table: String,
    /// Optional SQL predicate narrowing the hold to specific rows.
    #[serde(default)]
    pub row_predicate: Option<String>,
    pub reason: String,
    pub start: DateTime<Utc>,
    pub expiry: DateTime<Utc>,
    pub requestor: String,
}

impl LegalHold {
    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        self.start <= now && now < self.expiry
    }
}

/// Durable restore progress per (database, schema, table). Tracks every
/// data object key already loaded so a rerun
/// skips them unless explicitly told to ignore this state; a plain
/// timestamp cursor would not be precise enough since restore objects are
/// selected by object key, not by a monotonic row cursor.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RestoreWatermark {
    pub restored_object_keys: Vec<String>,
    #[serde(default)]
    pub last_restored_at: Option<DateTime<Utc>>,
}

impl RestoreWatermark {
    pub fn has_restored(&self, object_key: &str) -> bool {
        self.restored_object_keys.iter().any(|k| k == object_key)
    }

    pub fn record(&mut self, object_key: String, at: DateTime<Utc>) {
        if !self.has_restored(&object_key) {
            self.restored_object_keys.push(object_key);
        }
        self.last_restored_at = Some(at);
    }
}

/// Per-database, per-table outcome, rolled up into the run summary
///.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableOutcome {
    pub database: String,
    pub schema: String,
    pub table: String,
    pub records_archived: u64,
    pub bytes_uploaded: u64,
    pub succeeded: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_class: Option<String>,
}

/// Run-wide summary emitted at the end of a run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunSummary {
    pub databases_processed: u32,
    pub databases_failed: u32,
    pub records_archived: u64,
    pub bytes_uploaded: u64,
    pub tables: Vec<TableOutcome>,
}

/// Failure report written alongside audit events on partial/total failure
///.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailureReport {
    pub generated_at: DateTime<Utc>,
    pub affected_tables: Vec<TableOutcome>,
    pub error_classes: Vec<String>,
    pub remediations: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn artifact(record_count: u64) -> BatchArtifact {
        BatchArtifact {
            object_key: "k".to_string(),
            uncompressed_len: 10,
            compressed_len: 5,
            uncompressed_sha256: "u".to_string(),
            compressed_sha256: "c".to_string(),
            record_count,
            min_ts: Utc::now(),
            max_ts: Utc::now(),
            min_pk: PrimaryKey::Integer(1),
            max_pk: PrimaryKey::Integer(2),
        }
    }

    #[test]
    fn manifest_record_then_contains_and_get() {
        let mut manifest = TableManifest::default();
        assert!(!manifest.contains("fp1"));
        manifest.record("fp1".to_string(), artifact(100));
        assert!(manifest.contains("fp1"));
        assert_eq!(manifest.get("fp1").unwrap().record_count, 100);
        assert!(manifest.get("fp2").is_none());
    }

    #[test]
    fn manifest_record_is_idempotent_per_fingerprint() {
        let mut manifest = TableManifest::default();
        manifest.record("fp1".to_string(), artifact(100));
        manifest.record("fp1".to_string(), artifact(999));
        assert_eq!(manifest.entries.len(), 1);
        assert_eq!(manifest.get("fp1").unwrap().record_count, 100);
    }
}
