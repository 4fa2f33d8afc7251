//! Batch pipeline: the eight-step contract of one batch, driven
//! by [`BatchPipeline::run_one_batch`]. A single instance is strictly
//! single-threaded and the sole writer of its transaction, MultipartUpload
//! state, and watermark update for the duration of one batch.

use crate::error::PipelineError;
use crate::state::PipelineState;
use chrono::Utc;
use rowvault_core::codec::{serialize_batch, ReservedFields};
use rowvault_core::fingerprint::batch_fingerprint;
use rowvault_core::model::{
    BatchArtifact, BatchPlan, Cursor, CutoffTime, MetadataRecord, PrimaryKey, TableManifest, TableTarget, Watermark,
};
use rowvault_core::object_key::{data_object_key, deletion_manifest_object_key, metadata_object_key, table_manifest_object_key};
use rowvault_db::{DbError, TableHandle};
use rowvault_storage::{ObjectStoreClient, PutOptions};
use rowvault_verify::{assert_sets_equal, build_deletion_manifest, sorted_primary_keys_sha256, ThreeWayCount};
use metrics::{counter, histogram};
use std::time::{Duration, Instant};

/// Everything one batch needs that does not change within a table's run.
pub struct BatchContext<'a> {
    pub handle: &'a TableHandle<'a>,
    pub storage: &'a ObjectStoreClient,
    pub object_prefix: &'a str,
    pub compression_level: u32,
    pub statement_timeout: Duration,
    pub source_server_version: String,
    pub extra_where_predicates: Vec<String>,
}

/// Result of one successful (possibly idempotent-skip) batch.
pub struct BatchOutcome {
    pub state: PipelineState,
    pub idempotent_skip: bool,
    pub records: u64,
    pub uncompressed_bytes: u64,
    pub compressed_bytes: u64,
    pub fetch_duration: Duration,
    pub avg_row_bytes: u64,
    pub new_watermark: Option<Watermark>,
    /// The fingerprint this batch committed (or, on a skip, already held).
    /// `None` only for the empty-fetch `Drained` outcome.
    pub fingerprint: Option<String>,
    /// Primary keys deleted this batch, for post-commit sample verification.
    /// Empty on a skip or on `Drained` — nothing was deleted in this run.
    pub primary_keys: Vec<PrimaryKey>,
}

pub struct BatchPipeline;

impl BatchPipeline {
    /// Runs one batch through Planning → Advancing. Returns
    /// `Ok` with `idempotent_skip = true` when the fingerprint was already
    /// committed (re-running with the same inputs does no work).
    pub async fn run_one_batch(
        ctx: &BatchContext<'_>,
        target: &TableTarget,
        cutoff: CutoffTime,
        lower_bound: Option<Cursor>,
        batch_ordinal: u64,
        limit: usize,
        cumulative_rows_before: u64,
    ) -> Result<BatchOutcome, PipelineError> {
        // 1. Planning
        let fingerprint = batch_fingerprint(&target.database, &target.schema, &target.table, cutoff, lower_bound.clone(), batch_ordinal);
        let manifest_key = table_manifest_object_key(ctx.object_prefix, &target.database, &target.schema, &target.table);
        let manifest: TableManifest = match ctx.storage.get(&manifest_key).await {
            Ok(bytes) => serde_json::from_slice(&bytes).unwrap_or_default(),
            Err(_) => TableManifest::default(),
        };

        if manifest.contains(&fingerprint) {
            let artifact = manifest
                .get(&fingerprint)
                .ok_or_else(|| PipelineError::ManifestCorrupt { fingerprint: fingerprint.clone() })?;
            tracing::info!(%fingerprint, batch_ordinal, "fingerprint already committed, idempotent skip");
            let new_watermark = watermark_from_artifact(artifact, cumulative_rows_before);
            return Ok(BatchOutcome {
                state: PipelineState::Idle,
                idempotent_skip: true,
                records: 0,
                uncompressed_bytes: 0,
                compressed_bytes: 0,
                fetch_duration: Duration::ZERO,
                avg_row_bytes: 0,
                new_watermark: Some(new_watermark),
                fingerprint: Some(fingerprint),
                primary_keys: Vec::new(),
            });
        }

        let plan = BatchPlan {
            database: target.database.clone(),
            schema: target.schema.clone(),
            table: target.table.clone(),
            cutoff,
            lower_bound: lower_bound.clone(),
            limit,
            batch_ordinal,
            fingerprint: fingerprint.clone(),
            extra_where_predicates: ctx.extra_where_predicates.clone(),
        };

        // 2. Fetching
        let mut tx = ctx.handle.begin_batch_transaction(ctx.statement_timeout).await.map_err(PipelineError::from)?;
        let n_db = ctx.handle.count_eligible(&mut tx, &plan).await.map_err(PipelineError::from)?;

        let fetch_started = Instant::now();
        let rows = ctx.handle.fetch_batch(&mut tx, &plan).await.map_err(PipelineError::from)?;
        let fetch_duration = fetch_started.elapsed();

        if rows.is_empty() {
            tx.rollback().await.map_err(DbError::from).map_err(PipelineError::from)?;
            return Ok(BatchOutcome {
                state: PipelineState::Drained,
                idempotent_skip: false,
                records: 0,
                uncompressed_bytes: 0,
                compressed_bytes: 0,
                fetch_duration,
                avg_row_bytes: 0,
                new_watermark: None,
                fingerprint: None,
                primary_keys: Vec::new(),
            });
        }

        let primary_keys: Vec<PrimaryKey> = rows
            .iter()
            .filter_map(|row| ctx.handle.primary_key_of(row))
            .collect();

        // 3. Serializing
        let archive_time = Utc::now();
        let reserved = ReservedFields {
            archive_timestamp: archive_time,
            batch_fingerprint: &fingerprint,
            source_database: &target.database,
            source_table: &target.table,
        };
        let serialized = serialize_batch(&rows, &reserved, ctx.compression_level).map_err(PipelineError::Codec)?;
        let avg_row_bytes = if serialized.record_count > 0 {
            serialized.uncompressed_len / serialized.record_count
        } else {
            0
        };

        let (min_ts, max_ts) = ts_bounds(ctx.handle, &rows);
        let (min_pk, max_pk) = pk_bounds(&primary_keys);

        // 4. Uploading
        let data_key = data_object_key(ctx.object_prefix, &target.database, &target.schema, &target.table, archive_time, batch_ordinal);
        let metadata_key = metadata_object_key(ctx.object_prefix, &target.database, &target.schema, &target.table, archive_time, batch_ordinal);
        let deletion_manifest_key =
            deletion_manifest_object_key(ctx.object_prefix, &target.database, &target.schema, &target.table, archive_time, batch_ordinal);

        ctx.storage.put(&data_key, serialized.compressed_bytes.clone(), &PutOptions::default()).await?;

        let normalized_delete_sql = format!(
            "DELETE FROM {}.{} WHERE {} IN (...)",
            target.schema, target.table, target.primary_key_column
        );
        let deletion_manifest = build_deletion_manifest(
            &fingerprint,
            &target.database,
            &target.schema,
            &target.table,
            &primary_keys,
            &normalized_delete_sql,
            n_db,
        );
        let manifest_bytes = serde_json::to_vec_pretty(&deletion_manifest).map_err(anyhow::Error::from)?;
        ctx.storage.put(&deletion_manifest_key, manifest_bytes, &PutOptions::default()).await?;

        let metadata = MetadataRecord {
            schema_version: 1,
            database: target.database.clone(),
            schema: target.schema.clone(),
            table: target.table.clone(),
            batch_ordinal,
            fingerprint: fingerprint.clone(),
            archive_time,
            min_ts,
            max_ts,
            record_count: serialized.record_count,
            uncompressed_len: serialized.uncompressed_len,
            compressed_len: serialized.compressed_len,
            uncompressed_sha256: serialized.uncompressed_sha256.clone(),
            compression_algorithm: "gzip".to_string(),
            compression_level: ctx.compression_level,
            columns: ctx.handle.schema.columns.clone(),
            primary_key_column: target.primary_key_column.clone(),
            indexes: ctx.handle.schema.indexes.clone(),
            source_server_version: ctx.source_server_version.clone(),
            archiver_version: rowvault_core::ARCHIVER_VERSION.to_string(),
            deletion_manifest_path: deletion_manifest_key.clone(),
        };
        let metadata_bytes = serde_json::to_vec_pretty(&metadata).map_err(anyhow::Error::from)?;
        ctx.storage.put(&metadata_key, metadata_bytes, &PutOptions::default()).await?;

        // 5. Verifying
        let head = ctx.storage.head(&data_key).await?.ok_or_else(|| {
            PipelineError::Verify(rowvault_verify::VerifyError::ChecksumMismatch {
                expected: serialized.compressed_sha256.clone(),
                actual: "object missing after upload".to_string(),
            })
        })?;
        if head.size != serialized.compressed_len {
            return Err(PipelineError::Verify(rowvault_verify::VerifyError::ChecksumMismatch {
                expected: serialized.compressed_len.to_string(),
                actual: head.size.to_string(),
            }));
        }

        let counts = ThreeWayCount { n_db, n_stream: serialized.record_count, n_object: serialized.record_count };
        counts.assert_consistent()?;

        // The object is gzip-compressed at rest; decompress once to recompute
        // the uncompressed digest exactly as stored, rather than trusting the
        // in-memory value it was built from.
        let decompressed = rowvault_core::codec::decompress(&serialized.compressed_bytes).map_err(PipelineError::Codec)?;
        rowvault_verify::verify_checksum(&serialized.uncompressed_sha256, &decompressed)?;

        let object_primary_keys = extract_primary_keys(&decompressed, &target.primary_key_column, ctx.handle);
        assert_sets_equal(&primary_keys, &object_primary_keys)?;
        let (_, sanity_sha256) = sorted_primary_keys_sha256(&primary_keys);
        debug_assert_eq!(sanity_sha256, deletion_manifest.primary_keys_sha256);

        // 6. Deleting
        let affected = ctx.handle.delete_batch(&mut tx, &primary_keys).await.map_err(PipelineError::from)?;
        if affected != n_db {
            tx.rollback().await.map_err(DbError::from).map_err(PipelineError::from)?;
            return Err(PipelineError::Db(DbError::UnexpectedRowCount {
                expected: n_db as i64,
                actual: affected as i64,
            }));
        }

        // 7. Committing
        tx.commit().await.map_err(DbError::from).map_err(PipelineError::from)?;

        // 8. Advancing. The manifest is only marked as committed now that the
        // source delete is durable: its presence is the crash-recovery signal
        // that this batch's rows are gone, so it must never be written before
        // the commit it attests to.
        let artifact = BatchArtifact {
            object_key: data_key.clone(),
            uncompressed_len: serialized.uncompressed_len,
            compressed_len: serialized.compressed_len,
            uncompressed_sha256: serialized.uncompressed_sha256.clone(),
            compressed_sha256: serialized.compressed_sha256.clone(),
            record_count: serialized.record_count,
            min_ts,
            max_ts,
            min_pk,
            max_pk: max_pk.clone(),
        };
        ctx.storage
            .read_modify_write(
                &manifest_key,
                TableManifest::default,
                |current: &mut TableManifest| current.record(fingerprint.clone(), artifact.clone()),
                5,
            )
            .await?;

        let new_watermark = Watermark {
            last_ts: max_ts,
            last_pk: max_pk.clone(),
            cumulative_rows: cumulative_rows_before + affected,
            content_sha256: String::new(),
        };

        counter!("rowvault.batch.records", serialized.record_count, "table" => target.table.clone());
        counter!("rowvault.batch.bytes_uploaded", serialized.compressed_len, "table" => target.table.clone());
        histogram!("rowvault.batch.fetch_duration_ms", fetch_duration.as_secs_f64() * 1000.0);

        Ok(BatchOutcome {
            state: PipelineState::Idle,
            idempotent_skip: false,
            records: serialized.record_count,
            uncompressed_bytes: serialized.uncompressed_len,
            compressed_bytes: serialized.compressed_len,
            fetch_duration,
            avg_row_bytes,
            new_watermark: Some(new_watermark),
            fingerprint: Some(fingerprint),
            primary_keys,
        })
    }
}

fn ts_bounds(handle: &TableHandle<'_>, rows: &[rowvault_core::model::Row]) -> (chrono::DateTime<Utc>, chrono::DateTime<Utc>) {
    let ts_column = &handle.target.timestamp_column;
    let mut min = None;
    let mut max = None;
    for row in rows {
        if let Some((_, rowvault_core::model::RowValue::Timestamp { value, .. })) = row.iter().find(|(name, _)| name == ts_column) {
            min = Some(min.map_or(*value, |m: chrono::DateTime<Utc>| m.min(*value)));
            max = Some(max.map_or(*value, |m: chrono::DateTime<Utc>| m.max(*value)));
        }
    }
    let now = Utc::now();
    (min.unwrap_or(now), max.unwrap_or(now))
}

/// Re-reads the primary key out of each serialized record, independent of
/// the in-memory rows used to build the delete set.
fn extract_primary_keys(decompressed: &[u8], pk_column: &str, handle: &TableHandle<'_>) -> Vec<PrimaryKey> {
    let pk_type = handle
        .schema
        .columns
        .iter()
        .find(|c| c.name == pk_column)
        .map(|c| c.column_type)
        .unwrap_or(rowvault_core::model::ColumnType::Text);

    String::from_utf8_lossy(decompressed)
        .lines()
        .filter_map(|line| serde_json::from_str::<serde_json::Value>(line).ok())
        .filter_map(|record| {
            record.get(pk_column).map(|value| {
                let decoded = rowvault_core::codec::decode_value(value, pk_type);
                match decoded {
                    rowvault_core::model::RowValue::Integer(v) => PrimaryKey::Integer(v),
                    rowvault_core::model::RowValue::Uuid(v) => PrimaryKey::Uuid(v),
                    other => PrimaryKey::Text(other_to_string(&other)),
                }
            })
        })
        .collect()
}

fn other_to_string(value: &rowvault_core::model::RowValue) -> String {
    match value {
        rowvault_core::model::RowValue::Text(v) | rowvault_core::model::RowValue::Decimal(v) => v.clone(),
        rowvault_core::model::RowValue::Integer(v) => v.to_string(),
        _ => String::new(),
    }
}

fn pk_bounds(primary_keys: &[PrimaryKey]) -> (PrimaryKey, PrimaryKey) {
    let mut sorted = primary_keys.to_vec();
    sorted.sort();
    let min = sorted.first().cloned().unwrap_or(PrimaryKey::Integer(0));
    let max = sorted.last().cloned().unwrap_or(PrimaryKey::Integer(0));
    (min, max)
}

/// Reconstructs the watermark a skipped batch would have produced, from the
/// `BatchArtifact` recorded for its fingerprint on the run that actually
/// committed it.
fn watermark_from_artifact(artifact: &rowvault_core::model::BatchArtifact, cumulative_rows_before: u64) -> Watermark {
    Watermark {
        last_ts: artifact.max_ts,
        last_pk: artifact.max_pk.clone(),
        cumulative_rows: cumulative_rows_before + artifact.record_count,
        content_sha256: String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_artifact(record_count: u64, max_pk: i64) -> BatchArtifact {
        BatchArtifact {
            object_key: "archive/data/db1/public/t/2026/01/01/0000.ndjson.gz".to_string(),
            uncompressed_len: 1024,
            compressed_len: 256,
            uncompressed_sha256: "uncompressed".to_string(),
            compressed_sha256: "compressed".to_string(),
            record_count,
            min_ts: Utc::now(),
            max_ts: Utc::now(),
            min_pk: PrimaryKey::Integer(1),
            max_pk: PrimaryKey::Integer(max_pk),
        }
    }

    #[test]
    fn watermark_from_artifact_advances_cumulative_rows() {
        let artifact = sample_artifact(500, 999);
        let watermark = watermark_from_artifact(&artifact, 1_000);
        assert_eq!(watermark.cumulative_rows, 1_500);
        assert_eq!(watermark.last_pk, PrimaryKey::Integer(999));
        assert_eq!(watermark.last_ts, artifact.max_ts);
    }

    #[test]
    fn watermark_from_artifact_from_zero_matches_record_count() {
        let artifact = sample_artifact(42, 100);
        let watermark = watermark_from_artifact(&artifact, 0);
        assert_eq!(watermark.cumulative_rows, 42);
    }

    #[test]
    fn pk_bounds_sorts_and_picks_extremes() {
        let keys = vec![PrimaryKey::Integer(5), PrimaryKey::Integer(1), PrimaryKey::Integer(3)];
        let (min, max) = pk_bounds(&keys);
        assert_eq!(min, PrimaryKey::Integer(1));
        assert_eq!(max, PrimaryKey::Integer(5));
    }

    #[test]
    fn pk_bounds_empty_falls_back_to_zero() {
        let (min, max) = pk_bounds(&[]);
        assert_eq!(min, PrimaryKey::Integer(0));
        assert_eq!(max, PrimaryKey::Integer(0));
    }
}
