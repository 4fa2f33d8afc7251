//! Table orchestrator: drives one table to completion — acquires
//! the table lock, computes the cutoff, loops [`BatchPipeline::run_one_batch`]
//! with the retry policy and adaptive sizing, checkpoints periodically, runs
//! vacuum after the last batch, and releases the lock on every exit path.

use crate::audit::AuditLogger;
use crate::batch::{BatchContext, BatchPipeline};
use crate::error::PipelineError;
use crate::metrics;
use crate::sizing::{AdaptiveBatchSizer, SizingConfig};
use crate::state::PipelineState;
use chrono::Utc;
use rowvault_compliance::{ComplianceGate, GateDecision};
use rowvault_core::model::{AuditEventKind, Checkpoint, Cursor, TableOutcome, TableTarget};
use rowvault_db::{compute_cutoff, TableHandle, VacuumStrategy};
use rowvault_lock::LockManager;
use rowvault_state::{CheckpointStore, WatermarkStore};
use rowvault_storage::ObjectStoreClient;
use rowvault_verify::{check_sample_absent, choose_sample};
use sqlx::PgPool;
use std::time::{Duration, Instant};

struct RetryClassifier;

impl rowvault_core::retry::RetryClassifier<PipelineError> for RetryClassifier {
    fn is_transient(&self, error: &PipelineError) -> bool {
        error.is_retryable()
    }
}

pub struct TableOrchestratorConfig {
    pub sizing: SizingConfig,
    pub max_batches_per_table: Option<u64>,
    pub vacuum_strategy: VacuumStrategy,
    pub vacuum_timeout: Duration,
    pub backoff: rowvault_core::retry::BackoffPolicy,
    pub batch_timeout: Duration,
    pub statement_timeout: Duration,
    pub clock_skew_threshold_ms: i64,
    pub compression_level: u32,
    pub object_prefix: String,
    pub source_server_version: String,
    pub actor: String,
}

pub struct TableOrchestrator<'a> {
    pub pool: &'a PgPool,
    pub storage: &'a ObjectStoreClient,
    pub lock_manager: &'a LockManager,
    pub compliance_gate: &'a ComplianceGate,
    pub config: &'a TableOrchestratorConfig,
}

impl<'a> TableOrchestrator<'a> {
    /// Runs `target` from its current watermark through to drained or a
    /// `TableError`. Never returns a `BatchErrorTransient`/`Permanent` by
    /// itself: those are retried or promoted internally.
    pub async fn run_table(&self, target: &TableTarget, schema: &rowvault_db::TableSchema) -> Result<TableOutcome, PipelineError> {
        let watermark_store = WatermarkStore::new(self.storage, self.config.object_prefix.clone());
        let checkpoint_store = CheckpointStore::new(self.storage, self.config.object_prefix.clone());
        let audit = AuditLogger::new(self.storage, self.config.object_prefix.clone(), self.config.actor.clone());

        let run_started = Instant::now();
        audit
            .record(AuditEventKind::ArchiveStart, &target.database, &target.schema, &target.table, 0, 0, "started", None, Default::default())
            .await;

        let outcome = self.run_table_inner(target, schema, &watermark_store, &checkpoint_store, &audit).await;

        match &outcome {
            Ok(table_outcome) => {
                audit
                    .record(
                        AuditEventKind::ArchiveSuccess,
                        &target.database,
                        &target.schema,
                        &target.table,
                        table_outcome.records_archived,
                        run_started.elapsed().as_millis() as u64,
                        "success",
                        None,
                        Default::default(),
                    )
                    .await;
            }
            Err(error) => {
                audit
                    .record(
                        AuditEventKind::ArchiveFailure,
                        &target.database,
                        &target.schema,
                        &target.table,
                        0,
                        run_started.elapsed().as_millis() as u64,
                        "failed",
                        Some(error.to_string()),
                        Default::default(),
                    )
                    .await;
            }
        }

        outcome
    }

    async fn run_table_inner(
        &self,
        target: &TableTarget,
        schema: &rowvault_db::TableSchema,
        watermark_store: &WatermarkStore<'_>,
        checkpoint_store: &CheckpointStore<'_>,
        audit: &AuditLogger<'_>,
    ) -> Result<TableOutcome, PipelineError> {
        let decision = self.compliance_gate.evaluate(target).await?;
        let extra_where_predicates = match decision {
            GateDecision::Admit { extra_where_predicates } => extra_where_predicates,
            GateDecision::SkipLegalHold { reason } => {
                audit
                    .record(
                        AuditEventKind::SkipLegalHold,
                        &target.database,
                        &target.schema,
                        &target.table,
                        0,
                        0,
                        "skipped",
                        Some(reason.clone()),
                        Default::default(),
                    )
                    .await;
                return Ok(TableOutcome {
                    database: target.database.clone(),
                    schema: target.schema.clone(),
                    table: target.table.clone(),
                    records_archived: 0,
                    bytes_uploaded: 0,
                    succeeded: true,
                    error_class: None,
                });
            }
        };

        let table_lock = self
            .lock_manager
            .acquire_table_lock(&target.database, &target.schema, &target.table)
            .await
            .map_err(PipelineError::from)?;

        let run_result = self
            .drive_batches(target, schema, watermark_store, checkpoint_store, audit, &extra_where_predicates, &table_lock)
            .await;

        let release_result = table_lock.release().await;
        match run_result {
            Ok(outcome) => release_result.map(|()| outcome).map_err(PipelineError::from),
            Err(error) => {
                if let Err(release_error) = release_result {
                    tracing::warn!(error = %release_error, "failed to release table lock after an earlier batch error");
                }
                Err(error)
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn drive_batches(
        &self,
        target: &TableTarget,
        schema: &rowvault_db::TableSchema,
        watermark_store: &WatermarkStore<'_>,
        checkpoint_store: &CheckpointStore<'_>,
        audit: &AuditLogger<'_>,
        extra_where_predicates: &[String],
        table_lock: &rowvault_lock::LockGuard,
    ) -> Result<TableOutcome, PipelineError> {
        let cutoff = compute_cutoff(self.pool, target.retention_days as i64, self.config.clock_skew_threshold_ms)
            .await
            .map_err(PipelineError::from)?;

        let handle = TableHandle { pool: self.pool, target, schema };

        let existing_watermark = watermark_store
            .load(&target.database, &target.schema, &target.table)
            .await
            .map_err(PipelineError::from)?;
        let mut lower_bound = existing_watermark.as_ref().map(|w| Cursor { ts: w.last_ts, pk: w.last_pk.clone() });
        let mut cumulative_rows = existing_watermark.as_ref().map(|w| w.cumulative_rows).unwrap_or(0);

        let checkpoint = checkpoint_store
            .load(&target.database, &target.schema, &target.table)
            .await
            .map_err(PipelineError::from)?;
        let mut batch_ordinal = checkpoint.as_ref().map(|c| c.batch_ordinal + 1).unwrap_or(0);

        let mut sizer = AdaptiveBatchSizer::new(self.config.sizing.clone(), target.batch_size);
        let mut records_archived = 0u64;
        let mut bytes_uploaded = 0u64;
        let mut batches_run = 0u64;
        let mut batches_since_checkpoint = 0u64;
        let mut completed_fingerprints: Vec<String> = Vec::new();

        loop {
            if table_lock.is_lost() {
                return Err(PipelineError::LockLost);
            }
            if let Some(max) = self.config.max_batches_per_table {
                if batches_run >= max {
                    break;
                }
            }

            let ctx = BatchContext {
                handle: &handle,
                storage: self.storage,
                object_prefix: &self.config.object_prefix,
                compression_level: self.config.compression_level,
                statement_timeout: self.config.statement_timeout,
                source_server_version: self.config.source_server_version.clone(),
                extra_where_predicates: extra_where_predicates.to_vec(),
            };

            metrics::batch_started(&target.database, &target.table);
            let classifier = RetryClassifier;
            let lb = lower_bound.clone();
            let ordinal = batch_ordinal;
            let cumulative = cumulative_rows;
            let limit = sizer.current_size();
            let outcome = rowvault_core::retry::retry_async(self.config.backoff, &classifier, |attempt| {
                if attempt > 0 {
                    metrics::batch_retried(&target.database, &target.table, attempt);
                }
                let ctx = &ctx;
                let target = target;
                let lb = lb.clone();
                async move {
                    let run = BatchPipeline::run_one_batch(ctx, target, cutoff, lb, ordinal, limit, cumulative);
                    match tokio::time::timeout(self.config.batch_timeout, run).await {
                        Ok(result) => result,
                        Err(_elapsed) => Err(PipelineError::BatchTimeout),
                    }
                }
            })
            .await;

            let outcome = match outcome {
                Ok(outcome) => outcome,
                Err(error) => {
                    metrics::batch_failed(&target.database, &target.table, &format!("{:?}", error.severity()));
                    return Err(error);
                }
            };

            if outcome.state == PipelineState::Drained {
                metrics::table_drained(&target.database, &target.table, batches_run);
                break;
            }

            // The watermark advances whenever a batch — real or skipped —
            // resolved to a known committed state; only the metrics and
            // per-run counters are conditioned on this run having done work.
            if let Some(new_watermark) = outcome.new_watermark {
                let advanced = watermark_store
                    .advance(&target.database, &target.schema, &target.table, new_watermark)
                    .await
                    .map_err(PipelineError::from)?;
                lower_bound = Some(Cursor { ts: advanced.last_ts, pk: advanced.last_pk.clone() });
                cumulative_rows = advanced.cumulative_rows;
            }
            if let Some(fingerprint) = &outcome.fingerprint {
                if !completed_fingerprints.contains(fingerprint) {
                    completed_fingerprints.push(fingerprint.clone());
                }
            }

            if !outcome.idempotent_skip {
                metrics::fetch_duration(&target.database, &target.table, outcome.fetch_duration);
                if sizer.record_fetch_duration(outcome.fetch_duration) {
                    metrics::batch_size_clamped(&target.database, &target.table);
                }
                sizer.observe_row_bytes(outcome.avg_row_bytes);

                records_archived += outcome.records;
                bytes_uploaded += outcome.compressed_bytes;
                metrics::batch_succeeded(&target.database, &target.table, outcome.records, outcome.compressed_bytes);

                let sample = choose_sample(&outcome.primary_keys);
                if let Err(error) = check_sample_absent(self.pool, target, &sample).await {
                    tracing::error!(%error, database = %target.database, table = %target.table, "sample absence check found rows thought deleted still present");
                    audit
                        .record(
                            AuditEventKind::SampleAbsenceFailed,
                            &target.database,
                            &target.schema,
                            &target.table,
                            sample.len() as u64,
                            0,
                            "critical",
                            Some(error.to_string()),
                            Default::default(),
                        )
                        .await;
                }
            } else {
                metrics::batch_idempotent_skip(&target.database, &target.table);
            }

            batches_run += 1;
            batches_since_checkpoint += 1;
            batch_ordinal += 1;

            if checkpoint_store.should_checkpoint(batches_since_checkpoint) {
                if let Some(cursor) = &lower_bound {
                    let checkpoint = Checkpoint {
                        database: target.database.clone(),
                        schema: target.schema.clone(),
                        table: target.table.clone(),
                        batch_ordinal: batch_ordinal.saturating_sub(1),
                        watermark: rowvault_core::model::Watermark {
                            last_ts: cursor.ts,
                            last_pk: cursor.pk.clone(),
                            cumulative_rows,
                            content_sha256: String::new(),
                        },
                        completed_fingerprints: completed_fingerprints.clone(),
                        open_multipart_uploads: Vec::new(),
                        created_at: Utc::now(),
                    };
                    checkpoint_store.save(&checkpoint).await.map_err(PipelineError::from)?;
                    batches_since_checkpoint = 0;
                }
            }
        }

        checkpoint_store
            .clear(&target.database, &target.schema, &target.table)
            .await
            .map_err(PipelineError::from)?;

        if batches_run > 0 {
            if let Ok(vacuum_outcome) = rowvault_db::run_vacuum(self.pool, target, self.config.vacuum_strategy, self.config.vacuum_timeout)
                .await
            {
                if vacuum_outcome.ran {
                    metrics::vacuum_ran(&target.database, &target.table, vacuum_outcome.reclaimed_bytes_estimate.unwrap_or(0));
                }
            }
        }

        Ok(TableOutcome {
            database: target.database.clone(),
            schema: target.schema.clone(),
            table: target.table.clone(),
            records_archived,
            bytes_uploaded,
            succeeded: true,
            error_class: None,
        })
    }
}

