//! C10 Run Orchestrator: connects every configured database,
//! acquires the process lock, then drives databases bounded-parallel
//! through a `tokio::task::JoinSet` while each database's tables run one
//! at a time through [`rowvault_pipeline::TableOrchestrator`]. A failing
//! table aborts only that table; sibling tables and other databases
//! continue.
//!
//! Each per-database task needs `'static` resources to satisfy
//! `JoinSet::spawn`, but [`DistributedLockBackend`] and `TableOrchestrator`
//! borrow by reference. Rather than thread `Arc` through every layer for a
//! process that exits the moment this run finishes, the shared
//! [`ObjectStoreClient`], each [`DatabasePool`]/[`rowvault_config::DatabaseConfig`],
//! and the [`LockManager`] are leaked to `'static` once at the top of
//! [`RunOrchestrator::execute`] — they live exactly as long as the process.

use crate::error::RunError;
use chrono::Utc;
use opendal::services::{Fs, S3};
use opendal::Operator;
use rowvault_compliance::{ComplianceGate, LegalHoldSource, RetentionBounds, RetentionPolicy};
use rowvault_config::{
    ComplianceConfig, DatabaseConfig, LegalHoldSourceKind, LockBackendKind, PipelineConfig, RuntimeConfig,
    StorageBackend, StorageConfig, VacuumStrategyConfig,
};
use rowvault_core::error::ExitCode;
use rowvault_core::model::{FailureReport, RunSummary, TableOutcome, TableTarget};
use rowvault_core::object_key::failure_report_object_key;
use rowvault_db::{introspect_table, DatabasePool, PoolConfig};
use rowvault_lock::{DbAdvisoryLockBackend, DistributedLockBackend, FileLockBackend, LockBackend, LockManager};
use rowvault_notify::{NotifyDispatcher, NotifyEvent};
use rowvault_pipeline::{TableOrchestrator, TableOrchestratorConfig};
use rowvault_storage::{ClientConfig, ObjectStoreClient, PutOptions};
use metrics::{counter, gauge};
use sqlx::postgres::PgConnectOptions;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub dry_run: bool,
    pub database_filter: Vec<String>,
}

pub struct RunOrchestrator {
    config: RuntimeConfig,
    run_id: String,
}

impl RunOrchestrator {
    pub fn new(config: RuntimeConfig, run_id: String) -> Self {
        Self { config, run_id }
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Drives one full run to completion, returning the aggregated summary
    /// and the exit code it maps to. Setup failures (lock, config,
    /// connection) short-circuit with `Err`; once databases start running,
    /// every failure is folded into the returned summary instead.
    pub async fn execute(&self, options: RunOptions) -> Result<(RunSummary, ExitCode), RunError> {
        self.config.validate()?;

        let operator = build_operator(&self.config.storage).map_err(RunError::StorageInit)?;
        let client_config = ClientConfig {
            multipart_threshold_bytes: self.config.storage.multipart_threshold_bytes,
            part_size_bytes: self.config.storage.part_size_bytes,
            rate_limit_per_second: self.config.storage.rate_limit_per_second,
            fallback_dir: PathBuf::from(&self.config.storage.fallback_dir),
            ..ClientConfig::default()
        };
        let storage: &'static ObjectStoreClient = Box::leak(Box::new(ObjectStoreClient::new(operator, client_config)));

        let lock_backend = build_lock_backend(&self.config, storage).await?;
        let lock_manager: &'static LockManager = Box::leak(Box::new(LockManager::new(lock_backend)));
        let process_lock = lock_manager.acquire_process_lock().await?;

        let selected: Vec<DatabaseConfig> = self
            .config
            .databases
            .iter()
            .filter(|database| options.database_filter.is_empty() || options.database_filter.contains(&database.name))
            .cloned()
            .collect();
        if selected.is_empty() {
            let _ = process_lock.release().await;
            return Err(RunError::NoDatabasesSelected);
        }

        let notify = NotifyDispatcher::new(self.config.notify.clone());
        notify
            .notify(NotifyEvent::RunStart {
                run_id: self.run_id.clone(),
                databases: selected.iter().map(|database| database.name.clone()).collect(),
            })
            .await;

        let http_client = reqwest::Client::new();
        let semaphore = Arc::new(Semaphore::new(self.config.run.database_parallelism.clamp(1, 10)));
        let mut join_set: JoinSet<(String, Result<Vec<TableOutcome>, RunError>)> = JoinSet::new();

        for database in selected {
            let database_name = database.name.clone();
            match connect_database(&database).await {
                Ok(pool) => {
                    let pool_static: &'static DatabasePool = Box::leak(Box::new(pool));
                    let database_static: &'static DatabaseConfig = Box::leak(Box::new(database));
                    let permit_guard = semaphore.clone();
                    let compliance = self.config.compliance.clone();
                    let pipeline = self.config.pipeline.clone();
                    let object_prefix = self.config.storage.object_prefix.clone();
                    let sse_option = self.config.storage.sse_option.clone();
                    let http_client = http_client.clone();
                    let max_batches = self.config.run.max_batches_per_table;
                    let dry_run = options.dry_run;

                    join_set.spawn(async move {
                        let _permit = permit_guard.acquire_owned().await.expect("semaphore is never closed");
                        let outcomes = run_database(
                            pool_static,
                            database_static,
                            storage,
                            lock_manager,
                            &compliance,
                            &pipeline,
                            &object_prefix,
                            sse_option.as_deref(),
                            &http_client,
                            max_batches,
                            dry_run,
                        )
                        .await;
                        (database_static.name.clone(), Ok(outcomes))
                    });
                }
                Err(error) => {
                    tracing::error!(database = %database_name, %error, "database setup failed, skipping");
                    join_set.spawn(async move { (database_name, Err(error)) });
                }
            }
        }

        let mut table_outcomes: Vec<TableOutcome> = Vec::new();
        let mut databases_processed = 0u32;
        let mut databases_failed = 0u32;

        let drive = async {
            while let Some(joined) = join_set.join_next().await {
                match joined {
                    Ok((_name, Ok(outcomes))) => {
                        databases_processed += 1;
                        table_outcomes.extend(outcomes);
                    }
                    Ok((name, Err(error))) => {
                        tracing::error!(database = %name, %error, "database setup failed");
                        databases_failed += 1;
                    }
                    Err(join_error) => {
                        tracing::error!(%join_error, "database task panicked or was cancelled");
                        databases_failed += 1;
                    }
                }
            }
        };

        match self.config.run.run_deadline_secs {
            Some(deadline_secs) => {
                if tokio::time::timeout(Duration::from_secs(deadline_secs), drive).await.is_err() {
                    databases_failed += join_set.len() as u32;
                    tracing::warn!(remaining = join_set.len(), "run deadline exceeded, aborting remaining database tasks");
                    join_set.abort_all();
                    let grace = Duration::from_secs(self.config.run.shutdown_grace_secs);
                    let _ = tokio::time::timeout(grace, async { while join_set.join_next().await.is_some() {} }).await;
                }
            }
            None => drive.await,
        }

        let summary = RunSummary {
            databases_processed,
            databases_failed,
            records_archived: table_outcomes.iter().map(|t| t.records_archived).sum(),
            bytes_uploaded: table_outcomes.iter().map(|t| t.bytes_uploaded).sum(),
            tables: table_outcomes,
        };

        counter!("rowvault.run.databases_processed", databases_processed as u64);
        counter!("rowvault.run.databases_failed", databases_failed as u64);
        counter!("rowvault.run.records_archived", summary.records_archived);
        counter!("rowvault.run.bytes_uploaded", summary.bytes_uploaded);
        gauge!("rowvault.run.tables_last_run", summary.tables.len() as f64);

        let failed_tables: Vec<TableOutcome> = summary.tables.iter().filter(|t| !t.succeeded).cloned().collect();
        let exit_code = if databases_failed == 0 && failed_tables.is_empty() {
            ExitCode::Success
        } else if databases_processed > 0 {
            ExitCode::PartialSuccess
        } else {
            ExitCode::TotalFailure
        };

        if !failed_tables.is_empty() {
            for table in &failed_tables {
                notify
                    .notify(NotifyEvent::TableFailure {
                        run_id: self.run_id.clone(),
                        database: table.database.clone(),
                        schema: table.schema.clone(),
                        table: table.table.clone(),
                        error_class: table.error_class.clone().unwrap_or_else(|| "unknown".to_string()),
                        message: format!("table {}.{}.{} failed during archival", table.database, table.schema, table.table),
                    })
                    .await;
            }

            let mut error_classes: Vec<String> = failed_tables.iter().filter_map(|t| t.error_class.clone()).collect();
            error_classes.sort();
            error_classes.dedup();

            let report = FailureReport {
                generated_at: Utc::now(),
                affected_tables: failed_tables,
                error_classes,
                remediations: vec![
                    "review per-table logs for the affected tables and re-run once the underlying cause is resolved"
                        .to_string(),
                ],
            };

            let key = failure_report_object_key(&self.config.storage.object_prefix, &self.run_id, Utc::now());
            if let Ok(bytes) = serde_json::to_vec_pretty(&report) {
                if let Err(error) = storage.put(&key, bytes, &PutOptions::default()).await {
                    tracing::error!(%error, "failed to write failure report");
                }
            }
        }

        notify
            .notify(NotifyEvent::RunFinish {
                run_id: self.run_id.clone(),
                databases_processed,
                databases_failed,
                records_archived: summary.records_archived,
                bytes_uploaded: summary.bytes_uploaded,
            })
            .await;

        if let Err(error) = process_lock.release().await {
            tracing::warn!(%error, "failed to release process lock cleanly");
        }

        Ok((summary, exit_code))
    }
}

fn build_operator(storage: &StorageConfig) -> anyhow::Result<Operator> {
    match storage.backend {
        StorageBackend::Fs => {
            let root = storage.fs_path.as_deref().unwrap_or("./rowvault-data");
            std::fs::create_dir_all(root)?;
            Ok(Operator::new(Fs::default().root(root))?.finish())
        }
        StorageBackend::S3 => {
            let mut builder = S3::default();
            if let Some(bucket) = &storage.s3_bucket {
                builder = builder.bucket(bucket);
            }
            if let Some(region) = &storage.s3_region {
                builder = builder.region(region);
            }
            if let Some(endpoint) = &storage.s3_endpoint {
                builder = builder.endpoint(endpoint);
            }
            Ok(Operator::new(builder)?.finish())
        }
    }
}

async fn build_lock_backend(
    config: &RuntimeConfig,
    storage: &'static ObjectStoreClient,
) -> Result<Arc<dyn LockBackend>, RunError> {
    match config.lock.backend {
        LockBackendKind::File => Ok(Arc::new(FileLockBackend::new(config.lock.file_dir.clone()))),
        LockBackendKind::Database => {
            let first = config.databases.first().ok_or(RunError::NoDatabasesSelected)?;
            let pool = connect_database(first).await?;
            Ok(Arc::new(DbAdvisoryLockBackend::new(pool.pool)))
        }
        LockBackendKind::Distributed => Ok(Arc::new(DistributedLockBackend::new(storage, config.storage.object_prefix.clone()))),
    }
}

async fn connect_database(database: &DatabaseConfig) -> Result<DatabasePool, RunError> {
    let dsn = rowvault_config::resolve_secret_env(&database.dsn_env)?;
    let options: PgConnectOptions = dsn.parse().map_err(|source: sqlx::Error| RunError::DatabaseSetup {
        database: database.name.clone(),
        source: anyhow::Error::new(source),
    })?;
    let pool_config = PoolConfig { max_connections: database.max_connections, ..PoolConfig::default() };
    let pool =
        DatabasePool::connect(&database.name, options, &pool_config)
            .await
            .map_err(|source| RunError::DatabaseSetup { database: database.name.clone(), source: anyhow::Error::new(source) })?;
    pool.health_check()
        .await
        .map_err(|source| RunError::DatabaseSetup { database: database.name.clone(), source: anyhow::Error::new(source) })?;
    Ok(pool)
}

fn build_compliance_gate(
    compliance: &ComplianceConfig,
    pool: &sqlx::PgPool,
    http_client: &reqwest::Client,
    sse_option: Option<&str>,
) -> ComplianceGate {
    let legal_hold_source = match compliance.legal_hold_source {
        LegalHoldSourceKind::DatabaseTable => LegalHoldSource::DatabaseTable {
            pool: pool.clone(),
            table: compliance.legal_hold_table.clone().unwrap_or_else(|| "legal_holds".to_string()),
        },
        LegalHoldSourceKind::HttpEndpoint => LegalHoldSource::HttpEndpoint {
            client: http_client.clone(),
            url: compliance.legal_hold_url.clone().unwrap_or_default(),
        },
        LegalHoldSourceKind::StaticFile => LegalHoldSource::StaticFile {
            path: compliance.legal_hold_path.clone().map(PathBuf::from).unwrap_or_else(|| PathBuf::from("legal_holds.json")),
        },
    };

    let retention_policy = RetentionPolicy {
        global: match (compliance.retention_min_days, compliance.retention_max_days) {
            (Some(min_days), Some(max_days)) => Some(RetentionBounds { min_days, max_days }),
            _ => None,
        },
        by_classification: Default::default(),
    };

    ComplianceGate { legal_hold_source, retention_policy, sse_option: sse_option.map(str::to_string) }
}

fn map_vacuum_strategy(strategy: VacuumStrategyConfig) -> rowvault_db::VacuumStrategy {
    match strategy {
        VacuumStrategyConfig::None => rowvault_db::VacuumStrategy::None,
        VacuumStrategyConfig::Analyze => rowvault_db::VacuumStrategy::Analyze,
        VacuumStrategyConfig::Standard => rowvault_db::VacuumStrategy::Standard,
        VacuumStrategyConfig::Full => rowvault_db::VacuumStrategy::Full,
    }
}

/// Runs every configured table of one database to completion, in order. A
/// single failing table is recorded as a failed [`TableOutcome`] and the
/// loop continues to the next table: a table error aborts only the current
/// table, and other tables and databases continue.
#[allow(clippy::too_many_arguments)]
async fn run_database(
    pool: &'static DatabasePool,
    database: &'static DatabaseConfig,
    storage: &'static ObjectStoreClient,
    lock_manager: &'static LockManager,
    compliance: &ComplianceConfig,
    pipeline: &PipelineConfig,
    object_prefix: &str,
    sse_option: Option<&str>,
    http_client: &reqwest::Client,
    max_batches_per_table: Option<u64>,
    dry_run: bool,
) -> Vec<TableOutcome> {
    let gate = build_compliance_gate(compliance, &pool.pool, http_client, sse_option);
    let orchestrator_config = TableOrchestratorConfig {
        sizing: rowvault_pipeline::SizingConfig {
            min_batch_size: pipeline.min_batch_size,
            max_batch_size: pipeline.max_batch_size,
            target_duration: Duration::from_secs_f64(pipeline.target_fetch_duration_secs),
            lower_floor: Duration::from_millis(100),
            memory_cap_bytes: pipeline.memory_cap_bytes,
        },
        max_batches_per_table: if dry_run { Some(0) } else { max_batches_per_table },
        vacuum_strategy: map_vacuum_strategy(pipeline.vacuum_strategy),
        vacuum_timeout: pipeline.statement_timeout(),
        backoff: rowvault_core::retry::BackoffPolicy::default(),
        batch_timeout: pipeline.statement_timeout(),
        statement_timeout: pipeline.statement_timeout(),
        clock_skew_threshold_ms: pipeline.clock_skew_threshold_ms,
        compression_level: 6,
        object_prefix: object_prefix.to_string(),
        source_server_version: "unknown".to_string(),
        actor: "rowvault-run".to_string(),
    };

    let orchestrator = TableOrchestrator {
        pool: &pool.pool,
        storage,
        lock_manager,
        compliance_gate: &gate,
        config: &orchestrator_config,
    };

    let mut outcomes = Vec::with_capacity(database.tables.len());
    for table_config in &database.tables {
        let schema = match introspect_table(&pool.pool, &table_config.schema, &table_config.table).await {
            Ok(schema) => schema,
            Err(error) => {
                tracing::error!(database = %database.name, schema = %table_config.schema, table = %table_config.table, %error, "schema introspection failed");
                outcomes.push(failed_outcome(database, table_config, "TABLE_ERROR"));
                continue;
            }
        };

        let target = TableTarget {
            database: database.name.clone(),
            schema: table_config.schema.clone(),
            table: table_config.table.clone(),
            timestamp_column: table_config.timestamp_column.clone(),
            primary_key_column: table_config.primary_key_column.clone(),
            retention_days: table_config.retention_days,
            classification: table_config.classification.clone(),
            critical: table_config.critical,
            batch_size: table_config.batch_size,
            schema_hash_at_last_run: None,
        };

        match orchestrator.run_table(&target, &schema).await {
            Ok(outcome) => outcomes.push(outcome),
            Err(error) => {
                tracing::error!(database = %database.name, table = %table_config.table, %error, "table archival failed");
                outcomes.push(failed_outcome(database, table_config, &format!("{:?}", error.severity())));
            }
        }
    }
    outcomes
}

fn failed_outcome(database: &DatabaseConfig, table_config: &rowvault_config::TableConfig, error_class: &str) -> TableOutcome {
    TableOutcome {
        database: database.name.clone(),
        schema: table_config.schema.clone(),
        table: table_config.table.clone(),
        records_archived: 0,
        bytes_uploaded: 0,
        succeeded: false,
        error_class: Some(error_class.to_string()),
    }
}
