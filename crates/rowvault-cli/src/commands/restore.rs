//! `rowvault restore`: loads the target database's current
//! connection and schema, then drives [`rowvault_restore::RestoreEngine`]
//! against the archived objects for one table.

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use rowvault_config::RuntimeConfig;
use rowvault_db::{introspect_table, DatabasePool, PoolConfig};
use rowvault_restore::{ConflictStrategy, RestoreEngine, RestoreOptions, RestoreSelector, SchemaMigrationStrategy};
use rowvault_storage::{ClientConfig, ObjectStoreClient};
use sqlx::postgres::PgConnectOptions;
use std::path::PathBuf;

pub struct RestoreArgs {
    pub config_path: Option<PathBuf>,
    pub database: String,
    pub schema: String,
    pub table: String,
    pub conflict_strategy: String,
    pub migration_strategy: String,
    pub restore_all: bool,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub ignore_watermark: bool,
}

pub async fn run(args: RestoreArgs) -> Result<()> {
    let config = match &args.config_path {
        Some(path) => RuntimeConfig::load_from_path(path).with_context(|| format!("failed to load config from {}", path.display()))?,
        None => RuntimeConfig::load().context("failed to load configuration")?,
    };
    crate::init::init_tracing(&config);

    let database_config = config
        .databases
        .iter()
        .find(|database| database.name == args.database)
        .with_context(|| format!("no database named '{}' in configuration", args.database))?;

    let dsn = rowvault_config::resolve_secret_env(&database_config.dsn_env)?;
    let options: PgConnectOptions = dsn.parse().context("invalid database DSN")?;
    let pool = DatabasePool::connect(&database_config.name, options, &PoolConfig::default()).await.context("failed to connect to database")?;

    let schema = introspect_table(&pool.pool, &args.schema, &args.table).await.context("failed to introspect target table")?;
    let table_config = database_config
        .tables
        .iter()
        .find(|table| table.schema == args.schema && table.table == args.table)
        .with_context(|| format!("table {}.{} is not configured for this database", args.schema, args.table))?;

    let target = rowvault_core::model::TableTarget {
        database: database_config.name.clone(),
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

    let operator = build_operator(&config.storage)?;
    let client_config = ClientConfig {
        multipart_threshold_bytes: config.storage.multipart_threshold_bytes,
        part_size_bytes: config.storage.part_size_bytes,
        rate_limit_per_second: config.storage.rate_limit_per_second,
        fallback_dir: PathBuf::from(&config.storage.fallback_dir),
        ..ClientConfig::default()
    };
    let storage = ObjectStoreClient::new(operator, client_config);

    let selector = match (args.restore_all, args.from, args.to) {
        (true, _, _) => RestoreSelector::All,
        (false, Some(from), Some(to)) => RestoreSelector::DateRange { from, to },
        _ => bail!("either --restore-all or both --from and --to must be given"),
    };

    let restore_options = RestoreOptions {
        selector,
        conflict_strategy: parse_conflict_strategy(&args.conflict_strategy)?,
        migration_strategy: parse_migration_strategy(&args.migration_strategy)?,
        ignore_restore_watermark: args.ignore_watermark,
        ..RestoreOptions::default()
    };

    let engine = RestoreEngine { pool: &pool.pool, storage: &storage, object_prefix: &config.storage.object_prefix };
    let report = engine.restore(&target, &schema, &restore_options).await.context("restore failed")?;

    println!(
        "restored {} records ({} skipped, {} failed) across {} objects",
        report.records_restored, report.records_skipped, report.records_failed, report.objects_processed
    );
    Ok(())
}

fn parse_conflict_strategy(value: &str) -> Result<ConflictStrategy> {
    match value {
        "skip" => Ok(ConflictStrategy::Skip),
        "overwrite" => Ok(ConflictStrategy::Overwrite),
        "fail" => Ok(ConflictStrategy::Fail),
        "upsert" => Ok(ConflictStrategy::Upsert),
        other => bail!("unknown conflict strategy '{other}', expected skip|overwrite|fail|upsert"),
    }
}

fn parse_migration_strategy(value: &str) -> Result<SchemaMigrationStrategy> {
    match value {
        "strict" => Ok(SchemaMigrationStrategy::Strict),
        "lenient" => Ok(SchemaMigrationStrategy::Lenient),
        "transform" => Ok(SchemaMigrationStrategy::Transform),
        "none" => Ok(SchemaMigrationStrategy::None),
        other => bail!("unknown migration strategy '{other}', expected strict|lenient|transform|none"),
    }
}

fn build_operator(storage: &rowvault_config::StorageConfig) -> Result<opendal::Operator> {
    use opendal::services::{Fs, S3};
    use opendal::Operator;
    match storage.backend {
        rowvault_config::StorageBackend::Fs => {
            let root = storage.fs_path.as_deref().unwrap_or("./rowvault-data");
            Ok(Operator::new(Fs::default().root(root))?.finish())
        }
        rowvault_config::StorageBackend::S3 => {
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
