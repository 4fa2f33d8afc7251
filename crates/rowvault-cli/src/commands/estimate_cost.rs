//! `rowvault estimate-cost`: a rough byte/row projection from table
//! statistics — a full cost estimator is out of scope here;
//! this is a stub reading `pg_class.reltuples`/`pg_total_relation_size`,
//! not a pricing model for any particular object storage provider.

use anyhow::{Context, Result};
use rowvault_config::RuntimeConfig;
use rowvault_db::{DatabasePool, PoolConfig};
use sqlx::postgres::PgConnectOptions;
use sqlx::Row;
use std::path::PathBuf;

pub async fn run(config_path: Option<PathBuf>) -> Result<()> {
    let config = match &config_path {
        Some(path) => RuntimeConfig::load_from_path(path).with_context(|| format!("failed to load config from {}", path.display()))?,
        None => RuntimeConfig::load().context("failed to load configuration")?,
    };

    for database_config in &config.databases {
        let dsn = rowvault_config::resolve_secret_env(&database_config.dsn_env)?;
        let options: PgConnectOptions = dsn.parse().context("invalid database DSN")?;
        let pool = DatabasePool::connect(&database_config.name, options, &PoolConfig::default()).await?;

        for table_config in &database_config.tables {
            let qualified = format!("{}.{}", table_config.schema, table_config.table);
            let row = sqlx::query(
                "SELECT COALESCE(c.reltuples, 0)::bigint AS estimated_rows, \
                 pg_total_relation_size(c.oid) AS total_bytes \
                 FROM pg_class c JOIN pg_namespace n ON n.oid = c.relnamespace \
                 WHERE n.nspname = $1 AND c.relname = $2",
            )
            .bind(&table_config.schema)
            .bind(&table_config.table)
            .fetch_optional(&pool.pool)
            .await
            .context("failed to query table statistics")?;

            let Some(row) = row else {
                println!("{}.{}: table not found", database_config.name, qualified);
                continue;
            };

            let estimated_rows: i64 = row.try_get("estimated_rows").unwrap_or(0);
            let total_bytes: i64 = row.try_get("total_bytes").unwrap_or(0);
            let avg_row_bytes = if estimated_rows > 0 { total_bytes / estimated_rows } else { 0 };

            println!(
                "{}.{}: ~{} rows, ~{} bytes on disk (avg row size ~{} bytes); every row older than the {}d retention window is a future archive candidate",
                database_config.name, qualified, estimated_rows, total_bytes, avg_row_bytes, table_config.retention_days
            );
        }
    }

    Ok(())
}
