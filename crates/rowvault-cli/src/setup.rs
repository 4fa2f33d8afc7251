//! Interactive setup wizard: a thin `dialoguer`-based prompt sequence that
//! writes a starter config file. Not a compliance-aware wizard — the full
//! cost estimator and compliance checks are handled by other subcommands.

use anyhow::{Context, Result};
use dialoguer::{Confirm, Input, Select};
use rowvault_config::{DatabaseConfig, RuntimeConfig, StorageBackend, StorageConfig, TableConfig};
use std::path::Path;

pub fn run() -> Result<()> {
    println!();
    println!("rowvault setup - generate a starter configuration");
    println!();

    let database_name: String = Input::new().with_prompt("Database name (label only)").default("primary".to_string()).interact_text()?;

    let dsn_env: String = Input::new()
        .with_prompt("Environment variable holding the Postgres DSN")
        .default(format!("{}_DATABASE_URL", database_name.to_uppercase()))
        .interact_text()?;

    let schema: String = Input::new().with_prompt("Schema to archive").default("public".to_string()).interact_text()?;
    let table: String = Input::new().with_prompt("Table to archive").interact_text()?;
    let timestamp_column: String = Input::new().with_prompt("Timestamp column").default("created_at".to_string()).interact_text()?;
    let primary_key_column: String = Input::new().with_prompt("Primary key column").default("id".to_string()).interact_text()?;
    let retention_days: i64 = Input::new().with_prompt("Retention window in days").default(90i64).interact_text()?;

    let backend_options = &["Local filesystem", "S3-compatible object storage"];
    let backend_choice = Select::new().with_prompt("Object storage backend").items(backend_options).default(0).interact()?;

    let storage = if backend_choice == 0 {
        let path: String = Input::new().with_prompt("Local archive directory").default("./rowvault-data".to_string()).interact_text()?;
        StorageConfig { backend: StorageBackend::Fs, fs_path: Some(path), ..StorageConfig::default() }
    } else {
        let bucket: String = Input::new().with_prompt("S3 bucket name").interact_text()?;
        let region: String = Input::new().with_prompt("S3 region").default("us-east-1".to_string()).interact_text()?;
        StorageConfig { backend: StorageBackend::S3, s3_bucket: Some(bucket), s3_region: Some(region), ..StorageConfig::default() }
    };

    let config = RuntimeConfig {
        databases: vec![DatabaseConfig {
            name: database_name,
            dsn_env,
            max_connections: 5,
            tables: vec![TableConfig {
                schema,
                table,
                timestamp_column,
                primary_key_column,
                retention_days: retention_days as u32,
                classification: "standard".to_string(),
                critical: false,
                batch_size: 5_000,
            }],
        }],
        storage,
        ..RuntimeConfig::default()
    };

    let output_path = Path::new("rowvault.toml");
    if output_path.exists() {
        let overwrite = Confirm::new().with_prompt("rowvault.toml already exists. Overwrite?").default(false).interact()?;
        if !overwrite {
            println!("Aborted.");
            return Ok(());
        }
    }

    let rendered = toml::to_string_pretty(&config).context("failed to render configuration")?;
    std::fs::write(output_path, rendered).context("failed to write rowvault.toml")?;

    println!();
    println!("Wrote rowvault.toml");
    println!("Set the {} environment variable before running `rowvault run`.", config.databases[0].dsn_env);
    println!();
    Ok(())
}
