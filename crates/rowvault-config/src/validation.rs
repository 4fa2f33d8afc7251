//! Exhaustive config validation: every check here
//! runs before any side-effecting call (no connection, no object-store
//! write) so a misconfiguration always fails fast with no partial state.

use crate::{RuntimeConfig, StorageBackend};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    ReadFile { path: String, source: std::io::Error },
    #[error("failed to parse config file {path}: {source}")]
    ParseFile { path: String, source: toml::de::Error },
    #[error("failed to parse inline config from ROWVAULT_CONFIG_CONTENT: {0}")]
    ParseInline(toml::de::Error),
    #[error("environment variable {0} must be a valid value: {1}")]
    InvalidEnvValue(String, String),
    #[error("secret environment variable {0} is not set")]
    MissingSecretEnv(String),
    #[error("validation failed: {0}")]
    Invalid(String),
}

pub fn validate_config(config: &RuntimeConfig) -> Result<(), ConfigError> {
    validate_databases(config)?;
    validate_storage(config)?;
    validate_pipeline(config)?;
    validate_run(config)?;
    Ok(())
}

fn validate_databases(config: &RuntimeConfig) -> Result<(), ConfigError> {
    if config.databases.is_empty() {
        return Err(ConfigError::Invalid("at least one [[databases]] entry is required".into()));
    }

    let mut seen_names = std::collections::HashSet::new();
    for db in &config.databases {
        if db.name.is_empty() {
            return Err(ConfigError::Invalid("database name must not be empty".into()));
        }
        if !seen_names.insert(db.name.as_str()) {
            return Err(ConfigError::Invalid(format!("duplicate database name: {}", db.name)));
        }
        if db.dsn_env.is_empty() {
            return Err(ConfigError::Invalid(format!("database {} is missing dsn_env", db.name)));
        }
        if db.max_connections == 0 {
            return Err(ConfigError::Invalid(format!("database {} max_connections must be > 0", db.name)));
        }
        if db.tables.is_empty() {
            return Err(ConfigError::Invalid(format!("database {} has no tables configured", db.name)));
        }

        let mut seen_tables = std::collections::HashSet::new();
        for table in &db.tables {
            let key = (table.schema.clone(), table.table.clone());
            if !seen_tables.insert(key) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate table {}.{} in database {}",
                    table.schema, table.table, db.name
                )));
            }
            if table.timestamp_column.is_empty() || table.primary_key_column.is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "table {}.{} must set timestamp_column and primary_key_column",
                    table.schema, table.table
                )));
            }
            if table.retention_days == 0 {
                return Err(ConfigError::Invalid(format!(
                    "table {}.{} retention_days must be > 0",
                    table.schema, table.table
                )));
            }
            if table.batch_size == 0 {
                return Err(ConfigError::Invalid(format!(
                    "table {}.{} batch_size must be > 0",
                    table.schema, table.table
                )));
            }
        }
    }

    Ok(())
}

fn validate_storage(config: &RuntimeConfig) -> Result<(), ConfigError> {
    let storage = &config.storage;
    match storage.backend {
        StorageBackend::Fs => {
            if storage.fs_path.as_deref().unwrap_or("").is_empty() {
                return Err(ConfigError::Invalid("storage.fs_path is required for the fs backend".into()));
            }
        }
        StorageBackend::S3 => {
            if storage.s3_bucket.as_deref().unwrap_or("").is_empty() {
                return Err(ConfigError::Invalid("storage.s3_bucket is required for the s3 backend".into()));
            }
            if storage.s3_region.as_deref().unwrap_or("").is_empty() {
                return Err(ConfigError::Invalid("storage.s3_region is required for the s3 backend".into()));
            }
        }
    }

    if storage.part_size_bytes == 0 {
        return Err(ConfigError::Invalid("storage.part_size_bytes must be > 0".into()));
    }
    if storage.multipart_threshold_bytes < storage.part_size_bytes {
        return Err(ConfigError::Invalid(
            "storage.multipart_threshold_bytes must be >= storage.part_size_bytes".into(),
        ));
    }
    if storage.rate_limit_per_second == 0 {
        return Err(ConfigError::Invalid("storage.rate_limit_per_second must be > 0".into()));
    }
    if storage.compression_level > 9 {
        return Err(ConfigError::Invalid("storage.compression_level must be between 0 and 9".into()));
    }

    Ok(())
}

fn validate_pipeline(config: &RuntimeConfig) -> Result<(), ConfigError> {
    let pipeline = &config.pipeline;
    if pipeline.min_batch_size == 0 {
        return Err(ConfigError::Invalid("pipeline.min_batch_size must be > 0".into()));
    }
    if pipeline.min_batch_size > pipeline.max_batch_size {
        return Err(ConfigError::Invalid("pipeline.min_batch_size must be <= pipeline.max_batch_size".into()));
    }
    if pipeline.max_batch_retries == 0 {
        return Err(ConfigError::Invalid("pipeline.max_batch_retries must be > 0".into()));
    }
    if pipeline.statement_timeout_secs == 0 {
        return Err(ConfigError::Invalid("pipeline.statement_timeout_secs must be > 0".into()));
    }
    Ok(())
}

fn validate_run(config: &RuntimeConfig) -> Result<(), ConfigError> {
    let run = &config.run;
    if run.database_parallelism == 0 {
        return Err(ConfigError::Invalid("run.database_parallelism must be > 0".into()));
    }
    if run.database_parallelism > 10 {
        return Err(ConfigError::Invalid("run.database_parallelism must not exceed the hard cap of 10".into()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{DatabaseConfig, TableConfig};

    fn minimal_config() -> RuntimeConfig {
        let mut config = RuntimeConfig::default();
        config.databases.push(DatabaseConfig {
            name: "primary".into(),
            dsn_env: "ROWVAULT_PRIMARY_DSN".into(),
            max_connections: 5,
            tables: vec![TableConfig {
                schema: "public".into(),
                table: "events".into(),
                timestamp_column: "created_at".into(),
                primary_key_column: "id".into(),
                retention_days: 30,
                classification: "standard".into(),
                critical: false,
                batch_size: 5000,
            }],
        });
        config
    }

    #[test]
    fn rejects_empty_databases() {
        let config = RuntimeConfig::default();
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn accepts_minimal_valid_config() {
        let config = minimal_config();
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn rejects_duplicate_database_names() {
        let mut config = minimal_config();
        let dup = config.databases[0].clone();
        config.databases.push(dup);
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn rejects_inverted_batch_size_bounds() {
        let mut config = minimal_config();
        config.pipeline.min_batch_size = 100;
        config.pipeline.max_batch_size = 10;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn rejects_parallelism_above_hard_cap() {
        let mut config = minimal_config();
        config.run.database_parallelism = 11;
        assert!(validate_config(&config).is_err());
    }
}
