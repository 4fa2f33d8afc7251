//! Configuration source cascade: environment variables override a
//! config file, which overrides built-in defaults.

use crate::validation::ConfigError;
use crate::{LockBackendKind, LogFormat, RuntimeConfig, ServerConfig, StorageBackend};
use std::env;
use std::path::Path;

const ENV_PREFIX: &str = "ROWVAULT_";

pub fn load_config() -> Result<RuntimeConfig, ConfigError> {
    let mut config = load_from_file()?.unwrap_or_default();
    apply_env_overrides(&mut config)?;
    config.validate()?;
    Ok(config)
}

pub fn load_from_explicit_path(path: &Path) -> Result<RuntimeConfig, ConfigError> {
    let mut config = read_file(path)?;
    apply_env_overrides(&mut config)?;
    config.validate()?;
    Ok(config)
}

fn read_file(path: &Path) -> Result<RuntimeConfig, ConfigError> {
    let content = std::fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.display().to_string(), source })?;
    toml::from_str(&content).map_err(|source| ConfigError::ParseFile { path: path.display().to_string(), source })
}

fn load_from_file() -> Result<Option<RuntimeConfig>, ConfigError> {
    if let Ok(path) = env::var("ROWVAULT_CONFIG") {
        return Ok(Some(read_file(Path::new(&path))?));
    }

    if let Ok(content) = env::var("ROWVAULT_CONFIG_CONTENT") {
        let config: RuntimeConfig = toml::from_str(&content).map_err(ConfigError::ParseInline)?;
        return Ok(Some(config));
    }

    for path in &["./rowvault.toml", "./.rowvault.toml"] {
        if Path::new(path).exists() {
            return Ok(Some(read_file(Path::new(path))?));
        }
    }

    Ok(None)
}

fn apply_env_overrides(config: &mut RuntimeConfig) -> Result<(), ConfigError> {
    if let Some(backend) = get_env_string("STORAGE_BACKEND")? {
        config.storage.backend = match backend.to_lowercase().as_str() {
            "fs" => StorageBackend::Fs,
            "s3" => StorageBackend::S3,
            other => return Err(invalid("STORAGE_BACKEND", other)),
        };
    }
    if let Some(prefix) = get_env_string("STORAGE_OBJECT_PREFIX")? {
        config.storage.object_prefix = prefix;
    }
    if let Some(path) = get_env_string("STORAGE_FS_PATH")? {
        config.storage.fs_path = Some(path);
    }
    if let Some(bucket) = get_env_string("STORAGE_S3_BUCKET")? {
        config.storage.s3_bucket = Some(bucket);
    }
    if let Some(region) = get_env_string("STORAGE_S3_REGION")? {
        config.storage.s3_region = Some(region);
    }
    if let Some(endpoint) = get_env_string("STORAGE_S3_ENDPOINT")? {
        config.storage.s3_endpoint = Some(endpoint);
    }
    if let Some(sse) = get_env_string("STORAGE_SSE_OPTION")? {
        config.storage.sse_option = Some(sse);
    }
    if let Some(val) = get_env_u64("STORAGE_RATE_LIMIT_PER_SECOND")? {
        config.storage.rate_limit_per_second = val as u32;
    }
    if let Some(val) = get_env_u64("STORAGE_COMPRESSION_LEVEL")? {
        config.storage.compression_level = val as u32;
    }

    if let Some(backend) = get_env_string("LOCK_BACKEND")? {
        config.lock.backend = match backend.to_lowercase().as_str() {
            "file" => LockBackendKind::File,
            "database" => LockBackendKind::Database,
            "distributed" => LockBackendKind::Distributed,
            other => return Err(invalid("LOCK_BACKEND", other)),
        };
    }

    if let Some(val) = get_env_u64("PIPELINE_MIN_BATCH_SIZE")? {
        config.pipeline.min_batch_size = val as usize;
    }
    if let Some(val) = get_env_u64("PIPELINE_MAX_BATCH_SIZE")? {
        config.pipeline.max_batch_size = val as usize;
    }
    if let Some(val) = get_env_u64("PIPELINE_STATEMENT_TIMEOUT_SECS")? {
        config.pipeline.statement_timeout_secs = val;
    }
    if let Some(val) = get_env_u64("PIPELINE_MAX_BATCH_RETRIES")? {
        config.pipeline.max_batch_retries = val as u32;
    }
    if let Some(val) = get_env_u64("PIPELINE_CHECKPOINT_INTERVAL_BATCHES")? {
        config.pipeline.checkpoint_interval_batches = val;
    }

    if let Some(val) = get_env_u64("RUN_DATABASE_PARALLELISM")? {
        config.run.database_parallelism = val as usize;
    }
    if let Some(val) = get_env_u64("RUN_DEADLINE_SECS")? {
        config.run.run_deadline_secs = Some(val);
    }

    if let Some(addr) = get_env_string("SERVER_LISTEN_ADDR")? {
        let server = config.server.get_or_insert_with(ServerConfig::default);
        server.listen_addr = addr;
    }
    if let Some(level) = get_env_string("SERVER_LOG_LEVEL")? {
        let server = config.server.get_or_insert_with(ServerConfig::default);
        server.log_level = level;
    }
    if let Some(format) = get_env_string("SERVER_LOG_FORMAT")? {
        let server = config.server.get_or_insert_with(ServerConfig::default);
        server.log_format = match format.to_lowercase().as_str() {
            "json" => LogFormat::Json,
            _ => LogFormat::Text,
        };
    }

    Ok(())
}

fn invalid(key: &str, value: &str) -> ConfigError {
    ConfigError::InvalidEnvValue(format!("{}{}", ENV_PREFIX, key), value.to_string())
}

fn get_env_string(key: &str) -> Result<Option<String>, ConfigError> {
    let full_key = format!("{}{}", ENV_PREFIX, key);
    match env::var(&full_key) {
        Ok(val) if !val.is_empty() => Ok(Some(val)),
        Ok(_) => Ok(None),
        Err(env::VarError::NotPresent) => Ok(None),
        Err(_) => Err(ConfigError::InvalidEnvValue(full_key, "not valid unicode".to_string())),
    }
}

fn get_env_u64(key: &str) -> Result<Option<u64>, ConfigError> {
    match get_env_string(key)? {
        Some(val) => {
            let parsed = val.parse::<u64>().map_err(|_| invalid(key, &val))?;
            Ok(Some(parsed))
        }
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{DatabaseConfig, TableConfig};

    fn write_minimal_toml(dir: &tempfile::TempDir) -> std::path::PathBuf {
        let path = dir.path().join("rowvault.toml");
        std::fs::write(
            &path,
            r#"
            [[databases]]
            name = "primary"
            dsn_env = "ROWVAULT_PRIMARY_DSN"
            max_connections = 5

            [[databases.tables]]
            schema = "public"
            table = "events"
            timestamp_column = "created_at"
            primary_key_column = "id"
            retention_days = 30

            [storage]
            backend = "fs"
            object_prefix = "archive"
            fs_path = "./data"
            "#,
        )
        .unwrap();
        path
    }

    #[test]
    fn loads_and_validates_file_based_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_minimal_toml(&dir);
        let config = load_from_explicit_path(&path).unwrap();
        assert_eq!(config.databases.len(), 1);
        assert_eq!(config.databases[0].tables[0].table, "events");
    }

    #[test]
    fn env_override_takes_priority_over_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_minimal_toml(&dir);
        std::env::set_var("ROWVAULT_STORAGE_OBJECT_PREFIX", "override-prefix");
        let config = load_from_explicit_path(&path).unwrap();
        std::env::remove_var("ROWVAULT_STORAGE_OBJECT_PREFIX");
        assert_eq!(config.storage.object_prefix, "override-prefix");
    }

    #[test]
    fn unknown_enum_value_is_a_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_minimal_toml(&dir);
        std::env::set_var("ROWVAULT_STORAGE_BACKEND", "not-a-backend");
        let result = load_from_explicit_path(&path);
        std::env::remove_var("ROWVAULT_STORAGE_BACKEND");
        assert!(result.is_err());
    }

    #[test]
    fn minimal_programmatic_config_round_trips_through_toml() {
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
        let serialized = toml::to_string(&config).unwrap();
        let roundtripped: RuntimeConfig = toml::from_str(&serialized).unwrap();
        assert_eq!(roundtripped.databases[0].name, "primary");
    }
}
