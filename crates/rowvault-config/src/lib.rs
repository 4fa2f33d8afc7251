//! Unified configuration for the `rowvault` archival engine.
//!
//! Loaded from multiple sources with priority:
//! 1. Environment variables (highest priority)
//! 2. Config file path from `ROWVAULT_CONFIG`
//! 3. Inline config from `ROWVAULT_CONFIG_CONTENT`
//! 4. Default config file locations (`./rowvault.toml`, `./.rowvault.toml`)
//! 5. Built-in defaults (lowest priority)
//!
//! Any field named `*_env` indirects to an environment variable holding a
//! secret; a missing required variable is a validation error raised
//! before any side effect runs.

use serde::{Deserialize, Serialize};
use std::time::Duration;

mod secrets;
mod sources;
mod validation;

pub use secrets::resolve_secret_env;
pub use validation::ConfigError;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RuntimeConfig {
    pub databases: Vec<DatabaseConfig>,
    pub storage: StorageConfig,
    #[serde(default)]
    pub lock: LockConfig,
    #[serde(default)]
    pub compliance: ComplianceConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub run: RunConfig,
    #[serde(default)]
    pub notify: NotifyConfig,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server: Option<ServerConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub name: String,
    /// Indirects to an environment variable holding the Postgres DSN.
    pub dsn_env: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    pub tables: Vec<TableConfig>,
}

fn default_max_connections() -> u32 {
    5
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableConfig {
    pub schema: String,
    pub table: String,
    pub timestamp_column: String,
    pub primary_key_column: String,
    pub retention_days: u32,
    #[serde(default = "default_classification")]
    pub classification: String,
    #[serde(default)]
    pub critical: bool,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

fn default_classification() -> String {
    "standard".to_string()
}

fn default_batch_size() -> usize {
    5_000
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Fs,
    S3,
}

impl std::fmt::Display for StorageBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StorageBackend::Fs => write!(f, "fs"),
            StorageBackend::S3 => write!(f, "s3"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    pub object_prefix: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fs_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub s3_bucket: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub s3_region: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub s3_endpoint: Option<String>,
    /// Indirects to an environment variable holding the SSE option name
    /// ("none", "aws:kms", ...); enforced at the compliance gate.
    #[serde(default)]
    pub sse_option: Option<String>,
    #[serde(default = "default_multipart_threshold_bytes")]
    pub multipart_threshold_bytes: u64,
    #[serde(default = "default_part_size_bytes")]
    pub part_size_bytes: u64,
    #[serde(default = "default_rate_limit_per_second")]
    pub rate_limit_per_second: u32,
    #[serde(default = "default_compression_level")]
    pub compression_level: u32,
    #[serde(default = "default_fallback_dir")]
    pub fallback_dir: String,
}

fn default_multipart_threshold_bytes() -> u64 {
    10 * 1024 * 1024
}
fn default_part_size_bytes() -> u64 {
    5 * 1024 * 1024
}
fn default_rate_limit_per_second() -> u32 {
    100
}
fn default_compression_level() -> u32 {
    6
}
fn default_fallback_dir() -> String {
    "./rowvault-fallback".to_string()
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Fs,
            object_prefix: "archive".to_string(),
            fs_path: Some("./rowvault-data".to_string()),
            s3_bucket: None,
            s3_region: None,
            s3_endpoint: None,
            sse_option: None,
            multipart_threshold_bytes: default_multipart_threshold_bytes(),
            part_size_bytes: default_part_size_bytes(),
            rate_limit_per_second: default_rate_limit_per_second(),
            compression_level: default_compression_level(),
            fallback_dir: default_fallback_dir(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LockBackendKind {
    #[default]
    File,
    Database,
    Distributed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockConfig {
    pub backend: LockBackendKind,
    #[serde(default = "default_lock_dir")]
    pub file_dir: String,
}

fn default_lock_dir() -> String {
    "./rowvault-locks".to_string()
}

impl Default for LockConfig {
    fn default() -> Self {
        Self { backend: LockBackendKind::default(), file_dir: default_lock_dir() }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LegalHoldSourceKind {
    #[default]
    StaticFile,
    DatabaseTable,
    HttpEndpoint,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ComplianceConfig {
    pub legal_hold_source: LegalHoldSourceKind,
    #[serde(default)]
    pub legal_hold_path: Option<String>,
    #[serde(default)]
    pub legal_hold_table: Option<String>,
    #[serde(default)]
    pub legal_hold_url: Option<String>,
    #[serde(default)]
    pub retention_min_days: Option<u32>,
    #[serde(default)]
    pub retention_max_days: Option<u32>,
}

/// Staged-deletion vs strict verify-then-delete is a config enum, mutually
/// exclusive per run; default `verify_then_delete`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DeleteMode {
    #[default]
    VerifyThenDelete,
    Staged24h,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default = "default_min_batch_size")]
    pub min_batch_size: usize,
    #[serde(default = "default_max_batch_size")]
    pub max_batch_size: usize,
    #[serde(default = "default_target_fetch_secs")]
    pub target_fetch_duration_secs: f64,
    #[serde(default = "default_statement_timeout_secs")]
    pub statement_timeout_secs: u64,
    #[serde(default = "default_max_batch_retries")]
    pub max_batch_retries: u32,
    #[serde(default = "default_checkpoint_interval")]
    pub checkpoint_interval_batches: u64,
    #[serde(default = "default_clock_skew_ms")]
    pub clock_skew_threshold_ms: i64,
    #[serde(default = "default_memory_cap_bytes")]
    pub memory_cap_bytes: u64,
    #[serde(default)]
    pub delete_mode: DeleteMode,
    #[serde(default)]
    pub vacuum_strategy: VacuumStrategyConfig,
}

fn default_min_batch_size() -> usize {
    1_000
}
fn default_max_batch_size() -> usize {
    50_000
}
fn default_target_fetch_secs() -> f64 {
    2.0
}
fn default_statement_timeout_secs() -> u64 {
    30 * 60
}
fn default_max_batch_retries() -> u32 {
    3
}
fn default_checkpoint_interval() -> u64 {
    10
}
fn default_clock_skew_ms() -> i64 {
    5_000
}
fn default_memory_cap_bytes() -> u64 {
    512 * 1024 * 1024
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum VacuumStrategyConfig {
    #[default]
    None,
    Analyze,
    Standard,
    Full,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            min_batch_size: default_min_batch_size(),
            max_batch_size: default_max_batch_size(),
            target_fetch_duration_secs: default_target_fetch_secs(),
            statement_timeout_secs: default_statement_timeout_secs(),
            max_batch_retries: default_max_batch_retries(),
            checkpoint_interval_batches: default_checkpoint_interval(),
            clock_skew_threshold_ms: default_clock_skew_ms(),
            memory_cap_bytes: default_memory_cap_bytes(),
            delete_mode: DeleteMode::default(),
            vacuum_strategy: VacuumStrategyConfig::default(),
        }
    }
}

impl PipelineConfig {
    pub fn statement_timeout(&self) -> Duration {
        Duration::from_secs(self.statement_timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    #[serde(default = "default_database_parallelism")]
    pub database_parallelism: usize,
    #[serde(default)]
    pub max_batches_per_table: Option<u64>,
    #[serde(default)]
    pub run_deadline_secs: Option<u64>,
    #[serde(default = "default_shutdown_grace_secs")]
    pub shutdown_grace_secs: u64,
}

fn default_database_parallelism() -> usize {
    3
}
fn default_shutdown_grace_secs() -> u64 {
    60
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            database_parallelism: default_database_parallelism(),
            max_batches_per_table: None,
            run_deadline_secs: None,
            shutdown_grace_secs: default_shutdown_grace_secs(),
        }
    }
}

/// Notification fan-out configuration. Channels are closed-enum stubs;
/// `rowvault-notify` resolves
/// the `webhook_url_env` indirection but does not implement delivery
/// formatting for each provider beyond a generic JSON payload.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct NotifyConfig {
    #[serde(default)]
    pub channels: Vec<NotifyChannel>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum NotifyChannel {
    Email { to: Vec<String>, smtp_url_env: String },
    Slack { webhook_url_env: String },
    Teams { webhook_url_env: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub log_format: LogFormat,
}

fn default_listen_addr() -> String {
    "0.0.0.0:9090".to_string()
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { listen_addr: default_listen_addr(), log_level: default_log_level(), log_format: LogFormat::default() }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl RuntimeConfig {
    /// Loads configuration from all sources with priority, then validates.
    pub fn load() -> Result<Self, ConfigError> {
        sources::load_config()
    }

    pub fn load_from_path(path: &std::path::Path) -> Result<Self, ConfigError> {
        sources::load_from_explicit_path(path)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validation::validate_config(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storage_backend_display() {
        assert_eq!(StorageBackend::Fs.to_string(), "fs");
        assert_eq!(StorageBackend::S3.to_string(), "s3");
    }

    #[test]
    fn defaults_are_sane() {
        let pipeline = PipelineConfig::default();
        assert!(pipeline.min_batch_size < pipeline.max_batch_size);
        assert_eq!(pipeline.delete_mode, DeleteMode::VerifyThenDelete);
    }
}
