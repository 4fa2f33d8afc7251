//! Typed error surface for the run orchestrator. Setup
//! failures (config, lock, connection) map directly to an [`ExitCode`];
//! per-table failures never reach here — they are folded into the
//! [`rowvault_core::model::TableOutcome`] list instead.

use rowvault_core::error::ExitCode;

#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error("config validation failed: {0}")]
    Config(#[from] rowvault_config::ConfigError),

    #[error("process lock not acquired: {0}")]
    LockNotAcquired(#[from] rowvault_lock::LockError),

    #[error("database setup failed for {database}: {source}")]
    DatabaseSetup {
        database: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("storage backend initialization failed: {0}")]
    StorageInit(anyhow::Error),

    #[error("no databases selected")]
    NoDatabasesSelected,
}

impl RunError {
    pub fn exit_code(&self) -> ExitCode {
        match self {
            RunError::Config(_) => ExitCode::ValidationError,
            RunError::LockNotAcquired(_) => ExitCode::LockNotAcquired,
            RunError::NoDatabasesSelected => ExitCode::ValidationError,
            RunError::DatabaseSetup { source, .. } => classify_setup_failure(source),
            RunError::StorageInit(source) => classify_setup_failure(source),
        }
    }
}

/// Best-effort classification of a setup-time failure into one of the
/// non-generic exit codes: looked up by substring since the underlying
/// causes span `sqlx`, `opendal`, and raw I/O error types with no shared
/// enum to match on.
fn classify_setup_failure(error: &anyhow::Error) -> ExitCode {
    let message = error.to_string().to_lowercase();
    if message.contains("permission") || message.contains("denied") || message.contains("password authentication") {
        ExitCode::Permissions
    } else if message.contains("too many connections") || message.contains("resource") {
        ExitCode::ResourceExhaustion
    } else if message.contains("timed out") || message.contains("connection refused") || message.contains("network") {
        ExitCode::NetworkError
    } else {
        ExitCode::TotalFailure
    }
}
