//! Typed error surface for the batch pipeline and table orchestrator
//!. Every variant carries its severity so the orchestrator
//! can decide retry vs. table-abort without re-inspecting the cause.

use rowvault_core::error::Severity;

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("compliance gate rejected table: {0}")]
    Compliance(#[from] rowvault_compliance::ComplianceError),

    #[error("legal hold active, table skipped: {reason}")]
    SkipLegalHold { reason: String },

    #[error("database error: {0}")]
    Db(#[from] rowvault_db::DbError),

    #[error("storage error: {0}")]
    Storage(#[from] rowvault_storage::StorageError),

    #[error("state store error: {0}")]
    State(#[from] rowvault_state::StateError),

    #[error("lock error: {0}")]
    Lock(#[from] rowvault_lock::LockError),

    #[error("verification failed: {0}")]
    Verify(#[from] rowvault_verify::VerifyError),

    #[error("serialization error: {0}")]
    Codec(#[from] anyhow::Error),

    #[error("per-batch wall-clock timeout exceeded")]
    BatchTimeout,

    #[error("lock heartbeat lost mid-batch")]
    LockLost,

    #[error("table manifest inconsistent for fingerprint {fingerprint}: contains() is true but no entry was found")]
    ManifestCorrupt { fingerprint: String },
}

impl PipelineError {
    /// Classification used by the table orchestrator's retry policy.
    pub fn severity(&self) -> Severity {
        match self {
            PipelineError::Db(e) if e.is_transient() => Severity::BatchErrorTransient,
            PipelineError::Storage(e) if e.is_transient() => Severity::BatchErrorTransient,
            PipelineError::BatchTimeout | PipelineError::LockLost => Severity::BatchErrorTransient,
            PipelineError::Verify(_) => Severity::BatchErrorPermanent,
            PipelineError::Compliance(_) => Severity::TableError,
            PipelineError::SkipLegalHold { .. } => Severity::Warning,
            PipelineError::ManifestCorrupt { .. } => Severity::BatchErrorPermanent,
            _ => Severity::TableError,
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self.severity(), Severity::BatchErrorTransient)
    }
}
