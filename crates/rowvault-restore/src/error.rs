//! Typed error surface for the restore engine.

#[derive(Debug, thiserror::Error)]
pub enum RestoreError {
    #[error("storage error: {0}")]
    Storage(#[from] rowvault_storage::StorageError),

    #[error("database error: {0}")]
    Db(#[from] rowvault_db::DbError),

    #[error("verification error: {0}")]
    Verify(#[from] rowvault_verify::VerifyError),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("decode error: {0}")]
    Decode(#[from] anyhow::Error),

    #[error("schema reconciliation failed for column {column}: {reason}")]
    SchemaMismatch { column: String, reason: String },

    #[error("conflict strategy \"fail\" triggered: a row with primary key {0} already exists")]
    ConflictFailTriggered(String),

    #[error("metadata object missing for data object {0}")]
    MetadataMissing(String),
}
