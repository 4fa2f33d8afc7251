//! Typed error surface for the verifier. Every variant aborts the
//! batch with rollback and no delete — the verifier never retries, it only
//! reports.

use rowvault_core::model::PrimaryKey;

#[derive(Debug, thiserror::Error)]
pub enum VerifyError {
    #[error("three-way count mismatch: n_db={n_db} n_stream={n_stream} n_object={n_object}")]
    CountMismatch { n_db: u64, n_stream: u64, n_object: u64 },

    #[error("checksum mismatch: expected {expected}, observed {actual}")]
    ChecksumMismatch { expected: String, actual: String },

    #[error("primary-key set mismatch between serialized object and delete set")]
    PrimaryKeySetMismatch,

    #[error("sample absence check found primary key(s) still present after delete: {0:?}")]
    SampleAbsenceFailed(Vec<PrimaryKey>),

    #[error("database error during verification: {0}")]
    Db(#[from] rowvault_db::DbError),
}
