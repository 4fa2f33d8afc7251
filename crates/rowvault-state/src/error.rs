//! Typed error surface for the watermark and checkpoint store.

#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("storage error: {0}")]
    Storage(#[from] rowvault_storage::StorageError),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("watermark content hash mismatch at load: expected {expected}, observed {actual}")]
    IntegrityCheckFailed { expected: String, actual: String },

    #[error("new watermark ({new_ts}, {new_pk}) is not a monotonic successor of ({old_ts}, {old_pk})")]
    NonMonotonicWatermark {
        old_ts: String,
        old_pk: String,
        new_ts: String,
        new_pk: String,
    },
}
