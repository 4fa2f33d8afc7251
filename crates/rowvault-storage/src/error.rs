//! Typed error surface for the object-store client.

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("object not found: {0}")]
    NotFound(String),

    #[error("rate limited, retry after cooldown")]
    RateLimited,

    #[error("circuit breaker open for endpoint, short-circuiting call")]
    CircuitOpen,

    #[error("multipart upload {upload_id} part {part_number} failed after retries: {source}")]
    PartUploadFailed {
        upload_id: String,
        part_number: u32,
        #[source]
        source: Box<StorageError>,
    },

    #[error("conditional put conflict on {0} after retries exhausted")]
    ConditionalPutConflict(String),

    #[error("backend error: {0}")]
    Backend(#[from] opendal::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

impl StorageError {
    /// Network, timeout, and slow-down errors are transient.
    pub fn is_transient(&self) -> bool {
        match self {
            StorageError::RateLimited | StorageError::CircuitOpen => true,
            StorageError::Backend(e) => matches!(
                e.kind(),
                opendal::ErrorKind::Unexpected | opendal::ErrorKind::RateLimited
            ),
            StorageError::Io(_) => true,
            _ => false,
        }
    }
}
