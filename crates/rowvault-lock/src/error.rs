//! Typed error surface for the lock manager.

#[derive(Debug, thiserror::Error)]
pub enum LockError {
    #[error("lock already held by another instance (owner={owner}, acquired_at={acquired_at})")]
    AlreadyHeld { owner: String, acquired_at: String },

    #[error("lock heartbeat lost: last seen {last_seen_secs_ago}s ago, ttl is {ttl_secs}s")]
    HeartbeatLost { last_seen_secs_ago: i64, ttl_secs: i64 },

    #[error("lock file I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("database error: {0}")]
    Db(#[from] rowvault_db::DbError),

    #[error("storage error: {0}")]
    Storage(#[from] rowvault_storage::StorageError),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}
