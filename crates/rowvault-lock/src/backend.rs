//! The three lock backends: file (advisory file lock via `fs2`), database
//! (a heartbeat-checked row in a dedicated Postgres table), and distributed
//! (object-store conditional
//! write). All three store the same [`LockRecord`] shape so staleness
//! detection (`now - last_heartbeat > 2 * ttl`) is identical across backends.

use crate::error::LockError;
use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockRecord {
    pub owner: String,
    pub acquired_at: DateTime<Utc>,
    pub last_heartbeat: DateTime<Utc>,
    pub ttl_secs: i64,
}

impl LockRecord {
    fn vacant() -> Self {
        Self {
            owner: String::new(),
            acquired_at: DateTime::<Utc>::MIN_UTC,
            last_heartbeat: DateTime::<Utc>::MIN_UTC,
            ttl_secs: 0,
        }
    }

    /// Stale if no heartbeat for 2x the configured TTL.
    pub fn is_stale(&self, now: DateTime<Utc>) -> bool {
        self.owner.is_empty() || now - self.last_heartbeat > ChronoDuration::seconds(self.ttl_secs * 2)
    }
}

#[async_trait]
pub trait LockBackend: Send + Sync {
    async fn try_acquire(&self, key: &str, owner: &str, ttl: Duration) -> Result<(), LockError>;
    async fn heartbeat(&self, key: &str, owner: &str, ttl: Duration) -> Result<(), LockError>;
    async fn release(&self, key: &str, owner: &str) -> Result<(), LockError>;
}

/// File-based advisory lock: intended for a single
/// archiver host. The OS releases the underlying `flock` automatically if
/// the process dies, so staleness is mostly advisory/observability here;
/// the sidecar JSON lets `rowvault status` report who holds what.
pub struct FileLockBackend {
    dir: PathBuf,
    held: tokio::sync::Mutex<std::collections::HashMap<String, std::fs::File>>,
}

impl FileLockBackend {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            held: tokio::sync::Mutex::new(std::collections::HashMap::new()),
        }
    }

    fn lock_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.lock", key.replace(['/', '.'], "_")))
    }

    fn sidecar_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.lock.json", key.replace(['/', '.'], "_")))
    }
}

#[async_trait]
impl LockBackend for FileLockBackend {
    async fn try_acquire(&self, key: &str, owner: &str, ttl: Duration) -> Result<(), LockError> {
        std::fs::create_dir_all(&self.dir)?;
        let path = self.lock_path(key);
        let file = std::fs::OpenOptions::new().create(true).write(true).open(&path)?;
        fs2::FileExt::try_lock_exclusive(&file).map_err(|_| LockError::AlreadyHeld {
            owner: "unknown (held by another process)".to_string(),
            acquired_at: "unknown".to_string(),
        })?;

        let now = Utc::now();
        let record = LockRecord {
            owner: owner.to_string(),
            acquired_at: now,
            last_heartbeat: now,
            ttl_secs: ttl.as_secs() as i64,
        };
        std::fs::write(self.sidecar_path(key), serde_json::to_vec_pretty(&record)?)?;

        self.held.lock().await.insert(key.to_string(), file);
        Ok(())
    }

    async fn heartbeat(&self, key: &str, owner: &str, ttl: Duration) -> Result<(), LockError> {
        let now = Utc::now();
        let record = LockRecord {
            owner: owner.to_string(),
            acquired_at: now,
            last_heartbeat: now,
            ttl_secs: ttl.as_secs() as i64,
        };
        std::fs::write(self.sidecar_path(key), serde_json::to_vec_pretty(&record)?)?;
        Ok(())
    }

    async fn release(&self, key: &str, _owner: &str) -> Result<(), LockError> {
        if let Some(file) = self.held.lock().await.remove(key) {
            let _ = fs2::FileExt::unlock(&file);
        }
        let _ = std::fs::remove_file(self.sidecar_path(key));
        Ok(())
    }
}

/// Postgres-backed lock: a row per lock key in a
/// dedicated table, claimed by conditional `UPDATE`/`INSERT` rather than a
/// session-scoped `pg_advisory_lock`, since the latter cannot be
/// heartbeat-checked from a process that isn't holding the connection open.
pub struct DbAdvisoryLockBackend {
    pool: PgPool,
}

impl DbAdvisoryLockBackend {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn ensure_schema(&self) -> Result<(), LockError> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS rowvault_locks ( \
                lock_key TEXT PRIMARY KEY, \
                owner TEXT NOT NULL, \
                acquired_at TIMESTAMPTZ NOT NULL, \
                last_heartbeat TIMESTAMPTZ NOT NULL, \
                ttl_secs BIGINT NOT NULL \
            )",
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl LockBackend for DbAdvisoryLockBackend {
    async fn try_acquire(&self, key: &str, owner: &str, ttl: Duration) -> Result<(), LockError> {
        self.ensure_schema().await?;
        let now = Utc::now();
        let ttl_secs = ttl.as_secs() as i64;
        let result = sqlx::query(
            "INSERT INTO rowvault_locks (lock_key, owner, acquired_at, last_heartbeat, ttl_secs) \
             VALUES ($1, $2, $3, $3, $4) \
             ON CONFLICT (lock_key) DO UPDATE SET owner = EXCLUDED.owner, acquired_at = EXCLUDED.acquired_at, \
                last_heartbeat = EXCLUDED.last_heartbeat, ttl_secs = EXCLUDED.ttl_secs \
             WHERE rowvault_locks.owner = $2 \
                OR now() - rowvault_locks.last_heartbeat > (rowvault_locks.ttl_secs * 2 || ' seconds')::interval",
        )
        .bind(key)
        .bind(owner)
        .bind(now)
        .bind(ttl_secs)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            let row: (String, DateTime<Utc>) =
                sqlx::query_as("SELECT owner, acquired_at FROM rowvault_locks WHERE lock_key = $1")
                    .bind(key)
                    .fetch_one(&self.pool)
                    .await?;
            return Err(LockError::AlreadyHeld {
                owner: row.0,
                acquired_at: row.1.to_rfc3339(),
            });
        }
        Ok(())
    }

    async fn heartbeat(&self, key: &str, owner: &str, _ttl: Duration) -> Result<(), LockError> {
        let now = Utc::now();
        let result = sqlx::query(
            "UPDATE rowvault_locks SET last_heartbeat = $3 WHERE lock_key = $1 AND owner = $2",
        )
        .bind(key)
        .bind(owner)
        .bind(now)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(LockError::HeartbeatLost { last_seen_secs_ago: -1, ttl_secs: -1 });
        }
        Ok(())
    }

    async fn release(&self, key: &str, owner: &str) -> Result<(), LockError> {
        sqlx::query("DELETE FROM rowvault_locks WHERE lock_key = $1 AND owner = $2")
            .bind(key)
            .bind(owner)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

/// Object-store-backed lock: claims a
/// well-known key via [`rowvault_storage::ObjectStoreClient::read_modify_write`].
/// The modify closure only overwrites the stored record when it is vacant,
/// stale, or already owned by us — so a write against a live foreign lock is
/// a harmless no-op, and the caller distinguishes success from contention by
/// comparing the returned record's owner against its own.
pub struct DistributedLockBackend<'a> {
    client: &'a rowvault_storage::ObjectStoreClient,
    prefix: String,
}

impl<'a> DistributedLockBackend<'a> {
    pub fn new(client: &'a rowvault_storage::ObjectStoreClient, prefix: impl Into<String>) -> Self {
        Self { client, prefix: prefix.into() }
    }

    fn object_key(&self, key: &str) -> String {
        format!("{}/locks/{}.json", self.prefix, key.replace(['/', '.'], "_"))
    }
}

#[async_trait]
impl<'a> LockBackend for DistributedLockBackend<'a> {
    async fn try_acquire(&self, key: &str, owner: &str, ttl: Duration) -> Result<(), LockError> {
        let object_key = self.object_key(key);
        let owner = owner.to_string();
        let ttl_secs = ttl.as_secs() as i64;
        let result = self
            .client
            .read_modify_write(
                &object_key,
                LockRecord::vacant,
                |record: &mut LockRecord| {
                    let now = Utc::now();
                    if record.is_stale(now) || record.owner == owner {
                        *record = LockRecord {
                            owner: owner.clone(),
                            acquired_at: now,
                            last_heartbeat: now,
                            ttl_secs,
                        };
                    }
                },
                5,
            )
            .await?;

        if result.owner == owner {
            Ok(())
        } else {
            Err(LockError::AlreadyHeld {
                owner: result.owner,
                acquired_at: result.acquired_at.to_rfc3339(),
            })
        }
    }

    async fn heartbeat(&self, key: &str, owner: &str, ttl: Duration) -> Result<(), LockError> {
        let object_key = self.object_key(key);
        let owner = owner.to_string();
        let ttl_secs = ttl.as_secs() as i64;
        let result = self
            .client
            .read_modify_write(
                &object_key,
                LockRecord::vacant,
                |record: &mut LockRecord| {
                    if record.owner == owner {
                        record.last_heartbeat = Utc::now();
                        record.ttl_secs = ttl_secs;
                    }
                },
                5,
            )
            .await?;

        if result.owner == owner {
            Ok(())
        } else {
            Err(LockError::HeartbeatLost { last_seen_secs_ago: -1, ttl_secs })
        }
    }

    async fn release(&self, key: &str, owner: &str) -> Result<(), LockError> {
        let object_key = self.object_key(key);
        let owner = owner.to_string();
        self.client
            .read_modify_write(
                &object_key,
                LockRecord::vacant,
                |record: &mut LockRecord| {
                    if record.owner == owner {
                        *record = LockRecord::vacant();
                    }
                },
                5,
            )
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vacant_record_is_stale() {
        assert!(LockRecord::vacant().is_stale(Utc::now()));
    }

    #[test]
    fn fresh_record_is_not_stale() {
        let now = Utc::now();
        let record = LockRecord { owner: "a".into(), acquired_at: now, last_heartbeat: now, ttl_secs: 120 };
        assert!(!record.is_stale(now));
    }

    #[test]
    fn record_past_2x_ttl_is_stale() {
        let now = Utc::now();
        let record = LockRecord {
            owner: "a".into(),
            acquired_at: now - ChronoDuration::seconds(500),
            last_heartbeat: now - ChronoDuration::seconds(500),
            ttl_secs: 120,
        };
        assert!(record.is_stale(now));
    }
}
