//! Two layers of mutual exclusion: a process-wide single-instance
//! lock acquired at startup, and a per-table lock acquired before each
//! table runs. Both are driven by the same [`LockBackend`] and heartbeat on
//! an independent `tokio::time::interval` task.

use crate::backend::LockBackend;
use crate::error::LockError;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Process-wide lock TTL default: stale if no heartbeat for 2x this.
pub const PROCESS_LOCK_TTL: Duration = Duration::from_secs(5 * 60);
pub const PROCESS_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(60);

/// Per-table lock defaults: heartbeat every 30s, TTL 120 min.
pub const TABLE_LOCK_TTL: Duration = Duration::from_secs(120 * 60);
pub const TABLE_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

fn process_key() -> &'static str {
    "__process__"
}

pub fn table_key(database: &str, schema: &str, table: &str) -> String {
    format!("{database}.{schema}.{table}")
}

/// A held lock plus its background heartbeat task. Dropping the guard stops
/// the heartbeat but does not release the lock over the network — callers
/// MUST call [`LockGuard::release`] on every exit path (commit, rollback,
/// error) so a clean shutdown doesn't wait out the stale-lock TTL.
pub struct LockGuard {
    backend: Arc<dyn LockBackend>,
    key: String,
    owner: String,
    ttl: Duration,
    stop_tx: watch::Sender<bool>,
    heartbeat_task: Option<JoinHandle<()>>,
    /// Set when the heartbeat task observes a lost lock; a lost heartbeat
    /// aborts the current batch. Checked by the pipeline before committing.
    lost: Arc<std::sync::atomic::AtomicBool>,
}

impl LockGuard {
    pub fn is_lost(&self) -> bool {
        self.lost.load(std::sync::atomic::Ordering::SeqCst)
    }

    pub async fn release(mut self) -> Result<(), LockError> {
        let _ = self.stop_tx.send(true);
        if let Some(task) = self.heartbeat_task.take() {
            let _ = task.await;
        }
        self.backend.release(&self.key, &self.owner).await
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        let _ = self.stop_tx.send(true);
        if let Some(task) = self.heartbeat_task.take() {
            task.abort();
        }
    }
}

/// Acquires `key` against `backend`, then spawns a heartbeat task that fires
/// every `interval` until stopped or the lock is lost. `owner` should be
/// stable across heartbeats for one held lock (a UUID minted once at
/// acquire time) and distinct per archiver instance.
async fn acquire(
    backend: Arc<dyn LockBackend>,
    key: &str,
    owner: &str,
    ttl: Duration,
    interval: Duration,
) -> Result<LockGuard, LockError> {
    backend.try_acquire(key, owner, ttl).await?;

    let (stop_tx, mut stop_rx) = watch::channel(false);
    let lost = Arc::new(std::sync::atomic::AtomicBool::new(false));

    let task_backend = backend.clone();
    let task_key = key.to_string();
    let task_owner = owner.to_string();
    let task_lost = lost.clone();
    let heartbeat_task = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.tick().await; // first tick fires immediately; skip it, we just acquired
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(error) = task_backend.heartbeat(&task_key, &task_owner, ttl).await {
                        tracing::warn!(key = %task_key, %error, "lock heartbeat failed");
                        task_lost.store(true, std::sync::atomic::Ordering::SeqCst);
                    }
                }
                _ = stop_rx.changed() => {
                    if *stop_rx.borrow() {
                        break;
                    }
                }
            }
        }
    });

    Ok(LockGuard {
        backend,
        key: key.to_string(),
        owner: owner.to_string(),
        ttl,
        stop_tx,
        heartbeat_task: Some(heartbeat_task),
        lost,
    })
}

/// The run-wide entry point for both lock layers, owned by the Run
/// Orchestrator, which owns the lock manager handle for the run's lifetime.
pub struct LockManager {
    backend: Arc<dyn LockBackend>,
    owner: String,
}

impl LockManager {
    pub fn new(backend: Arc<dyn LockBackend>) -> Self {
        Self { backend, owner: uuid::Uuid::new_v4().to_string() }
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    /// Acquired at startup; released on graceful shutdown or detected as
    /// stale by a future instance after 2x `PROCESS_LOCK_TTL`.
    pub async fn acquire_process_lock(&self) -> Result<LockGuard, LockError> {
        acquire(self.backend.clone(), process_key(), &self.owner, PROCESS_LOCK_TTL, PROCESS_HEARTBEAT_INTERVAL).await
    }

    /// Acquired before a table runs, released after its final batch or on
    /// abort.
    pub async fn acquire_table_lock(&self, database: &str, schema: &str, table: &str) -> Result<LockGuard, LockError> {
        let key = table_key(database, schema, table);
        acquire(self.backend.clone(), &key, &self.owner, TABLE_LOCK_TTL, TABLE_HEARTBEAT_INTERVAL).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::FileLockBackend;

    #[tokio::test]
    async fn acquiring_table_lock_twice_from_different_owners_fails() {
        let dir = tempfile::tempdir().unwrap();
        let backend = Arc::new(FileLockBackend::new(dir.path()));
        let manager_a = LockManager::new(backend.clone());
        let manager_b = LockManager::new(backend);

        let guard_a = manager_a.acquire_table_lock("db", "public", "t").await.unwrap();
        let result_b = manager_b.acquire_table_lock("db", "public", "t").await;
        assert!(result_b.is_err());

        guard_a.release().await.unwrap();
        let guard_b = manager_b.acquire_table_lock("db", "public", "t").await;
        assert!(guard_b.is_ok());
    }

    #[tokio::test]
    async fn process_and_table_locks_are_independent_keys() {
        let dir = tempfile::tempdir().unwrap();
        let backend = Arc::new(FileLockBackend::new(dir.path()));
        let manager = LockManager::new(backend);

        let process_guard = manager.acquire_process_lock().await.unwrap();
        let table_guard = manager.acquire_table_lock("db", "public", "t").await.unwrap();
        process_guard.release().await.unwrap();
        table_guard.release().await.unwrap();
    }
}
