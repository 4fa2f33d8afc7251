//! Lock Manager: two layers of mutual exclusion — a process-wide
//! single-instance lock and per-table locks — over a pluggable backend
//! (file, database-row, or object-store), each with an independent
//! heartbeat task and stale-lock detection at 2x TTL.

pub mod backend;
pub mod error;
pub mod manager;

pub use backend::{DbAdvisoryLockBackend, DistributedLockBackend, FileLockBackend, LockBackend, LockRecord};
pub use error::LockError;
pub use manager::{table_key, LockGuard, LockManager, PROCESS_LOCK_TTL, TABLE_LOCK_TTL};
