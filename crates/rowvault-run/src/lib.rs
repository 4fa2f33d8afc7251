//! Run orchestrator: the run-wide entry point. Connects every
//! configured database, acquires the process lock, then drives databases
//! bounded-parallel through a `tokio::task::JoinSet` while each database's
//! tables run one at a time through [`rowvault_pipeline::TableOrchestrator`].
//! Owns the [`rowvault_lock::LockManager`] and notification fan-out for the
//! run's lifetime and writes a [`rowvault_core::model::FailureReport`] to
//! object storage when any table fails.

mod error;
mod orchestrator;

pub use error::RunError;
pub use orchestrator::{RunOptions, RunOrchestrator};
