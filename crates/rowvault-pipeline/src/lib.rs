//! Batch Pipeline and Table Orchestrator: drives one
//! table's backlog to completion, batch by batch, through the
//! verify-then-delete state machine.

pub mod audit;
pub mod batch;
pub mod error;
pub mod metrics;
pub mod sizing;
pub mod state;
pub mod table;

pub use audit::AuditLogger;
pub use batch::{BatchContext, BatchOutcome, BatchPipeline};
pub use error::PipelineError;
pub use sizing::{AdaptiveBatchSizer, SizingConfig};
pub use state::PipelineState;
pub use table::{TableOrchestrator, TableOrchestratorConfig};
