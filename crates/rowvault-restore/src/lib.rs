//! C11 Restore Engine: inverts the archival pipeline — list
//! objects, stream-decode, reconcile schema, bulk-load with conflict
//! resolution, advance the restore watermark.

pub mod conflict;
pub mod engine;
pub mod error;
pub mod migration;
pub mod selector;
pub mod watermark;

pub use conflict::ConflictStrategy;
pub use engine::{RestoreEngine, RestoreOptions, RestoreReport};
pub use error::RestoreError;
pub use migration::SchemaMigrationStrategy;
pub use selector::RestoreSelector;
pub use watermark::RestoreWatermarkStore;
