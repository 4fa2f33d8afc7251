//! Compliance Gate: legal-hold, retention-bounds, and
//! encryption-required checks evaluated before a table's first batch.

pub mod encryption;
pub mod error;
pub mod gate;
pub mod legal_hold;
pub mod retention;

pub use error::ComplianceError;
pub use gate::{ComplianceGate, GateDecision};
pub use legal_hold::{evaluate_legal_holds, LegalHoldEvaluation, LegalHoldSource};
pub use retention::{RetentionBounds, RetentionPolicy};
