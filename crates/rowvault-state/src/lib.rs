//! Watermark & checkpoint store: durable per-table progress
//! cursor plus periodic resumable checkpoints, both object-backed.

pub mod checkpoint;
pub mod error;
pub mod watermark;

pub use checkpoint::CheckpointStore;
pub use error::StateError;
pub use watermark::{content_hash, WatermarkStore};
