//! Shared data model, serializer/codec, fingerprinting, object-key layout,
//! and error taxonomy for the rowvault archival engine.

pub mod codec;
pub mod error;
pub mod fingerprint;
pub mod model;
pub mod object_key;
pub mod retry;

pub const ARCHIVER_VERSION: &str = env!("CARGO_PKG_VERSION");
