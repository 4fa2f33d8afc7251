//! Object-store client: a resilient facade over `opendal::Operator`
//! adding rate limiting, circuit breaking, local-disk fallback, and
//! multipart upload orchestration.

pub mod circuit_breaker;
pub mod client;
pub mod error;
pub mod fallback;
pub mod multipart;
pub mod rate_limit;

pub use circuit_breaker::{CircuitBreaker, CircuitState};
pub use client::{ClientConfig, ObjectHead, ObjectStoreClient, PutOptions};
pub use error::StorageError;
pub use fallback::{FallbackDir, FallbackIndexRecord};
pub use multipart::{upload_in_parts, MultipartUpload};
pub use rate_limit::AdaptivePrefixLimiter;
