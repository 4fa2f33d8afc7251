//! Verifier: three-way count check, checksum verification,
//! primary-key set equality, deletion manifest generation, and the
//! post-commit sample absence check.

pub mod checksum;
pub mod counts;
pub mod error;
pub mod manifest;
pub mod pkset;
pub mod sample;

pub use checksum::{sha256_hex, verify_checksum};
pub use counts::ThreeWayCount;
pub use error::VerifyError;
pub use manifest::{build_deletion_manifest, delete_statement_digest};
pub use pkset::{assert_sets_equal, sorted_primary_keys_sha256};
pub use sample::{check_sample_absent, choose_sample, sample_size};
