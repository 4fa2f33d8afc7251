//! Checksum verification: the pre-compression SHA-256 recorded in
//! `MetadataRecord` is recomputed and compared both at verify time and on
//! scheduled/restore-time validation.

use crate::error::VerifyError;
use sha2::{Digest, Sha256};

pub fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

pub fn verify_checksum(expected: &str, bytes: &[u8]) -> Result<(), VerifyError> {
    let actual = sha256_hex(bytes);
    if actual == expected {
        Ok(())
    } else {
        Err(VerifyError::ChecksumMismatch { expected: expected.to_string(), actual })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matching_checksum_passes() {
        let bytes = b"hello world";
        let digest = sha256_hex(bytes);
        assert!(verify_checksum(&digest, bytes).is_ok());
    }

    #[test]
    fn mismatched_checksum_fails() {
        assert!(verify_checksum("deadbeef", b"hello world").is_err());
    }
}
