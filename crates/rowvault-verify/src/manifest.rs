//! Deletion manifest generation: written to
//! object storage before the source-DB delete is committed, so the
//! manifest always exists for any delete that happened.

use crate::pkset::sorted_primary_keys_sha256;
use chrono::Utc;
use rowvault_core::model::{DeletionManifest, PrimaryKey};
use sha2::{Digest, Sha256};

/// The delete-statement digest is SHA-256 over the
/// normalized parameterized SQL text concatenated with the primary-key
/// list's own SHA-256, so the same statement shape against different key
/// sets still yields a distinguishable digest.
pub fn delete_statement_digest(normalized_sql: &str, primary_keys_sha256: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(normalized_sql.as_bytes());
    hasher.update(b"\0");
    hasher.update(primary_keys_sha256.as_bytes());
    hex::encode(hasher.finalize())
}

#[allow(clippy::too_many_arguments)]
pub fn build_deletion_manifest(
    fingerprint: &str,
    database: &str,
    schema: &str,
    table: &str,
    primary_keys: &[PrimaryKey],
    normalized_delete_sql: &str,
    committed_row_count: u64,
) -> DeletionManifest {
    let (sorted_keys, primary_keys_sha256) = sorted_primary_keys_sha256(primary_keys);
    let delete_statement_digest = delete_statement_digest(normalized_delete_sql, &primary_keys_sha256);

    DeletionManifest {
        fingerprint: fingerprint.to_string(),
        database: database.to_string(),
        schema: schema.to_string(),
        table: table.to_string(),
        delete_time: Utc::now(),
        primary_keys: sorted_keys,
        primary_keys_sha256,
        delete_statement_digest,
        committed_row_count,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digest_is_stable_for_same_inputs() {
        let a = delete_statement_digest("DELETE FROM t WHERE pk IN ($1)", "abc");
        let b = delete_statement_digest("DELETE FROM t WHERE pk IN ($1)", "abc");
        assert_eq!(a, b);
    }

    #[test]
    fn digest_changes_with_key_set() {
        let a = delete_statement_digest("DELETE FROM t WHERE pk IN ($1)", "abc");
        let b = delete_statement_digest("DELETE FROM t WHERE pk IN ($1)", "xyz");
        assert_ne!(a, b);
    }
}
