//! Primary-key set equality: the set of keys passed to the delete
//! must equal the set present in the serialized object. A SHA-256 over the
//! sorted key list is stored in the `DeletionManifest` for later audit.

use crate::error::VerifyError;
use rowvault_core::model::PrimaryKey;
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;

pub fn sorted_primary_keys_sha256(primary_keys: &[PrimaryKey]) -> (Vec<PrimaryKey>, String) {
    let mut sorted = primary_keys.to_vec();
    sorted.sort();
    let joined = sorted.iter().map(|pk| pk.to_string()).collect::<Vec<_>>().join("\u{0}");
    (sorted, hex::encode(Sha256::digest(joined.as_bytes())))
}

pub fn assert_sets_equal(delete_set: &[PrimaryKey], object_set: &[PrimaryKey]) -> Result<(), VerifyError> {
    let delete: BTreeSet<&PrimaryKey> = delete_set.iter().collect();
    let object: BTreeSet<&PrimaryKey> = object_set.iter().collect();
    if delete == object {
        Ok(())
    } else {
        Err(VerifyError::PrimaryKeySetMismatch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_sets_pass_regardless_of_order() {
        let a = vec![PrimaryKey::Integer(1), PrimaryKey::Integer(2), PrimaryKey::Integer(3)];
        let b = vec![PrimaryKey::Integer(3), PrimaryKey::Integer(1), PrimaryKey::Integer(2)];
        assert!(assert_sets_equal(&a, &b).is_ok());
    }

    #[test]
    fn differing_sets_fail() {
        let a = vec![PrimaryKey::Integer(1), PrimaryKey::Integer(2)];
        let b = vec![PrimaryKey::Integer(1), PrimaryKey::Integer(3)];
        assert!(assert_sets_equal(&a, &b).is_err());
    }

    #[test]
    fn digest_is_order_independent() {
        let a = vec![PrimaryKey::Integer(2), PrimaryKey::Integer(1)];
        let b = vec![PrimaryKey::Integer(1), PrimaryKey::Integer(2)];
        let (_, digest_a) = sorted_primary_keys_sha256(&a);
        let (_, digest_b) = sorted_primary_keys_sha256(&b);
        assert_eq!(digest_a, digest_b);
    }
}
