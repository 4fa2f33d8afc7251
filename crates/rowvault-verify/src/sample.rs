//! Post-commit sample absence check: after the delete commits, a
//! random sample of the deleted primary keys is queried back against the
//! source; any hit is a critical alert, since it means rows thought to be
//! deleted are still present.

use crate::error::VerifyError;
use rand::seq::SliceRandom;
use rowvault_core::model::{PrimaryKey, TableTarget};
use sqlx::PgPool;

/// `min(1000, max(10, 1% of batch))`.
pub fn sample_size(batch_len: usize) -> usize {
    let one_percent = batch_len / 100;
    one_percent.max(10).min(1000).min(batch_len)
}

fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

pub fn choose_sample(primary_keys: &[PrimaryKey]) -> Vec<PrimaryKey> {
    let mut rng = rand::thread_rng();
    let n = sample_size(primary_keys.len());
    let mut pool = primary_keys.to_vec();
    pool.shuffle(&mut rng);
    pool.truncate(n);
    pool
}

/// Queries the source for any of `sample` still present. Any result is a
/// correctness failure — the deletion should have removed all of them.
pub async fn check_sample_absent(
    pool: &PgPool,
    target: &TableTarget,
    sample: &[PrimaryKey],
) -> Result<(), VerifyError> {
    if sample.is_empty() {
        return Ok(());
    }
    let pk_ident = quote_ident(&target.primary_key_column);
    let placeholders: Vec<String> = (1..=sample.len()).map(|i| format!("${i}::text")).collect();
    let sql = format!(
        "SELECT {pk_ident}::text FROM {}.{} WHERE {pk_ident}::text IN ({})",
        quote_ident(&target.schema),
        quote_ident(&target.table),
        placeholders.join(", ")
    );

    let mut query = sqlx::query_as::<_, (String,)>(&sql);
    for pk in sample {
        query = query.bind(pk.to_string());
    }
    let found: Vec<(String,)> = query.fetch_all(pool).await.map_err(rowvault_db::DbError::from)?;

    if found.is_empty() {
        Ok(())
    } else {
        Err(VerifyError::SampleAbsenceFailed(
            found.into_iter().map(|(text,)| PrimaryKey::Text(text)).collect(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sample_size_floor_is_ten() {
        assert_eq!(sample_size(50), 10);
    }

    #[test]
    fn sample_size_is_one_percent_above_floor() {
        assert_eq!(sample_size(5000), 50);
    }

    #[test]
    fn sample_size_cap_is_one_thousand() {
        assert_eq!(sample_size(1_000_000), 1000);
    }

    #[test]
    fn sample_size_never_exceeds_batch_len() {
        assert_eq!(sample_size(3), 3);
    }
}
