//! Watermark store: the durable `(timestamp, primary
//! key)` progress cursor per `(database, schema, table)`, stored at a
//! well-known object key and integrity-checked by content hash at load.
//!
//! Updates happen only while the per-table lock is held, so a plain
//! retrying put is sufficient here rather than a compare-and-swap — the
//! Lock Manager is the thing guaranteeing single-writer, not this store.

use crate::error::StateError;
use rowvault_core::model::Watermark;
use rowvault_core::object_key::watermark_object_key;
use rowvault_storage::{ObjectStoreClient, PutOptions};
use sha2::{Digest, Sha256};

/// Recomputed at both save and load time; any mismatch at load means the
/// object was corrupted or truncated in flight.
pub fn content_hash(last_ts: chrono::DateTime<chrono::Utc>, last_pk: &rowvault_core::model::PrimaryKey, cumulative_rows: u64) -> String {
    let mut hasher = Sha256::new();
    hasher.update(last_ts.to_rfc3339().as_bytes());
    hasher.update(b"\0");
    hasher.update(last_pk.to_string().as_bytes());
    hasher.update(b"\0");
    hasher.update(cumulative_rows.to_le_bytes());
    hex::encode(hasher.finalize())
}

pub struct WatermarkStore<'a> {
    client: &'a ObjectStoreClient,
    prefix: String,
}

impl<'a> WatermarkStore<'a> {
    pub fn new(client: &'a ObjectStoreClient, prefix: impl Into<String>) -> Self {
        Self { client, prefix: prefix.into() }
    }

    pub async fn load(&self, database: &str, schema: &str, table: &str) -> Result<Option<Watermark>, StateError> {
        let key = watermark_object_key(&self.prefix, database, schema, table);
        let bytes = match self.client.get(&key).await {
            Ok(bytes) => bytes,
            Err(rowvault_storage::StorageError::Backend(e)) if e.kind() == opendal::ErrorKind::NotFound => {
                return Ok(None)
            }
            Err(other) => return Err(other.into()),
        };
        let watermark: Watermark = serde_json::from_slice(&bytes)?;
        let expected = content_hash(watermark.last_ts, &watermark.last_pk, watermark.cumulative_rows);
        if expected != watermark.content_sha256 {
            return Err(StateError::IntegrityCheckFailed {
                expected,
                actual: watermark.content_sha256,
            });
        }
        Ok(Some(watermark))
    }

    /// Writes `new_watermark` after checking it is a monotonic successor of
    /// whatever is currently stored.
    pub async fn advance(
        &self,
        database: &str,
        schema: &str,
        table: &str,
        mut new_watermark: Watermark,
    ) -> Result<Watermark, StateError> {
        if let Some(existing) = self.load(database, schema, table).await? {
            if !new_watermark.is_monotonic_successor_of(&existing) {
                return Err(StateError::NonMonotonicWatermark {
                    old_ts: existing.last_ts.to_rfc3339(),
                    old_pk: existing.last_pk.to_string(),
                    new_ts: new_watermark.last_ts.to_rfc3339(),
                    new_pk: new_watermark.last_pk.to_string(),
                });
            }
        }

        new_watermark.content_sha256 = content_hash(new_watermark.last_ts, &new_watermark.last_pk, new_watermark.cumulative_rows);
        let key = watermark_object_key(&self.prefix, database, schema, table);
        let bytes = serde_json::to_vec_pretty(&new_watermark)?;
        self.client.put(&key, bytes, &PutOptions::default()).await?;
        Ok(new_watermark)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use opendal::services::Memory;
    use opendal::Operator;
    use rowvault_core::model::PrimaryKey;
    use rowvault_storage::ClientConfig;

    fn test_client() -> ObjectStoreClient {
        let operator = Operator::new(Memory::default()).unwrap().finish();
        ObjectStoreClient::new(operator, ClientConfig {
            fallback_dir: std::env::temp_dir().join("rowvault-state-test-fallback"),
            ..ClientConfig::default()
        })
    }

    fn watermark(ts_offset_secs: i64, pk: i64, rows: u64) -> Watermark {
        Watermark {
            last_ts: chrono::Utc::now() + chrono::Duration::seconds(ts_offset_secs),
            last_pk: PrimaryKey::Integer(pk),
            cumulative_rows: rows,
            content_sha256: String::new(),
        }
    }

    #[tokio::test]
    async fn load_returns_none_when_absent() {
        let client = test_client();
        let store = WatermarkStore::new(&client, "archive");
        assert!(store.load("db1", "public", "t").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn advance_then_load_round_trips() {
        let client = test_client();
        let store = WatermarkStore::new(&client, "archive");
        store.advance("db1", "public", "t", watermark(0, 1, 10)).await.unwrap();
        let loaded = store.load("db1", "public", "t").await.unwrap().unwrap();
        assert_eq!(loaded.cumulative_rows, 10);
    }

    #[tokio::test]
    async fn non_monotonic_advance_is_rejected() {
        let client = test_client();
        let store = WatermarkStore::new(&client, "archive");
        store.advance("db1", "public", "t", watermark(100, 5, 10)).await.unwrap();
        let result = store.advance("db1", "public", "t", watermark(0, 1, 5)).await;
        assert!(matches!(result, Err(StateError::NonMonotonicWatermark { .. })));
    }
}
