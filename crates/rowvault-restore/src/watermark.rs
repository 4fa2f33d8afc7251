//! Restore watermark store: persists which data objects have
//! already been loaded for a (database, schema, table), so a rerun is a
//! no-op unless `ignore_restore_watermark` is set.

use crate::error::RestoreError;
use chrono::Utc;
use rowvault_core::model::RestoreWatermark;
use rowvault_core::object_key::restore_watermark_object_key;
use rowvault_storage::{ObjectStoreClient, PutOptions};

pub struct RestoreWatermarkStore<'a> {
    client: &'a ObjectStoreClient,
    prefix: String,
}

impl<'a> RestoreWatermarkStore<'a> {
    pub fn new(client: &'a ObjectStoreClient, prefix: impl Into<String>) -> Self {
        Self { client, prefix: prefix.into() }
    }

    pub async fn load(&self, database: &str, schema: &str, table: &str) -> Result<RestoreWatermark, RestoreError> {
        let key = restore_watermark_object_key(&self.prefix, database, schema, table);
        match self.client.get(&key).await {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(rowvault_storage::StorageError::Backend(e)) if e.kind() == opendal::ErrorKind::NotFound => {
                Ok(RestoreWatermark::default())
            }
            Err(other) => Err(other.into()),
        }
    }

    pub async fn record(
        &self,
        database: &str,
        schema: &str,
        table: &str,
        object_key: &str,
    ) -> Result<(), RestoreError> {
        let key = restore_watermark_object_key(&self.prefix, database, schema, table);
        self.client
            .read_modify_write(
                &key,
                RestoreWatermark::default,
                |watermark: &mut RestoreWatermark| watermark.record(object_key.to_string(), Utc::now()),
                5,
            )
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use opendal::services::Memory;
    use opendal::Operator;
    use rowvault_storage::ClientConfig;

    fn test_client() -> ObjectStoreClient {
        let operator = Operator::new(Memory::default()).unwrap().finish();
        ObjectStoreClient::new(operator, ClientConfig {
            fallback_dir: std::env::temp_dir().join("rowvault-restore-test-fallback"),
            ..ClientConfig::default()
        })
    }

    #[tokio::test]
    async fn absent_watermark_loads_empty() {
        let client = test_client();
        let store = RestoreWatermarkStore::new(&client, "archive");
        let loaded = store.load("db1", "public", "t").await.unwrap();
        assert!(loaded.restored_object_keys.is_empty());
    }

    #[tokio::test]
    async fn recording_an_object_persists_across_loads() {
        let client = test_client();
        let store = RestoreWatermarkStore::new(&client, "archive");
        store.record("db1", "public", "t", "archive/db1/public/t/obj1.jsonl.gz").await.unwrap();
        let loaded = store.load("db1", "public", "t").await.unwrap();
        assert!(loaded.has_restored("archive/db1/public/t/obj1.jsonl.gz"));
    }
}
