//! Checkpoint store: persisted every N completed
//! batches so a crash mid-table resumes instead of restarting. Cleared on
//! clean completion; stale checkpoints are garbage-collected.

use crate::error::StateError;
use chrono::{DateTime, Duration, Utc};
use rowvault_core::model::Checkpoint;
use rowvault_storage::{ObjectStoreClient, PutOptions};

fn checkpoint_object_key(prefix: &str, database: &str, schema: &str, table: &str) -> String {
    format!("{prefix}/{database}/{schema}/{table}/_checkpoint.json")
}

pub struct CheckpointStore<'a> {
    client: &'a ObjectStoreClient,
    prefix: String,
    /// Persist every N completed batches, default 10.
    pub interval_batches: u64,
}

impl<'a> CheckpointStore<'a> {
    pub fn new(client: &'a ObjectStoreClient, prefix: impl Into<String>) -> Self {
        Self { client, prefix: prefix.into(), interval_batches: 10 }
    }

    pub fn should_checkpoint(&self, batches_completed_since_last: u64) -> bool {
        batches_completed_since_last >= self.interval_batches
    }

    pub async fn save(&self, checkpoint: &Checkpoint) -> Result<(), StateError> {
        let key = checkpoint_object_key(&self.prefix, &checkpoint.database, &checkpoint.schema, &checkpoint.table);
        let bytes = serde_json::to_vec_pretty(checkpoint)?;
        self.client.put(&key, bytes, &PutOptions::default()).await?;
        Ok(())
    }

    pub async fn load(&self, database: &str, schema: &str, table: &str) -> Result<Option<Checkpoint>, StateError> {
        let key = checkpoint_object_key(&self.prefix, database, schema, table);
        match self.client.get(&key).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(rowvault_storage::StorageError::Backend(e)) if e.kind() == opendal::ErrorKind::NotFound => Ok(None),
            Err(other) => Err(other.into()),
        }
    }

    /// Cleared on clean completion of a table's run.
    pub async fn clear(&self, database: &str, schema: &str, table: &str) -> Result<(), StateError> {
        let key = checkpoint_object_key(&self.prefix, database, schema, table);
        match self.client.delete(&key).await {
            Ok(()) => Ok(()),
            Err(rowvault_storage::StorageError::Backend(e)) if e.kind() == opendal::ErrorKind::NotFound => Ok(()),
            Err(other) => Err(other.into()),
        }
    }

    /// Lists checkpoints under `prefix` older than `cutoff`, for garbage
    /// collection of abandoned runs.
    pub async fn stale_checkpoints(&self, cutoff: DateTime<Utc>) -> Result<Vec<Checkpoint>, StateError> {
        let keys = self.client.list(&self.prefix).await?;
        let mut stale = Vec::new();
        for key in keys.into_iter().filter(|k| k.ends_with("_checkpoint.json")) {
            if let Ok(bytes) = self.client.get(&key).await {
                if let Ok(checkpoint) = serde_json::from_slice::<Checkpoint>(&bytes) {
                    if checkpoint.created_at < cutoff {
                        stale.push(checkpoint);
                    }
                }
            }
        }
        Ok(stale)
    }

    pub async fn garbage_collect(&self, max_age: Duration) -> Result<usize, StateError> {
        let cutoff = Utc::now() - max_age;
        let stale = self.stale_checkpoints(cutoff).await?;
        for checkpoint in &stale {
            self.clear(&checkpoint.database, &checkpoint.schema, &checkpoint.table).await?;
        }
        Ok(stale.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use opendal::services::Memory;
    use opendal::Operator;
    use rowvault_core::model::{PrimaryKey, Watermark};
    use rowvault_storage::ClientConfig;

    fn test_client() -> ObjectStoreClient {
        let operator = Operator::new(Memory::default()).unwrap().finish();
        ObjectStoreClient::new(operator, ClientConfig {
            fallback_dir: std::env::temp_dir().join("rowvault-checkpoint-test-fallback"),
            ..ClientConfig::default()
        })
    }

    fn sample_checkpoint() -> Checkpoint {
        Checkpoint {
            database: "db1".into(),
            schema: "public".into(),
            table: "audit_logs".into(),
            batch_ordinal: 4,
            watermark: Watermark {
                last_ts: Utc::now(),
                last_pk: PrimaryKey::Integer(42),
                cumulative_rows: 400,
                content_sha256: "x".into(),
            },
            completed_fingerprints: vec!["fp1".into(), "fp2".into()],
            open_multipart_uploads: vec![],
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn save_then_load_round_trips() {
        let client = test_client();
        let store = CheckpointStore::new(&client, "archive");
        store.save(&sample_checkpoint()).await.unwrap();
        let loaded = store.load("db1", "public", "audit_logs").await.unwrap().unwrap();
        assert_eq!(loaded.batch_ordinal, 4);
        assert_eq!(loaded.completed_fingerprints.len(), 2);
    }

    #[tokio::test]
    async fn clear_removes_checkpoint() {
        let client = test_client();
        let store = CheckpointStore::new(&client, "archive");
        store.save(&sample_checkpoint()).await.unwrap();
        store.clear("db1", "public", "audit_logs").await.unwrap();
        assert!(store.load("db1", "public", "audit_logs").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn should_checkpoint_respects_interval() {
        let client = test_client();
        let store = CheckpointStore::new(&client, "archive");
        assert!(!store.should_checkpoint(9));
        assert!(store.should_checkpoint(10));
    }
}
