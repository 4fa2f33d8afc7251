//! Local-disk fallback for puts that exhaust their retry budget: the
//! payload is written atomically alongside an index record, and a cleanup
//! task resumes these on the next run.

use crate::error::StorageError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FallbackIndexRecord {
    pub object_key: String,
    pub metadata: serde_json::Value,
    pub storage_class: Option<String>,
    pub sse_option: Option<String>,
    pub recorded_at: chrono::DateTime<chrono::Utc>,
}

pub struct FallbackDir {
    root: PathBuf,
}

fn slug(object_key: &str) -> String {
    object_key.replace(['/', '\\'], "_")
}

impl FallbackDir {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn payload_path(&self, object_key: &str) -> PathBuf {
        self.root.join(format!("{}.bin", slug(object_key)))
    }

    fn index_path(&self, object_key: &str) -> PathBuf {
        self.root.join(format!("{}.index.json", slug(object_key)))
    }

    /// Writes `bytes` and its index record atomically (write to a temp file,
    /// then rename), so a crash mid-write never leaves a half-written entry.
    pub async fn stash(
        &self,
        object_key: &str,
        bytes: &[u8],
        record: &FallbackIndexRecord,
    ) -> Result<(), StorageError> {
        tokio::fs::create_dir_all(&self.root).await?;

        let payload_path = self.payload_path(object_key);
        let tmp_payload = payload_path.with_extension("bin.tmp");
        let mut file = tokio::fs::File::create(&tmp_payload).await?;
        file.write_all(bytes).await?;
        file.sync_all().await?;
        tokio::fs::rename(&tmp_payload, &payload_path).await?;

        let index_path = self.index_path(object_key);
        let tmp_index = index_path.with_extension("index.json.tmp");
        tokio::fs::write(&tmp_index, serde_json::to_vec_pretty(record)?).await?;
        tokio::fs::rename(&tmp_index, &index_path).await?;

        tracing::warn!(object_key, path = %payload_path.display(), "stashed object to local fallback after retry exhaustion");
        Ok(())
    }

    /// Lists every `(record, payload_path)` pair currently stashed, for the
    /// cleanup task to resume on the next run.
    pub async fn pending(&self) -> Result<Vec<(FallbackIndexRecord, PathBuf)>, StorageError> {
        let mut out = Vec::new();
        let Ok(mut entries) = tokio::fs::read_dir(&self.root).await else {
            return Ok(out);
        };
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) == Some("json")
                && path.to_string_lossy().ends_with(".index.json")
            {
                let bytes = tokio::fs::read(&path).await?;
                let record: FallbackIndexRecord = serde_json::from_slice(&bytes)?;
                let payload = self.payload_path(&record.object_key);
                if payload.exists() {
                    out.push((record, payload));
                }
            }
        }
        Ok(out)
    }

    pub async fn clear(&self, object_key: &str) -> Result<(), StorageError> {
        let _ = tokio::fs::remove_file(self.payload_path(object_key)).await;
        let _ = tokio::fs::remove_file(self.index_path(object_key)).await;
        Ok(())
    }
}

pub fn fallback_dir_for(root: &Path) -> FallbackDir {
    FallbackDir::new(root.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn stash_and_list_pending() {
        let dir = tempfile::tempdir().unwrap();
        let fallback = FallbackDir::new(dir.path());
        let record = FallbackIndexRecord {
            object_key: "archive/db1/public/t/year=2026/month=01/day=01/t_batch_000.jsonl.gz".into(),
            metadata: serde_json::json!({"rows": 10}),
            storage_class: None,
            sse_option: None,
            recorded_at: chrono::Utc::now(),
        };
        fallback.stash(&record.object_key, b"payload", &record).await.unwrap();

        let pending = fallback.pending().await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].0.object_key, record.object_key);

        fallback.clear(&record.object_key).await.unwrap();
        assert!(fallback.pending().await.unwrap().is_empty());
    }
}
