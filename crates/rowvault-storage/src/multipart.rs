//! Multipart upload orchestration: objects above the configured
//! threshold are split into fixed-size parts (the last part may be
//! smaller), each retried independently, with part state persisted before
//! the first attempt of each part so a crash mid-upload can resume instead
//! of restarting. Parts are staged as their own objects under a
//! `<key>.part-NNNNN` naming scheme and stitched into the final object on
//! completion, since the underlying backends (fs/s3/memory) are reached
//! only through [`ObjectStoreClient`]'s retrying, fallback-backed writes.

use crate::client::{ObjectStoreClient, PutOptions};
use crate::error::StorageError;
use rowvault_core::model::{MultipartUploadState, UploadPart};
use sha2::{Digest, Sha256};

fn part_key(object_key: &str, part_number: u32) -> String {
    format!("{object_key}.part-{part_number:05}")
}

/// A handle to an in-progress multipart upload. The caller should persist
/// `state()` (typically via the checkpoint store) after every successful
/// part so the upload can be resumed after a crash instead of restarted.
pub struct MultipartUpload<'a> {
    client: &'a ObjectStoreClient,
    state: MultipartUploadState,
}

impl<'a> MultipartUpload<'a> {
    pub fn begin(client: &'a ObjectStoreClient, object_key: &str) -> Self {
        Self {
            client,
            state: MultipartUploadState {
                upload_id: uuid::Uuid::new_v4().to_string(),
                object_key: object_key.to_string(),
                parts: Vec::new(),
            },
        }
    }

    /// Resumes an upload whose state was persisted before a crash.
    pub fn resume(client: &'a ObjectStoreClient, state: MultipartUploadState) -> Self {
        Self { client, state }
    }

    pub fn state(&self) -> &MultipartUploadState {
        &self.state
    }

    /// Uploads one part. The part's length and content digest are recorded
    /// in `state` *before* the first attempt; `put_direct` itself
    /// retries transient failures with full-jitter backoff. Parts always go
    /// through the direct path, never `put`, since a part is by definition
    /// below the multipart threshold only by accident of chunking.
    pub async fn put_part(&mut self, part_number: u32, bytes: &[u8]) -> Result<(), StorageError> {
        let digest = hex::encode(Sha256::digest(bytes));
        self.state.parts.push(UploadPart {
            part_number,
            length: bytes.len() as u64,
            etag: digest,
        });

        let key = part_key(&self.state.object_key, part_number);
        self.client.put_direct(&key, bytes.to_vec(), &PutOptions::default()).await
    }

    /// Reassembles the parts (in order) into the final object, then removes
    /// the per-part staging objects. Uses `put_direct`: the reassembled
    /// object is exactly the size that triggered multipart upload in the
    /// first place, so going through `put` here would recurse.
    pub async fn complete(self, options: &PutOptions) -> Result<(), StorageError> {
        let mut assembled = Vec::new();
        let mut parts = self.state.parts.clone();
        parts.sort_by_key(|p| p.part_number);
        for part in &parts {
            let key = part_key(&self.state.object_key, part.part_number);
            assembled.extend(self.client.get(&key).await?);
        }
        self.client.put_direct(&self.state.object_key, assembled, options).await?;
        for part in &parts {
            let key = part_key(&self.state.object_key, part.part_number);
            let _ = self.client.delete(&key).await;
        }
        Ok(())
    }

    /// Removes any part objects already staged, abandoning the upload.
    pub async fn abort(self) -> Result<(), StorageError> {
        for part in &self.state.parts {
            let key = part_key(&self.state.object_key, part.part_number);
            let _ = self.client.delete(&key).await;
        }
        Ok(())
    }
}

/// Splits `bytes` into fixed-size chunks (last chunk may be smaller),
/// uploading each through [`MultipartUpload::put_part`] and persisting
/// state via `on_part_committed` after each successful part.
pub async fn upload_in_parts<F, Fut>(
    client: &ObjectStoreClient,
    object_key: &str,
    bytes: &[u8],
    part_size: usize,
    options: &PutOptions,
    mut on_part_committed: F,
) -> Result<MultipartUploadState, StorageError>
where
    F: FnMut(MultipartUploadState) -> Fut,
    Fut: std::future::Future<Output = ()>,
{
    let mut upload = MultipartUpload::begin(client, object_key);
    for (index, chunk) in bytes.chunks(part_size.max(1)).enumerate() {
        upload.put_part(index as u32 + 1, chunk).await?;
        on_part_committed(upload.state().clone()).await;
    }
    let state = upload.state().clone();
    upload.complete(options).await?;
    Ok(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::ClientConfig;
    use opendal::services::Memory;
    use opendal::Operator;

    fn test_client() -> ObjectStoreClient {
        let operator = Operator::new(Memory::default()).unwrap().finish();
        ObjectStoreClient::new(
            operator,
            ClientConfig {
                fallback_dir: std::env::temp_dir().join("rowvault-multipart-test-fallback"),
                ..ClientConfig::default()
            },
        )
    }

    #[tokio::test]
    async fn splits_and_reassembles_bytes() {
        let client = test_client();
        let payload = vec![7u8; 25];
        let state = upload_in_parts(&client, "big.bin", &payload, 10, &PutOptions::default(), |_| async {})
            .await
            .unwrap();

        assert_eq!(state.parts.len(), 3);
        assert_eq!(state.parts[2].length, 5);

        let roundtripped = client.get("big.bin").await.unwrap();
        assert_eq!(roundtripped, payload);
    }

    #[tokio::test]
    async fn abort_cleans_up_staged_parts() {
        let client = test_client();
        let mut upload = MultipartUpload::begin(&client, "abandoned.bin");
        upload.put_part(1, b"part one").await.unwrap();
        let part_key = part_key("abandoned.bin", 1);
        assert!(client.head(&part_key).await.unwrap().is_some());

        upload.abort().await.unwrap();
        assert!(client.head(&part_key).await.unwrap().is_none());
    }
}
