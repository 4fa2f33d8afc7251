//! Object store client: the unified surface every other
//! component uses to reach durable storage, wrapping an `opendal::Operator`
//! with rate limiting, circuit breaking, and local-disk fallback.

use crate::circuit_breaker::CircuitBreaker;
use crate::error::StorageError;
use crate::fallback::{FallbackDir, FallbackIndexRecord};
use crate::rate_limit::AdaptivePrefixLimiter;
use opendal::Operator;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::PathBuf;
use std::time::Duration;

struct TransientClassifier;

impl rowvault_core::retry::RetryClassifier<StorageError> for TransientClassifier {
    fn is_transient(&self, error: &StorageError) -> bool {
        error.is_transient()
    }
}

#[derive(Debug, Clone)]
pub struct ObjectHead {
    pub size: u64,
    pub etag: Option<String>,
}

#[derive(Debug, Clone)]
pub struct PutOptions {
    pub metadata: serde_json::Value,
    pub storage_class: Option<String>,
    pub sse_option: Option<String>,
}

impl Default for PutOptions {
    fn default() -> Self {
        Self {
            metadata: serde_json::Value::Null,
            storage_class: None,
            sse_option: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Objects above this size use multipart upload (default ~10 MiB).
    pub multipart_threshold_bytes: u64,
    /// Fixed part size; the last part may be smaller (default 5 MiB).
    pub part_size_bytes: u64,
    pub rate_limit_per_second: u32,
    pub rate_limit_cooldown: Duration,
    pub circuit_failure_threshold: u32,
    pub circuit_open_timeout: Duration,
    pub fallback_dir: PathBuf,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            multipart_threshold_bytes: 10 * 1024 * 1024,
            part_size_bytes: 5 * 1024 * 1024,
            rate_limit_per_second: 100,
            rate_limit_cooldown: Duration::from_secs(30),
            circuit_failure_threshold: 5,
            circuit_open_timeout: Duration::from_secs(60),
            fallback_dir: PathBuf::from("./rowvault-fallback"),
        }
    }
}

pub struct ObjectStoreClient {
    operator: Operator,
    config: ClientConfig,
    limiter: AdaptivePrefixLimiter,
    breaker: CircuitBreaker,
    fallback: FallbackDir,
}

impl ObjectStoreClient {
    pub fn new(operator: Operator, config: ClientConfig) -> Self {
        let limiter = AdaptivePrefixLimiter::new(config.rate_limit_per_second, config.rate_limit_cooldown);
        let breaker = CircuitBreaker::new(config.circuit_failure_threshold, config.circuit_open_timeout);
        let fallback = FallbackDir::new(config.fallback_dir.clone());
        Self {
            operator,
            config,
            limiter,
            breaker,
            fallback,
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn fallback(&self) -> &FallbackDir {
        &self.fallback
    }

    async fn guarded<T, F, Fut>(&self, op: F) -> Result<T, StorageError>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<T, opendal::Error>>,
    {
        if !self.breaker.allow_request() {
            return Err(StorageError::CircuitOpen);
        }
        self.limiter.acquire().await;
        match op().await {
            Ok(value) => {
                self.breaker.record_success();
                Ok(value)
            }
            Err(err) => {
                self.breaker.record_failure();
                if err.kind() == opendal::ErrorKind::RateLimited {
                    self.limiter.on_slow_down();
                }
                Err(StorageError::Backend(err))
            }
        }
    }

    /// Puts an object, transparently switching to multipart upload above
    /// `multipart_threshold_bytes`.
    pub async fn put(&self, key: &str, bytes: Vec<u8>, options: &PutOptions) -> Result<(), StorageError> {
        if bytes.len() as u64 > self.config.multipart_threshold_bytes {
            let part_size = self.config.part_size_bytes.max(1) as usize;
            crate::multipart::upload_in_parts(self, key, &bytes, part_size, options, |_state| async {}).await?;
            return Ok(());
        }
        self.put_direct(key, bytes, options).await
    }

    /// Writes a single object in one request, retrying transient failures
    /// before falling back to the local-disk staging area. Used directly by
    /// [`crate::multipart::MultipartUpload`] for individual parts and the
    /// final reassembled object, both of which must bypass the size check
    /// in [`Self::put`] to avoid recursing back into multipart upload.
    pub(crate) async fn put_direct(&self, key: &str, bytes: Vec<u8>, options: &PutOptions) -> Result<(), StorageError> {
        let policy = rowvault_core::retry::BackoffPolicy::default();
        let classifier = TransientClassifier;
        let result = rowvault_core::retry::retry_async(policy, &classifier, |_attempt| {
            let key_owned = key.to_string();
            let op = self.operator.clone();
            let bytes = bytes.clone();
            async move { self.guarded(|| async move { op.write(&key_owned, bytes).await }).await }
        })
        .await;

        match result {
            Ok(()) => Ok(()),
            Err(err) => {
                let record = FallbackIndexRecord {
                    object_key: key.to_string(),
                    metadata: options.metadata.clone(),
                    storage_class: options.storage_class.clone(),
                    sse_option: options.sse_option.clone(),
                    recorded_at: chrono::Utc::now(),
                };
                self.fallback.stash(key, &bytes, &record).await?;
                Err(err)
            }
        }
    }

    pub async fn get(&self, key: &str) -> Result<Vec<u8>, StorageError> {
        let key_owned = key.to_string();
        let op = self.operator.clone();
        let bytes = self.guarded(|| async move { op.read(&key_owned).await }).await?;
        Ok(bytes.to_vec())
    }

    /// Checks that an object exists and its reported size equals the
    /// serialized compressed length — used by the verifier for upload
    /// verification.
    pub async fn head(&self, key: &str) -> Result<Option<ObjectHead>, StorageError> {
        let key_owned = key.to_string();
        let op = self.operator.clone();
        match op.stat(&key_owned).await {
            Ok(meta) => Ok(Some(ObjectHead {
                size: meta.content_length(),
                etag: meta.etag().map(str::to_string),
            })),
            Err(e) if e.kind() == opendal::ErrorKind::NotFound => Ok(None),
            Err(e) => {
                self.breaker.record_failure();
                Err(StorageError::Backend(e))
            }
        }
    }

    pub async fn list(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
        let prefix_owned = prefix.to_string();
        let op = self.operator.clone();
        let entries = self.guarded(|| async move { op.list(&prefix_owned).await }).await?;
        Ok(entries.into_iter().map(|e| e.path().to_string()).collect())
    }

    pub async fn delete(&self, key: &str) -> Result<(), StorageError> {
        let key_owned = key.to_string();
        let op = self.operator.clone();
        self.guarded(|| async move { op.delete(&key_owned).await }).await
    }

    /// Read-modify-write with bounded retries on conflict, used for
    /// `TableManifest` updates. `modify` mutates the in-memory value;
    /// the write is only accepted if nothing else wrote the key meanwhile.
    pub async fn read_modify_write<T, F>(
        &self,
        key: &str,
        default: impl Fn() -> T,
        modify: F,
        max_attempts: u32,
    ) -> Result<T, StorageError>
    where
        T: Serialize + DeserializeOwned + Clone,
        F: Fn(&mut T),
    {
        for _attempt in 0..max_attempts {
            let before_etag = self.head(key).await?.and_then(|h| h.etag);
            let mut value = match self.get(key).await {
                Ok(bytes) => serde_json::from_slice(&bytes)?,
                Err(StorageError::Backend(e)) if e.kind() == opendal::ErrorKind::NotFound => default(),
                Err(other) => return Err(other),
            };
            modify(&mut value);
            let bytes = serde_json::to_vec_pretty(&value)?;

            let key_owned = key.to_string();
            let op = self.operator.clone();
            let write_result = match &before_etag {
                Some(etag) => {
                    let etag = etag.clone();
                    self.guarded(|| async move {
                        op.write_with(&key_owned, bytes)
                            .if_match(&etag)
                            .await
                    })
                    .await
                }
                None => {
                    self.guarded(|| async move {
                        op.write_with(&key_owned, bytes).if_not_exists(true).await
                    })
                    .await
                }
            };

            match write_result {
                Ok(()) => return Ok(value),
                Err(StorageError::Backend(e))
                    if matches!(e.kind(), opendal::ErrorKind::ConditionNotMatch) =>
                {
                    continue;
                }
                Err(other) => return Err(other),
            }
        }
        Err(StorageError::ConditionalPutConflict(key.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use opendal::services::Memory;

    fn test_client() -> ObjectStoreClient {
        let operator = Operator::new(Memory::default()).unwrap().finish();
        ObjectStoreClient::new(operator, ClientConfig {
            fallback_dir: std::env::temp_dir().join("rowvault-test-fallback"),
            ..ClientConfig::default()
        })
    }

    #[tokio::test]
    async fn put_then_get_round_trips() {
        let client = test_client();
        client.put("key.txt", b"hello".to_vec(), &PutOptions::default()).await.unwrap();
        let bytes = client.get("key.txt").await.unwrap();
        assert_eq!(bytes, b"hello");
    }

    #[tokio::test]
    async fn head_reports_size() {
        let client = test_client();
        client.put("key.txt", b"hello".to_vec(), &PutOptions::default()).await.unwrap();
        let head = client.head("key.txt").await.unwrap().unwrap();
        assert_eq!(head.size, 5);
    }

    #[tokio::test]
    async fn head_missing_returns_none() {
        let client = test_client();
        assert!(client.head("missing.txt").await.unwrap().is_none());
    }

    #[derive(Debug, Clone, serde::Serialize, serde::Deserialize, Default, PartialEq)]
    struct Counter {
        n: u32,
    }

    #[tokio::test]
    async fn put_below_threshold_writes_single_object() {
        let client = test_client();
        client.put("small.bin", vec![1u8; 10], &PutOptions::default()).await.unwrap();
        assert_eq!(client.get("small.bin").await.unwrap().len(), 10);
        assert!(client.head("small.bin.part-00001").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn put_above_threshold_dispatches_to_multipart() {
        let operator = Operator::new(Memory::default()).unwrap().finish();
        let client = ObjectStoreClient::new(operator, ClientConfig {
            fallback_dir: std::env::temp_dir().join("rowvault-test-multipart-dispatch"),
            multipart_threshold_bytes: 20,
            part_size_bytes: 8,
            ..ClientConfig::default()
        });

        let payload = vec![3u8; 25];
        client.put("big.bin", payload.clone(), &PutOptions::default()).await.unwrap();

        let roundtripped = client.get("big.bin").await.unwrap();
        assert_eq!(roundtripped, payload);
        // Parts are cleaned up by MultipartUpload::complete once reassembled.
        assert!(client.head("big.bin.part-00001").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn read_modify_write_creates_then_updates() {
        let client = test_client();
        let result = client
            .read_modify_write("counter.json", Counter::default, |c: &mut Counter| c.n += 1, 5)
            .await
            .unwrap();
        assert_eq!(result.n, 1);

        let result = client
            .read_modify_write("counter.json", Counter::default, |c: &mut Counter| c.n += 1, 5)
            .await
            .unwrap();
        assert_eq!(result.n, 2);
    }
}
