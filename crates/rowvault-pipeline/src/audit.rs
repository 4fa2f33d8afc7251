//! Audit event emission: one immutable JSON object per event, written
//! under `<prefix>/audit/year=.../<epoch_millis>_<kind>.json`. Audit writes
//! are best-effort from the pipeline's point of view — a failure to write
//! one is logged as a `WARNING`, never promoted to a batch or table error.

use chrono::Utc;
use rowvault_core::model::{AuditEvent, AuditEventKind};
use rowvault_core::object_key::audit_event_object_key;
use rowvault_storage::{ObjectStoreClient, PutOptions};
use std::collections::BTreeMap;

fn kind_slug(kind: AuditEventKind) -> &'static str {
    match kind {
        AuditEventKind::ArchiveStart => "archive_start",
        AuditEventKind::ArchiveBatchSuccess => "archive_batch_success",
        AuditEventKind::ArchiveSuccess => "archive_success",
        AuditEventKind::ArchiveFailure => "archive_failure",
        AuditEventKind::SkipLegalHold => "skip_legal_hold",
        AuditEventKind::RestoreStart => "restore_start",
        AuditEventKind::RestoreSuccess => "restore_success",
        AuditEventKind::RestoreFailure => "restore_failure",
        AuditEventKind::SampleAbsenceFailed => "sample_absence_failed",
        AuditEventKind::Error => "error",
    }
}

pub struct AuditLogger<'a> {
    storage: &'a ObjectStoreClient,
    prefix: String,
    actor: String,
}

impl<'a> AuditLogger<'a> {
    pub fn new(storage: &'a ObjectStoreClient, prefix: impl Into<String>, actor: impl Into<String>) -> Self {
        Self { storage, prefix: prefix.into(), actor: actor.into() }
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn record(
        &self,
        kind: AuditEventKind,
        database: &str,
        schema: &str,
        table: &str,
        row_count: u64,
        duration_ms: u64,
        status: &str,
        error_summary: Option<String>,
        extra: BTreeMap<String, serde_json::Value>,
    ) {
        let event = AuditEvent {
            timestamp: Utc::now(),
            actor: self.actor.clone(),
            kind,
            database: database.to_string(),
            schema: schema.to_string(),
            table: table.to_string(),
            row_count,
            duration_ms,
            status: status.to_string(),
            error_summary,
            extra,
        };

        let key = audit_event_object_key(&self.prefix, kind_slug(kind), event.timestamp.timestamp_millis(), event.timestamp);
        match serde_json::to_vec_pretty(&event) {
            Ok(bytes) => {
                if let Err(error) = self.storage.put(&key, bytes, &PutOptions::default()).await {
                    tracing::warn!(%error, %key, "failed to write audit event");
                }
            }
            Err(error) => tracing::warn!(%error, "failed to serialize audit event"),
        }
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
            fallback_dir: std::env::temp_dir().join("rowvault-audit-test-fallback"),
            ..ClientConfig::default()
        })
    }

    #[tokio::test]
    async fn record_writes_one_object_per_event() {
        let client = test_client();
        let logger = AuditLogger::new(&client, "archive", "rowvault");
        logger
            .record(
                AuditEventKind::ArchiveBatchSuccess,
                "db1",
                "public",
                "audit_logs",
                500,
                1200,
                "success",
                None,
                BTreeMap::new(),
            )
            .await;

        let now = Utc::now();
        let day_dir = format!("archive/audit/year={}/month={}/day={}", now.format("%Y"), now.format("%m"), now.format("%d"));
        let keys = client.list(&day_dir).await.unwrap();
        assert_eq!(keys.len(), 1);
        assert!(keys[0].ends_with("_archive_batch_success.json"));
    }
}
