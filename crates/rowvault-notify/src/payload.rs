//! The three notification moments: run start, a per-table
//! failure, and run finish. `NotifyPayload` is the generic JSON body sent
//! to every channel; channel-specific formatting beyond that is out of
//! scope.

use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Clone)]
pub enum NotifyEvent {
    RunStart { run_id: String, databases: Vec<String> },
    TableFailure { run_id: String, database: String, schema: String, table: String, error_class: String, message: String },
    RunFinish { run_id: String, databases_processed: u32, databases_failed: u32, records_archived: u64, bytes_uploaded: u64 },
}

impl NotifyEvent {
    pub fn subject(&self) -> String {
        match self {
            NotifyEvent::RunStart { run_id, .. } => format!("rowvault run {run_id} started"),
            NotifyEvent::TableFailure { database, schema, table, .. } => {
                format!("rowvault table failure: {database}.{schema}.{table}")
            }
            NotifyEvent::RunFinish { run_id, databases_failed, .. } if *databases_failed > 0 => {
                format!("rowvault run {run_id} finished with failures")
            }
            NotifyEvent::RunFinish { run_id, .. } => format!("rowvault run {run_id} finished"),
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            NotifyEvent::RunStart { .. } => "run_start",
            NotifyEvent::TableFailure { .. } => "table_failure",
            NotifyEvent::RunFinish { .. } => "run_finish",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct NotifyPayload {
    pub kind: &'static str,
    pub subject: String,
    pub emitted_at: DateTime<Utc>,
    #[serde(flatten)]
    pub detail: serde_json::Value,
}

impl From<&NotifyEvent> for NotifyPayload {
    fn from(event: &NotifyEvent) -> Self {
        let detail = match event {
            NotifyEvent::RunStart { run_id, databases } => {
                serde_json::json!({ "run_id": run_id, "databases": databases })
            }
            NotifyEvent::TableFailure { run_id, database, schema, table, error_class, message } => {
                serde_json::json!({
                    "run_id": run_id,
                    "database": database,
                    "schema": schema,
                    "table": table,
                    "error_class": error_class,
                    "message": message,
                })
            }
            NotifyEvent::RunFinish { run_id, databases_processed, databases_failed, records_archived, bytes_uploaded } => {
                serde_json::json!({
                    "run_id": run_id,
                    "databases_processed": databases_processed,
                    "databases_failed": databases_failed,
                    "records_archived": records_archived,
                    "bytes_uploaded": bytes_uploaded,
                })
            }
        };
        NotifyPayload { kind: event.kind(), subject: event.subject(), emitted_at: Utc::now(), detail }
    }
}
