//! Per-phase metric emission. One counter/histogram pair per
//! pipeline phase, named `rowvault.<phase>.*`, so a dashboard can chart the
//! same eight steps the state machine goes through.

use metrics::{counter, histogram};
use std::time::Duration;

pub fn batch_started(database: &str, table: &str) {
    counter!("rowvault.batch.started", 1, "database" => database.to_string(), "table" => table.to_string());
}

pub fn batch_idempotent_skip(database: &str, table: &str) {
    counter!("rowvault.batch.idempotent_skip", 1, "database" => database.to_string(), "table" => table.to_string());
}

pub fn batch_succeeded(database: &str, table: &str, records: u64, compressed_bytes: u64) {
    counter!("rowvault.batch.succeeded", 1, "database" => database.to_string(), "table" => table.to_string());
    counter!("rowvault.records.archived", records, "database" => database.to_string(), "table" => table.to_string());
    counter!("rowvault.bytes.uploaded", compressed_bytes, "database" => database.to_string(), "table" => table.to_string());
}

pub fn batch_retried(database: &str, table: &str, attempt: u32) {
    counter!("rowvault.batch.retried", 1, "database" => database.to_string(), "table" => table.to_string(), "attempt" => attempt.to_string());
}

pub fn batch_failed(database: &str, table: &str, severity: &str) {
    counter!("rowvault.batch.failed", 1, "database" => database.to_string(), "table" => table.to_string(), "severity" => severity.to_string());
}

pub fn fetch_duration(database: &str, table: &str, duration: Duration) {
    histogram!("rowvault.fetch.duration_ms", duration.as_secs_f64() * 1000.0, "database" => database.to_string(), "table" => table.to_string());
}

pub fn batch_size_clamped(database: &str, table: &str) {
    counter!("rowvault.batch_size.clamped", 1, "database" => database.to_string(), "table" => table.to_string());
}

pub fn table_drained(database: &str, table: &str, batches: u64) {
    counter!("rowvault.table.drained", 1, "database" => database.to_string(), "table" => table.to_string());
    histogram!("rowvault.table.batch_count", batches as f64, "database" => database.to_string(), "table" => table.to_string());
}

pub fn vacuum_ran(database: &str, table: &str, reclaimed_bytes: i64) {
    counter!("rowvault.vacuum.ran", 1, "database" => database.to_string(), "table" => table.to_string());
    histogram!("rowvault.vacuum.reclaimed_bytes", reclaimed_bytes as f64, "database" => database.to_string(), "table" => table.to_string());
}
