//! Object-store key layout. Bit-exact so any compatible reader can
//! navigate the bucket without consulting a catalog.

use chrono::{DateTime, Utc};

fn table_dir(prefix: &str, database: &str, schema: &str, table: &str) -> String {
    format!("{prefix}/{database}/{schema}/{table}")
}

fn date_partition(prefix: &str, database: &str, schema: &str, table: &str, at: DateTime<Utc>) -> String {
    format!(
        "{}/year={:04}/month={:02}/day={:02}",
        table_dir(prefix, database, schema, table),
        at.format("%Y"),
        at.format("%m"),
        at.format("%d"),
    )
}

/// `YYYYMMDDTHHMMSSZ` segment: the batch's start time, not the row timestamp.
fn batch_start_segment(batch_start: DateTime<Utc>) -> String {
    batch_start.format("%Y%m%dT%H%M%SZ").to_string()
}

fn batch_stem(
    prefix: &str,
    database: &str,
    schema: &str,
    table: &str,
    batch_start: DateTime<Utc>,
    batch_ordinal: u64,
) -> String {
    format!(
        "{}/{}_{}_batch_{:03}",
        date_partition(prefix, database, schema, table, batch_start),
        table,
        batch_start_segment(batch_start),
        batch_ordinal,
    )
}

pub fn data_object_key(
    prefix: &str,
    database: &str,
    schema: &str,
    table: &str,
    batch_start: DateTime<Utc>,
    batch_ordinal: u64,
) -> String {
    format!(
        "{}.jsonl.gz",
        batch_stem(prefix, database, schema, table, batch_start, batch_ordinal)
    )
}

pub fn metadata_object_key(
    prefix: &str,
    database: &str,
    schema: &str,
    table: &str,
    batch_start: DateTime<Utc>,
    batch_ordinal: u64,
) -> String {
    format!(
        "{}_metadata.json",
        batch_stem(prefix, database, schema, table, batch_start, batch_ordinal)
    )
}

pub fn deletion_manifest_object_key(
    prefix: &str,
    database: &str,
    schema: &str,
    table: &str,
    batch_start: DateTime<Utc>,
    batch_ordinal: u64,
) -> String {
    format!(
        "{}_manifest.json",
        batch_stem(prefix, database, schema, table, batch_start, batch_ordinal)
    )
}

pub fn watermark_object_key(prefix: &str, database: &str, schema: &str, table: &str) -> String {
    format!("{}/_watermark.json", table_dir(prefix, database, schema, table))
}

pub fn table_manifest_object_key(prefix: &str, database: &str, schema: &str, table: &str) -> String {
    format!("{}/_manifest.json", table_dir(prefix, database, schema, table))
}

/// Durable restore progress cursor, sibling to the archive
/// watermark but keyed separately so a restore run never perturbs archival
/// state and vice versa.
pub fn restore_watermark_object_key(prefix: &str, database: &str, schema: &str, table: &str) -> String {
    format!("{}/_restore_watermark.json", table_dir(prefix, database, schema, table))
}

/// Prefix under which every batch's data/metadata/manifest objects for one
/// table live, for restore-time listing.
pub fn table_data_prefix(prefix: &str, database: &str, schema: &str, table: &str) -> String {
    format!("{}/", table_dir(prefix, database, schema, table))
}

pub fn audit_event_object_key(prefix: &str, kind: &str, epoch_millis: i64, at: DateTime<Utc>) -> String {
    format!(
        "{prefix}/audit/year={:04}/month={:02}/day={:02}/{epoch_millis}_{kind}.json",
        at.format("%Y"),
        at.format("%m"),
        at.format("%d"),
    )
}

/// One failure report per run, written alongside that run's audit
/// events so an operator can find the summary without replaying the log.
pub fn failure_report_object_key(prefix: &str, run_id: &str, at: DateTime<Utc>) -> String {
    format!(
        "{prefix}/failure_reports/year={:04}/month={:02}/day={:02}/{run_id}.json",
        at.format("%Y"),
        at.format("%m"),
        at.format("%d"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn data_object_key_matches_layout() {
        let at = Utc.with_ymd_and_hms(2026, 3, 4, 12, 30, 0).unwrap();
        let key = data_object_key("archive", "db1", "public", "audit_logs", at, 7);
        assert_eq!(
            key,
            "archive/db1/public/audit_logs/year=2026/month=03/day=04/audit_logs_20260304T123000Z_batch_007.jsonl.gz"
        );
    }

    #[test]
    fn watermark_key_is_table_scoped() {
        assert_eq!(
            watermark_object_key("archive", "db1", "public", "audit_logs"),
            "archive/db1/public/audit_logs/_watermark.json"
        );
    }
}
