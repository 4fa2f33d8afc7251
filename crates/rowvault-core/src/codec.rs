//! C1 Serializer/Codec: converts fetched rows into newline-delimited
//! JSON, gzip-compressed, with rolling SHA-256 digests over both the
//! uncompressed and compressed streams. Per-value encoding rules are fixed
//! so that any implementation reading the object store produces identical
//! bytes back out.

use crate::model::{Row, RowValue};
use flate2::write::GzEncoder;
use flate2::Compression;
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use std::io::Write;

/// Prefixes a base64 blob so it can be distinguished from ordinary text on
/// decode.
pub const BINARY_SENTINEL: &str = "__rowvault_b64__:";

/// The four reserved fields every record carries, inserted by the
/// serializer itself — never by the source query.
pub struct ReservedFields<'a> {
    pub archive_timestamp: chrono::DateTime<chrono::Utc>,
    pub batch_fingerprint: &'a str,
    pub source_database: &'a str,
    pub source_table: &'a str,
}

/// Converts one typed value into its JSON wire representation.
pub fn encode_value(value: &RowValue) -> Value {
    match value {
        RowValue::Null => Value::Null,
        RowValue::Integer(i) => Value::from(*i),
        RowValue::Boolean(b) => Value::from(*b),
        RowValue::Text(s) => Value::from(s.clone()),
        RowValue::Uuid(s) => Value::from(s.clone()),
        RowValue::Decimal(s) => Value::from(s.clone()),
        RowValue::Binary(bytes) => {
            Value::from(format!("{BINARY_SENTINEL}{}", base64::Engine::encode(
                &base64::engine::general_purpose::STANDARD,
                bytes,
            )))
        }
        RowValue::Timestamp { value, .. } => Value::from(value.to_rfc3339_opts(
            chrono::SecondsFormat::Micros,
            true,
        )),
        RowValue::Json(v) => v.clone(),
        RowValue::Structured(v) => v.clone(),
    }
}

/// Inverts [`encode_value`]. `hint` disambiguates values JSON alone cannot
/// (e.g. whether a plain string is text, a UUID, or a decimal) — the
/// restore engine supplies it from the table's current schema.
pub fn decode_value(value: &Value, hint: crate::model::ColumnType) -> RowValue {
    use crate::model::ColumnType as CT;
    if value.is_null() {
        return RowValue::Null;
    }
    match hint {
        CT::Integer => RowValue::Integer(value.as_i64().unwrap_or_default()),
        CT::Boolean => RowValue::Boolean(value.as_bool().unwrap_or_default()),
        CT::Uuid => RowValue::Uuid(value.as_str().unwrap_or_default().to_string()),
        CT::Decimal => RowValue::Decimal(value.as_str().unwrap_or_default().to_string()),
        CT::Binary => {
            let s = value.as_str().unwrap_or_default();
            let stripped = s.strip_prefix(BINARY_SENTINEL).unwrap_or(s);
            let bytes = base64::Engine::decode(&base64::engine::general_purpose::STANDARD, stripped)
                .unwrap_or_default();
            RowValue::Binary(bytes)
        }
        CT::TimestampTz | CT::TimestampNaive => {
            let s = value.as_str().unwrap_or_default();
            let parsed = chrono::DateTime::parse_from_rfc3339(s)
                .map(|dt| dt.with_timezone(&chrono::Utc))
                .unwrap_or_else(|_| chrono::Utc::now());
            RowValue::Timestamp {
                value: parsed,
                source_has_tz: matches!(hint, CT::TimestampTz),
            }
        }
        CT::Json => RowValue::Json(value.clone()),
        CT::Range | CT::Composite => RowValue::Structured(value.clone()),
        CT::Text => RowValue::Text(value.as_str().unwrap_or_default().to_string()),
    }
}

fn encode_record(row: &Row, reserved: &ReservedFields<'_>) -> Value {
    let mut map = Map::with_capacity(row.len() + 4);
    for (name, value) in row {
        map.insert(name.clone(), encode_value(value));
    }
    map.insert(
        "_archived_at".to_string(),
        Value::from(reserved.archive_timestamp.to_rfc3339_opts(chrono::SecondsFormat::Micros, true)),
    );
    map.insert(
        "_batch_fingerprint".to_string(),
        Value::from(reserved.batch_fingerprint),
    );
    map.insert(
        "_source_database".to_string(),
        Value::from(reserved.source_database),
    );
    map.insert("_source_table".to_string(), Value::from(reserved.source_table));
    Value::Object(map)
}

/// Result of serializing a batch of rows: the compressed bytes plus every
/// count and digest the verifier needs.
pub struct SerializedBatch {
    pub compressed_bytes: Vec<u8>,
    pub uncompressed_len: u64,
    pub compressed_len: u64,
    pub uncompressed_sha256: String,
    pub compressed_sha256: String,
    pub record_count: u64,
}

/// Streams `rows` through NDJSON encoding and gzip compression, computing
/// both digests in one pass. `compression_level` is clamped to `1..=9`.
pub fn serialize_batch(
    rows: &[Row],
    reserved: &ReservedFields<'_>,
    compression_level: u32,
) -> anyhow::Result<SerializedBatch> {
    let level = compression_level.clamp(1, 9);
    let mut uncompressed_hasher = Sha256::new();
    let mut uncompressed_len = 0u64;

    let compressed_buf = Vec::new();
    let mut encoder = GzEncoder::new(compressed_buf, Compression::new(level));

    for row in rows {
        let record = encode_record(row, reserved);
        let mut line = serde_json::to_vec(&record)?;
        line.push(b'\n');
        uncompressed_hasher.update(&line);
        uncompressed_len += line.len() as u64;
        encoder.write_all(&line)?;
    }

    let compressed_bytes = encoder.finish()?;
    let compressed_sha256 = hex::encode(Sha256::digest(&compressed_bytes));

    Ok(SerializedBatch {
        compressed_len: compressed_bytes.len() as u64,
        compressed_bytes,
        uncompressed_len,
        uncompressed_sha256: hex::encode(uncompressed_hasher.finalize()),
        compressed_sha256,
        record_count: rows.len() as u64,
    })
}

/// Decompresses a `.jsonl.gz` object back into its newline-delimited JSON
/// text, verifying the result round-trips byte-for-byte is the caller's
/// responsibility (compare against `uncompressed_sha256`).
pub fn decompress(compressed: &[u8]) -> anyhow::Result<Vec<u8>> {
    use flate2::read::GzDecoder;
    use std::io::Read;
    let mut decoder = GzDecoder::new(compressed);
    let mut out = Vec::new();
    decoder.read_to_end(&mut out)?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::RowValue;
    use chrono::Utc;

    fn reserved(fp: &str) -> ReservedFields<'static> {
        ReservedFields {
            archive_timestamp: Utc::now(),
            batch_fingerprint: Box::leak(fp.to_string().into_boxed_str()),
            source_database: "db1",
            source_table: "audit_logs",
        }
    }

    #[test]
    fn round_trips_byte_for_byte() {
        let rows = vec![
            vec![
                ("id".to_string(), RowValue::Integer(1)),
                ("name".to_string(), RowValue::Text("alice".to_string())),
            ],
            vec![
                ("id".to_string(), RowValue::Integer(2)),
                ("name".to_string(), RowValue::Null),
            ],
        ];
        let serialized = serialize_batch(&rows, &reserved("fp1"), 6).unwrap();
        assert_eq!(serialized.record_count, 2);

        let decompressed = decompress(&serialized.compressed_bytes).unwrap();
        let text = String::from_utf8(decompressed).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);

        let first: Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first["id"], 1);
        assert_eq!(first["_source_database"], "db1");
        assert!(first.get("_archived_at").is_some());
    }

    #[test]
    fn binary_values_are_base64_with_sentinel() {
        let rows = vec![vec![(
            "blob".to_string(),
            RowValue::Binary(vec![0xde, 0xad, 0xbe, 0xef]),
        )]];
        let serialized = serialize_batch(&rows, &reserved("fp2"), 1).unwrap();
        let decompressed = decompress(&serialized.compressed_bytes).unwrap();
        let text = String::from_utf8(decompressed).unwrap();
        let record: Value = serde_json::from_str(text.lines().next().unwrap()).unwrap();
        let encoded = record["blob"].as_str().unwrap();
        assert!(encoded.starts_with(BINARY_SENTINEL));

        let decoded = decode_value(&record["blob"], crate::model::ColumnType::Binary);
        assert_eq!(decoded, RowValue::Binary(vec![0xde, 0xad, 0xbe, 0xef]));
    }

    #[test]
    fn digests_are_stable_across_runs() {
        let rows = vec![vec![("id".to_string(), RowValue::Integer(7))]];
        let a = serialize_batch(&rows, &reserved("fp3"), 6).unwrap();
        let b = serialize_batch(&rows, &reserved("fp3"), 6).unwrap();
        assert_eq!(a.uncompressed_sha256, b.uncompressed_sha256);
    }
}
