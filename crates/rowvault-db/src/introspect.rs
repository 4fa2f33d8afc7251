//! Schema introspection: columns, primary key, indexes, and a
//! canonical hash used to detect schema drift between runs.

use crate::error::DbError;
use rowvault_core::model::{ColumnInfo, ColumnType};
use sha2::{Digest, Sha256};
use sqlx::PgPool;

#[derive(Debug, Clone)]
pub struct TableSchema {
    pub columns: Vec<ColumnInfo>,
    pub primary_key_column: String,
    pub indexes: Vec<String>,
    pub is_partitioned_parent: bool,
    pub schema_hash: String,
}

/// Maps a Postgres `udt_name` (as reported by `information_schema.columns`)
/// to the serializer's typed column model. Unrecognized types fall back to
/// `Text`, matching the serializer's textual encoding for anything it
/// doesn't special-case.
fn map_pg_type(udt_name: &str) -> ColumnType {
    match udt_name {
        "int2" | "int4" | "int8" | "serial" | "bigserial" => ColumnType::Integer,
        "bool" => ColumnType::Boolean,
        "text" | "varchar" | "bpchar" | "char" | "name" => ColumnType::Text,
        "uuid" => ColumnType::Uuid,
        "numeric" | "decimal" => ColumnType::Decimal,
        "bytea" => ColumnType::Binary,
        "timestamptz" => ColumnType::TimestampTz,
        "timestamp" => ColumnType::TimestampNaive,
        "json" | "jsonb" => ColumnType::Json,
        name if name.starts_with("tsrange") || name.starts_with("daterange") || name.starts_with("numrange") => {
            ColumnType::Range
        }
        "record" => ColumnType::Composite,
        _ => ColumnType::Text,
    }
}

async fn fetch_columns(pool: &PgPool, schema: &str, table: &str) -> Result<Vec<ColumnInfo>, DbError> {
    let rows: Vec<(String, String, String)> = sqlx::query_as(
        "SELECT column_name, udt_name, is_nullable \
         FROM information_schema.columns \
         WHERE table_schema = $1 AND table_name = $2 \
         ORDER BY ordinal_position",
    )
    .bind(schema)
    .bind(table)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|(name, udt_name, is_nullable)| ColumnInfo {
            column_type: map_pg_type(&udt_name),
            nullable: is_nullable == "YES",
            name,
        })
        .collect())
}

async fn fetch_primary_key(pool: &PgPool, schema: &str, table: &str) -> Result<String, DbError> {
    let qualified = format!("{schema}.{table}");
    let row: Option<(String,)> = sqlx::query_as(
        "SELECT a.attname \
         FROM pg_index i \
         JOIN pg_attribute a ON a.attrelid = i.indrelid AND a.attnum = ANY(i.indkey) \
         WHERE i.indrelid = $1::regclass AND i.indisprimary \
         LIMIT 1",
    )
    .bind(&qualified)
    .fetch_optional(pool)
    .await?;

    row.map(|(name,)| name)
        .ok_or_else(|| DbError::NoPrimaryKey(qualified.clone()))
}

async fn fetch_indexes(pool: &PgPool, schema: &str, table: &str) -> Result<Vec<String>, DbError> {
    let rows: Vec<(String,)> = sqlx::query_as(
        "SELECT indexname FROM pg_indexes WHERE schemaname = $1 AND tablename = $2 ORDER BY indexname",
    )
    .bind(schema)
    .bind(table)
    .fetch_all(pool)
    .await?;
    Ok(rows.into_iter().map(|(name,)| name).collect())
}

async fn fetch_is_partitioned_parent(pool: &PgPool, schema: &str, table: &str) -> Result<bool, DbError> {
    let qualified = format!("{schema}.{table}");
    let row: Option<(bool,)> = sqlx::query_as(
        "SELECT true FROM pg_partitioned_table WHERE partrelid = $1::regclass",
    )
    .bind(&qualified)
    .fetch_optional(pool)
    .await?;
    Ok(row.is_some())
}

/// Deterministic hash of the table's shape (sorted column defs + primary
/// key + indexes) used to detect drift between archiver runs.
pub fn canonical_schema_hash(columns: &[ColumnInfo], primary_key_column: &str, indexes: &[String]) -> String {
    let mut column_strs: Vec<String> = columns
        .iter()
        .map(|c| format!("{}:{}:{}", c.name, c.column_type, c.nullable))
        .collect();
    column_strs.sort();
    let mut sorted_indexes = indexes.to_vec();
    sorted_indexes.sort();

    let mut hasher = Sha256::new();
    hasher.update(column_strs.join("\u{0}").as_bytes());
    hasher.update([0u8]);
    hasher.update(primary_key_column.as_bytes());
    hasher.update([0u8]);
    hasher.update(sorted_indexes.join("\u{0}").as_bytes());
    hex::encode(hasher.finalize())
}

pub async fn introspect_table(pool: &PgPool, schema: &str, table: &str) -> Result<TableSchema, DbError> {
    let columns = fetch_columns(pool, schema, table).await?;
    let primary_key_column = fetch_primary_key(pool, schema, table).await?;
    let indexes = fetch_indexes(pool, schema, table).await?;
    let is_partitioned_parent = fetch_is_partitioned_parent(pool, schema, table).await?;
    let schema_hash = canonical_schema_hash(&columns, &primary_key_column, &indexes);

    Ok(TableSchema {
        columns,
        primary_key_column,
        indexes,
        is_partitioned_parent,
        schema_hash,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_is_order_independent_in_columns() {
        let a = vec![
            ColumnInfo { name: "id".into(), column_type: ColumnType::Integer, nullable: false },
            ColumnInfo { name: "ts".into(), column_type: ColumnType::TimestampTz, nullable: false },
        ];
        let b = vec![a[1].clone(), a[0].clone()];
        assert_eq!(
            canonical_schema_hash(&a, "id", &["idx_ts".into()]),
            canonical_schema_hash(&b, "id", &["idx_ts".into()])
        );
    }

    #[test]
    fn hash_changes_when_nullability_changes() {
        let a = vec![ColumnInfo { name: "id".into(), column_type: ColumnType::Integer, nullable: false }];
        let b = vec![ColumnInfo { name: "id".into(), column_type: ColumnType::Integer, nullable: true }];
        assert_ne!(canonical_schema_hash(&a, "id", &[]), canonical_schema_hash(&b, "id", &[]));
    }

    #[test]
    fn maps_common_postgres_types() {
        assert_eq!(map_pg_type("int8"), ColumnType::Integer);
        assert_eq!(map_pg_type("timestamptz"), ColumnType::TimestampTz);
        assert_eq!(map_pg_type("jsonb"), ColumnType::Json);
        assert_eq!(map_pg_type("some_unknown_type"), ColumnType::Text);
    }
}
