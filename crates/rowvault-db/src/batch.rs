//! Row iteration and deletion under row-level locks: every batch
//! runs in one read-committed transaction with a per-transaction statement
//! timeout, selects with `FOR UPDATE SKIP LOCKED` and no `OFFSET`, and
//! deletes the exact primary-key set it fetched behind a savepoint.

use crate::error::DbError;
use crate::introspect::TableSchema;
use chrono::{DateTime, Utc};
use rowvault_core::model::{BatchPlan, ColumnInfo, ColumnType, PrimaryKey, Row, RowValue, TableTarget};
use sqlx::{PgPool, Postgres, Row as SqlxRow, Transaction, ValueRef};
use std::time::Duration;

fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

/// Select-list expression for one column: scalar types that sqlx decodes
/// natively pass through unchanged; everything else (decimal, uuid, json,
/// range/composite) is cast to `text` so decoding never depends on extra
/// driver type features.
fn select_expr(column: &ColumnInfo) -> String {
    let ident = quote_ident(&column.name);
    match column.column_type {
        ColumnType::Integer | ColumnType::Boolean | ColumnType::Binary | ColumnType::TimestampTz | ColumnType::TimestampNaive => ident,
        ColumnType::Text | ColumnType::Uuid | ColumnType::Decimal | ColumnType::Json | ColumnType::Range | ColumnType::Composite => {
            format!("{ident}::text")
        }
    }
}

fn decode_value(row: &sqlx::postgres::PgRow, column: &ColumnInfo, index: usize) -> Result<RowValue, DbError> {
    if matches!(
        row.try_get_raw(index).map(|raw| raw.is_null()),
        Ok(true)
    ) {
        return Ok(RowValue::Null);
    }
    let value = match column.column_type {
        ColumnType::Integer => RowValue::Integer(row.try_get::<i64, _>(index)?),
        ColumnType::Boolean => RowValue::Boolean(row.try_get::<bool, _>(index)?),
        ColumnType::Binary => RowValue::Binary(row.try_get::<Vec<u8>, _>(index)?),
        ColumnType::TimestampTz => RowValue::Timestamp {
            value: row.try_get::<DateTime<Utc>, _>(index)?,
            source_has_tz: true,
        },
        ColumnType::TimestampNaive => {
            let naive: chrono::NaiveDateTime = row.try_get(index)?;
            RowValue::Timestamp {
                value: DateTime::from_naive_utc_and_offset(naive, Utc),
                source_has_tz: false,
            }
        }
        ColumnType::Text => RowValue::Text(row.try_get::<String, _>(index)?),
        ColumnType::Uuid => RowValue::Uuid(row.try_get::<String, _>(index)?),
        ColumnType::Decimal => RowValue::Decimal(row.try_get::<String, _>(index)?),
        ColumnType::Json => {
            let text: String = row.try_get(index)?;
            RowValue::Json(serde_json::from_str(&text).unwrap_or(serde_json::Value::String(text)))
        }
        ColumnType::Range | ColumnType::Composite => {
            let text: String = row.try_get(index)?;
            RowValue::Structured(serde_json::json!({ "raw": text }))
        }
    };
    Ok(value)
}

fn row_to_pk(value: &RowValue) -> PrimaryKey {
    match value {
        RowValue::Integer(v) => PrimaryKey::Integer(*v),
        RowValue::Uuid(v) => PrimaryKey::Uuid(v.clone()),
        other => PrimaryKey::Text(match other {
            RowValue::Text(v) => v.clone(),
            RowValue::Decimal(v) => v.clone(),
            _ => other_as_string(other),
        }),
    }
}

fn other_as_string(value: &RowValue) -> String {
    match value {
        RowValue::Integer(v) => v.to_string(),
        RowValue::Boolean(v) => v.to_string(),
        RowValue::Null => String::new(),
        _ => String::new(),
    }
}

pub struct TableHandle<'a> {
    pub pool: &'a PgPool,
    pub target: &'a TableTarget,
    pub schema: &'a TableSchema,
}

impl<'a> TableHandle<'a> {
    /// Opens a new per-batch transaction at read-committed isolation with
    /// the configured statement timeout applied via `SET LOCAL`.
    pub async fn begin_batch_transaction(
        &self,
        statement_timeout: Duration,
    ) -> Result<Transaction<'static, Postgres>, DbError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("SET LOCAL transaction isolation level read committed")
            .execute(&mut *tx)
            .await?;
        sqlx::query(&format!(
            "SET LOCAL statement_timeout = {}",
            statement_timeout.as_millis()
        ))
        .execute(&mut *tx)
        .await?;
        Ok(tx)
    }

    /// `WHERE ts < cutoff AND (ts, pk) > (lo_ts, lo_pk) ORDER BY ts, pk
    /// LIMIT n FOR UPDATE SKIP LOCKED`. Never `OFFSET`; fully parameterized.
    pub async fn fetch_batch(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        plan: &BatchPlan,
    ) -> Result<Vec<Row>, DbError> {
        let ts_ident = quote_ident(&self.target.timestamp_column);
        let pk_ident = quote_ident(&self.target.primary_key_column);
        let select_list = self
            .schema
            .columns
            .iter()
            .map(select_expr)
            .collect::<Vec<_>>()
            .join(", ");

        let mut sql = format!(
            "SELECT {select_list} FROM {}.{} WHERE {ts_ident} < $1",
            quote_ident(&self.target.schema),
            quote_ident(&self.target.table),
        );
        if plan.lower_bound.is_some() {
            sql.push_str(&format!(" AND ({ts_ident}, {pk_ident}) > ($2, $3)"));
        }
        for predicate in &plan.extra_where_predicates {
            sql.push_str(&format!(" AND ({predicate})"));
        }
        sql.push_str(&format!(
            " ORDER BY {ts_ident}, {pk_ident} LIMIT ${} FOR UPDATE SKIP LOCKED",
            if plan.lower_bound.is_some() { 4 } else { 2 }
        ));

        let mut query = sqlx::query(&sql).bind(plan.cutoff.0);
        if let Some(cursor) = &plan.lower_bound {
            query = query.bind(cursor.ts).bind(cursor.pk.to_string());
        }
        query = query.bind(plan.limit as i64);

        let rows = query.fetch_all(&mut **tx).await?;
        rows.iter()
            .map(|row| {
                self.schema
                    .columns
                    .iter()
                    .enumerate()
                    .map(|(index, column)| decode_value(row, column, index).map(|v| (column.name.clone(), v)))
                    .collect::<Result<Row, DbError>>()
            })
            .collect()
    }

    /// `SELECT COUNT(*)` with the same predicate as `fetch_batch`, taken
    /// inside the batch transaction before the fetch. Uses the
    /// same `(ts, pk)` cursor bound but no `LIMIT`/`FOR UPDATE`, since a plain
    /// count never needs to lock rows.
    pub async fn count_eligible(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        plan: &BatchPlan,
    ) -> Result<u64, DbError> {
        let ts_ident = quote_ident(&self.target.timestamp_column);
        let pk_ident = quote_ident(&self.target.primary_key_column);

        let mut sql = format!(
            "SELECT COUNT(*) FROM {}.{} WHERE {ts_ident} < $1",
            quote_ident(&self.target.schema),
            quote_ident(&self.target.table),
        );
        if plan.lower_bound.is_some() {
            sql.push_str(&format!(" AND ({ts_ident}, {pk_ident}) > ($2, $3)"));
        }
        for predicate in &plan.extra_where_predicates {
            sql.push_str(&format!(" AND ({predicate})"));
        }

        let mut query = sqlx::query_as::<_, (i64,)>(&sql).bind(plan.cutoff.0);
        if let Some(cursor) = &plan.lower_bound {
            query = query.bind(cursor.ts).bind(cursor.pk.to_string());
        }
        let (count,) = query.fetch_one(&mut **tx).await?;
        Ok(count.max(0) as u64)
    }

    /// Extracts the primary-key value from a fetched row.
    pub fn primary_key_of(&self, row: &Row) -> Option<PrimaryKey> {
        row.iter()
            .find(|(name, _)| name == &self.target.primary_key_column)
            .map(|(_, value)| row_to_pk(value))
    }

    /// Deletes exactly the primary-key set passed in, inside a savepoint so
    /// a failure here rolls back only the delete, not the whole batch
    /// transaction.
    pub async fn delete_batch(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        primary_keys: &[PrimaryKey],
    ) -> Result<u64, DbError> {
        sqlx::query("SAVEPOINT batch_delete").execute(&mut **tx).await?;

        let pk_ident = quote_ident(&self.target.primary_key_column);
        let placeholders: Vec<String> = (1..=primary_keys.len()).map(|i| format!("${i}")).collect();
        let sql = format!(
            "DELETE FROM {}.{} WHERE {pk_ident} IN ({})",
            quote_ident(&self.target.schema),
            quote_ident(&self.target.table),
            placeholders.join(", ")
        );

        let mut query = sqlx::query(&sql);
        for pk in primary_keys {
            query = match pk {
                PrimaryKey::Integer(v) => query.bind(*v),
                PrimaryKey::Text(v) | PrimaryKey::Uuid(v) => query.bind(v.clone()),
            };
        }

        match query.execute(&mut **tx).await {
            Ok(result) => {
                sqlx::query("RELEASE SAVEPOINT batch_delete").execute(&mut **tx).await?;
                Ok(result.rows_affected())
            }
            Err(err) => {
                sqlx::query("ROLLBACK TO SAVEPOINT batch_delete").execute(&mut **tx).await?;
                Err(err.into())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn select_expr_casts_non_native_types_to_text() {
        let decimal = ColumnInfo { name: "amount".into(), column_type: ColumnType::Decimal, nullable: false };
        assert_eq!(select_expr(&decimal), "\"amount\"::text");

        let integer = ColumnInfo { name: "id".into(), column_type: ColumnType::Integer, nullable: false };
        assert_eq!(select_expr(&integer), "\"id\"");
    }

    #[test]
    fn quote_ident_escapes_embedded_quotes() {
        assert_eq!(quote_ident("weird\"name"), "\"weird\"\"name\"");
    }

    #[test]
    fn row_to_pk_preserves_variant() {
        assert_eq!(row_to_pk(&RowValue::Integer(42)), PrimaryKey::Integer(42));
        assert_eq!(row_to_pk(&RowValue::Uuid("abc".into())), PrimaryKey::Uuid("abc".into()));
        assert_eq!(row_to_pk(&RowValue::Text("x".into())), PrimaryKey::Text("x".into()));
    }
}
