//! Post-table vacuum/analyze invocation: runs after the last
//! batch of a table, bounded by a timeout. `VACUUM` cannot run inside a
//! transaction, so this always executes against the pool directly.

use crate::error::DbError;
use rowvault_core::model::TableTarget;
use sqlx::PgPool;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VacuumStrategy {
    #[default]
    None,
    Analyze,
    Standard,
    Full,
}

#[derive(Debug)]
pub struct VacuumOutcome {
    pub ran: bool,
    pub reclaimed_bytes_estimate: Option<i64>,
}

fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

async fn relation_size(pool: &PgPool, schema: &str, table: &str) -> Result<i64, DbError> {
    let qualified = format!("{schema}.{table}");
    let (size,): (i64,) = sqlx::query_as("SELECT pg_total_relation_size($1::regclass)")
        .bind(&qualified)
        .fetch_one(pool)
        .await?;
    Ok(size)
}

/// Runs the configured vacuum strategy against `target`, bounded by
/// `timeout`. A reclaimed-fraction below the caller's threshold is left
/// for the orchestrator to log as ineffective — it is never fatal.
pub async fn run_vacuum(
    pool: &PgPool,
    target: &TableTarget,
    strategy: VacuumStrategy,
    timeout: Duration,
) -> Result<VacuumOutcome, DbError> {
    if strategy == VacuumStrategy::None {
        return Ok(VacuumOutcome { ran: false, reclaimed_bytes_estimate: None });
    }

    let qualified = format!("{}.{}", quote_ident(&target.schema), quote_ident(&target.table));
    let before = relation_size(pool, &target.schema, &target.table).await?;

    let stmt = match strategy {
        VacuumStrategy::Analyze => format!("VACUUM (ANALYZE) {qualified}"),
        VacuumStrategy::Standard => format!("VACUUM {qualified}"),
        VacuumStrategy::Full => format!("VACUUM (FULL, ANALYZE) {qualified}"),
        VacuumStrategy::None => unreachable!(),
    };

    let result = tokio::time::timeout(timeout, sqlx::query(&stmt).execute(pool)).await;
    match result {
        Ok(Ok(_)) => {
            let after = relation_size(pool, &target.schema, &target.table).await?;
            Ok(VacuumOutcome {
                ran: true,
                reclaimed_bytes_estimate: Some((before - after).max(0)),
            })
        }
        Ok(Err(e)) => Err(e.into()),
        Err(_elapsed) => Err(DbError::StatementTimeout),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_strategy_is_none() {
        assert_eq!(VacuumStrategy::default(), VacuumStrategy::None);
    }
}
