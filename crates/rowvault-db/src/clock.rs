//! Server-time query and clock-skew check used to compute `CutoffTime`
//!: the cutoff is always derived from source-DB server time,
//! never the archiver host's clock.

use crate::error::DbError;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use rowvault_core::model::CutoffTime;
use sqlx::PgPool;

pub async fn server_now(pool: &PgPool) -> Result<DateTime<Utc>, DbError> {
    let (now,): (DateTime<Utc>,) = sqlx::query_as("SELECT now()").fetch_one(pool).await?;
    Ok(now)
}

/// Compares source-DB server time against the archiver host's clock;
/// aborts the table if skew exceeds `threshold_ms` rather than silently
/// computing a cutoff against an untrustworthy reference.
pub async fn check_clock_skew(pool: &PgPool, threshold_ms: i64) -> Result<DateTime<Utc>, DbError> {
    let server_time = server_now(pool).await?;
    let host_time = Utc::now();
    let skew_ms = (server_time - host_time).num_milliseconds().abs();
    if skew_ms > threshold_ms {
        return Err(DbError::ClockSkewExceeded { skew_ms, threshold_ms });
    }
    Ok(server_time)
}

/// `cutoff = server_now() - retention_days`.
pub async fn compute_cutoff(pool: &PgPool, retention_days: i64, clock_skew_threshold_ms: i64) -> Result<CutoffTime, DbError> {
    let server_time = check_clock_skew(pool, clock_skew_threshold_ms).await?;
    Ok(CutoffTime(server_time - ChronoDuration::days(retention_days)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cutoff_is_exclusive_upper_bound() {
        let now = Utc::now();
        let cutoff = CutoffTime(now - ChronoDuration::days(30));
        assert!(cutoff.row_is_eligible(now - ChronoDuration::days(31)));
        assert!(!cutoff.row_is_eligible(now - ChronoDuration::days(29)));
        assert!(!cutoff.row_is_eligible(now - ChronoDuration::days(30)));
    }
}
