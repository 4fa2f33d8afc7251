//! Typed error surface for the source-database adapter.

#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("clock skew {skew_ms}ms exceeds threshold {threshold_ms}ms")]
    ClockSkewExceeded { skew_ms: i64, threshold_ms: i64 },

    #[error("schema drift on {table}: expected hash {expected_hash}, observed {actual_hash}")]
    SchemaDrift {
        table: String,
        expected_hash: String,
        actual_hash: String,
    },

    #[error("statement timed out")]
    StatementTimeout,

    #[error("expected {expected} affected rows, observed {actual}")]
    UnexpectedRowCount { expected: i64, actual: i64 },

    #[error("table {0} has no declared primary key")]
    NoPrimaryKey(String),
}

impl DbError {
    /// Connection loss, pool exhaustion, and timeouts are transient;
    /// authentication, missing objects, and type errors are not.
    pub fn is_transient(&self) -> bool {
        match self {
            DbError::Sqlx(sqlx::Error::PoolTimedOut)
            | DbError::Sqlx(sqlx::Error::PoolClosed)
            | DbError::Sqlx(sqlx::Error::Io(_))
            | DbError::Sqlx(sqlx::Error::Tls(_))
            | DbError::StatementTimeout => true,
            DbError::Sqlx(sqlx::Error::Database(db_err)) => {
                matches!(db_err.code().as_deref(), Some("40001") | Some("40P01") | Some("57014"))
            }
            _ => false,
        }
    }
}
