//! Legal hold evaluation: consulted before the first batch of a
//! table. An active hold on the whole table short-circuits the table with
//! no side effects; a record-level hold narrows the candidate `WHERE`
//! clause instead of blocking the table outright.

use crate::error::ComplianceError;
use rowvault_core::model::LegalHold;
use sqlx::PgPool;

/// Where legal holds are consulted from: a DB table, an HTTP
/// endpoint, or a static file.
pub enum LegalHoldSource {
    DatabaseTable { pool: PgPool, table: String },
    HttpEndpoint { client: reqwest::Client, url: String },
    StaticFile { path: std::path::PathBuf },
}

async fn fetch_from_db(pool: &PgPool, table: &str, database: &str, schema: &str, target_table: &str) -> Result<Vec<LegalHold>, ComplianceError> {
    let rows: Vec<(String, String, Option<String>, String, chrono::DateTime<chrono::Utc>, chrono::DateTime<chrono::Utc>, String)> = sqlx::query_as(&format!(
        "SELECT database, schema, row_predicate, reason, start, expiry, requestor FROM {table} \
         WHERE database = $1 AND schema = $2 AND table_name = $3"
    ))
    .bind(database)
    .bind(schema)
    .bind(target_table)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|(database, schema, row_predicate, reason, start, expiry, requestor)| LegalHold {
            database,
            schema,
            table: target_table.to_string(),
            row_predicate,
            reason,
            start,
            expiry,
            requestor,
        })
        .collect())
}

async fn fetch_from_http(client: &reqwest::Client, url: &str, database: &str, schema: &str, table: &str) -> Result<Vec<LegalHold>, ComplianceError> {
    let response = client
        .get(url)
        .query(&[("database", database), ("schema", schema), ("table", table)])
        .send()
        .await?
        .error_for_status()
        .map_err(|e| ComplianceError::SourceUnreachable(e.to_string()))?;
    let holds: Vec<LegalHold> = response.json().await?;
    Ok(holds)
}

fn fetch_from_file(path: &std::path::Path, database: &str, schema: &str, table: &str) -> Result<Vec<LegalHold>, ComplianceError> {
    let contents = std::fs::read_to_string(path)?;
    let all: Vec<LegalHold> = serde_json::from_str(&contents)?;
    Ok(all
        .into_iter()
        .filter(|h| h.database == database && h.schema == schema && h.table == table)
        .collect())
}

impl LegalHoldSource {
    async fn fetch(&self, database: &str, schema: &str, table: &str) -> Result<Vec<LegalHold>, ComplianceError> {
        match self {
            LegalHoldSource::DatabaseTable { pool, table: holds_table } => {
                fetch_from_db(pool, holds_table, database, schema, table).await
            }
            LegalHoldSource::HttpEndpoint { client, url } => fetch_from_http(client, url, database, schema, table).await,
            LegalHoldSource::StaticFile { path } => fetch_from_file(path, database, schema, table),
        }
    }
}

/// Returned when a table is wholly held; the caller records
/// `SKIP_LEGAL_HOLD` and runs no batches. A `None` row predicate means the
/// whole table is held; `Some(predicate)` means only a subset is, and the
/// caller should AND it into the batch select instead of skipping.
pub struct LegalHoldEvaluation {
    pub whole_table_hold: Option<LegalHold>,
    pub row_predicates: Vec<String>,
}

/// An active hold on the table short-circuits with an audit entry and no
/// side effects. Record-level holds are realized as an additional `AND`
/// clause in the batch select.
pub async fn evaluate_legal_holds(
    source: &LegalHoldSource,
    database: &str,
    schema: &str,
    table: &str,
    now: chrono::DateTime<chrono::Utc>,
) -> Result<LegalHoldEvaluation, ComplianceError> {
    let holds = source.fetch(database, schema, table).await?;
    let mut whole_table_hold = None;
    let mut row_predicates = Vec::new();

    for hold in holds {
        if !hold.is_active_at(now) {
            continue;
        }
        match &hold.row_predicate {
            None => {
                whole_table_hold = Some(hold);
                break;
            }
            Some(predicate) => row_predicates.push(predicate.clone()),
        }
    }

    Ok(LegalHoldEvaluation { whole_table_hold, row_predicates })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    fn hold(row_predicate: Option<&str>) -> LegalHold {
        let now = Utc::now();
        LegalHold {
            database: "db1".into(),
            schema: "public".into(),
            table: "audit_logs".into(),
            row_predicate: row_predicate.map(str::to_string),
            reason: "case-X".into(),
            start: now - Duration::days(1),
            expiry: now + Duration::days(1),
            requestor: "legal@example.com".into(),
        }
    }

    #[test]
    fn expired_hold_is_not_active() {
        let mut h = hold(None);
        h.expiry = Utc::now() - Duration::days(1);
        assert!(!h.is_active_at(Utc::now()));
    }

    #[tokio::test]
    async fn whole_table_hold_from_static_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("holds.json");
        std::fs::write(&path, serde_json::to_vec(&vec![hold(None)]).unwrap()).unwrap();

        let source = LegalHoldSource::StaticFile { path };
        let eval = evaluate_legal_holds(&source, "db1", "public", "audit_logs", Utc::now()).await.unwrap();
        assert!(eval.whole_table_hold.is_some());
        assert!(eval.row_predicates.is_empty());
    }

    #[tokio::test]
    async fn record_level_hold_narrows_instead_of_blocking() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("holds.json");
        std::fs::write(&path, serde_json::to_vec(&vec![hold(Some("account_id = 42"))]).unwrap()).unwrap();

        let source = LegalHoldSource::StaticFile { path };
        let eval = evaluate_legal_holds(&source, "db1", "public", "audit_logs", Utc::now()).await.unwrap();
        assert!(eval.whole_table_hold.is_none());
        assert_eq!(eval.row_predicates, vec!["account_id = 42".to_string()]);
    }
}
