//! Route handlers for the metrics/health surface.

use crate::state::{ServerState, Snapshot};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde_json::json;
use std::sync::Arc;

pub(crate) type AppState = Arc<ServerState>;

/// GET /health - liveness only, never fails once the process is up.
pub(crate) async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, Json(json!({"status": "healthy"})))
}

/// GET /ready - readiness, reflecting whether a run has completed setup
/// (lock acquired, storage reachable) via [`ServerState::mark_ready`].
pub(crate) async fn ready_check(State(state): State<AppState>) -> impl IntoResponse {
    let snapshot = state.snapshot().await;
    if snapshot.ready {
        (StatusCode::OK, Json(json!({"status": "ready"})))
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, Json(json!({"status": "not ready"})))
    }
}

/// GET /metrics - Prometheus text exposition format, hand-rendered from
/// the last recorded [`RunSummary`](rowvault_core::model::RunSummary)
/// rather than wired through an external exporter crate.
pub(crate) async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    let snapshot = state.snapshot().await;
    let body = render_prometheus_text(&snapshot);
    (StatusCode::OK, [("content-type", "text/plain; version=0.0.4")], body)
}

fn render_prometheus_text(snapshot: &Snapshot) -> String {
    let mut out = String::new();
    out.push_str("# TYPE rowvault_uptime_seconds gauge\n");
    out.push_str(&format!("rowvault_uptime_seconds {}\n", snapshot.uptime_seconds));
    out.push_str("# TYPE rowvault_ready gauge\n");
    out.push_str(&format!("rowvault_ready {}\n", if snapshot.ready { 1 } else { 0 }));

    let Some(summary) = &snapshot.summary else {
        return out;
    };

    out.push_str("# TYPE rowvault_run_databases_processed counter\n");
    out.push_str(&format!("rowvault_run_databases_processed {}\n", summary.databases_processed));
    out.push_str("# TYPE rowvault_run_databases_failed counter\n");
    out.push_str(&format!("rowvault_run_databases_failed {}\n", summary.databases_failed));
    out.push_str("# TYPE rowvault_run_records_archived counter\n");
    out.push_str(&format!("rowvault_run_records_archived {}\n", summary.records_archived));
    out.push_str("# TYPE rowvault_run_bytes_uploaded counter\n");
    out.push_str(&format!("rowvault_run_bytes_uploaded {}\n", summary.bytes_uploaded));

    out.push_str("# TYPE rowvault_table_records_archived counter\n");
    out.push_str("# TYPE rowvault_table_succeeded gauge\n");
    for table in &summary.tables {
        out.push_str(&format!(
            "rowvault_table_records_archived{{database=\"{}\",schema=\"{}\",table=\"{}\"}} {}\n",
            table.database, table.schema, table.table, table.records_archived
        ));
        out.push_str(&format!(
            "rowvault_table_succeeded{{database=\"{}\",schema=\"{}\",table=\"{}\"}} {}\n",
            table.database,
            table.schema,
            table.table,
            if table.succeeded { 1 } else { 0 }
        ));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use rowvault_core::model::{RunSummary, TableOutcome};

    #[test]
    fn renders_gauges_with_no_run_yet() {
        let snapshot = Snapshot { uptime_seconds: 5, ready: false, summary: None };
        let text = render_prometheus_text(&snapshot);
        assert!(text.contains("rowvault_uptime_seconds 5"));
        assert!(text.contains("rowvault_ready 0"));
        assert!(!text.contains("rowvault_run_records_archived"));
    }

    #[test]
    fn renders_per_table_series_once_a_run_completes() {
        let summary = RunSummary {
            databases_processed: 1,
            databases_failed: 0,
            records_archived: 42,
            bytes_uploaded: 1024,
            tables: vec![TableOutcome {
                database: "db1".into(),
                schema: "public".into(),
                table: "events".into(),
                records_archived: 42,
                bytes_uploaded: 1024,
                succeeded: true,
                error_class: None,
            }],
        };
        let snapshot = Snapshot { uptime_seconds: 10, ready: true, summary: Some(summary) };
        let text = render_prometheus_text(&snapshot);
        assert!(text.contains("rowvault_run_records_archived 42"));
        assert!(text.contains(r#"rowvault_table_succeeded{database="db1",schema="public",table="events"} 1"#));
    }
}
