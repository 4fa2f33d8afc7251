//! Shared state behind the `/health`, `/ready`, and `/metrics` endpoints
//!. A run orchestrator records its summary here as it finishes;
//! handlers only ever read a snapshot.

use chrono::{DateTime, Utc};
use rowvault_core::model::RunSummary;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;

pub struct ServerState {
    started_at: DateTime<Utc>,
    ready: AtomicBool,
    last_summary: RwLock<Option<RunSummary>>,
}

impl Default for ServerState {
    fn default() -> Self {
        Self { started_at: Utc::now(), ready: AtomicBool::new(false), last_summary: RwLock::new(None) }
    }
}

impl ServerState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark_ready(&self) {
        self.ready.store(true, Ordering::SeqCst);
    }

    pub fn mark_not_ready(&self) {
        self.ready.store(false, Ordering::SeqCst);
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    pub async fn record_summary(&self, summary: RunSummary) {
        *self.last_summary.write().await = Some(summary);
    }

    pub async fn snapshot(&self) -> Snapshot {
        let summary = self.last_summary.read().await.clone();
        Snapshot { uptime_seconds: (Utc::now() - self.started_at).num_seconds().max(0), ready: self.is_ready(), summary }
    }
}

#[derive(Debug, Clone)]
pub struct Snapshot {
    pub uptime_seconds: i64,
    pub ready: bool,
    pub summary: Option<RunSummary>,
}
