//! C7 Compliance Gate: evaluated once before the first batch of a
//! table, combining legal hold, retention bounds, and encryption
//! enforcement into a single admission decision.

use crate::encryption::check_encryption_required;
use crate::error::ComplianceError;
use crate::legal_hold::{evaluate_legal_holds, LegalHoldSource};
use crate::retention::RetentionPolicy;
use chrono::Utc;
use rowvault_core::model::TableTarget;

/// The outcome of gating one table: either admitted (with any narrowing row
/// predicates from record-level holds applied) or blocked outright.
pub enum GateDecision {
    Admit { extra_where_predicates: Vec<String> },
    SkipLegalHold { reason: String },
}

pub struct ComplianceGate {
    pub legal_hold_source: LegalHoldSource,
    pub retention_policy: RetentionPolicy,
    pub sse_option: Option<String>,
}

impl ComplianceGate {
    pub async fn evaluate(&self, target: &TableTarget) -> Result<GateDecision, ComplianceError> {
        self.retention_policy.check(target.retention_days, &target.classification)?;
        check_encryption_required(target.critical, self.sse_option.as_deref())?;

        let evaluation = evaluate_legal_holds(
            &self.legal_hold_source,
            &target.database,
            &target.schema,
            &target.table,
            Utc::now(),
        )
        .await?;

        if let Some(hold) = evaluation.whole_table_hold {
            return Ok(GateDecision::SkipLegalHold { reason: hold.reason });
        }

        Ok(GateDecision::Admit { extra_where_predicates: evaluation.row_predicates })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retention::RetentionBounds;

    fn target() -> TableTarget {
        TableTarget {
            database: "db1".into(),
            schema: "public".into(),
            table: "audit_logs".into(),
            timestamp_column: "created_at".into(),
            primary_key_column: "id".into(),
            retention_days: 90,
            classification: "standard".into(),
            critical: false,
            batch_size: 1000,
            schema_hash_at_last_run: None,
        }
    }

    #[tokio::test]
    async fn admits_when_no_holds_and_bounds_satisfied() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("holds.json");
        std::fs::write(&path, b"[]").unwrap();

        let gate = ComplianceGate {
            legal_hold_source: LegalHoldSource::StaticFile { path },
            retention_policy: RetentionPolicy {
                global: Some(RetentionBounds { min_days: 1, max_days: 3650 }),
                ..Default::default()
            },
            sse_option: None,
        };

        let decision = gate.evaluate(&target()).await.unwrap();
        assert!(matches!(decision, GateDecision::Admit { .. }));
    }

    #[tokio::test]
    async fn critical_table_without_encryption_is_rejected_before_legal_hold_lookup() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("holds.json");
        std::fs::write(&path, b"[]").unwrap();

        let mut critical_target = target();
        critical_target.critical = true;

        let gate = ComplianceGate {
            legal_hold_source: LegalHoldSource::StaticFile { path },
            retention_policy: RetentionPolicy::default(),
            sse_option: None,
        };

        let result = gate.evaluate(&critical_target).await;
        assert!(matches!(result, Err(ComplianceError::EncryptionRequired)));
    }
}
