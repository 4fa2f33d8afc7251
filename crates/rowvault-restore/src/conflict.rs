//! Row-level conflict resolution on restore: applied once per row
//! against the current primary-key set, after schema reconciliation.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictStrategy {
    /// Leave the existing row untouched; the restored row is dropped.
    Skip,
    /// Replace the existing row's columns with the restored values.
    Overwrite,
    /// Abort the restore the moment a conflicting primary key is found.
    Fail,
    /// Insert new rows, update colliding ones — no failure either way.
    Upsert,
}

impl ConflictStrategy {
    /// The `ON CONFLICT` clause fragment for this strategy, given the
    /// primary-key column and the ordered non-key column list to update.
    pub fn on_conflict_clause(&self, pk_column: &str, update_columns: &[String]) -> String {
        match self {
            ConflictStrategy::Skip => format!("ON CONFLICT (\"{pk_column}\") DO NOTHING"),
            ConflictStrategy::Fail => String::new(),
            ConflictStrategy::Overwrite | ConflictStrategy::Upsert => {
                if update_columns.is_empty() {
                    format!("ON CONFLICT (\"{pk_column}\") DO NOTHING")
                } else {
                    let assignments: Vec<String> =
                        update_columns.iter().map(|c| format!("\"{c}\" = EXCLUDED.\"{c}\"")).collect();
                    format!("ON CONFLICT (\"{pk_column}\") DO UPDATE SET {}", assignments.join(", "))
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn skip_does_nothing_on_conflict() {
        assert_eq!(ConflictStrategy::Skip.on_conflict_clause("id", &["name".into()]), "ON CONFLICT (\"id\") DO NOTHING");
    }

    #[test]
    fn fail_has_no_conflict_clause_so_the_database_raises_a_unique_violation() {
        assert_eq!(ConflictStrategy::Fail.on_conflict_clause("id", &["name".into()]), "");
    }

    #[test]
    fn upsert_updates_every_non_key_column() {
        let clause = ConflictStrategy::Upsert.on_conflict_clause("id", &["name".into(), "amount".into()]);
        assert!(clause.contains("\"name\" = EXCLUDED.\"name\""));
        assert!(clause.contains("\"amount\" = EXCLUDED.\"amount\""));
    }
}
