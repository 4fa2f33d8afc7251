//! Error taxonomy. Every error carries its severity and enough
//! structured context to reconstruct what failed without re-parsing a
//! message string.

use serde::Serialize;
use std::fmt;

/// Severity/recoverability classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    /// Halts the run before any side effect.
    Fatal,
    /// Aborts the current table; other tables and databases continue.
    TableError,
    /// Rolled back, retried up to the batch retry budget.
    BatchErrorTransient,
    /// Rolled back and immediately promoted to `TableError`.
    BatchErrorPermanent,
    /// Logged; no abort.
    Warning,
}

/// Structured context attached to every [`ArchiveError`].
#[derive(Debug, Clone, Default, Serialize)]
pub struct ErrorContext {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub table: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub batch_ordinal: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fingerprint: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phase: Option<String>,
}

impl ErrorContext {
    pub fn for_table(database: &str, schema: &str, table: &str) -> Self {
        Self {
            database: Some(database.to_string()),
            schema: Some(schema.to_string()),
            table: Some(table.to_string()),
            ..Default::default()
        }
    }

    pub fn with_batch(mut self, batch_ordinal: u64, fingerprint: &str, phase: &str) -> Self {
        self.batch_ordinal = Some(batch_ordinal);
        self.fingerprint = Some(fingerprint.to_string());
        self.phase = Some(phase.to_string());
        self
    }
}

impl fmt::Display for ErrorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{}.{}",
            self.database.as_deref().unwrap_or("?"),
            self.schema.as_deref().unwrap_or("?"),
            self.table.as_deref().unwrap_or("?")
        )?;
        if let Some(ordinal) = self.batch_ordinal {
            write!(f, " batch={ordinal}")?;
        }
        if let Some(phase) = &self.phase {
            write!(f, " phase={phase}")?;
        }
        Ok(())
    }
}

/// The error type returned by every rowvault component crate.
#[derive(Debug, thiserror::Error)]
#[error("{severity:?} [{context}]: {message}{}", .cause.as_ref().map(|c| format!(" (caused by: {c})")).unwrap_or_default())]
pub struct ArchiveError {
    pub severity: Severity,
    pub context: ErrorContext,
    pub message: String,
    #[source]
    pub cause: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl ArchiveError {
    pub fn new(severity: Severity, context: ErrorContext, message: impl Into<String>) -> Self {
        Self {
            severity,
            context,
            message: message.into(),
            cause: None,
        }
    }

    pub fn with_cause(
        mut self,
        cause: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        self.cause = Some(Box::new(cause));
        self
    }

    pub fn fatal(context: ErrorContext, message: impl Into<String>) -> Self {
        Self::new(Severity::Fatal, context, message)
    }

    pub fn table_error(context: ErrorContext, message: impl Into<String>) -> Self {
        Self::new(Severity::TableError, context, message)
    }

    pub fn transient(context: ErrorContext, message: impl Into<String>) -> Self {
        Self::new(Severity::BatchErrorTransient, context, message)
    }

    pub fn permanent(context: ErrorContext, message: impl Into<String>) -> Self {
        Self::new(Severity::BatchErrorPermanent, context, message)
    }

    pub fn warning(context: ErrorContext, message: impl Into<String>) -> Self {
        Self::new(Severity::Warning, context, message)
    }

    /// Permanent batch errors promote immediately to a table error;
    /// transient ones only do so once the retry budget is exhausted.
    pub fn is_retryable(&self) -> bool {
        matches!(self.severity, Severity::BatchErrorTransient)
    }
}

/// Process exit codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    Success = 0,
    PartialSuccess = 1,
    TotalFailure = 2,
    ValidationError = 3,
    LockNotAcquired = 4,
    Permissions = 5,
    ResourceExhaustion = 6,
    NetworkError = 7,
}
