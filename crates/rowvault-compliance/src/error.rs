//! Typed error surface for the compliance gate. Every variant is a
//! `TABLE_ERROR`: the table is skipped, the run continues.

#[derive(Debug, thiserror::Error)]
pub enum ComplianceError {
    #[error("legal hold active on {table}: {reason}")]
    LegalHold { table: String, reason: String },

    #[error("retention_days {actual} out of bounds [{min}, {max}] for classification {classification}")]
    RetentionOutOfBounds { actual: u32, min: u32, max: u32, classification: String },

    #[error("table is marked critical but encryption is disabled")]
    EncryptionRequired,

    #[error("legal hold source unreachable: {0}")]
    SourceUnreachable(String),

    #[error("database error: {0}")]
    Db(#[from] rowvault_db::DbError),

    #[error("http error querying legal hold endpoint: {0}")]
    Http(#[from] reqwest::Error),

    #[error("io error reading legal hold file: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed legal hold source: {0}")]
    Serde(#[from] serde_json::Error),
}
