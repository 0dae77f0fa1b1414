use std::io;
use thiserror::Error;

/// Errors surfaced by the ledger.
///
/// Verification routines never return `HashMismatch`-style errors; they report
/// chain problems inside their report structs so a single bad manifest does
/// not stop the rest of the chain from being checked.
#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("SQLite error: {0}")]
    Sqlite(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Configuration error: {0}")]
    Config(String),

    /// Container, section or row absent. Callers usually treat this as "empty".
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Already exists: {0}")]
    AlreadyExists(String),

    /// Structural mismatch between the container and the expected schema.
    #[error("Schema invalid: {0}")]
    SchemaInvalid(String),

    /// Attempted shrink or overwrite of committed data. Always aborts the
    /// enclosing write scope.
    #[error("Append-only violation: {0}")]
    AppendOnlyViolation(String),

    #[error("Manifest already exists for {0}")]
    ManifestExists(chrono::NaiveDate),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

impl From<serde_json::Error> for LedgerError {
    fn from(err: serde_json::Error) -> Self {
        LedgerError::Serialization(err.to_string())
    }
}

impl LedgerError {
    /// Whether this error means "nothing there yet" rather than a failure.
    pub fn is_not_found(&self) -> bool {
        matches!(self, LedgerError::NotFound(_))
    }

    /// Whether this error indicates the append-only contract was violated.
    pub fn is_integrity_violation(&self) -> bool {
        matches!(
            self,
            LedgerError::AppendOnlyViolation(_) | LedgerError::SchemaInvalid(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, LedgerError>;
