use crate::domain::error::DomainError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum InfraError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Invalid config: {0}")]
    InvalidConfig(String),
    #[error("Corrupt tracker state: {0}")]
    CorruptState(String),
    #[error("Lock poisoned: {0}")]
    LockPoisoned(String),
    #[error(transparent)]
    Domain(#[from] DomainError),
}
