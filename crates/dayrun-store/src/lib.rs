//! Persistence layer for dayrun
//!
//! Provides the append-only session log: one `LogRecord` per finished
//! session, queryable by recency, name or start time.

mod sqlite;
mod traits;

pub use sqlite::*;
pub use traits::*;

use dayrun_util::DayrunError;
use thiserror::Error;

/// Store errors
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Session already logged: {0}")]
    AlreadyLogged(String),
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        StoreError::Database(e.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Serialization(e.to_string())
    }
}

impl From<StoreError> for DayrunError {
    fn from(e: StoreError) -> Self {
        DayrunError::store(e.to_string())
    }
}

pub type StoreResult<T> = Result<T, StoreError>;
