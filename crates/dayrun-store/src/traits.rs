//! Store trait definitions

use chrono::{DateTime, Local};
use dayrun_api::LogRecord;

use crate::StoreResult;

/// Append-only log of finished sessions.
///
/// Records are never rewritten; appending a second record for the same
/// session fails.
pub trait SessionLog: Send + Sync {
    /// Append a finished session
    fn append(&self, record: &LogRecord) -> StoreResult<()>;

    /// Most recent sessions, newest first
    fn recent(&self, limit: usize) -> StoreResult<Vec<LogRecord>>;

    /// Most recent sessions with this name, newest first
    fn find_by_name(&self, name: &str, limit: usize) -> StoreResult<Vec<LogRecord>>;

    /// The session that started at exactly this instant, if any
    fn find_by_start(&self, started_at: DateTime<Local>) -> StoreResult<Option<LogRecord>>;

    /// Number of logged sessions
    fn count(&self) -> StoreResult<usize>;

    /// Check if store is healthy
    fn is_healthy(&self) -> bool;
}
