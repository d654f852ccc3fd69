//! SQLite-based session log

use chrono::{DateTime, Local};
use dayrun_api::LogRecord;
use rusqlite::{params, Connection, ErrorCode, OptionalExtension};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, warn};

use crate::{SessionLog, StoreError, StoreResult};

/// SQLite-based store
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open or create a store at the given path
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    /// Create an in-memory store (for testing)
    pub fn in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn conn(&self) -> StoreResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| StoreError::Database("connection lock poisoned".into()))
    }

    fn init_schema(&self) -> StoreResult<()> {
        let conn = self.conn()?;

        conn.execute_batch(
            r#"
            -- Session log (append-only)
            CREATE TABLE IF NOT EXISTS sessions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                session_id TEXT NOT NULL UNIQUE,
                name TEXT NOT NULL,
                started_ms INTEGER NOT NULL,
                ended_ms INTEGER NOT NULL,
                outcome TEXT NOT NULL,
                record_json TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_sessions_name ON sessions(name);
            CREATE INDEX IF NOT EXISTS idx_sessions_started ON sessions(started_ms);
            "#,
        )?;

        debug!("Store schema initialized");
        Ok(())
    }

    fn query_records(
        &self,
        sql: &str,
        params: impl rusqlite::Params,
    ) -> StoreResult<Vec<LogRecord>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt.query_map(params, |row| row.get::<_, String>(0))?;

        let mut records = Vec::new();
        for row in rows {
            let json = row?;
            match serde_json::from_str::<LogRecord>(&json) {
                Ok(record) => records.push(record),
                Err(e) => warn!(error = %e, "Skipping unreadable session record"),
            }
        }
        Ok(records)
    }
}

impl SessionLog for SqliteStore {
    fn append(&self, record: &LogRecord) -> StoreResult<()> {
        let conn = self.conn()?;
        let record_json = serde_json::to_string(record)?;
        let session_id = record.session_id.to_string();

        let result = conn.execute(
            r#"
            INSERT INTO sessions (session_id, name, started_ms, ended_ms, outcome, record_json)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
            params![
                session_id,
                record.name,
                record.started_at.timestamp_millis(),
                record.ended_at.timestamp_millis(),
                record.outcome.as_str(),
                record_json,
            ],
        );

        match result {
            Ok(_) => {
                debug!(
                    session_id = %record.session_id,
                    name = %record.name,
                    outcome = record.outcome.as_str(),
                    failures = record.failures.len(),
                    "Session logged"
                );
                Ok(())
            }
            Err(rusqlite::Error::SqliteFailure(e, _)) if e.code == ErrorCode::ConstraintViolation => {
                Err(StoreError::AlreadyLogged(session_id))
            }
            Err(e) => Err(e.into()),
        }
    }

    fn recent(&self, limit: usize) -> StoreResult<Vec<LogRecord>> {
        self.query_records(
            "SELECT record_json FROM sessions ORDER BY id DESC LIMIT ?",
            [limit as i64],
        )
    }

    fn find_by_name(&self, name: &str, limit: usize) -> StoreResult<Vec<LogRecord>> {
        self.query_records(
            "SELECT record_json FROM sessions WHERE name = ? ORDER BY id DESC LIMIT ?",
            params![name, limit as i64],
        )
    }

    fn find_by_start(&self, started_at: DateTime<Local>) -> StoreResult<Option<LogRecord>> {
        let conn = self.conn()?;
        let json: Option<String> = conn
            .query_row(
                "SELECT record_json FROM sessions WHERE started_ms = ? ORDER BY id DESC LIMIT 1",
                [started_at.timestamp_millis()],
                |row| row.get(0),
            )
            .optional()?;

        match json {
            Some(s) => Ok(Some(serde_json::from_str(&s)?)),
            None => Ok(None),
        }
    }

    fn count(&self) -> StoreResult<usize> {
        let conn = self.conn()?;
        let n: i64 = conn.query_row("SELECT COUNT(*) FROM sessions", [], |row| row.get(0))?;
        Ok(n.max(0) as usize)
    }

    fn is_healthy(&self) -> bool {
        match self.conn.lock() {
            Ok(conn) => conn.query_row("SELECT 1", [], |_| Ok(())).is_ok(),
            Err(_) => {
                warn!("Store lock poisoned");
                false
            }
        }
    }
}
