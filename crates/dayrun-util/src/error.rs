//! Error types for dayrun

use thiserror::Error;

/// Fatal errors: the session cannot start, or a command cannot proceed.
///
/// Effect-level failures are never represented here; they are collected
/// as `EffectFailure` records and reported alongside a successful session.
#[derive(Debug, Error)]
pub enum DayrunError {
    #[error("A session is already running: '{name}' (pid {pid})")]
    AlreadyRunning { pid: u32, name: String },

    #[error("Invalid session: {0}")]
    InvalidSpec(String),

    #[error("Template not found: {0}")]
    TemplateNotFound(String),

    #[error("No active session")]
    NoActiveSession,

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Store error: {0}")]
    StoreError(String),

    #[error("Lock error: {0}")]
    LockError(String),

    #[error("Monitor error: {0}")]
    MonitorError(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl DayrunError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidSpec(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    pub fn store(msg: impl Into<String>) -> Self {
        Self::StoreError(msg.into())
    }

    pub fn lock(msg: impl Into<String>) -> Self {
        Self::LockError(msg.into())
    }

    pub fn monitor(msg: impl Into<String>) -> Self {
        Self::MonitorError(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Whether the error was raised before any effect could run because
    /// the request itself is unusable.
    pub fn is_invalid_request(&self) -> bool {
        matches!(self, Self::InvalidSpec(_) | Self::TemplateNotFound(_))
    }
}

pub type Result<T> = std::result::Result<T, DayrunError>;
