//! Persisted records: lock file content, session log entries, effect failures

use chrono::{DateTime, Local};
use dayrun_util::SessionId;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use crate::SessionOutcome;

/// Effect operation that can fail without failing the session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EffectOp {
    SetDnd,
    RestoreDnd,
    Notify,
    OpenTarget,
    RunCommand,
    CreateMultiplex,
    PlayAudio,
}

impl EffectOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            EffectOp::SetDnd => "set_dnd",
            EffectOp::RestoreDnd => "restore_dnd",
            EffectOp::Notify => "notify",
            EffectOp::OpenTarget => "open_target",
            EffectOp::RunCommand => "run_command",
            EffectOp::CreateMultiplex => "create_multiplex",
            EffectOp::PlayAudio => "play_audio",
        }
    }
}

impl fmt::Display for EffectOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One best-effort operation that failed: (operation, target, error)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EffectFailure {
    pub op: EffectOp,
    pub target: String,
    pub error: String,
}

impl EffectFailure {
    pub fn new(op: EffectOp, target: impl Into<String>, error: impl ToString) -> Self {
        Self {
            op,
            target: target.into(),
            error: error.to_string(),
        }
    }
}

impl fmt::Display for EffectFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} '{}': {}", self.op, self.target, self.error)
    }
}

/// Content of the session lock file.
///
/// The file existing and `pid` being alive is the only definition of
/// "a session is active".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockRecord {
    /// Process that owns the remainder of the session
    pub pid: u32,
    pub session_id: SessionId,
    pub name: String,
    pub started_at: DateTime<Local>,
    /// When the session is due to end; `None` runs until stopped
    #[serde(default)]
    pub deadline: Option<DateTime<Local>>,
    /// Whether the session turned DND on, so a later invocation can
    /// restore it if the owner died
    #[serde(default)]
    pub dnd: bool,
}

impl LockRecord {
    /// Same record, owned by another process
    pub fn with_owner(&self, pid: u32) -> Self {
        Self {
            pid,
            ..self.clone()
        }
    }

    pub fn is_owned_by(&self, session_id: &SessionId, pid: u32) -> bool {
        &self.session_id == session_id && self.pid == pid
    }
}

/// One finished session in the append-only session log
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogRecord {
    pub session_id: SessionId,
    pub name: String,
    pub started_at: DateTime<Local>,
    pub ended_at: DateTime<Local>,
    pub outcome: SessionOutcome,
    #[serde(default)]
    pub failures: Vec<EffectFailure>,
    /// Whether the end of the session was owned by a detached monitor
    #[serde(default)]
    pub detached: bool,
}

impl LogRecord {
    pub fn duration(&self) -> Duration {
        (self.ended_at - self.started_at)
            .to_std()
            .unwrap_or(Duration::ZERO)
    }

    pub fn has_failures(&self) -> bool {
        !self.failures.is_empty()
    }
}
