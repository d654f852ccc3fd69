//! Session specs and lifecycle states

use dayrun_util::{DayrunError, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Fully-resolved description of one focused session.
///
/// Built by the config layer from a template and/or command-line flags;
/// immutable once handed to the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSpec {
    pub name: String,

    /// Session length; `None` runs until stopped
    #[serde(default)]
    pub duration: Option<Duration>,

    /// Applications, URLs or files to open, in order
    #[serde(default)]
    pub open: Vec<String>,

    /// Shell commands launched in the background, in order
    #[serde(default)]
    pub commands: Vec<String>,

    /// Terminal multiplexer workspace
    #[serde(default)]
    pub multiplex: Option<MultiplexLayout>,

    /// Ambient audio file or stream URL
    #[serde(default)]
    pub audio: Option<String>,

    /// Enable do-not-disturb for the session
    #[serde(default)]
    pub dnd: bool,

    /// Send start and end notifications
    #[serde(default)]
    pub notify: bool,
}

impl SessionSpec {
    /// Create an empty spec with only a name
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            duration: None,
            open: Vec::new(),
            commands: Vec::new(),
            multiplex: None,
            audio: None,
            dnd: false,
            notify: false,
        }
    }

    /// Whether starting this spec would apply any effect at all
    pub fn has_effects(&self) -> bool {
        self.dnd
            || self.notify
            || !self.open.is_empty()
            || !self.commands.is_empty()
            || self.multiplex.is_some()
            || self.audio.is_some()
    }

    /// Reject specs the engine must never start.
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(DayrunError::invalid("session name cannot be empty"));
        }

        if self.duration == Some(Duration::ZERO) {
            return Err(DayrunError::invalid("duration must be greater than zero"));
        }

        if self.duration.is_none() && !self.has_effects() {
            return Err(DayrunError::invalid(
                "session has no duration and nothing to do",
            ));
        }

        if let Some(target) = self.open.iter().find(|t| t.trim().is_empty()) {
            return Err(DayrunError::invalid(format!(
                "open target cannot be blank: {:?}",
                target
            )));
        }

        if self.commands.iter().any(|c| c.trim().is_empty()) {
            return Err(DayrunError::invalid("command cannot be blank"));
        }

        if let Some(audio) = &self.audio
            && audio.trim().is_empty()
        {
            return Err(DayrunError::invalid("audio source cannot be blank"));
        }

        if let Some(layout) = &self.multiplex {
            layout.validate()?;
        }

        Ok(())
    }
}

/// Terminal multiplexer workspace: one named session, one pane per entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MultiplexLayout {
    pub session_name: String,
    #[serde(default)]
    pub panes: Vec<PaneSpec>,
}

impl MultiplexLayout {
    pub fn validate(&self) -> Result<()> {
        if self.session_name.trim().is_empty() {
            return Err(DayrunError::invalid("multiplex session name cannot be empty"));
        }
        // tmux target syntax reserves these
        if self.session_name.contains([':', '.']) {
            return Err(DayrunError::invalid(format!(
                "multiplex session name '{}' cannot contain ':' or '.'",
                self.session_name
            )));
        }
        for (i, pane) in self.panes.iter().enumerate() {
            if pane.command.trim().is_empty() {
                return Err(DayrunError::invalid(format!(
                    "pane {} of '{}' has an empty command",
                    i + 1,
                    self.session_name
                )));
            }
        }
        Ok(())
    }
}

/// One pane of a multiplexer workspace
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaneSpec {
    #[serde(default)]
    pub title: Option<String>,
    pub command: String,
    #[serde(default)]
    pub cwd: Option<PathBuf>,
}

impl PaneSpec {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            title: None,
            command: command.into(),
            cwd: None,
        }
    }

    pub fn titled(title: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
            command: command.into(),
            cwd: None,
        }
    }

    /// Label used in logs and failure records
    pub fn label(&self) -> &str {
        self.title.as_deref().unwrap_or(&self.command)
    }
}

/// Session lifecycle state
///
/// `Pending -> Running -> Ending -> Completed | Aborted`. `Ending` is
/// entered at most once per session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Pending,
    Running,
    Ending,
    Completed,
    Aborted,
}

impl SessionState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Completed | SessionState::Aborted)
    }
}

/// Terminal outcome recorded in the session log
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionOutcome {
    Completed,
    Aborted,
}

impl SessionOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionOutcome::Completed => "completed",
            SessionOutcome::Aborted => "aborted",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "completed" => Some(SessionOutcome::Completed),
            "aborted" => Some(SessionOutcome::Aborted),
            _ => None,
        }
    }
}

impl From<SessionOutcome> for SessionState {
    fn from(outcome: SessionOutcome) -> Self {
        match outcome {
            SessionOutcome::Completed => SessionState::Completed,
            SessionOutcome::Aborted => SessionState::Aborted,
        }
    }
}

/// Why a session entered `Ending`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndReason {
    /// The configured duration elapsed
    Elapsed,
    /// A stop was requested (CLI `stop`, signal, or API call)
    StopRequested,
    /// The owning process died; ended by a later invocation
    OwnerLost,
}

impl EndReason {
    pub fn outcome(&self) -> SessionOutcome {
        match self {
            EndReason::Elapsed => SessionOutcome::Completed,
            EndReason::StopRequested | EndReason::OwnerLost => SessionOutcome::Aborted,
        }
    }
}
