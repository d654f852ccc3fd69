//! Effect adapter traits

use async_trait::async_trait;
use dayrun_api::MultiplexLayout;
use std::path::Path;
use thiserror::Error;

use crate::{Capabilities, OsFamily};

/// Errors from effect adapter operations
#[derive(Debug, Error)]
pub enum EffectError {
    #[error("{0} is not available")]
    ToolMissing(String),

    #[error("{program} exited with {status}")]
    CommandFailed { program: String, status: String },

    #[error("Spawn failed: {0}")]
    SpawnFailed(String),

    #[error("Don't know how to open '{0}'")]
    UnsupportedTarget(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type EffectResult<T> = Result<T, EffectError>;

/// Result of launching one pane's command outside a multiplexer
#[derive(Debug)]
pub struct PaneLaunch {
    /// Pane title, or its command when untitled
    pub pane: String,
    pub result: EffectResult<()>,
}

/// What `create_multiplex_session` ended up doing
#[derive(Debug)]
pub enum MultiplexOutcome {
    /// A multiplexer session was created (possibly under a suffixed name)
    Created { session_name: String },

    /// No multiplexer: every pane ran as an ordinary background command
    Fallback { launches: Vec<PaneLaunch> },
}

/// Effect adapter trait - implemented once per OS family.
///
/// Every operation is best-effort: the engine records failures and moves
/// on. Operations gated by a capability succeed as no-ops when that
/// capability is absent.
#[async_trait]
pub trait EffectAdapter: Send + Sync {
    /// OS family this adapter issues commands for
    fn os_family(&self) -> OsFamily;

    /// Capabilities probed at construction
    fn capabilities(&self) -> &Capabilities;

    /// Turn do-not-disturb on or off
    async fn set_dnd(&self, enabled: bool) -> EffectResult<()>;

    /// Show a desktop notification
    async fn notify(&self, title: &str, body: &str) -> EffectResult<()>;

    /// Open an application, URL or file with the system's default handler
    async fn open_target(&self, target: &str) -> EffectResult<()>;

    /// Launch a shell command in the background, detached from this process
    async fn run_command(&self, command: &str, cwd: Option<&Path>) -> EffectResult<()>;

    /// Create a multiplexer workspace, or run its panes as plain commands
    async fn create_multiplex_session(
        &self,
        layout: &MultiplexLayout,
    ) -> EffectResult<MultiplexOutcome>;
}

/// Run every pane of `layout` through `run_command`, in order.
///
/// Used by adapters when no multiplexer is available; one pane failing
/// does not stop the others.
pub async fn run_panes_as_commands<A>(adapter: &A, layout: &MultiplexLayout) -> MultiplexOutcome
where
    A: EffectAdapter + ?Sized,
{
    let mut launches = Vec::with_capacity(layout.panes.len());
    for pane in &layout.panes {
        let result = adapter.run_command(&pane.command, pane.cwd.as_deref()).await;
        launches.push(PaneLaunch {
            pane: pane.label().to_string(),
            result,
        });
    }
    MultiplexOutcome::Fallback { launches }
}
