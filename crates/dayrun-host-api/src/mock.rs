//! Mock effect adapter for testing

use async_trait::async_trait;
use dayrun_api::{EffectOp, MultiplexLayout};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use crate::{
    run_panes_as_commands, Capabilities, EffectAdapter, EffectError, EffectResult,
    MultiplexOutcome, OsFamily,
};

/// An effect the mock actually applied
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EffectCall {
    SetDnd(bool),
    Notify { title: String, body: String },
    Open(String),
    Run { command: String, cwd: Option<PathBuf> },
    Multiplex(String),
}

/// Mock adapter for unit/integration testing.
///
/// Records every applied effect in order. Capability-gated operations are
/// not recorded when the capability is off, mirroring the real adapters'
/// silent no-op.
pub struct MockAdapter {
    capabilities: Capabilities,
    calls: Arc<Mutex<Vec<EffectCall>>>,

    /// Targets (open targets or commands) that fail
    pub fail_targets: Arc<Mutex<HashSet<String>>>,

    /// Operations that always fail
    pub fail_ops: Arc<Mutex<HashSet<EffectOp>>>,
}

impl MockAdapter {
    pub fn new() -> Self {
        Self {
            capabilities: Capabilities::all(),
            calls: Arc::new(Mutex::new(Vec::new())),
            fail_targets: Arc::new(Mutex::new(HashSet::new())),
            fail_ops: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    pub fn with_capabilities(mut self, caps: Capabilities) -> Self {
        self.capabilities = caps;
        self
    }

    /// Make `open_target`/`run_command` fail for this target
    pub fn fail_target(self, target: impl Into<String>) -> Self {
        self.fail_targets.lock().unwrap().insert(target.into());
        self
    }

    /// Make every call of this operation fail
    pub fn fail_op(self, op: EffectOp) -> Self {
        self.fail_ops.lock().unwrap().insert(op);
        self
    }

    /// Applied effects, in order
    pub fn calls(&self) -> Vec<EffectCall> {
        self.calls.lock().unwrap().clone()
    }

    /// Number of applied effects matching `pred`
    pub fn count(&self, pred: impl Fn(&EffectCall) -> bool) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| pred(c)).count()
    }

    fn check(&self, op: EffectOp, target: &str) -> EffectResult<()> {
        if self.fail_ops.lock().unwrap().contains(&op) {
            return Err(EffectError::Internal(format!("Mock {} failure", op)));
        }
        if self.fail_targets.lock().unwrap().contains(target) {
            return Err(EffectError::SpawnFailed(format!("Mock failure for {}", target)));
        }
        Ok(())
    }

    fn record(&self, call: EffectCall) {
        self.calls.lock().unwrap().push(call);
    }
}

impl Default for MockAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EffectAdapter for MockAdapter {
    fn os_family(&self) -> OsFamily {
        OsFamily::current()
    }

    fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    async fn set_dnd(&self, enabled: bool) -> EffectResult<()> {
        if !self.capabilities.can_toggle_dnd {
            return Ok(());
        }
        let op = if enabled { EffectOp::SetDnd } else { EffectOp::RestoreDnd };
        self.check(op, "dnd")?;
        self.record(EffectCall::SetDnd(enabled));
        Ok(())
    }

    async fn notify(&self, title: &str, body: &str) -> EffectResult<()> {
        if !self.capabilities.can_notify {
            return Ok(());
        }
        self.check(EffectOp::Notify, title)?;
        self.record(EffectCall::Notify {
            title: title.to_string(),
            body: body.to_string(),
        });
        Ok(())
    }

    async fn open_target(&self, target: &str) -> EffectResult<()> {
        self.check(EffectOp::OpenTarget, target)?;
        self.record(EffectCall::Open(target.to_string()));
        Ok(())
    }

    async fn run_command(&self, command: &str, cwd: Option<&Path>) -> EffectResult<()> {
        self.check(EffectOp::RunCommand, command)?;
        self.record(EffectCall::Run {
            command: command.to_string(),
            cwd: cwd.map(Path::to_path_buf),
        });
        Ok(())
    }

    async fn create_multiplex_session(
        &self,
        layout: &MultiplexLayout,
    ) -> EffectResult<MultiplexOutcome> {
        if !self.capabilities.can_multiplex {
            return Ok(run_panes_as_commands(self, layout).await);
        }
        self.check(EffectOp::CreateMultiplex, &layout.session_name)?;
        self.record(EffectCall::Multiplex(layout.session_name.clone()));
        Ok(MultiplexOutcome::Created {
            session_name: layout.session_name.clone(),
        })
    }
}
