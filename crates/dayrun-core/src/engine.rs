//! Session orchestration engine

use dayrun_api::{
    EffectFailure, EffectOp, EndReason, LockRecord, LogRecord, SessionOutcome, SessionSpec,
};
use dayrun_host_api::{run_panes_as_commands, EffectAdapter, EffectResult, MultiplexOutcome};
use dayrun_store::{SessionLog, StoreError};
use dayrun_util::{format_duration, handoff_path, DayrunError, Result, SessionId};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::{
    LockStatus, MonitorHandoff, MonitorLauncher, SessionHandle, SessionLock, StartOptions,
    StopRequest,
};

/// Title used for every desktop notification
pub const NOTIFICATION_TITLE: &str = "dayrun";

/// What `run` ended up doing
#[derive(Debug)]
pub enum StartOutcome {
    /// A detached monitor owns the rest of the session
    Detached {
        session_id: SessionId,
        monitor_pid: u32,
        failures: Vec<EffectFailure>,
    },
    /// The session ran to its end in this process
    Finished(LogRecord),
}

/// The session engine: applies start and end effects around the lock.
pub struct SessionEngine {
    adapter: Arc<dyn EffectAdapter>,
    log: Arc<dyn SessionLog>,
    lock: SessionLock,
    data_dir: PathBuf,
    launcher: Option<Arc<dyn MonitorLauncher>>,
    pid: u32,
}

impl SessionEngine {
    /// Create an engine storing its lock and handoffs under `data_dir`
    pub fn new(
        adapter: Arc<dyn EffectAdapter>,
        log: Arc<dyn SessionLog>,
        data_dir: impl Into<PathBuf>,
    ) -> Self {
        let data_dir = data_dir.into();
        Self {
            adapter,
            log,
            lock: SessionLock::in_data_dir(&data_dir),
            data_dir,
            launcher: None,
            pid: std::process::id(),
        }
    }

    /// Enable `detach` by providing a way to start monitors
    pub fn with_launcher(mut self, launcher: Arc<dyn MonitorLauncher>) -> Self {
        self.launcher = Some(launcher);
        self
    }

    pub fn adapter(&self) -> &Arc<dyn EffectAdapter> {
        &self.adapter
    }

    pub fn log(&self) -> &Arc<dyn SessionLog> {
        &self.log
    }

    pub fn lock(&self) -> &SessionLock {
        &self.lock
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Process recorded as lock owner for sessions this engine runs
    pub fn owner_pid(&self) -> u32 {
        self.pid
    }

    /// What the lock says about the active session
    pub fn status(&self) -> Result<LockStatus> {
        self.lock.status()
    }

    /// Start a session: take the lock, apply start effects and, when
    /// detaching, hand the rest of the session to a monitor.
    ///
    /// Only an invalid spec, a live lock holder or asking to detach without
    /// a launcher are errors; effect failures are collected on the handle.
    /// When the monitor cannot be started the handle stays attached and the
    /// caller waits on it as usual.
    pub async fn start(&self, spec: SessionSpec, options: StartOptions) -> Result<SessionHandle> {
        spec.validate()?;
        if options.detach && self.launcher.is_none() {
            return Err(DayrunError::monitor("detaching is not available"));
        }

        let handle = SessionHandle::new(spec, options);
        let record = LockRecord {
            pid: self.pid,
            session_id: handle.id().clone(),
            name: handle.spec().name.clone(),
            started_at: handle.started_at(),
            deadline: handle.deadline(),
            dnd: handle.spec().dnd,
        };

        let acquired = self.lock.acquire(record)?;
        if let Some(stale) = acquired.recovered {
            self.recover(stale).await;
        }

        handle.mark_running();
        info!(
            session_id = %handle.id(),
            name = %handle.spec().name,
            deadline = ?handle.deadline(),
            detach = options.detach,
            "Session started"
        );

        self.apply_start_effects(&handle).await;

        // Without a monitor the session stays attached to this process
        if options.detach
            && let Err(e) = self.hand_off(&handle)
        {
            warn!(session_id = %handle.id(), error = %e, "Monitor handoff failed; staying attached");
        }

        Ok(handle)
    }

    /// Block until an attached session ends, then end it
    pub async fn wait(&self, handle: &SessionHandle) -> Result<LogRecord> {
        if handle.is_detached() {
            return Err(DayrunError::internal("session is owned by its monitor"));
        }
        let reason = handle.wait_for_end().await;
        self.end(handle, reason)
            .await?
            .ok_or_else(|| DayrunError::internal("session was ended elsewhere"))
    }

    /// Start a session and, unless detached, run it to completion
    pub async fn run(&self, spec: SessionSpec, options: StartOptions) -> Result<StartOutcome> {
        let handle = self.start(spec, options).await?;
        match handle.monitor_pid() {
            Some(monitor_pid) => Ok(StartOutcome::Detached {
                session_id: handle.id().clone(),
                monitor_pid,
                failures: handle.failures(),
            }),
            None => Ok(StartOutcome::Finished(self.wait(&handle).await?)),
        }
    }

    /// Request early termination of an in-process session
    pub fn stop(&self, handle: &SessionHandle) -> bool {
        handle.stop()
    }

    /// Stop whichever session holds the lock, from any process. A stale
    /// lock is recovered instead.
    pub async fn request_stop(&self) -> Result<StopRequest> {
        let request = self.lock.request_stop()?;
        if let StopRequest::ClearedStale(Some(stale)) = &request {
            self.recover(stale.clone()).await;
        }
        Ok(request)
    }

    /// Run the `Ending` path: end notification, DND restore, log record,
    /// lock release.
    ///
    /// Returns `None` when another path already ended the session.
    pub async fn end(&self, handle: &SessionHandle, reason: EndReason) -> Result<Option<LogRecord>> {
        if !handle.begin_ending() {
            debug!(session_id = %handle.id(), "Session already ending");
            return Ok(None);
        }

        let outcome = reason.outcome();
        let spec = handle.spec();
        info!(session_id = %handle.id(), reason = ?reason, "Session ending");

        if spec.notify {
            let body = match outcome {
                SessionOutcome::Completed => format!("Session '{}' complete", spec.name),
                SessionOutcome::Aborted => format!("Session '{}' stopped", spec.name),
            };
            let result = self.adapter.notify(NOTIFICATION_TITLE, &body).await;
            self.note(handle, EffectOp::Notify, NOTIFICATION_TITLE, result);
        }

        if spec.dnd {
            let result = self.adapter.set_dnd(false).await;
            self.note(handle, EffectOp::RestoreDnd, "dnd", result);
        }

        let record = LogRecord {
            session_id: handle.id().clone(),
            name: spec.name.clone(),
            started_at: handle.started_at(),
            ended_at: dayrun_util::now(),
            outcome,
            failures: handle.failures(),
            detached: handle.is_detached(),
        };

        if handle.options().record {
            self.append_log(&record);
        }

        if let Err(e) = self.lock.release(handle.id()) {
            warn!(session_id = %handle.id(), error = %e, "Failed to release session lock");
        }

        handle.finish(outcome);
        info!(
            session_id = %record.session_id,
            name = %record.name,
            outcome = outcome.as_str(),
            duration = %format_duration(record.duration()),
            failures = record.failures.len(),
            "Session ended"
        );

        Ok(Some(record))
    }

    async fn apply_start_effects(&self, handle: &SessionHandle) {
        let spec = handle.spec();

        if spec.dnd {
            let result = self.adapter.set_dnd(true).await;
            self.note(handle, EffectOp::SetDnd, "dnd", result);
        }

        for target in &spec.open {
            let result = self.adapter.open_target(target).await;
            self.note(handle, EffectOp::OpenTarget, target, result);
        }

        for command in &spec.commands {
            let result = self.adapter.run_command(command, None).await;
            self.note(handle, EffectOp::RunCommand, command, result);
        }

        if let Some(layout) = &spec.multiplex {
            let outcome = match self.adapter.create_multiplex_session(layout).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    self.note(handle, EffectOp::CreateMultiplex, &layout.session_name, Err(e));
                    run_panes_as_commands(self.adapter.as_ref(), layout).await
                }
            };
            match outcome {
                MultiplexOutcome::Created { session_name } => {
                    info!(session = %session_name, "Multiplexer session ready");
                    handle.set_multiplex_session(session_name);
                }
                MultiplexOutcome::Fallback { launches } => {
                    for launch in launches {
                        self.note(handle, EffectOp::RunCommand, &launch.pane, launch.result);
                    }
                }
            }
        }

        if let Some(audio) = &spec.audio {
            let result = self.adapter.open_target(audio).await;
            self.note(handle, EffectOp::PlayAudio, audio, result);
        }

        if spec.notify {
            let body = match spec.duration {
                Some(d) => format!("Session '{}' started: {}", spec.name, format_duration(d)),
                None => format!("Session '{}' started until stopped", spec.name),
            };
            let result = self.adapter.notify(NOTIFICATION_TITLE, &body).await;
            self.note(handle, EffectOp::Notify, NOTIFICATION_TITLE, result);
        }
    }

    fn hand_off(&self, handle: &SessionHandle) -> Result<u32> {
        let launcher = self
            .launcher
            .as_ref()
            .ok_or_else(|| DayrunError::monitor("detaching is not available"))?;

        let path = handoff_path(&self.data_dir, handle.id());
        MonitorHandoff::from_handle(handle).write(&path)?;

        let pid = match launcher.launch(&path) {
            Ok(pid) => pid,
            Err(e) => {
                let _ = std::fs::remove_file(&path);
                return Err(e);
            }
        };

        self.lock.transfer(handle.id(), pid)?;
        handle.mark_detached(pid);
        info!(session_id = %handle.id(), pid, "Session handed to monitor");
        Ok(pid)
    }

    /// Finish what a dead owner left behind: restore DND and log the
    /// session as aborted.
    async fn recover(&self, stale: LockRecord) {
        warn!(
            session_id = %stale.session_id,
            name = %stale.name,
            pid = stale.pid,
            "Recovering session whose owner died"
        );

        let mut failures = Vec::new();
        if stale.dnd
            && let Err(e) = self.adapter.set_dnd(false).await
        {
            warn!(error = %e, "Failed to restore do-not-disturb");
            failures.push(EffectFailure::new(EffectOp::RestoreDnd, "dnd", e));
        }

        let _ = std::fs::remove_file(handoff_path(&self.data_dir, &stale.session_id));

        let record = LogRecord {
            session_id: stale.session_id,
            name: stale.name,
            started_at: stale.started_at,
            ended_at: dayrun_util::now(),
            outcome: EndReason::OwnerLost.outcome(),
            failures,
            detached: true,
        };
        self.append_log(&record);
    }

    fn append_log(&self, record: &LogRecord) {
        match self.log.append(record) {
            Ok(()) => {}
            Err(StoreError::AlreadyLogged(id)) => {
                debug!(session_id = %id, "Session already in the log");
            }
            Err(e) => {
                error!(session_id = %record.session_id, error = %e, "Failed to write session log");
            }
        }
    }

    /// Record a best-effort result on the handle
    fn note(&self, handle: &SessionHandle, op: EffectOp, target: &str, result: EffectResult<()>) {
        match result {
            Ok(()) => debug!(op = %op, target = %target, "Effect applied"),
            Err(e) => {
                warn!(op = %op, target = %target, error = %e, "Effect failed");
                handle.record_failure(EffectFailure::new(op, target, e));
            }
        }
    }
}
