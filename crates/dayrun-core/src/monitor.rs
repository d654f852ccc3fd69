//! Detached monitor: owns a session after the starting process returns

use chrono::{DateTime, Local};
use dayrun_api::{EffectFailure, EndReason, LogRecord, SessionSpec};
use dayrun_host_api::EffectAdapter;
use dayrun_store::SessionLog;
use dayrun_util::{DayrunError, Result, SessionId};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::NamedTempFile;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::{SessionEngine, SessionHandle, SessionLock, StartOptions};

/// How long a monitor waits for the starting process to hand it the lock
pub const OWNERSHIP_TIMEOUT: Duration = Duration::from_secs(10);

const OWNERSHIP_POLL: Duration = Duration::from_millis(20);

/// Starts a monitor for a written handoff file. Returns the pid that will
/// own the session lock.
pub trait MonitorLauncher: Send + Sync {
    fn launch(&self, handoff: &Path) -> Result<u32>;
}

/// Everything a monitor needs to finish a session it did not start
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitorHandoff {
    pub session_id: SessionId,
    pub spec: SessionSpec,
    pub started_at: DateTime<Local>,
    #[serde(default)]
    pub failures: Vec<EffectFailure>,
    #[serde(default = "default_record")]
    pub record: bool,
}

fn default_record() -> bool {
    true
}

impl MonitorHandoff {
    pub fn from_handle(handle: &SessionHandle) -> Self {
        Self {
            session_id: handle.id().clone(),
            spec: handle.spec().clone(),
            started_at: handle.started_at(),
            failures: handle.failures(),
            record: handle.options().record,
        }
    }

    /// Write atomically to `path`
    pub fn write(&self, path: &Path) -> Result<()> {
        let dir = path.parent().unwrap_or_else(|| Path::new("."));
        std::fs::create_dir_all(dir)
            .map_err(|e| DayrunError::monitor(format!("cannot create {}: {}", dir.display(), e)))?;

        let json = serde_json::to_vec_pretty(self)
            .map_err(|e| DayrunError::monitor(format!("cannot encode handoff: {}", e)))?;
        let mut tmp = NamedTempFile::new_in(dir)
            .map_err(|e| DayrunError::monitor(format!("cannot create temp file: {}", e)))?;
        tmp.write_all(&json)
            .map_err(|e| DayrunError::monitor(format!("cannot write handoff: {}", e)))?;
        tmp.persist(path).map_err(|e| {
            DayrunError::monitor(format!("cannot write {}: {}", path.display(), e.error))
        })?;
        Ok(())
    }

    /// Read the handoff and delete its file
    pub fn take(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| DayrunError::monitor(format!("cannot read {}: {}", path.display(), e)))?;
        let handoff = serde_json::from_str(&content)
            .map_err(|e| DayrunError::monitor(format!("bad handoff {}: {}", path.display(), e)))?;
        let _ = std::fs::remove_file(path);
        Ok(handoff)
    }

    /// The running session this handoff describes, owned by `pid`
    pub fn into_handle(self, pid: u32) -> SessionHandle {
        let options = StartOptions {
            detach: true,
            record: self.record,
        };
        let handle = SessionHandle::resume(
            self.session_id,
            self.spec,
            options,
            self.started_at,
            self.failures,
        );
        handle.mark_running();
        handle.mark_detached(pid);
        handle
    }
}

/// How a monitor run ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MonitorExit {
    /// The monitor ended the session
    Finished(LogRecord),
    /// The lock no longer named this session and process; nothing touched
    Superseded,
}

/// Wait for the session's deadline or `shutdown`, then end it if this
/// process still owns the lock.
pub async fn run_monitor<F>(
    engine: &SessionEngine,
    handoff: MonitorHandoff,
    shutdown: F,
) -> Result<MonitorExit>
where
    F: Future<Output = ()>,
{
    let pid = engine.owner_pid();
    let handle = handoff.into_handle(pid);
    info!(
        session_id = %handle.id(),
        name = %handle.spec().name,
        deadline = ?handle.deadline(),
        pid,
        "Monitor waiting"
    );

    // The starting process moves the lock to us only after we consumed the
    // handoff; until then a passed deadline must not be acted on.
    if !wait_for_ownership(engine.lock(), handle.id(), pid, OWNERSHIP_TIMEOUT).await {
        info!(session_id = %handle.id(), "Lock was never handed over; monitor exiting");
        return Ok(MonitorExit::Superseded);
    }

    let reason = tokio::select! {
        reason = handle.wait_for_end() => reason,
        _ = shutdown => {
            handle.stop();
            EndReason::StopRequested
        }
    };

    if !engine.lock().is_owned_by(handle.id(), pid) {
        info!(session_id = %handle.id(), "Lock has a new owner; monitor exiting");
        return Ok(MonitorExit::Superseded);
    }

    match engine.end(&handle, reason).await? {
        Some(record) => Ok(MonitorExit::Finished(record)),
        None => Ok(MonitorExit::Superseded),
    }
}

/// Poll until the lock names `session_id` and `pid`. Gives up early once
/// the lock is gone or belongs to another session.
async fn wait_for_ownership(
    lock: &SessionLock,
    session_id: &SessionId,
    pid: u32,
    timeout: Duration,
) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        match lock.read() {
            Ok(Some(record)) if record.is_owned_by(session_id, pid) => return true,
            Ok(Some(record)) if &record.session_id != session_id => return false,
            Ok(None) => return false,
            Ok(Some(record)) => {
                debug!(session_id = %session_id, owner = record.pid, "Waiting for lock handover");
            }
            Err(e) => debug!(error = %e, "Lock unreadable while waiting for handover"),
        }
        if tokio::time::Instant::now() >= deadline {
            warn!(session_id = %session_id, pid, "Timed out waiting for lock handover");
            return false;
        }
        tokio::time::sleep(OWNERSHIP_POLL).await;
    }
}

/// Runs monitors as tasks on the current tokio runtime.
///
/// The session keeps running only as long as the runtime does; used when
/// dayrun is embedded and in tests.
pub struct TaskMonitorLauncher {
    adapter: Arc<dyn EffectAdapter>,
    log: Arc<dyn SessionLog>,
    data_dir: PathBuf,
    shutdown: watch::Sender<bool>,
    tasks: Mutex<Vec<JoinHandle<Result<MonitorExit>>>>,
}

impl TaskMonitorLauncher {
    pub fn new(
        adapter: Arc<dyn EffectAdapter>,
        log: Arc<dyn SessionLog>,
        data_dir: impl Into<PathBuf>,
    ) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            adapter,
            log,
            data_dir: data_dir.into(),
            shutdown,
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Deliver a stop to every running monitor
    pub fn stop_all(&self) {
        self.shutdown.send_replace(true);
    }

    /// Wait for every launched monitor to exit
    pub async fn join_all(&self) -> Vec<Result<MonitorExit>> {
        let tasks: Vec<_> = match self.tasks.lock() {
            Ok(mut tasks) => tasks.drain(..).collect(),
            Err(poisoned) => poisoned.into_inner().drain(..).collect(),
        };

        let mut exits = Vec::with_capacity(tasks.len());
        for task in tasks {
            exits.push(
                task.await
                    .unwrap_or_else(|e| Err(DayrunError::monitor(format!("monitor task failed: {}", e)))),
            );
        }
        exits
    }
}

impl MonitorLauncher for TaskMonitorLauncher {
    fn launch(&self, handoff: &Path) -> Result<u32> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| DayrunError::monitor(format!("no runtime for monitor task: {}", e)))?;
        let handoff = MonitorHandoff::take(handoff)?;
        let engine = SessionEngine::new(self.adapter.clone(), self.log.clone(), self.data_dir.clone());
        let mut shutdown = self.shutdown.subscribe();

        let task = runtime.spawn(async move {
            let stop = async move {
                if shutdown.wait_for(|stopped| *stopped).await.is_err() {
                    std::future::pending::<()>().await;
                }
            };
            run_monitor(&engine, handoff, stop).await
        });

        match self.tasks.lock() {
            Ok(mut tasks) => tasks.push(task),
            Err(poisoned) => poisoned.into_inner().push(task),
        }
        Ok(std::process::id())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dayrun_api::{LockRecord, SessionOutcome};
    use dayrun_host_api::{EffectCall, MockAdapter};
    use dayrun_store::SqliteStore;
    use std::time::{Duration, Instant};

    struct Fixture {
        dir: tempfile::TempDir,
        mock: Arc<MockAdapter>,
        store: Arc<SqliteStore>,
        launcher: Arc<TaskMonitorLauncher>,
        engine: SessionEngine,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let mock = Arc::new(MockAdapter::new());
        let store = Arc::new(SqliteStore::in_memory().unwrap());
        let launcher = Arc::new(TaskMonitorLauncher::new(
            mock.clone(),
            store.clone(),
            dir.path(),
        ));
        let engine = SessionEngine::new(mock.clone(), store.clone(), dir.path())
            .with_launcher(launcher.clone());
        Fixture {
            dir,
            mock,
            store,
            launcher,
            engine,
        }
    }

    fn detached() -> StartOptions {
        StartOptions {
            detach: true,
            record: true,
        }
    }

    fn spec(name: &str, millis: u64) -> SessionSpec {
        SessionSpec {
            duration: Some(Duration::from_millis(millis)),
            dnd: true,
            ..SessionSpec::named(name)
        }
    }

    #[test]
    fn handoff_take_consumes_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("handoff.json");
        let handle = SessionHandle::new(spec("focus", 60_000), StartOptions::default());
        let handoff = MonitorHandoff::from_handle(&handle);

        handoff.write(&path).unwrap();
        assert_eq!(MonitorHandoff::take(&path).unwrap(), handoff);
        assert!(!path.exists());
        assert!(MonitorHandoff::take(&path).is_err());
    }

    #[test]
    fn resumed_handle_keeps_deadline() {
        let handle = SessionHandle::new(spec("focus", 60_000), StartOptions::default());
        let resumed = MonitorHandoff::from_handle(&handle).into_handle(4242);

        assert_eq!(resumed.id(), handle.id());
        assert_eq!(resumed.deadline(), handle.deadline());
        assert_eq!(resumed.monitor_pid(), Some(4242));
        assert!(resumed.options().detach);
    }

    #[tokio::test]
    async fn detached_session_returns_at_once_and_ends_later() {
        let f = fixture();

        let started = Instant::now();
        let handle = f.engine.start(spec("bg", 300), detached()).await.unwrap();
        assert!(started.elapsed() < Duration::from_millis(300));
        assert!(handle.is_detached());
        assert!(f.engine.lock().is_owned_by(handle.id(), std::process::id()));
        assert_eq!(f.store.count().unwrap(), 0);

        let exits = f.launcher.join_all().await;
        assert_eq!(exits.len(), 1);
        let record = match exits.into_iter().next().unwrap().unwrap() {
            MonitorExit::Finished(record) => record,
            other => panic!("unexpected monitor exit: {:?}", other),
        };

        assert_eq!(record.session_id, *handle.id());
        assert_eq!(record.outcome, SessionOutcome::Completed);
        assert!(record.detached);
        assert!(record.duration() >= Duration::from_millis(250));
        assert!(!f.engine.lock().path().exists());
        assert_eq!(f.store.count().unwrap(), 1);
        assert_eq!(f.mock.calls().last(), Some(&EffectCall::SetDnd(false)));

        let handoffs = std::fs::read_dir(f.dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().starts_with("handoff-"))
            .count();
        assert_eq!(handoffs, 0);
    }

    #[tokio::test]
    async fn monitor_stops_early_on_shutdown() {
        let f = fixture();
        f.engine.start(spec("bg", 3_600_000), detached()).await.unwrap();

        f.launcher.stop_all();
        let exits = f.launcher.join_all().await;
        let Ok(MonitorExit::Finished(record)) = &exits[0] else {
            panic!("unexpected monitor exit: {:?}", exits);
        };
        assert_eq!(record.outcome, SessionOutcome::Aborted);
        assert!(!f.engine.lock().path().exists());
    }

    #[tokio::test]
    async fn monitor_leaves_a_replaced_lock_alone() {
        let f = fixture();
        f.engine.start(spec("bg", 3_600_000), detached()).await.unwrap();

        let other = LockRecord {
            pid: std::process::id(),
            session_id: SessionId::new(),
            name: "other".into(),
            started_at: dayrun_util::now(),
            deadline: None,
            dnd: false,
        };
        std::fs::write(f.engine.lock().path(), serde_json::to_vec(&other).unwrap()).unwrap();
        let calls_before = f.mock.calls().len();

        f.launcher.stop_all();
        let exits = f.launcher.join_all().await;
        assert!(matches!(exits[0], Ok(MonitorExit::Superseded)));

        assert_eq!(f.engine.lock().read().unwrap(), Some(other));
        assert_eq!(f.mock.calls().len(), calls_before);
        assert_eq!(f.store.count().unwrap(), 0);
    }

    fn foreground_lock(handle: &SessionHandle, pid: u32) -> LockRecord {
        LockRecord {
            pid,
            session_id: handle.id().clone(),
            name: handle.spec().name.clone(),
            started_at: handle.started_at(),
            deadline: handle.deadline(),
            dnd: handle.spec().dnd,
        }
    }

    #[tokio::test]
    async fn monitor_waits_for_handover_when_deadline_already_passed() {
        let f = fixture();
        let handle = SessionHandle::new(spec("late", 10), detached());
        // Start effects ran past the deadline while the starter held the lock
        f.engine.lock().acquire(foreground_lock(&handle, 1)).unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        let handover = async {
            tokio::time::sleep(Duration::from_millis(200)).await;
            SessionLock::in_data_dir(f.dir.path())
                .transfer(handle.id(), std::process::id())
                .unwrap();
        };
        let monitor = run_monitor(
            &f.engine,
            MonitorHandoff::from_handle(&handle),
            std::future::pending::<()>(),
        );
        let (exit, ()) = tokio::join!(monitor, handover);

        let Ok(MonitorExit::Finished(record)) = &exit else {
            panic!("unexpected monitor exit: {:?}", exit);
        };
        assert_eq!(record.outcome, SessionOutcome::Completed);
        assert!(record.detached);
        assert_eq!(f.store.count().unwrap(), 1);
        assert_eq!(f.mock.calls().last(), Some(&EffectCall::SetDnd(false)));
        assert!(!f.engine.lock().path().exists());
    }

    #[tokio::test]
    async fn ownership_wait_gives_up() {
        let f = fixture();
        let handle = SessionHandle::new(spec("late", 60_000), detached());
        let lock = f.engine.lock();

        // Absent lock: nothing to wait for
        assert!(!wait_for_ownership(lock, handle.id(), 42, Duration::from_secs(5)).await);

        lock.acquire(foreground_lock(&handle, 1)).unwrap();
        let started = Instant::now();
        assert!(!wait_for_ownership(lock, handle.id(), 42, Duration::from_millis(100)).await);
        assert!(started.elapsed() >= Duration::from_millis(100));

        lock.transfer(handle.id(), 42).unwrap();
        assert!(wait_for_ownership(lock, handle.id(), 42, Duration::ZERO).await);
    }

    struct BrokenLauncher;

    impl MonitorLauncher for BrokenLauncher {
        fn launch(&self, _handoff: &Path) -> Result<u32> {
            Err(DayrunError::monitor("cannot spawn"))
        }
    }

    #[tokio::test]
    async fn failed_handoff_keeps_the_session_attached() {
        let dir = tempfile::tempdir().unwrap();
        let mock = Arc::new(MockAdapter::new());
        let store = Arc::new(SqliteStore::in_memory().unwrap());
        let engine = SessionEngine::new(mock.clone(), store.clone(), dir.path())
            .with_launcher(Arc::new(BrokenLauncher));

        let handle = engine.start(spec("bg", 60_000), detached()).await.unwrap();
        assert!(!handle.is_detached());
        assert!(engine.lock().is_owned_by(handle.id(), std::process::id()));
        assert!(!dayrun_util::handoff_path(dir.path(), handle.id()).exists());

        engine.stop(&handle);
        let record = engine.wait(&handle).await.unwrap();
        assert_eq!(record.outcome, SessionOutcome::Aborted);
        assert!(!record.detached);
        assert_eq!(mock.calls().last(), Some(&EffectCall::SetDnd(false)));
        assert!(!engine.lock().path().exists());
    }
}
