//! Session lock: the single on-disk record of the active session

use dayrun_api::LockRecord;
use dayrun_util::{DayrunError, Result, SessionId};
use nix::errno::Errno;
use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

/// Attempts `acquire` makes before giving up on a contended lock
const ACQUIRE_ATTEMPTS: usize = 5;

/// Pause between contended attempts
const RETRY_DELAY: Duration = Duration::from_millis(20);

/// Unparseable lock content younger than this may still be mid-write and is
/// left alone
const UNREADABLE_GRACE: Duration = Duration::from_secs(2);

/// What the lock file currently says
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LockStatus {
    /// No lock file
    Idle,
    /// Lock held by a live process
    Active(LockRecord),
    /// Lock left behind by a dead process; `None` when unreadable
    Stale(Option<LockRecord>),
}

/// Successful acquisition
#[derive(Debug, Clone)]
pub struct Acquired {
    pub record: LockRecord,
    /// Stale record that was cleared to make room, if any
    pub recovered: Option<LockRecord>,
}

/// Result of asking the active session to stop from another process
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopRequest {
    /// SIGTERM delivered to the owner
    Signalled(LockRecord),
    /// The owner was already dead; its lock was removed
    ClearedStale(Option<LockRecord>),
}

/// File-backed session lock.
///
/// Creation is atomic (write to a temp file, then link into place without
/// clobbering), so at most one record exists at a time.
#[derive(Debug, Clone)]
pub struct SessionLock {
    path: PathBuf,
}

impl SessionLock {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Lock at the standard location under `data_dir`
    pub fn in_data_dir(data_dir: &Path) -> Self {
        Self::new(dayrun_util::lock_path(data_dir))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn dir(&self) -> &Path {
        self.path.parent().unwrap_or_else(|| Path::new("."))
    }

    /// Raw read: `Ok(None)` when absent, `Err` only for I/O problems.
    /// Unparseable content is reported as `Some(Err(..))`.
    fn read_raw(&self) -> Result<Option<std::result::Result<LockRecord, serde_json::Error>>> {
        match std::fs::read_to_string(&self.path) {
            Ok(content) => Ok(Some(serde_json::from_str(&content))),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(DayrunError::lock(format!(
                "cannot read {}: {}",
                self.path.display(),
                e
            ))),
        }
    }

    /// Current record, if one parses
    pub fn read(&self) -> Result<Option<LockRecord>> {
        Ok(self.read_raw()?.and_then(|r| r.ok()))
    }

    /// Classify the lock file by checking the owner's liveness. A pid that
    /// now runs a different program counts as dead.
    pub fn status(&self) -> Result<LockStatus> {
        Ok(match self.read_raw()? {
            None => LockStatus::Idle,
            Some(Err(e)) => {
                debug!(path = %self.path.display(), error = %e, "Unreadable lock file");
                LockStatus::Stale(None)
            }
            Some(Ok(record)) if owner_alive(record.pid) => LockStatus::Active(record),
            Some(Ok(record)) => LockStatus::Stale(Some(record)),
        })
    }

    /// Take the lock for `record`, clearing a stale one if needed.
    ///
    /// Fails with `AlreadyRunning` while a live process holds it.
    pub fn acquire(&self, record: LockRecord) -> Result<Acquired> {
        std::fs::create_dir_all(self.dir()).map_err(|e| {
            DayrunError::lock(format!("cannot create {}: {}", self.dir().display(), e))
        })?;

        let mut recovered = None;
        for _ in 0..ACQUIRE_ATTEMPTS {
            let tmp = self.write_temp(&record)?;
            match tmp.persist_noclobber(&self.path) {
                Ok(_) => {
                    info!(
                        session_id = %record.session_id,
                        name = %record.name,
                        pid = record.pid,
                        "Session lock acquired"
                    );
                    return Ok(Acquired { record, recovered });
                }
                Err(e) if e.error.kind() == ErrorKind::AlreadyExists => {}
                Err(e) => {
                    return Err(DayrunError::lock(format!(
                        "cannot create {}: {}",
                        self.path.display(),
                        e.error
                    )));
                }
            }

            match self.status()? {
                LockStatus::Active(holder) => {
                    return Err(DayrunError::AlreadyRunning {
                        pid: holder.pid,
                        name: holder.name,
                    });
                }
                LockStatus::Stale(stale) => {
                    warn!(
                        pid = stale.as_ref().map(|r| r.pid),
                        name = stale.as_ref().map(|r| r.name.as_str()),
                        "Clearing stale session lock"
                    );
                    if self.remove_if_unchanged(stale.as_ref())? {
                        recovered = stale.or(recovered);
                    } else {
                        std::thread::sleep(RETRY_DELAY);
                    }
                }
                LockStatus::Idle => {}
            }
        }

        Err(DayrunError::lock("lock is contended; try again"))
    }

    /// Point the lock at a new owner process. Only the session that holds
    /// the lock may move it.
    pub fn transfer(&self, session_id: &SessionId, pid: u32) -> Result<LockRecord> {
        let current = self
            .read()?
            .filter(|r| &r.session_id == session_id)
            .ok_or_else(|| {
                DayrunError::lock(format!("session {} does not hold the lock", session_id))
            })?;

        let moved = current.with_owner(pid);
        let tmp = self.write_temp(&moved)?;
        tmp.persist(&self.path).map_err(|e| {
            DayrunError::lock(format!("cannot update {}: {}", self.path.display(), e.error))
        })?;

        debug!(session_id = %session_id, from = current.pid, to = pid, "Lock ownership transferred");
        Ok(moved)
    }

    /// Whether the lock currently names this session and process
    pub fn is_owned_by(&self, session_id: &SessionId, pid: u32) -> bool {
        matches!(self.read(), Ok(Some(r)) if r.is_owned_by(session_id, pid))
    }

    /// Delete the lock if it belongs to `session_id`. Idempotent; returns
    /// whether a file was removed.
    pub fn release(&self, session_id: &SessionId) -> Result<bool> {
        match self.read_raw()? {
            None => Ok(false),
            Some(Ok(r)) if &r.session_id == session_id => {
                self.remove_file()?;
                info!(session_id = %session_id, "Session lock released");
                Ok(true)
            }
            Some(_) => {
                debug!(session_id = %session_id, "Lock belongs to another session; left in place");
                Ok(false)
            }
        }
    }

    /// Remove a stale lock. Returns the cleared record, or `None` when the
    /// lock is absent or still live.
    pub fn clear_stale(&self) -> Result<Option<Option<LockRecord>>> {
        match self.status()? {
            LockStatus::Stale(stale) => {
                self.remove_if_unchanged(stale.as_ref())?;
                Ok(Some(stale))
            }
            _ => Ok(None),
        }
    }

    /// Ask whoever holds the lock to end the session
    pub fn request_stop(&self) -> Result<StopRequest> {
        match self.status()? {
            LockStatus::Idle => Err(DayrunError::NoActiveSession),
            LockStatus::Active(record) => {
                signal_process(record.pid, Signal::SIGTERM)?;
                info!(
                    pid = record.pid,
                    name = %record.name,
                    exe = ?process_exe(record.pid),
                    "Stop requested"
                );
                Ok(StopRequest::Signalled(record))
            }
            LockStatus::Stale(stale) => {
                self.remove_if_unchanged(stale.as_ref())?;
                Ok(StopRequest::ClearedStale(stale))
            }
        }
    }

    fn write_temp(&self, record: &LockRecord) -> Result<NamedTempFile> {
        let json = serde_json::to_vec_pretty(record)
            .map_err(|e| DayrunError::lock(format!("cannot encode lock record: {}", e)))?;
        let mut tmp = NamedTempFile::new_in(self.dir())
            .map_err(|e| DayrunError::lock(format!("cannot create temp file: {}", e)))?;
        tmp.write_all(&json)
            .and_then(|_| tmp.as_file().sync_all())
            .map_err(|e| DayrunError::lock(format!("cannot write lock record: {}", e)))?;
        Ok(tmp)
    }

    /// Remove the lock file only if it still holds `expected`, so a fresh
    /// lock written by a racing process survives.
    fn remove_if_unchanged(&self, expected: Option<&LockRecord>) -> Result<bool> {
        let current = self.read_raw()?;
        let unchanged = match (&current, expected) {
            (None, _) => return Ok(false),
            (Some(Ok(r)), Some(e)) => r == e,
            (Some(Err(_)), None) => self.age().is_some_and(|age| age >= UNREADABLE_GRACE),
            _ => false,
        };
        if unchanged {
            self.remove_file()?;
        }
        Ok(unchanged)
    }

    fn age(&self) -> Option<Duration> {
        let modified = std::fs::metadata(&self.path).and_then(|m| m.modified()).ok()?;
        SystemTime::now().duration_since(modified).ok()
    }

    fn remove_file(&self) -> Result<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(DayrunError::lock(format!(
                "cannot remove {}: {}",
                self.path.display(),
                e
            ))),
        }
    }
}

/// Whether a process with this pid exists
pub fn process_alive(pid: u32) -> bool {
    let Ok(raw) = i32::try_from(pid) else {
        return false;
    };
    if raw <= 0 {
        return false;
    }
    match signal::kill(Pid::from_raw(raw), None) {
        Ok(()) => true,
        // Exists, owned by someone else
        Err(Errno::EPERM) => true,
        Err(_) => false,
    }
}

/// Executable a process runs, where the platform exposes it. A binary
/// replaced on disk still compares equal to its new copy.
fn process_exe(pid: u32) -> Option<PathBuf> {
    let link = std::fs::read_link(format!("/proc/{}/exe", pid)).ok()?;
    match link.to_str().and_then(|s| s.strip_suffix(" (deleted)")) {
        Some(path) => Some(PathBuf::from(path)),
        None => Some(link),
    }
}

/// Whether `pid` is alive and, when that can be seen, runs the same
/// program as this process
pub fn owner_alive(pid: u32) -> bool {
    if !process_alive(pid) {
        return false;
    }
    match (process_exe(pid), process_exe(std::process::id())) {
        (Some(owner), Some(ours)) if owner != ours => {
            warn!(pid, exe = %owner.display(), "Lock owner pid now runs another program");
            false
        }
        _ => true,
    }
}

fn signal_process(pid: u32, sig: Signal) -> Result<()> {
    let raw = i32::try_from(pid).map_err(|_| DayrunError::lock(format!("bad pid {}", pid)))?;
    match signal::kill(Pid::from_raw(raw), sig) {
        Ok(()) | Err(Errno::ESRCH) => Ok(()),
        Err(e) => Err(DayrunError::lock(format!(
            "cannot signal pid {}: {}",
            pid, e
        ))),
    }
}
