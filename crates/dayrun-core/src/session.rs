//! Session state machine

use chrono::{DateTime, Local};
use dayrun_api::{EffectFailure, EndReason, SessionOutcome, SessionSpec, SessionState};
use dayrun_util::SessionId;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::watch;
use tracing::debug;

/// How a session was started
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StartOptions {
    /// Hand the rest of the session to a detached monitor
    pub detach: bool,
    /// Append a `LogRecord` when the session ends
    pub record: bool,
}

impl Default for StartOptions {
    fn default() -> Self {
        Self {
            detach: false,
            record: true,
        }
    }
}

#[derive(Debug)]
struct Lifecycle {
    state: SessionState,
    failures: Vec<EffectFailure>,
    monitor_pid: Option<u32>,
    multiplex_session: Option<String>,
}

#[derive(Debug)]
struct Inner {
    session_id: SessionId,
    spec: SessionSpec,
    options: StartOptions,
    started_at: DateTime<Local>,
    deadline: Option<DateTime<Local>>,
    deadline_at: Option<tokio::time::Instant>,
    lifecycle: Mutex<Lifecycle>,
    stop_tx: watch::Sender<bool>,
}

/// Shared handle to one session.
///
/// Cloning is cheap; every clone observes the same state. `Ending` is
/// entered at most once no matter how many paths race for it.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    inner: Arc<Inner>,
}

impl SessionHandle {
    /// New session starting now, in `Pending`
    pub fn new(spec: SessionSpec, options: StartOptions) -> Self {
        let started_at = dayrun_util::now();
        Self::resume(SessionId::new(), spec, options, started_at, Vec::new())
    }

    /// Rebuild a running session from its start time (used by the monitor)
    pub fn resume(
        session_id: SessionId,
        spec: SessionSpec,
        options: StartOptions,
        started_at: DateTime<Local>,
        failures: Vec<EffectFailure>,
    ) -> Self {
        let deadline = spec
            .duration
            .map(|d| dayrun_util::add_duration(started_at, d));
        let deadline_at = deadline.map(|d| {
            tokio::time::Instant::now() + dayrun_util::remaining_until(d, dayrun_util::now())
        });
        let (stop_tx, _) = watch::channel(false);

        Self {
            inner: Arc::new(Inner {
                session_id,
                spec,
                options,
                started_at,
                deadline,
                deadline_at,
                lifecycle: Mutex::new(Lifecycle {
                    state: SessionState::Pending,
                    failures,
                    monitor_pid: None,
                    multiplex_session: None,
                }),
                stop_tx,
            }),
        }
    }

    fn lifecycle(&self) -> MutexGuard<'_, Lifecycle> {
        // State updates are single assignments; a poisoned guard is still consistent
        self.inner
            .lifecycle
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn id(&self) -> &SessionId {
        &self.inner.session_id
    }

    pub fn spec(&self) -> &SessionSpec {
        &self.inner.spec
    }

    pub fn options(&self) -> StartOptions {
        self.inner.options
    }

    pub fn started_at(&self) -> DateTime<Local> {
        self.inner.started_at
    }

    /// Wall-clock end of the session; `None` runs until stopped
    pub fn deadline(&self) -> Option<DateTime<Local>> {
        self.inner.deadline
    }

    pub fn state(&self) -> SessionState {
        self.lifecycle().state
    }

    /// Time left before the deadline, `None` when untimed
    pub fn remaining(&self) -> Option<Duration> {
        self.inner
            .deadline
            .map(|d| dayrun_util::remaining_until(d, dayrun_util::now()))
    }

    /// Failures recorded so far
    pub fn failures(&self) -> Vec<EffectFailure> {
        self.lifecycle().failures.clone()
    }

    pub fn record_failure(&self, failure: EffectFailure) {
        self.lifecycle().failures.push(failure);
    }

    /// Pid of the detached monitor that owns this session, if any
    pub fn monitor_pid(&self) -> Option<u32> {
        self.lifecycle().monitor_pid
    }

    pub fn is_detached(&self) -> bool {
        self.monitor_pid().is_some()
    }

    /// Name of the multiplexer session created for this session
    pub fn multiplex_session(&self) -> Option<String> {
        self.lifecycle().multiplex_session.clone()
    }

    pub(crate) fn set_multiplex_session(&self, name: String) {
        self.lifecycle().multiplex_session = Some(name);
    }

    pub(crate) fn mark_running(&self) {
        let mut lc = self.lifecycle();
        if lc.state == SessionState::Pending {
            lc.state = SessionState::Running;
        }
    }

    pub(crate) fn mark_detached(&self, pid: u32) {
        self.lifecycle().monitor_pid = Some(pid);
    }

    /// Request early termination. Safe to call any number of times from
    /// any task; returns whether this was the first request.
    pub fn stop(&self) -> bool {
        let first = self.inner.stop_tx.send_if_modified(|stopped| {
            let first = !*stopped;
            *stopped = true;
            first
        });
        if first {
            debug!(session_id = %self.inner.session_id, "Stop requested");
        }
        first
    }

    pub fn is_stop_requested(&self) -> bool {
        *self.inner.stop_tx.borrow()
    }

    /// Wait until the deadline passes or a stop is requested, whichever
    /// comes first
    pub async fn wait_for_end(&self) -> EndReason {
        let mut stop_rx = self.inner.stop_tx.subscribe();
        if *stop_rx.borrow_and_update() {
            return EndReason::StopRequested;
        }

        let deadline = async {
            match self.inner.deadline_at {
                Some(at) => tokio::time::sleep_until(at).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            _ = deadline => EndReason::Elapsed,
            _ = stop_rx.wait_for(|stopped| *stopped) => EndReason::StopRequested,
        }
    }

    /// Claim the `Ending` transition. Exactly one caller ever gets `true`.
    pub fn begin_ending(&self) -> bool {
        let mut lc = self.lifecycle();
        match lc.state {
            SessionState::Pending | SessionState::Running => {
                lc.state = SessionState::Ending;
                true
            }
            _ => false,
        }
    }

    pub(crate) fn finish(&self, outcome: SessionOutcome) {
        self.lifecycle().state = outcome.into();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn timed(duration: Duration) -> SessionHandle {
        let spec = SessionSpec {
            duration: Some(duration),
            ..SessionSpec::named("focus")
        };
        SessionHandle::new(spec, StartOptions::default())
    }

    #[test]
    fn lifecycle_transitions() {
        let handle = timed(Duration::from_secs(60));
        assert_eq!(handle.state(), SessionState::Pending);

        handle.mark_running();
        assert_eq!(handle.state(), SessionState::Running);

        assert!(handle.begin_ending());
        assert_eq!(handle.state(), SessionState::Ending);
        assert!(!handle.begin_ending());

        handle.finish(SessionOutcome::Completed);
        assert!(handle.state().is_terminal());
        assert!(!handle.begin_ending());
    }

    #[test]
    fn ending_is_claimed_once_across_threads() {
        let handle = timed(Duration::from_secs(60));
        handle.mark_running();

        let winners = (0..16)
            .map(|_| {
                let h = handle.clone();
                std::thread::spawn(move || h.begin_ending())
            })
            .collect::<Vec<_>>()
            .into_iter()
            .filter_map(|t| t.join().ok())
            .filter(|won| *won)
            .count();
        assert_eq!(winners, 1);
    }

    #[test]
    fn stop_is_idempotent() {
        let handle = timed(Duration::from_secs(60));
        assert!(handle.stop());
        assert!(!handle.stop());
        assert!(handle.is_stop_requested());
    }

    #[test]
    fn deadline_and_failures() {
        let handle = timed(Duration::from_secs(90));
        let deadline = handle.deadline().unwrap();
        assert_eq!((deadline - handle.started_at()).num_seconds(), 90);
        assert!(handle.remaining().unwrap() <= Duration::from_secs(90));

        handle.record_failure(EffectFailure::new(
            dayrun_api::EffectOp::Notify,
            "dayrun",
            "no daemon",
        ));
        assert_eq!(handle.failures().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn wait_ends_at_deadline() {
        let handle = timed(Duration::from_secs(30));
        assert_eq!(handle.wait_for_end().await, EndReason::Elapsed);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_interrupts_wait() {
        let handle = timed(Duration::from_secs(3600));
        let stopper = handle.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            stopper.stop();
        });
        assert_eq!(handle.wait_for_end().await, EndReason::StopRequested);
    }

    #[tokio::test]
    async fn untimed_session_waits_for_stop() {
        let spec = SessionSpec {
            dnd: true,
            ..SessionSpec::named("open-ended")
        };
        let handle = SessionHandle::new(spec, StartOptions::default());
        assert!(handle.deadline().is_none());

        handle.stop();
        assert_eq!(handle.wait_for_end().await, EndReason::StopRequested);
    }
}
