//! Integration tests for dayrun
//!
//! The first half drives the engine end to end against the mock adapter;
//! the second half runs the real binary in an isolated data directory.

use dayrun_api::{EffectOp, LockRecord, LogRecord, PaneSpec, SessionOutcome, SessionSpec};
use dayrun_config::{parse_config, SessionRequest};
use dayrun_core::{SessionEngine, StartOptions, StartOutcome};
use dayrun_host_api::{Capabilities, EffectCall, MockAdapter};
use dayrun_store::{SessionLog, SqliteStore};
use dayrun_util::{DayrunError, SessionId};
use std::path::Path;
use std::process::{Command, Output};
use std::sync::Arc;
use std::time::{Duration, Instant};

const CONFIG: &str = r#"
config_version = 1

[defaults]
duration = "25m"
dnd = true
notify = true

[templates.writing]
duration = "2s"
open = ["https://example.com/draft"]
commands = ["true"]
"#;

struct Harness {
    _dir: tempfile::TempDir,
    mock: Arc<MockAdapter>,
    store: Arc<SqliteStore>,
    engine: Arc<SessionEngine>,
}

fn harness(mock: MockAdapter) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let mock = Arc::new(mock);
    let store = Arc::new(SqliteStore::in_memory().unwrap());
    let engine = Arc::new(SessionEngine::new(mock.clone(), store.clone(), dir.path()));
    Harness {
        _dir: dir,
        mock,
        store,
        engine,
    }
}

fn finished(outcome: StartOutcome) -> LogRecord {
    match outcome {
        StartOutcome::Finished(record) => record,
        other => panic!("expected an attached session, got {:?}", other),
    }
}

fn timed(name: &str, duration: Duration) -> SessionSpec {
    SessionSpec {
        duration: Some(duration),
        ..SessionSpec::named(name)
    }
}

#[tokio::test]
async fn template_session_runs_for_its_duration() {
    let h = harness(MockAdapter::new());
    let config = parse_config(CONFIG).unwrap();
    let spec = config
        .resolve(&SessionRequest {
            template: Some("writing".into()),
            ..Default::default()
        })
        .unwrap();

    let started = Instant::now();
    let record = finished(h.engine.run(spec, StartOptions::default()).await.unwrap());
    let elapsed = started.elapsed();

    assert!(elapsed >= Duration::from_secs(2), "ended early: {:?}", elapsed);
    assert!(elapsed < Duration::from_secs(4), "ended late: {:?}", elapsed);
    assert_eq!(record.name, "writing");
    assert_eq!(record.outcome, SessionOutcome::Completed);
    assert_eq!(h.store.count().unwrap(), 1);
    assert!(!h.engine.lock().path().exists());

    let calls = h.mock.calls();
    assert_eq!(calls.first(), Some(&EffectCall::SetDnd(true)));
    assert_eq!(calls.last(), Some(&EffectCall::SetDnd(false)));
    assert!(calls.contains(&EffectCall::Open("https://example.com/draft".into())));
}

#[tokio::test]
async fn only_one_session_at_a_time() {
    let h = harness(MockAdapter::new());
    let first = h
        .engine
        .start(timed("first", Duration::from_secs(60)), StartOptions::default())
        .await
        .unwrap();

    let err = h
        .engine
        .start(timed("second", Duration::from_secs(60)), StartOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, DayrunError::AlreadyRunning { .. }));

    h.engine.stop(&first);
    let record = h.engine.wait(&first).await.unwrap();
    assert_eq!(record.outcome, SessionOutcome::Aborted);

    // The lock is free again
    let next = h
        .engine
        .run(timed("third", Duration::from_millis(50)), StartOptions::default())
        .await
        .unwrap();
    assert_eq!(finished(next).outcome, SessionOutcome::Completed);
}

#[tokio::test]
async fn lock_of_dead_process_is_reclaimed() {
    let h = harness(MockAdapter::new());
    let mut child = std::process::Command::new("true").spawn().unwrap();
    let dead = child.id();
    child.wait().unwrap();

    h.engine
        .lock()
        .acquire(LockRecord {
            pid: dead,
            session_id: SessionId::new(),
            name: "crashed".into(),
            started_at: dayrun_util::now(),
            deadline: None,
            dnd: false,
        })
        .unwrap();

    let record = finished(
        h.engine
            .run(timed("fresh", Duration::from_millis(50)), StartOptions::default())
            .await
            .unwrap(),
    );
    assert_eq!(record.outcome, SessionOutcome::Completed);

    let names: Vec<_> = h.store.recent(10).unwrap().into_iter().map(|r| r.name).collect();
    assert_eq!(names, vec!["fresh", "crashed"]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_stops_end_the_session_once() {
    let h = harness(MockAdapter::new());
    let spec = SessionSpec {
        dnd: true,
        notify: true,
        ..timed("busy", Duration::from_secs(60))
    };
    let handle = h.engine.start(spec, StartOptions::default()).await.unwrap();

    let waiter = {
        let engine = h.engine.clone();
        let handle = handle.clone();
        tokio::spawn(async move { engine.wait(&handle).await })
    };
    let stoppers: Vec<_> = (0..8)
        .map(|_| {
            let handle = handle.clone();
            tokio::spawn(async move { handle.stop() })
        })
        .collect();

    let mut first_requests = 0;
    for stopper in stoppers {
        if stopper.await.unwrap() {
            first_requests += 1;
        }
    }
    let record = waiter.await.unwrap().unwrap();

    assert_eq!(first_requests, 1);
    assert_eq!(record.outcome, SessionOutcome::Aborted);
    assert_eq!(h.mock.count(|c| *c == EffectCall::SetDnd(false)), 1);
    assert_eq!(
        h.mock
            .count(|c| matches!(c, EffectCall::Notify { body, .. } if body.contains("stopped"))),
        1
    );
    assert_eq!(h.store.count().unwrap(), 1);
}

#[tokio::test]
async fn panes_without_tmux_run_in_the_background() {
    let caps = Capabilities {
        can_multiplex: false,
        ..Capabilities::all()
    };
    let h = harness(MockAdapter::new().with_capabilities(caps));
    let config = parse_config(CONFIG).unwrap();
    let spec = config
        .resolve(&SessionRequest {
            duration: Some(Duration::from_millis(50)),
            panes: vec![
                PaneSpec::titled("editor", "nvim"),
                PaneSpec::titled("server", "cargo watch"),
                PaneSpec::new("htop"),
            ],
            ..Default::default()
        })
        .unwrap();

    let record = finished(h.engine.run(spec, StartOptions::default()).await.unwrap());

    assert!(record.failures.is_empty());
    let commands: Vec<_> = h
        .mock
        .calls()
        .into_iter()
        .filter_map(|c| match c {
            EffectCall::Run { command, .. } => Some(command),
            _ => None,
        })
        .collect();
    assert_eq!(commands, vec!["nvim", "cargo watch", "htop"]);
    assert_eq!(h.mock.count(|c| matches!(c, EffectCall::Multiplex(_))), 0);
}

#[tokio::test]
async fn failing_target_is_recorded_once() {
    let h = harness(MockAdapter::new().fail_target("no-such-app"));
    let spec = SessionSpec {
        open: vec!["no-such-app".into()],
        ..timed("bumpy", Duration::from_millis(50))
    };

    let record = finished(h.engine.run(spec, StartOptions::default()).await.unwrap());

    assert_eq!(record.outcome, SessionOutcome::Completed);
    assert_eq!(record.failures.len(), 1);
    assert_eq!(record.failures[0].op, EffectOp::OpenTarget);
    assert_eq!(record.failures[0].target, "no-such-app");
    assert_eq!(h.store.recent(1).unwrap()[0].failures, record.failures);
}

// Binary-level tests

fn dayrun(dir: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_dayrun"))
        .arg("--data-dir")
        .arg(dir.join("data"))
        .arg("--config")
        .arg(dir.join("config.toml"))
        .args(args)
        .env_remove("DAYRUN_DATA_DIR")
        .env_remove("DAYRUN_CONFIG")
        .env_remove("DAYRUN_LOG")
        .env_remove("RUST_LOG")
        .output()
        .unwrap()
}

fn history(dir: &Path) -> Vec<LogRecord> {
    let output = dayrun(dir, &["history", "--json"]);
    assert!(output.status.success(), "{:?}", output);
    serde_json::from_slice(&output.stdout).unwrap()
}

const QUIET: &[&str] = &["--no-dnd", "--no-notify"];

#[test]
fn binary_foreground_session() {
    let dir = tempfile::tempdir().unwrap();
    let mut args = vec!["start", "-d", "1s", "--name", "short"];
    args.extend_from_slice(QUIET);

    let started = Instant::now();
    let output = dayrun(dir.path(), &args);
    assert!(output.status.success(), "{:?}", output);
    assert!(started.elapsed() >= Duration::from_secs(1));

    let records = history(dir.path());
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].name, "short");
    assert_eq!(records[0].outcome, SessionOutcome::Completed);
    assert!(!records[0].detached);
    assert!(dir.path().join("config.toml").exists());
}

#[test]
fn binary_detached_session() {
    let dir = tempfile::tempdir().unwrap();
    let lock = dayrun_util::lock_path(&dir.path().join("data"));
    let mut args = vec!["start", "-d", "1s", "--detach"];
    args.extend_from_slice(QUIET);

    let started = Instant::now();
    let output = dayrun(dir.path(), &args);
    assert!(output.status.success(), "{:?}", output);
    assert!(started.elapsed() < Duration::from_millis(200), "{:?}", started.elapsed());

    let status = dayrun(dir.path(), &["status"]);
    let stdout = String::from_utf8_lossy(&status.stdout);
    assert!(stdout.contains("Session:  focus"), "{}", stdout);

    let deadline = Instant::now() + Duration::from_secs(10);
    while lock.exists() && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(100));
    }
    assert!(!lock.exists(), "monitor never released the lock");

    let records = history(dir.path());
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].outcome, SessionOutcome::Completed);
    assert!(records[0].detached);
}

#[test]
fn binary_detached_session_with_slow_start_still_ends() {
    let dir = tempfile::tempdir().unwrap();
    let lock = dayrun_util::lock_path(&dir.path().join("data"));
    // Each long-running command holds start up for its launch check, so the
    // deadline passes before the monitor is handed the lock
    let mut args = vec!["start", "-d", "1s", "--detach"];
    for _ in 0..6 {
        args.extend_from_slice(&["--cmd", "sleep 5"]);
    }
    args.extend_from_slice(QUIET);

    let output = dayrun(dir.path(), &args);
    assert!(output.status.success(), "{:?}", output);

    let deadline = Instant::now() + Duration::from_secs(8);
    while lock.exists() && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(100));
    }
    assert!(!lock.exists(), "monitor never released the lock");

    let records = history(dir.path());
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].outcome, SessionOutcome::Completed);
    assert!(records[0].detached);
    assert!(records[0].failures.is_empty());
}

#[test]
fn binary_stop_ends_detached_session() {
    let dir = tempfile::tempdir().unwrap();
    let lock = dayrun_util::lock_path(&dir.path().join("data"));
    let mut args = vec!["start", "--until-stopped", "--detach", "--cmd", "true"];
    args.extend_from_slice(QUIET);

    let output = dayrun(dir.path(), &args);
    assert!(output.status.success(), "{:?}", output);

    let busy = dayrun(dir.path(), &["start", "-d", "5m", "--no-dnd"]);
    assert_eq!(busy.status.code(), Some(3));

    let stop = dayrun(dir.path(), &["stop"]);
    assert!(stop.status.success(), "{:?}", stop);

    let deadline = Instant::now() + Duration::from_secs(10);
    while lock.exists() && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(100));
    }
    assert!(!lock.exists());

    let records = history(dir.path());
    assert_eq!(records[0].outcome, SessionOutcome::Aborted);
}

#[test]
fn binary_exit_codes_and_idle_commands() {
    let dir = tempfile::tempdir().unwrap();

    let missing = dayrun(dir.path(), &["start", "-t", "nope"]);
    assert_eq!(missing.status.code(), Some(4));

    let empty = dayrun(dir.path(), &["start", "--until-stopped", "--no-dnd", "--no-notify"]);
    assert_eq!(empty.status.code(), Some(4));

    let status = dayrun(dir.path(), &["status"]);
    assert!(status.status.success());
    assert!(String::from_utf8_lossy(&status.stdout).contains("No active session"));

    let stop = dayrun(dir.path(), &["stop"]);
    assert_eq!(stop.status.code(), Some(1));
}

#[test]
fn binary_template_management() {
    let dir = tempfile::tempdir().unwrap();

    let add = dayrun(
        dir.path(),
        &["templates", "add", "reading", "-d", "45m", "--no-dnd", "--open", "https://example.com"],
    );
    assert!(add.status.success(), "{:?}", add);

    let again = dayrun(dir.path(), &["templates", "add", "reading", "-d", "30m"]);
    assert_eq!(again.status.code(), Some(4));

    let list = dayrun(dir.path(), &["templates", "list"]);
    let stdout = String::from_utf8_lossy(&list.stdout);
    assert!(stdout.contains("reading"), "{}", stdout);
    assert!(stdout.contains("duration=45m"), "{}", stdout);

    let show = dayrun(dir.path(), &["templates", "show", "reading"]);
    let stdout = String::from_utf8_lossy(&show.stdout);
    assert!(stdout.contains("[templates.reading]"), "{}", stdout);
    assert!(stdout.contains("https://example.com"), "{}", stdout);

    let remove = dayrun(dir.path(), &["templates", "remove", "reading"]);
    assert!(remove.status.success());
    let gone = dayrun(dir.path(), &["templates", "show", "reading"]);
    assert_eq!(gone.status.code(), Some(4));
}
