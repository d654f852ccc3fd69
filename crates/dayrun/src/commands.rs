//! Subcommand implementations

use anyhow::{Context as _, Result};
use dayrun_api::{EffectFailure, LogRecord, MultiplexLayout, SessionOutcome};
use dayrun_config::{default_multiplex_name, validate_config, Config, Template};
use dayrun_core::{
    run_monitor, LockStatus, MonitorExit, MonitorHandoff, SessionEngine, SessionHandle,
    SessionLock, StartOptions, StopRequest,
};
use dayrun_store::{SessionLog, SqliteStore};
use dayrun_util::{
    format_datetime_full, format_duration, remaining_until, sessions_db_path, DayrunError,
};
use std::collections::BTreeMap;
use std::io::{IsTerminal, Write};
use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::launcher::ProcessMonitorLauncher;
use crate::signals::StopSignals;
use crate::{Context, EffectArgs, HistoryArgs, StartArgs, TemplateCommand};

/// Exit code when the session ran but some effects failed
const PARTIAL_FAILURE: u8 = 2;

fn load_config(ctx: &Context) -> Result<Config> {
    dayrun_config::load_or_init(&ctx.config_path)
        .with_context(|| format!("Failed to load config from {}", ctx.config_path.display()))
}

fn open_store(ctx: &Context) -> Result<SqliteStore> {
    let db_path = sessions_db_path(&ctx.data_dir);
    SqliteStore::open(&db_path)
        .with_context(|| format!("Failed to open session log {}", db_path.display()))
}

fn build_engine(ctx: &Context) -> Result<SessionEngine> {
    let store = open_store(ctx)?;
    let adapter = dayrun_host::detect();
    Ok(SessionEngine::new(adapter, Arc::new(store), &ctx.data_dir))
}

pub async fn start(ctx: &Context, args: &StartArgs) -> Result<ExitCode> {
    let config = load_config(ctx)?;
    let spec = config.resolve(&args.to_request())?;
    let options = StartOptions {
        detach: args.detach,
        record: !args.no_log,
    };

    let mut engine = build_engine(ctx)?;
    if options.detach {
        let launcher = ProcessMonitorLauncher::new(&ctx.data_dir, &ctx.config_path, &ctx.log_level)?;
        engine = engine.with_launcher(Arc::new(launcher));
    }

    let mut signals = StopSignals::register()?;
    let handle = engine.start(spec, options).await?;

    if let Some(pid) = handle.monitor_pid() {
        println!(
            "Session '{}' running in the background (monitor pid {})",
            handle.spec().name,
            pid
        );
        print_deadline(&handle);
        print_multiplex(&handle);
        // A stop sent while the session was being handed over reached us
        if signals.arrived().await {
            engine.request_stop().await?;
            println!("Stop requested");
        }
        return Ok(report_failures(&handle.failures()));
    }
    if options.detach {
        eprintln!("Could not start a background monitor; staying in the foreground");
    }

    println!("Session '{}' started. Press Ctrl-C to stop.", handle.spec().name);
    print_deadline(&handle);
    print_multiplex(&handle);

    let stopper = handle.clone();
    let watcher = tokio::spawn(async move {
        signals.recv().await;
        stopper.stop();
    });
    let ticker = tokio::spawn(countdown(handle.clone()));

    let result = engine.wait(&handle).await;
    watcher.abort();
    ticker.abort();
    if std::io::stdout().is_terminal() {
        println!();
    }

    let record = result?;
    print_summary(&record);
    Ok(report_failures(&record.failures))
}

fn print_deadline(handle: &SessionHandle) {
    match handle.deadline() {
        Some(deadline) => println!("Ends at {}", format_datetime_full(&deadline)),
        None => println!("Runs until `dayrun stop`"),
    }
}

fn print_multiplex(handle: &SessionHandle) {
    if let Some(name) = handle.multiplex_session() {
        println!("tmux session '{}' is ready: tmux attach -t {}", name, name);
    }
}

fn print_summary(record: &LogRecord) {
    let verb = match record.outcome {
        SessionOutcome::Completed => "completed",
        SessionOutcome::Aborted => "stopped",
    };
    println!(
        "Session '{}' {} after {}",
        record.name,
        verb,
        format_duration(record.duration())
    );
}

/// Print effect failures to stderr and pick the exit code
fn report_failures(failures: &[EffectFailure]) -> ExitCode {
    if failures.is_empty() {
        return ExitCode::SUCCESS;
    }
    eprintln!("{} effect(s) failed:", failures.len());
    for failure in failures {
        eprintln!("  {}", failure);
    }
    ExitCode::from(PARTIAL_FAILURE)
}

/// `H:MM:SS` or `MM:SS`
fn clock(d: Duration) -> String {
    let secs = d.as_secs();
    let (h, m, s) = (secs / 3600, (secs % 3600) / 60, secs % 60);
    if h > 0 {
        format!("{}:{:02}:{:02}", h, m, s)
    } else {
        format!("{:02}:{:02}", m, s)
    }
}

async fn countdown(handle: SessionHandle) {
    let mut stdout = std::io::stdout();
    if !stdout.is_terminal() {
        return;
    }

    let mut tick = tokio::time::interval(Duration::from_secs(1));
    loop {
        tick.tick().await;
        let line = match handle.remaining() {
            Some(left) => format!("{} remaining", clock(left)),
            None => {
                let elapsed = (dayrun_util::now() - handle.started_at())
                    .to_std()
                    .unwrap_or_default();
                format!("{} elapsed", clock(elapsed))
            }
        };
        let _ = write!(stdout, "\r\x1b[2K{}", line);
        let _ = stdout.flush();
    }
}

pub async fn stop(ctx: &Context) -> Result<ExitCode> {
    let engine = build_engine(ctx)?;
    match engine.request_stop().await? {
        StopRequest::Signalled(record) => {
            println!("Stopping session '{}' (pid {})", record.name, record.pid)
        }
        StopRequest::ClearedStale(Some(record)) => println!(
            "Session '{}' had lost its process (pid {}); cleaned up",
            record.name, record.pid
        ),
        StopRequest::ClearedStale(None) => println!("Removed an unreadable session lock"),
    }
    Ok(ExitCode::SUCCESS)
}

pub fn status(ctx: &Context) -> Result<ExitCode> {
    let lock = SessionLock::in_data_dir(&ctx.data_dir);
    match lock.status()? {
        LockStatus::Idle => println!("No active session"),
        LockStatus::Active(record) => {
            println!("Session:  {}", record.name);
            println!("Id:       {}", record.session_id);
            println!("Owner:    pid {}", record.pid);
            println!("Started:  {}", format_datetime_full(&record.started_at));
            match record.deadline {
                Some(deadline) => println!(
                    "Ends:     {} ({} left)",
                    format_datetime_full(&deadline),
                    clock(remaining_until(deadline, dayrun_util::now()))
                ),
                None => println!("Ends:     when stopped"),
            }
            println!("DND:      {}", if record.dnd { "on" } else { "off" });
        }
        LockStatus::Stale(Some(record)) => println!(
            "Session '{}' lost its process (pid {}); run `dayrun stop` to clean up",
            record.name, record.pid
        ),
        LockStatus::Stale(None) => {
            println!("Session lock is unreadable; run `dayrun stop` to clean up")
        }
    }
    Ok(ExitCode::SUCCESS)
}

pub fn history(ctx: &Context, args: &HistoryArgs) -> Result<ExitCode> {
    let store = open_store(ctx)?;
    let records = match &args.name {
        Some(name) => store.find_by_name(name, args.last)?,
        None => store.recent(args.last)?,
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&records)?);
        return Ok(ExitCode::SUCCESS);
    }

    if records.is_empty() {
        println!("No sessions recorded");
    }
    for record in &records {
        println!("{}", history_line(record));
    }
    Ok(ExitCode::SUCCESS)
}

fn history_line(record: &LogRecord) -> String {
    let mut line = format!(
        "{}  {:>8}  {:<9}  {}",
        record.started_at.format("%Y-%m-%d %H:%M"),
        clock(record.duration()),
        record.outcome.as_str(),
        record.name
    );
    if record.detached {
        line.push_str("  (detached)");
    }
    if !record.failures.is_empty() {
        line.push_str(&format!("  [{} failed]", record.failures.len()));
    }
    line
}

pub fn templates(ctx: &Context, command: TemplateCommand) -> Result<ExitCode> {
    let mut config = load_config(ctx)?;

    match command {
        TemplateCommand::List => {
            if config.templates.is_empty() {
                println!("No templates");
            }
            for (name, template) in &config.templates {
                println!("{:<16} {}", name, template.summary(&config.defaults));
            }
        }
        TemplateCommand::Show { name } => {
            let raw = config.to_raw();
            let template = raw
                .templates
                .get(&name)
                .ok_or_else(|| DayrunError::TemplateNotFound(name.clone()))?;
            let doc = BTreeMap::from([("templates", BTreeMap::from([(name.as_str(), template)]))]);
            print!("{}", toml::to_string_pretty(&doc).context("Failed to render template")?);
        }
        TemplateCommand::Add {
            name,
            force,
            effects,
        } => {
            if config.template(&name).is_some() && !force {
                return Err(DayrunError::invalid(format!(
                    "template '{}' already exists; use --force to replace it",
                    name
                ))
                .into());
            }
            let template = template_from(&name, &effects);
            config.save_template(name.clone(), template);

            let errors = validate_config(&config.to_raw());
            if !errors.is_empty() {
                let message = errors.iter().map(ToString::to_string).collect::<Vec<_>>();
                return Err(DayrunError::invalid(message.join("; ")).into());
            }
            save(ctx, &config)?;
            println!("Saved template '{}'", name);
        }
        TemplateCommand::Remove { name } => {
            config
                .remove_template(&name)
                .ok_or_else(|| DayrunError::TemplateNotFound(name.clone()))?;
            save(ctx, &config)?;
            println!("Removed template '{}'", name);
        }
    }
    Ok(ExitCode::SUCCESS)
}

fn save(ctx: &Context, config: &Config) -> Result<()> {
    dayrun_config::save_config(&ctx.config_path, config)
        .with_context(|| format!("Failed to write config to {}", ctx.config_path.display()))
}

fn template_from(name: &str, effects: &EffectArgs) -> Template {
    let multiplex = if effects.panes.is_empty() && effects.tmux_session.is_none() {
        None
    } else {
        Some(MultiplexLayout {
            session_name: effects
                .tmux_session
                .clone()
                .unwrap_or_else(|| default_multiplex_name(name)),
            panes: effects.panes.clone(),
        })
    };

    Template {
        duration: effects.duration,
        dnd: effects.dnd(),
        notify: effects.notify(),
        open: effects.open.clone(),
        commands: effects.commands.clone(),
        audio: effects.audio.clone(),
        multiplex,
    }
}

pub async fn monitor(ctx: &Context, handoff: &Path) -> Result<ExitCode> {
    let mut signals = StopSignals::register()?;
    let handoff = MonitorHandoff::take(handoff)?;
    let engine = build_engine(ctx)?;

    match run_monitor(&engine, handoff, signals.recv()).await? {
        MonitorExit::Finished(record) => info!(
            session_id = %record.session_id,
            outcome = record.outcome.as_str(),
            "Monitor finished session"
        ),
        MonitorExit::Superseded => info!("Monitor exiting without ending the session"),
    }
    Ok(ExitCode::SUCCESS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use dayrun_api::{EffectOp, PaneSpec};
    use dayrun_util::SessionId;

    #[test]
    fn clock_format() {
        assert_eq!(clock(Duration::from_secs(59)), "00:59");
        assert_eq!(clock(Duration::from_secs(25 * 60)), "25:00");
        assert_eq!(clock(Duration::from_secs(3600 + 61)), "1:01:01");
    }

    #[test]
    fn failures_select_partial_exit_code() {
        assert_eq!(report_failures(&[]), ExitCode::SUCCESS);
        let failures = [EffectFailure::new(EffectOp::OpenTarget, "nope", "not found")];
        assert_eq!(report_failures(&failures), ExitCode::from(PARTIAL_FAILURE));
    }

    #[test]
    fn history_line_marks_detached_and_failures() {
        let started_at = dayrun_util::now();
        let record = LogRecord {
            session_id: SessionId::new(),
            name: "deep-work".into(),
            started_at,
            ended_at: started_at + chrono::Duration::minutes(90),
            outcome: SessionOutcome::Completed,
            failures: vec![EffectFailure::new(EffectOp::Notify, "dayrun", "no daemon")],
            detached: true,
        };
        let line = history_line(&record);
        assert!(line.contains("1:30:00"));
        assert!(line.contains("completed"));
        assert!(line.contains("deep-work"));
        assert!(line.ends_with("(detached)  [1 failed]"));
    }

    #[test]
    fn template_from_flags() {
        let effects = EffectArgs {
            duration: Some(Duration::from_secs(50 * 60)),
            dnd: false,
            no_dnd: true,
            notify: false,
            no_notify: false,
            open: vec!["https://example.com".into()],
            commands: vec![],
            panes: vec![PaneSpec::new("nvim")],
            tmux_session: None,
            audio: None,
        };
        let template = template_from("writing", &effects);
        assert_eq!(template.dnd, Some(false));
        assert_eq!(template.notify, None);
        let layout = template.multiplex.unwrap();
        assert_eq!(layout.session_name, "dayrun_writing");
        assert_eq!(layout.panes.len(), 1);
    }
}
