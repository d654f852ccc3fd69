//! dayrun - start a focused work session with one command
//!
//! Entry point for the `dayrun` CLI. It wires together:
//! - Configuration loading and template resolution
//! - The session log store
//! - The platform effect adapter
//! - The session engine and its detached monitor

use anyhow::Result;
use clap::{Args as ClapArgs, Parser, Subcommand};
use dayrun_api::PaneSpec;
use dayrun_config::SessionRequest;
use dayrun_util::{config_path_without_env, data_dir_without_env, DayrunError};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

mod commands;
mod launcher;
mod signals;

/// dayrun - focused work sessions
#[derive(Parser, Debug)]
#[command(name = "dayrun", version)]
#[command(about = "Start a focused work session: DND, apps, commands, tmux and a timer", long_about = None)]
struct Args {
    /// Data directory for the lock, handoffs and session log
    #[arg(long, global = true, env = "DAYRUN_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Configuration file path (default: ~/.config/dayrun/config.toml)
    #[arg(long, global = true, env = "DAYRUN_CONFIG")]
    config: Option<PathBuf>,

    /// Log level or filter directive
    #[arg(long, global = true, env = "DAYRUN_LOG", default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start a session
    Start(StartArgs),

    /// Stop the running session
    Stop,

    /// Show the running session
    Status,

    /// Show past sessions
    History(HistoryArgs),

    /// Manage session templates
    Templates {
        #[command(subcommand)]
        command: TemplateCommand,
    },

    /// Own a detached session until it ends
    #[command(hide = true)]
    Monitor {
        /// Handoff file written by `start --detach`
        handoff: PathBuf,
    },
}

/// Session settings shared by `start` and `templates add`
#[derive(ClapArgs, Debug)]
struct EffectArgs {
    /// Session length, e.g. 90s, 25m, 1.5h (bare numbers are minutes)
    #[arg(short, long, value_parser = parse_duration_arg)]
    duration: Option<Duration>,

    /// Turn on do-not-disturb
    #[arg(long, overrides_with = "no_dnd")]
    dnd: bool,

    /// Leave do-not-disturb alone
    #[arg(long)]
    no_dnd: bool,

    /// Send start and end notifications
    #[arg(long, overrides_with = "no_notify")]
    notify: bool,

    /// Don't send notifications
    #[arg(long)]
    no_notify: bool,

    /// Application, URL or file to open (repeatable)
    #[arg(long = "open", value_name = "TARGET")]
    open: Vec<String>,

    /// Shell command to run in the background (repeatable)
    #[arg(long = "cmd", value_name = "COMMAND")]
    commands: Vec<String>,

    /// tmux pane as TITLE=COMMAND or COMMAND (repeatable)
    #[arg(long = "pane", value_name = "TITLE=COMMAND", value_parser = parse_pane)]
    panes: Vec<PaneSpec>,

    /// tmux session name
    #[arg(long, value_name = "NAME")]
    tmux_session: Option<String>,

    /// Audio file or stream to play
    #[arg(long, value_name = "SOURCE")]
    audio: Option<String>,
}

impl EffectArgs {
    fn dnd(&self) -> Option<bool> {
        flag(self.dnd, self.no_dnd)
    }

    fn notify(&self) -> Option<bool> {
        flag(self.notify, self.no_notify)
    }
}

#[derive(ClapArgs, Debug)]
struct StartArgs {
    /// Template to start from
    #[arg(short, long)]
    template: Option<String>,

    /// Run until `dayrun stop` instead of for a fixed time
    #[arg(long, conflicts_with = "duration")]
    until_stopped: bool,

    /// Session name (default: the template name, or "focus")
    #[arg(long)]
    name: Option<String>,

    /// Return immediately and let a background monitor end the session
    #[arg(long)]
    detach: bool,

    /// Don't record this session in the history
    #[arg(long)]
    no_log: bool,

    #[command(flatten)]
    effects: EffectArgs,
}

impl StartArgs {
    fn to_request(&self) -> SessionRequest {
        SessionRequest {
            template: self.template.clone(),
            name: self.name.clone(),
            duration: self.effects.duration,
            until_stopped: self.until_stopped,
            dnd: self.effects.dnd(),
            notify: self.effects.notify(),
            open: self.effects.open.clone(),
            commands: self.effects.commands.clone(),
            panes: self.effects.panes.clone(),
            multiplex_session: self.effects.tmux_session.clone(),
            audio: self.effects.audio.clone(),
        }
    }
}

#[derive(ClapArgs, Debug)]
struct HistoryArgs {
    /// Number of sessions to show
    #[arg(long, default_value_t = 10)]
    last: usize,

    /// Only sessions with this name
    #[arg(long)]
    name: Option<String>,

    /// Print records as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Subcommand, Debug)]
enum TemplateCommand {
    /// List templates
    List,

    /// Show one template as TOML
    Show { name: String },

    /// Add or replace a template
    Add {
        name: String,

        /// Replace an existing template
        #[arg(long)]
        force: bool,

        #[command(flatten)]
        effects: EffectArgs,
    },

    /// Remove a template
    Remove { name: String },
}

fn flag(yes: bool, no: bool) -> Option<bool> {
    match (yes, no) {
        (true, _) => Some(true),
        (_, true) => Some(false),
        _ => None,
    }
}

fn parse_duration_arg(s: &str) -> Result<Duration, String> {
    dayrun_util::parse_duration(s).map_err(|e| e.to_string())
}

fn parse_pane(s: &str) -> Result<PaneSpec, String> {
    if s.trim().is_empty() {
        return Err("pane command is empty".into());
    }
    match s.split_once('=') {
        Some((title, command))
            if !title.is_empty() && !title.contains(char::is_whitespace) =>
        {
            if command.trim().is_empty() {
                return Err(format!("pane '{}' has no command", title));
            }
            Ok(PaneSpec::titled(title, command))
        }
        _ => Ok(PaneSpec::new(s)),
    }
}

/// Paths and settings every command works with
pub struct Context {
    pub data_dir: PathBuf,
    pub config_path: PathBuf,
    pub log_level: String,
}

impl Context {
    fn from_args(args: &Args) -> Self {
        Self {
            data_dir: args.data_dir.clone().unwrap_or_else(data_dir_without_env),
            config_path: args.config.clone().unwrap_or_else(config_path_without_env),
            log_level: args.log_level.clone(),
        }
    }
}

fn env_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("warn"))
}

fn init_logging(level: &str) {
    tracing_subscriber::fmt()
        .with_env_filter(env_filter(level))
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();
}

/// The monitor has no terminal; it logs to `<log_dir>/monitor.log`
fn init_monitor_logging(ctx: &Context) {
    let log_dir = dayrun_util::log_dir_for(&ctx.data_dir);
    let file = std::fs::create_dir_all(&log_dir).and_then(|_| {
        std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(log_dir.join("monitor.log"))
    });

    match file {
        Ok(file) => tracing_subscriber::fmt()
            .with_env_filter(env_filter(&ctx.log_level))
            .with_target(true)
            .with_ansi(false)
            .with_writer(std::sync::Mutex::new(file))
            .init(),
        Err(_) => init_logging(&ctx.log_level),
    }
}

/// Exit code for a failed command
fn exit_code_for(err: &anyhow::Error) -> ExitCode {
    match err.downcast_ref::<DayrunError>() {
        Some(DayrunError::AlreadyRunning { .. }) => ExitCode::from(3),
        Some(e) if e.is_invalid_request() => ExitCode::from(4),
        _ => ExitCode::FAILURE,
    }
}

async fn run(args: Args, ctx: Context) -> Result<ExitCode> {
    match args.command {
        Command::Start(start) => commands::start(&ctx, &start).await,
        Command::Stop => commands::stop(&ctx).await,
        Command::Status => commands::status(&ctx),
        Command::History(history) => commands::history(&ctx, &history),
        Command::Templates { command } => commands::templates(&ctx, command),
        Command::Monitor { handoff } => commands::monitor(&ctx, &handoff).await,
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    let ctx = Context::from_args(&args);

    if matches!(args.command, Command::Monitor { .. }) {
        init_monitor_logging(&ctx);
    } else {
        init_logging(&ctx.log_level);
    }

    tracing::debug!(
        version = env!("CARGO_PKG_VERSION"),
        data_dir = %ctx.data_dir.display(),
        config = %ctx.config_path.display(),
        "dayrun starting"
    );

    match run(args, ctx).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("dayrun: {:#}", e);
            exit_code_for(&e)
        }
    }
}
