//! Process launching utilities

use dayrun_host_api::{EffectError, EffectResult};
use std::io::ErrorKind;
use std::os::unix::process::ExitStatusExt;
use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, warn};

/// How long a launched process is watched for an early failure
pub const LAUNCH_GRACE: Duration = Duration::from_millis(250);

/// Run a short-lived helper tool to completion and return its stdout
pub async fn run_tool(program: &str, args: &[&str]) -> EffectResult<String> {
    let output = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .output()
        .await
        .map_err(|e| spawn_error(program, e))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        debug!(program = %program, status = %output.status, stderr = %stderr.trim(), "Tool failed");
        return Err(EffectError::CommandFailed {
            program: program.to_string(),
            status: describe_status(output.status),
        });
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Launch `argv` in its own session, detached from this process.
///
/// The child is watched for [`LAUNCH_GRACE`]; exiting unsuccessfully in that
/// window is reported, anything else counts as launched. The child outlives
/// the caller.
pub async fn launch_detached(argv: &[String], cwd: Option<&Path>) -> EffectResult<u32> {
    let Some((program, args)) = argv.split_first() else {
        return Err(EffectError::SpawnFailed("Empty argv".into()));
    };

    let mut cmd = Command::new(program);
    cmd.args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .kill_on_drop(false);

    if let Some(dir) = cwd {
        cmd.current_dir(dir);
    }

    // SAFETY: setsid is async-signal-safe and touches no shared state
    unsafe {
        cmd.pre_exec(|| {
            nix::unistd::setsid().map_err(std::io::Error::from)?;
            Ok(())
        });
    }

    let mut child = cmd.spawn().map_err(|e| spawn_error(program, e))?;
    let pid = child.id().unwrap_or_default();
    debug!(pid = pid, program = %program, "Process launched");

    match tokio::time::timeout(LAUNCH_GRACE, child.wait()).await {
        Ok(Ok(status)) if !status.success() => Err(EffectError::CommandFailed {
            program: program.to_string(),
            status: describe_status(status),
        }),
        Ok(Ok(_)) => Ok(pid),
        Ok(Err(e)) => {
            warn!(pid = pid, error = %e, "Wait on launched process failed");
            Ok(pid)
        }
        // Still running; dropping the handle leaves reaping to the runtime
        Err(_) => Ok(pid),
    }
}

/// Launch a shell command line with `sh -c`
pub async fn run_shell(command: &str, cwd: Option<&Path>) -> EffectResult<u32> {
    let argv = vec!["sh".to_string(), "-c".to_string(), command.to_string()];
    launch_detached(&argv, cwd).await
}

fn spawn_error(program: &str, e: std::io::Error) -> EffectError {
    if e.kind() == ErrorKind::NotFound {
        EffectError::ToolMissing(program.to_string())
    } else {
        EffectError::SpawnFailed(format!("Failed to spawn {}: {}", program, e))
    }
}

fn describe_status(status: ExitStatus) -> String {
    match (status.code(), status.signal()) {
        (Some(code), _) => format!("exit code {}", code),
        (None, Some(sig)) => format!("signal {}", sig),
        (None, None) => "unknown status".to_string(),
    }
}
