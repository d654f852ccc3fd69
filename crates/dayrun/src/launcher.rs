//! Starts `dayrun monitor` as a detached process

use dayrun_core::MonitorLauncher;
use dayrun_util::{DayrunError, Result};
use std::os::unix::process::CommandExt;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};
use tracing::debug;

/// How long a new monitor may take to pick up its handoff
const READY_TIMEOUT: Duration = Duration::from_secs(5);

/// Re-executes this binary in monitor mode, in a new session with null
/// stdio, passing down the paths and log level the caller resolved.
///
/// `launch` returns once the monitor has consumed the handoff file. The
/// monitor installs its signal handlers before doing so, so a `dayrun stop`
/// issued afterwards always reaches a handler.
pub struct ProcessMonitorLauncher {
    exe: PathBuf,
    data_dir: PathBuf,
    config: PathBuf,
    log_level: String,
}

impl ProcessMonitorLauncher {
    pub fn new(data_dir: &Path, config: &Path, log_level: &str) -> Result<Self> {
        let exe = std::env::current_exe()
            .map_err(|e| DayrunError::monitor(format!("cannot locate dayrun binary: {}", e)))?;
        Ok(Self {
            exe,
            data_dir: data_dir.to_path_buf(),
            config: config.to_path_buf(),
            log_level: log_level.to_string(),
        })
    }

    fn command(&self, handoff: &Path) -> Command {
        let mut cmd = Command::new(&self.exe);
        cmd.arg("--data-dir")
            .arg(&self.data_dir)
            .arg("--config")
            .arg(&self.config)
            .arg("--log-level")
            .arg(&self.log_level)
            .arg("monitor")
            .arg(handoff)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());
        cmd
    }
}

impl MonitorLauncher for ProcessMonitorLauncher {
    fn launch(&self, handoff: &Path) -> Result<u32> {
        let mut cmd = self.command(handoff);

        // SAFETY: setsid is async-signal-safe and touches no shared state
        unsafe {
            cmd.pre_exec(|| {
                nix::unistd::setsid().map_err(std::io::Error::from)?;
                Ok(())
            });
        }

        let mut child = cmd
            .spawn()
            .map_err(|e| DayrunError::monitor(format!("cannot start monitor: {}", e)))?;
        debug!(pid = child.id(), handoff = %handoff.display(), "Monitor spawned");

        let deadline = Instant::now() + READY_TIMEOUT;
        while handoff.exists() {
            let exited = child
                .try_wait()
                .map_err(|e| DayrunError::monitor(format!("cannot watch monitor: {}", e)))?;
            if let Some(status) = exited {
                return Err(DayrunError::monitor(format!("monitor exited early ({})", status)));
            }
            if Instant::now() >= deadline {
                let _ = child.kill();
                return Err(DayrunError::monitor("monitor did not pick up its handoff"));
            }
            std::thread::sleep(Duration::from_millis(20));
        }
        Ok(child.id())
    }
}
