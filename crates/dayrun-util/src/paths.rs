//! Default paths for dayrun
//!
//! All paths are user-writable (no root required):
//! - Data: `$DAYRUN_DATA_DIR`, `$XDG_DATA_HOME/dayrun` or `~/.local/share/dayrun`
//! - Config: `$DAYRUN_CONFIG`, `$XDG_CONFIG_HOME/dayrun/config.toml` or `~/.config/dayrun/config.toml`
//! - Logs: `<data>/logs` when the data dir is overridden, else `$XDG_STATE_HOME/dayrun`
//!
//! The `DAYRUN_*` overrides are read by the command line; the functions
//! here give the fallbacks.
//!
//! The lock file, monitor handoff files and the session database all live
//! inside the data directory.

use std::path::{Path, PathBuf};

use crate::SessionId;

/// Application subdirectory name
const APP_DIR: &str = "dayrun";

const CONFIG_FILENAME: &str = "config.toml";
const LOCK_FILENAME: &str = "current_session.lock";
const DB_FILENAME: &str = "sessions.db";

/// Get the data directory without checking DAYRUN_DATA_DIR.
pub fn data_dir_without_env() -> PathBuf {
    if let Ok(data_home) = std::env::var("XDG_DATA_HOME") {
        return PathBuf::from(data_home).join(APP_DIR);
    }

    if let Some(home) = dirs::home_dir() {
        return home.join(".local").join("share").join(APP_DIR);
    }

    // Last resort
    PathBuf::from("/tmp").join(APP_DIR).join("data")
}

/// Get the config file path without checking DAYRUN_CONFIG.
pub fn config_path_without_env() -> PathBuf {
    if let Ok(config_home) = std::env::var("XDG_CONFIG_HOME") {
        return PathBuf::from(config_home).join(APP_DIR).join(CONFIG_FILENAME);
    }

    if let Some(home) = dirs::home_dir() {
        return home.join(".config").join(APP_DIR).join(CONFIG_FILENAME);
    }

    PathBuf::from("/tmp").join(APP_DIR).join(CONFIG_FILENAME)
}

/// Get the log directory that belongs to `data_dir`.
///
/// An explicitly chosen data directory keeps its logs next to it so that
/// isolated runs (tests, alternate profiles) never write to the user's
/// state directory.
pub fn log_dir_for(data_dir: &Path) -> PathBuf {
    if data_dir != data_dir_without_env() {
        return data_dir.join("logs");
    }

    default_log_dir()
}

/// Get the default log directory.
///
/// Order of precedence:
/// 1. `$XDG_STATE_HOME/dayrun` (if XDG_STATE_HOME is set)
/// 2. `~/.local/state/dayrun` (fallback)
pub fn default_log_dir() -> PathBuf {
    if let Ok(state_home) = std::env::var("XDG_STATE_HOME") {
        return PathBuf::from(state_home).join(APP_DIR);
    }

    if let Some(home) = dirs::home_dir() {
        return home.join(".local").join("state").join(APP_DIR);
    }

    PathBuf::from("/tmp").join(APP_DIR).join("logs")
}

/// Path of the single session lock file inside `data_dir`
pub fn lock_path(data_dir: &Path) -> PathBuf {
    data_dir.join(LOCK_FILENAME)
}

/// Path of the session log database inside `data_dir`
pub fn sessions_db_path(data_dir: &Path) -> PathBuf {
    data_dir.join(DB_FILENAME)
}

/// Path of the handoff file a detached monitor is started with
pub fn handoff_path(data_dir: &Path, session_id: &SessionId) -> PathBuf {
    data_dir.join(format!("handoff-{}.json", session_id))
}

/// Expand a leading `~/` to the user's home directory.
pub fn expand_tilde(path: &str) -> PathBuf {
    if path == "~" {
        if let Some(home) = dirs::home_dir() {
            return home;
        }
    }
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}
