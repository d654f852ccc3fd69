//! Capability probing

use dayrun_host_api::{Capabilities, OsFamily};
use tracing::debug;

/// Whether an executable is on `PATH`
pub fn has_tool(name: &str) -> bool {
    which::which(name).is_ok()
}

/// Probe the host for the helper tools each effect needs.
///
/// Never fails; a tool that can't be found is an absent capability.
pub fn probe(os: OsFamily) -> Capabilities {
    probe_with(os, has_tool)
}

/// Probe using a custom tool lookup
pub fn probe_with(os: OsFamily, has: impl Fn(&str) -> bool) -> Capabilities {
    let caps = match os {
        OsFamily::Linux => Capabilities {
            can_toggle_dnd: has("gsettings"),
            can_notify: has("notify-send"),
            can_multiplex: has("tmux"),
            can_open: has("xdg-open") || has("gtk-launch"),
        },
        OsFamily::MacOs => Capabilities {
            can_toggle_dnd: has("defaults"),
            can_notify: has("osascript"),
            can_multiplex: has("tmux"),
            can_open: has("open"),
        },
        OsFamily::OtherUnix => Capabilities {
            can_toggle_dnd: false,
            can_notify: false,
            can_multiplex: has("tmux"),
            can_open: false,
        },
    };
    debug!(os = %os, capabilities = ?caps, "Probe finished");
    caps
}
