//! Host capabilities model

use serde::{Deserialize, Serialize};
use std::fmt;

/// Operating system family an adapter targets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OsFamily {
    Linux,
    MacOs,
    /// Any other Unix; only tool-independent effects work there
    OtherUnix,
}

impl OsFamily {
    /// Family of the running system
    pub fn current() -> Self {
        if cfg!(target_os = "linux") {
            OsFamily::Linux
        } else if cfg!(target_os = "macos") {
            OsFamily::MacOs
        } else {
            OsFamily::OtherUnix
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            OsFamily::Linux => "linux",
            OsFamily::MacOs => "macos",
            OsFamily::OtherUnix => "unix",
        }
    }
}

impl fmt::Display for OsFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Describes which optional integrations are usable on this host.
///
/// Computed once per invocation by the capability probe and never mutated
/// afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Capabilities {
    /// A do-not-disturb toggle is available
    pub can_toggle_dnd: bool,

    /// Desktop notifications can be sent
    pub can_notify: bool,

    /// A terminal multiplexer can host pane workspaces
    pub can_multiplex: bool,

    /// A default handler for URLs and files is available
    pub can_open: bool,
}

impl Capabilities {
    /// Nothing optional is available
    pub fn none() -> Self {
        Self::default()
    }

    /// Everything is available
    pub fn all() -> Self {
        Self {
            can_toggle_dnd: true,
            can_notify: true,
            can_multiplex: true,
            can_open: true,
        }
    }

    /// Names of the available capabilities, for logging
    pub fn available(&self) -> Vec<&'static str> {
        let mut names = Vec::new();
        if self.can_toggle_dnd {
            names.push("dnd");
        }
        if self.can_notify {
            names.push("notify");
        }
        if self.can_multiplex {
            names.push("multiplex");
        }
        if self.can_open {
            names.push("open");
        }
        names
    }
}
