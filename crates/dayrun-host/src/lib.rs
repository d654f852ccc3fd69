//! Platform effect adapters for dayrun
//!
//! Provides:
//! - Capability probing (which helper tools exist on this host)
//! - Detached process launching in a new session
//! - tmux workspace creation with unique session names
//! - One `EffectAdapter` per OS family: Linux, macOS, other Unix

mod fallback;
mod linux;
mod macos;
mod probe;
mod process;
mod target;
mod tmux;

pub use fallback::*;
pub use linux::*;
pub use macos::*;
pub use probe::*;
pub use process::*;
pub use target::*;
pub use tmux::*;

use dayrun_host_api::{Capabilities, EffectAdapter, OsFamily};
use std::sync::Arc;
use tracing::info;

/// Build the adapter for an OS family with already-probed capabilities
pub fn adapter_for(os: OsFamily, capabilities: Capabilities) -> Arc<dyn EffectAdapter> {
    match os {
        OsFamily::Linux => Arc::new(LinuxEffects::new(capabilities)),
        OsFamily::MacOs => Arc::new(MacEffects::new(capabilities)),
        OsFamily::OtherUnix => Arc::new(UnixEffects::new(capabilities)),
    }
}

/// Probe the running host and build its adapter
pub fn detect() -> Arc<dyn EffectAdapter> {
    let os = OsFamily::current();
    let capabilities = probe(os);
    info!(
        os = %os,
        capabilities = ?capabilities.available(),
        "Host capabilities probed"
    );
    adapter_for(os, capabilities)
}
