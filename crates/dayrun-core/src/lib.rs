//! Session engine for dayrun
//!
//! This crate is the heart of dayrun, containing:
//! - The session lock (one active session per user, stale-lock recovery)
//! - Session state machine (Pending -> Running -> Ending -> Completed | Aborted)
//! - Start/end effect sequencing with best-effort failure collection
//! - Detached monitor handoff and ownership checks

mod engine;
mod lock;
mod monitor;
mod session;

pub use engine::*;
pub use lock::*;
pub use monitor::*;
pub use session::*;
