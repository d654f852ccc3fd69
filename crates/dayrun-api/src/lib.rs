//! Shared types for dayrun
//!
//! This crate defines the vocabulary every other crate speaks:
//! - Session specs (what a focused session does)
//! - Lifecycle states and outcomes
//! - Persisted records (lock record, log record, effect failures)

mod records;
mod types;

pub use records::*;
pub use types::*;
