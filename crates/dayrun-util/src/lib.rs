//! Shared utilities for dayrun
//!
//! This crate provides:
//! - ID types (SessionId)
//! - Time utilities (wall-clock now, duration parsing and formatting)
//! - Error types
//! - Default paths for the data, config, lock and log locations

mod error;
mod ids;
mod paths;
mod time;

pub use error::*;
pub use ids::*;
pub use paths::*;
pub use time::*;
