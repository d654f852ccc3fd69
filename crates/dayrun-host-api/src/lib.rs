//! Effect adapter trait interfaces for dayrun
//!
//! This crate defines the capability-based interface between the session
//! engine and platform-specific effect implementations. It contains no
//! platform code itself.

mod capabilities;
mod mock;
mod traits;

pub use capabilities::*;
pub use mock::*;
pub use traits::*;
