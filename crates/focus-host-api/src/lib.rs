//! Host adapter trait interfaces for focusd
//!
//! This crate defines the capability-based interface between the service and
//! the platform that actually enforces decisions: a block surface drawn over
//! foreground apps, or an OS restriction subsystem that takes a block-set.
//! It contains no platform code itself.

mod capabilities;
mod mock;
mod traits;

pub use capabilities::*;
pub use mock::*;
pub use traits::*;
