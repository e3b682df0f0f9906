//! Shared utilities for focusd
//!
//! This crate provides:
//! - ID types (CommandId, ClientId)
//! - Wall-clock helpers (mockable `now()`, epoch-millis conversion)
//! - Error types
//! - Rate limiting helpers
//! - Default paths for socket, config, data, and log directories

mod error;
mod ids;
mod paths;
mod rate_limit;
mod time;

pub use error::*;
pub use ids::*;
pub use paths::*;
pub use rate_limit::*;
pub use time::*;
