//! Protocol types for focusd IPC
//!
//! This crate defines the stable API between focusd and its clients
//! (the UI, the block surface and the platform shim):
//! - The shared session model
//! - Commands (requests from clients) and responses
//! - Events (service -> clients)
//! - Versioning

mod commands;
mod events;
mod types;

pub use commands::*;
pub use events::*;
pub use types::*;

/// Current API version
pub const API_VERSION: u32 = 1;
