//! Focus restriction engine for focusd
//!
//! This crate decides, at any instant, whether a restriction is active and
//! whether a given app is blocked, and owns the legitimate ways out:
//! - Policy evaluation (pure decision over a session snapshot)
//! - Friction controller (hold-to-unlock, emergency exceptions, card-required)
//! - Enforcement monitor (event-driven block screens or declarative shields)
//! - Remote command channel (idempotent queue applied through local write paths)
//! - Deadline tracking for the in-process timer

mod block_screen;
mod engine;
mod evaluator;
mod events;
mod friction;
mod monitor;
mod remote;
mod timer;

pub use block_screen::*;
pub use engine::*;
pub use evaluator::*;
pub use events::*;
pub use friction::*;
pub use monitor::*;
pub use remote::*;
pub use timer::*;
