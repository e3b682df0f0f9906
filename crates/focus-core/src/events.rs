//! Core events emitted by the engine

use chrono::{DateTime, Local};
use focus_api::{BlockScreen, SessionEndReason, ShieldPolicy};
use focus_util::CommandId;

/// Events emitted by the core engine.
///
/// The engine never calls the host itself; the daemon turns these into host
/// calls and IPC broadcasts.
#[derive(Debug, Clone, PartialEq)]
pub enum CoreEvent {
    SessionStarted {
        ends_at: Option<DateTime<Local>>,
        allowed_count: usize,
    },

    SessionEnded {
        reason: SessionEndReason,
    },

    /// Allowlist replaced on a running session
    AppsConfigured {
        allowed_count: usize,
    },

    EmergencyStarted {
        until: DateTime<Local>,
    },

    CardRequiredChanged {
        required: bool,
    },

    /// Event-driven hosts: cover the foreground app
    BlockRequested(BlockScreen),

    /// Declarative hosts: replace the OS block-set
    ShieldChanged(ShieldPolicy),

    /// The nearest self-changing instant moved; rearm the timer
    DeadlineChanged {
        deadline: Option<DateTime<Local>>,
    },

    RemoteCommandApplied {
        command_id: CommandId,
        kind: String,
        /// False when the command was rejected and consumed without effect
        applied: bool,
    },
}
