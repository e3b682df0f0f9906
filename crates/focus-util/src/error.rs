//! Error types for focusd

use thiserror::Error;

/// Engine-level error type shared by the core, the daemon, and the IPC layer
#[derive(Debug, Error)]
pub enum FocusError {
    #[error("Emergency unlock is unavailable while card-required mode is on")]
    CardRequiredBlocksEmergency,

    #[error("Keep holding: {remaining_secs}s remaining")]
    StillHolding { remaining_secs: u64 },

    #[error("Unlock delay still running: {remaining_secs}s remaining")]
    TooEarly { remaining_secs: u64 },

    #[error("No active focus session")]
    NoActiveSession,

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Store error: {0}")]
    StoreError(String),

    #[error("Host error: {0}")]
    HostError(String),

    #[error("IPC error: {0}")]
    IpcError(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Rate limited")]
    RateLimited,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl FocusError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    pub fn store(msg: impl Into<String>) -> Self {
        Self::StoreError(msg.into())
    }

    pub fn host(msg: impl Into<String>) -> Self {
        Self::HostError(msg.into())
    }

    pub fn ipc(msg: impl Into<String>) -> Self {
        Self::IpcError(msg.into())
    }

    pub fn permission(msg: impl Into<String>) -> Self {
        Self::PermissionDenied(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Policy violations are expected outcomes the UI explains to the user,
    /// as opposed to faults in the storage or host layers.
    pub fn is_policy_violation(&self) -> bool {
        matches!(
            self,
            Self::CardRequiredBlocksEmergency
                | Self::StillHolding { .. }
                | Self::TooEarly { .. }
                | Self::NoActiveSession
        )
    }
}

pub type Result<T> = std::result::Result<T, FocusError>;
