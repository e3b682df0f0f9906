//! Host adapter traits

use async_trait::async_trait;
use focus_api::{BlockScreen, PermissionStatus, ShieldPolicy};
use thiserror::Error;

use crate::HostCapabilities;

/// Errors from host adapter operations
#[derive(Debug, Error)]
pub enum HostError {
    #[error("Not supported by this host: {0}")]
    Unsupported(String),

    #[error("Not authorized: {0}")]
    NotAuthorized(String),

    /// The platform shim is not connected
    #[error("Host disconnected")]
    Disconnected,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type HostResult<T> = Result<T, HostError>;

/// Draws the blocking screen over a blocked foreground app
pub trait BlockSurface: Send + Sync {
    fn present_block(&self, screen: &BlockScreen) -> HostResult<()>;
}

/// Hands a block-set to the OS restriction subsystem
pub trait ShieldController: Send + Sync {
    /// Replace the current block-set. Idempotent from the OS point of view.
    fn apply_shield(&self, policy: &ShieldPolicy) -> HostResult<()>;
}

/// Host adapter trait - implemented by platform bridges
#[async_trait]
pub trait HostAdapter: BlockSurface + ShieldController {
    fn capabilities(&self) -> &HostCapabilities;

    /// Current authorization state; never fails, unsupported is a flag
    async fn permission_status(&self) -> PermissionStatus;

    /// Ask the OS for authorization.
    ///
    /// This is the one suspend point of the permission flow; the returned
    /// snapshot is final and there are no internal retries.
    async fn request_authorization(&self) -> HostResult<PermissionStatus>;

    /// Optional: check if the host adapter is healthy
    fn is_healthy(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_error_messages() {
        let err = HostError::Unsupported("shield".into());
        assert_eq!(err.to_string(), "Not supported by this host: shield");
        assert_eq!(HostError::Disconnected.to_string(), "Host disconnected");
    }
}
