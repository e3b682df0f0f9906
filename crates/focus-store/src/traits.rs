//! Store trait definitions

use chrono::{DateTime, Local};
use focus_api::Session;
use focus_util::CommandId;

use crate::{AuditEvent, StoreResult};

/// Scalar bookkeeping keys kept next to the session record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceKey {
    /// Push transport token, registered by the shim
    PushToken,
    LastAppliedCommandId,
    /// Command id carried by a push that arrived before its payload
    PendingCommandHint,
    /// Route recorded by the last deep link, consumed once by the UI
    PendingRoute,
    /// Epoch millis when the shield's primary button was pressed
    ShieldOpenAppRequestedAt,
    /// Task title shown on the block screen
    FeaturedTask,
}

impl DeviceKey {
    pub fn as_key(&self) -> &'static str {
        match self {
            DeviceKey::PushToken => "device.push_token",
            DeviceKey::LastAppliedCommandId => "device.last_applied_command_id",
            DeviceKey::PendingCommandHint => "device.pending_command_hint",
            DeviceKey::PendingRoute => "device.pending_route",
            DeviceKey::ShieldOpenAppRequestedAt => "device.shield_open_app_requested_at",
            DeviceKey::FeaturedTask => "device.featured_task",
        }
    }
}

/// A remote command waiting to be applied
#[derive(Debug, Clone, PartialEq)]
pub struct StoredCommand {
    pub id: CommandId,
    pub received_at: DateTime<Local>,
    pub payload_json: String,
}

/// Main store trait
pub trait Store: Send + Sync {
    // Session record

    /// Current session. Never fails: a missing or corrupt record reads as the
    /// default inactive session.
    fn read_session(&self) -> Session;

    /// Atomic read-modify-write of the session record.
    ///
    /// The mutator runs exactly once, inside a write transaction that excludes
    /// other writers (including other processes), and its result is normalized
    /// before it is persisted. Returns the committed session.
    fn write_session(&self, mutator: &mut dyn FnMut(Session) -> Session) -> StoreResult<Session>;

    /// Reset to the default inactive session
    fn clear_session(&self) -> StoreResult<()>;

    // Remote commands

    /// Insert a command unless its id is already known, pending or consumed.
    /// Returns whether it was inserted.
    fn insert_remote_command(
        &self,
        id: &CommandId,
        received_at: DateTime<Local>,
        payload_json: &str,
    ) -> StoreResult<bool>;

    /// Unconsumed commands in arrival order
    fn pending_remote_commands(&self) -> StoreResult<Vec<StoredCommand>>;

    /// Drop the payload and keep the id as a tombstone
    fn mark_command_consumed(&self, id: &CommandId, at: DateTime<Local>) -> StoreResult<()>;

    fn is_command_consumed(&self, id: &CommandId) -> StoreResult<bool>;

    /// Forget tombstones consumed before `cutoff`. Returns how many were removed.
    fn prune_tombstones(&self, cutoff: DateTime<Local>) -> StoreResult<usize>;

    // Device bookkeeping

    fn get_device_value(&self, key: DeviceKey) -> StoreResult<Option<String>>;

    /// `None` removes the key
    fn set_device_value(&self, key: DeviceKey, value: Option<&str>) -> StoreResult<()>;

    /// Read and remove in one transaction
    fn take_device_value(&self, key: DeviceKey) -> StoreResult<Option<String>>;

    // Audit log

    fn append_audit(&self, event: AuditEvent) -> StoreResult<()>;

    /// Most recent first
    fn get_recent_audits(&self, limit: usize) -> StoreResult<Vec<AuditEvent>>;

    // Health

    fn is_healthy(&self) -> bool;
}

/// Convenience wrapper so callers can pass closures by value
pub fn write_session_with<S, F>(store: &S, mutator: F) -> StoreResult<Session>
where
    S: Store + ?Sized,
    F: FnOnce(Session) -> Session,
{
    let mut mutator = Some(mutator);
    store.write_session(&mut |session| match mutator.take() {
        Some(f) => f(session),
        // Stores call the mutator once; a repeat call leaves the record as is.
        None => session,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn device_keys_are_namespaced() {
        assert!(DeviceKey::PushToken.as_key().starts_with("device."));
        assert_ne!(
            DeviceKey::PendingRoute.as_key(),
            DeviceKey::PendingCommandHint.as_key()
        );
    }
}
