//! Remote command channel
//!
//! Commands arrive by push or by polling, are queued in the store keyed by
//! their id, and are applied later through the same write paths the local UI
//! uses. An id is remembered after it has been applied, so redelivery is a
//! no-op.

use chrono::{DateTime, Local};
use focus_api::{AppIdentifier, FrictionConfig, RemoteCommandEnvelope};
use focus_store::{decode_app_list, DeviceKey, Store, StoreError};
use focus_util::{from_epoch_millis, CommandId, FocusError};
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("Remote command has a blank id")]
    BlankId,

    #[error("Unknown remote command kind: {0}")]
    UnknownKind(String),

    #[error("Invalid or missing parameter: {0}")]
    InvalidParam(&'static str),

    #[error("Unreadable command payload: {0}")]
    Malformed(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<RemoteError> for FocusError {
    fn from(e: RemoteError) -> Self {
        match e {
            RemoteError::Store(e) => FocusError::store(e.to_string()),
            other => FocusError::invalid(other.to_string()),
        }
    }
}

/// A parsed remote payload, ready to be routed to a local write path
#[derive(Debug, Clone, PartialEq)]
pub enum RemoteAction {
    StartSession {
        ends_at: Option<DateTime<Local>>,
        allowed_apps: BTreeSet<AppIdentifier>,
        /// `None` when absent or malformed; the configured default applies
        friction: Option<FrictionConfig>,
    },
    EndSession,
    SetCardRequired {
        required: bool,
    },
    StartEmergencyException {
        duration_minutes: Option<u32>,
    },
    ConfigureApps {
        allowed_apps: BTreeSet<AppIdentifier>,
    },
}

impl RemoteAction {
    pub fn kind(&self) -> &'static str {
        match self {
            RemoteAction::StartSession { .. } => "start_session",
            RemoteAction::EndSession => "end_session",
            RemoteAction::SetCardRequired { .. } => "set_card_required",
            RemoteAction::StartEmergencyException { .. } => "start_emergency_exception",
            RemoteAction::ConfigureApps { .. } => "configure_apps",
        }
    }
}

/// Parse the `kind`/`params` pair of an envelope
pub fn parse_remote_action(envelope: &RemoteCommandEnvelope) -> Result<RemoteAction, RemoteError> {
    let params = &envelope.params;
    match envelope.kind.trim() {
        "start_session" => Ok(RemoteAction::StartSession {
            ends_at: ends_at_param(params)?,
            allowed_apps: match params.get("allowed_apps") {
                None | Some(Value::Null) => BTreeSet::new(),
                Some(value) => {
                    decode_app_list(value).ok_or(RemoteError::InvalidParam("allowed_apps"))?
                }
            },
            friction: params
                .get("friction")
                .and_then(|value| serde_json::from_value(value.clone()).ok()),
        }),
        "end_session" => Ok(RemoteAction::EndSession),
        "set_card_required" => {
            let required = params
                .get("required")
                .and_then(Value::as_bool)
                .ok_or(RemoteError::InvalidParam("required"))?;
            Ok(RemoteAction::SetCardRequired { required })
        }
        "start_emergency_exception" => {
            let duration_minutes = match params.get("duration_minutes") {
                None | Some(Value::Null) => None,
                Some(value) => Some(
                    value
                        .as_u64()
                        .and_then(|m| u32::try_from(m).ok())
                        .ok_or(RemoteError::InvalidParam("duration_minutes"))?,
                ),
            };
            Ok(RemoteAction::StartEmergencyException { duration_minutes })
        }
        "configure_apps" => {
            let allowed_apps = params
                .get("allowed_apps")
                .and_then(decode_app_list)
                .ok_or(RemoteError::InvalidParam("allowed_apps"))?;
            Ok(RemoteAction::ConfigureApps { allowed_apps })
        }
        other => Err(RemoteError::UnknownKind(other.to_string())),
    }
}

fn ends_at_param(params: &Map<String, Value>) -> Result<Option<DateTime<Local>>, RemoteError> {
    match params.get("ends_at_millis") {
        None | Some(Value::Null) => Ok(None),
        Some(value) => {
            let millis = value
                .as_i64()
                .ok_or(RemoteError::InvalidParam("ends_at_millis"))?;
            Ok(from_epoch_millis(millis))
        }
    }
}

/// A queued command with its payload parsed
#[derive(Debug)]
pub struct RemoteCommand {
    pub id: CommandId,
    pub received_at: DateTime<Local>,
    /// Raw kind as delivered, for logs and audit
    pub kind: String,
    pub action: Result<RemoteAction, RemoteError>,
}

pub struct RemoteCommandChannel {
    store: Arc<dyn Store>,
}

impl RemoteCommandChannel {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Queue a command. Returns false when the id is already pending or was
    /// applied before.
    pub fn ingest(
        &self,
        envelope: &RemoteCommandEnvelope,
        now: DateTime<Local>,
    ) -> Result<bool, RemoteError> {
        let id = CommandId::new(envelope.command_id.trim());
        if id.is_blank() {
            warn!(kind = %envelope.kind, "Dropping remote command without id");
            return Err(RemoteError::BlankId);
        }

        let payload = serde_json::to_string(envelope)
            .map_err(|e| RemoteError::Malformed(e.to_string()))?;
        let inserted = self.store.insert_remote_command(&id, now, &payload)?;

        if inserted {
            info!(command_id = %id, kind = %envelope.kind, "Remote command queued");
        } else {
            debug!(command_id = %id, "Duplicate remote command ignored");
        }
        Ok(inserted)
    }

    /// Unconsumed commands in arrival order. Draining again before they are
    /// marked consumed yields the same commands.
    pub fn drain_pending(&self) -> Result<Vec<RemoteCommand>, RemoteError> {
        let stored = self.store.pending_remote_commands()?;

        Ok(stored
            .into_iter()
            .map(|cmd| {
                match serde_json::from_str::<RemoteCommandEnvelope>(&cmd.payload_json) {
                    Ok(envelope) => RemoteCommand {
                        id: cmd.id,
                        received_at: cmd.received_at,
                        action: parse_remote_action(&envelope),
                        kind: envelope.kind,
                    },
                    Err(e) => RemoteCommand {
                        id: cmd.id,
                        received_at: cmd.received_at,
                        kind: String::from("unknown"),
                        action: Err(RemoteError::Malformed(e.to_string())),
                    },
                }
            })
            .collect())
    }

    pub fn mark_consumed(&self, id: &CommandId, now: DateTime<Local>) -> Result<(), RemoteError> {
        self.store.mark_command_consumed(id, now)?;
        Ok(())
    }

    pub fn pending_count(&self) -> Result<usize, RemoteError> {
        Ok(self.store.pending_remote_commands()?.len())
    }

    /// A push that carried only an id: remember it until that command is
    /// consumed
    pub fn note_pending_command(&self, id: &CommandId) -> Result<(), RemoteError> {
        if id.is_blank() {
            return Err(RemoteError::BlankId);
        }
        self.store
            .set_device_value(DeviceKey::PendingCommandHint, Some(id.as_str()))?;
        debug!(command_id = %id, "Pending command hint recorded");
        Ok(())
    }

    pub fn pending_hint(&self) -> Result<Option<CommandId>, RemoteError> {
        Ok(self
            .store
            .get_device_value(DeviceKey::PendingCommandHint)?
            .map(CommandId::new))
    }

    pub fn clear_hint(&self) -> Result<(), RemoteError> {
        self.store
            .set_device_value(DeviceKey::PendingCommandHint, None)?;
        Ok(())
    }

    /// Drop the hint once the command it names has been consumed. Returns
    /// whether a hint is still outstanding.
    pub fn settle_hint(&self) -> Result<bool, RemoteError> {
        let Some(id) = self.pending_hint()? else {
            return Ok(false);
        };
        if self.store.is_command_consumed(&id)? {
            debug!(command_id = %id, "Hinted command consumed");
            self.clear_hint()?;
            return Ok(false);
        }
        Ok(true)
    }

    /// Forget consumed ids older than `retention`
    pub fn prune_tombstones(
        &self,
        retention: Duration,
        now: DateTime<Local>,
    ) -> Result<usize, RemoteError> {
        let retention = chrono::Duration::from_std(retention)
            .unwrap_or_else(|_| chrono::Duration::days(36_500));
        let cutoff = now
            .checked_sub_signed(retention)
            .unwrap_or(now);
        let pruned = self.store.prune_tombstones(cutoff)?;
        if pruned > 0 {
            info!(pruned, cutoff = %cutoff, "Pruned remote command tombstones");
        }
        Ok(pruned)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use focus_api::Platform;
    use focus_store::SqliteStore;
    use serde_json::json;

    fn envelope(id: &str, kind: &str, params: Value) -> RemoteCommandEnvelope {
        RemoteCommandEnvelope {
            command_id: id.to_string(),
            kind: kind.to_string(),
            params: params.as_object().cloned().unwrap_or_default(),
        }
    }

    fn channel() -> RemoteCommandChannel {
        RemoteCommandChannel::new(Arc::new(SqliteStore::in_memory().unwrap()))
    }

    #[test]
    fn parses_start_session() {
        let action = parse_remote_action(&envelope(
            "c1",
            "start_session",
            json!({
                "ends_at_millis": 1_750_000_000_000i64,
                "allowed_apps": [{"platform": "android", "id": "com.phone.dialer"}],
                "friction": {"holdToUnlockSeconds": 5, "unlockDelaySeconds": 0, "emergencyUnlockMinutes": 2}
            }),
        ))
        .unwrap();

        match action {
            RemoteAction::StartSession {
                ends_at,
                allowed_apps,
                friction,
            } => {
                assert_eq!(ends_at, from_epoch_millis(1_750_000_000_000));
                assert_eq!(allowed_apps.len(), 1);
                assert_eq!(
                    allowed_apps.iter().next().map(|a| a.platform),
                    Some(Platform::Android)
                );
                assert_eq!(friction.map(|f| f.hold_to_unlock_seconds), Some(5));
            }
            other => panic!("unexpected action {other:?}"),
        }
    }

    #[test]
    fn start_session_tolerates_bad_friction_and_zero_deadline() {
        let action = parse_remote_action(&envelope(
            "c1",
            "start_session",
            json!({"ends_at_millis": 0, "friction": "lots"}),
        ))
        .unwrap();

        assert_eq!(
            action,
            RemoteAction::StartSession {
                ends_at: None,
                allowed_apps: BTreeSet::new(),
                friction: None,
            }
        );
    }

    #[test]
    fn rejects_unknown_kind_and_bad_params() {
        assert!(matches!(
            parse_remote_action(&envelope("c1", "format_disk", json!({}))),
            Err(RemoteError::UnknownKind(_))
        ));
        assert!(matches!(
            parse_remote_action(&envelope("c1", "set_card_required", json!({"required": "yes"}))),
            Err(RemoteError::InvalidParam("required"))
        ));
        assert!(matches!(
            parse_remote_action(&envelope("c1", "configure_apps", json!({}))),
            Err(RemoteError::InvalidParam("allowed_apps"))
        ));
        assert!(matches!(
            parse_remote_action(&envelope(
                "c1",
                "start_emergency_exception",
                json!({"duration_minutes": -3})
            )),
            Err(RemoteError::InvalidParam("duration_minutes"))
        ));
    }

    #[test]
    fn emergency_duration_is_optional() {
        assert_eq!(
            parse_remote_action(&envelope("c1", "start_emergency_exception", json!({}))).unwrap(),
            RemoteAction::StartEmergencyException {
                duration_minutes: None
            }
        );
    }

    #[test]
    fn ingest_is_idempotent() {
        let channel = channel();
        let now = focus_util::now();
        let cmd = envelope("c1", "end_session", json!({}));

        assert!(channel.ingest(&cmd, now).unwrap());
        assert!(!channel.ingest(&cmd, now).unwrap());
        assert_eq!(channel.drain_pending().unwrap().len(), 1);

        channel.mark_consumed(&CommandId::new("c1"), now).unwrap();
        assert!(!channel.ingest(&cmd, now).unwrap());
        assert!(channel.drain_pending().unwrap().is_empty());
    }

    #[test]
    fn drain_is_restartable() {
        let channel = channel();
        let now = focus_util::now();
        channel
            .ingest(&envelope("c1", "end_session", json!({})), now)
            .unwrap();
        channel
            .ingest(&envelope("c2", "bogus", json!({})), now)
            .unwrap();

        let first = channel.drain_pending().unwrap();
        let second = channel.drain_pending().unwrap();
        assert_eq!(first.len(), 2);
        assert_eq!(
            first.iter().map(|c| c.id.clone()).collect::<Vec<_>>(),
            second.iter().map(|c| c.id.clone()).collect::<Vec<_>>()
        );
        assert!(first[1].action.is_err());
    }

    #[test]
    fn blank_ids_are_refused() {
        let channel = channel();
        let now = focus_util::now();
        assert!(matches!(
            channel.ingest(&envelope("  ", "end_session", json!({})), now),
            Err(RemoteError::BlankId)
        ));
        assert!(channel.note_pending_command(&CommandId::new("")).is_err());
    }

    #[test]
    fn pending_hint_roundtrip() {
        let channel = channel();
        channel.note_pending_command(&CommandId::new("c9")).unwrap();
        assert_eq!(channel.pending_hint().unwrap(), Some(CommandId::new("c9")));
        channel.clear_hint().unwrap();
        assert_eq!(channel.pending_hint().unwrap(), None);
    }

    #[test]
    fn hint_outlives_unrelated_consumption() {
        let channel = channel();
        let now = focus_util::now();
        channel.note_pending_command(&CommandId::new("cmd-42")).unwrap();

        channel.mark_consumed(&CommandId::new("other"), now).unwrap();
        assert!(channel.settle_hint().unwrap());
        assert_eq!(channel.pending_hint().unwrap(), Some(CommandId::new("cmd-42")));

        channel.mark_consumed(&CommandId::new("cmd-42"), now).unwrap();
        assert!(!channel.settle_hint().unwrap());
        assert_eq!(channel.pending_hint().unwrap(), None);
    }
}
