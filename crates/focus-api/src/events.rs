//! Event types for focusd -> client streaming

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

use crate::{BlockScreen, ServiceStateSnapshot, SessionEndReason, ShieldPolicy, API_VERSION};

/// Event envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub api_version: u32,
    pub timestamp: DateTime<Local>,
    pub payload: EventPayload,
}

impl Event {
    pub fn new(payload: EventPayload) -> Self {
        Self {
            api_version: API_VERSION,
            timestamp: focus_util::now(),
            payload,
        }
    }
}

/// All possible events from the service to clients
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventPayload {
    /// Full state snapshot (sent on subscribe and after every write)
    StateChanged(ServiceStateSnapshot),

    SessionStarted {
        /// None means no scheduled end
        ends_at: Option<DateTime<Local>>,
        allowed_count: usize,
    },

    SessionEnded {
        reason: SessionEndReason,
    },

    /// Event-driven hosts: cover the foreground app with a block screen
    BlockRequested(BlockScreen),

    /// Declarative hosts: replace the OS block-set
    ShieldUpdated(ShieldPolicy),

    EmergencyStarted {
        until: DateTime<Local>,
    },

    CardRequiredChanged {
        required: bool,
    },

    RemoteCommandApplied {
        command_id: String,
        kind: String,
        /// False when the command was rejected and consumed
        applied: bool,
    },

    /// The platform shim should show the OS authorization prompt and report
    /// the outcome with `report_authorization`
    PermissionsRequested,

    /// Service is shutting down
    Shutdown,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{AppIdentifier, FrictionConfig};

    #[test]
    fn event_serialization() {
        let event = Event::new(EventPayload::SessionStarted {
            ends_at: Some(focus_util::now()),
            allowed_count: 2,
        });

        let json = serde_json::to_string(&event).unwrap();
        let parsed: Event = serde_json::from_str(&json).unwrap();

        assert_eq!(parsed.api_version, API_VERSION);
        assert!(matches!(
            parsed.payload,
            EventPayload::SessionStarted { allowed_count: 2, .. }
        ));
    }

    #[test]
    fn block_requested_carries_screen() {
        let event = Event::new(EventPayload::BlockRequested(BlockScreen {
            app: AppIdentifier::android("com.social.app"),
            friction: FrictionConfig::default(),
            ends_at: None,
            headline: "Stay with it".into(),
            featured_task: None,
            emergency_available: true,
        }));

        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("block_requested"));
        assert!(json.contains("com.social.app"));

        let parsed: Event = serde_json::from_str(&json).unwrap();
        match parsed.payload {
            EventPayload::BlockRequested(screen) => {
                assert_eq!(screen.app.id, "com.social.app");
                assert!(screen.ends_at.is_none());
            }
            other => panic!("unexpected payload {other:?}"),
        }
    }
}
