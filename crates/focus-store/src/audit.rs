//! Audit event types

use chrono::{DateTime, Local};
use focus_api::SessionEndReason;
use serde::{Deserialize, Serialize};

/// Types of audit events
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuditEventType {
    ServiceStarted,

    ServiceStopped,

    SessionStarted {
        ends_at: Option<DateTime<Local>>,
        allowed_count: usize,
    },

    SessionEnded {
        reason: SessionEndReason,
    },

    /// Allowlist replaced mid-session
    AppsConfigured { allowed_count: usize },

    EmergencyStarted {
        until: DateTime<Local>,
        duration_minutes: u32,
    },

    /// Emergency exception refused because card-required is on
    EmergencyRefused,

    CardRequiredChanged { required: bool },

    RemoteCommandApplied { command_id: String, kind: String },

    /// Malformed or unknown command, consumed without effect
    RemoteCommandRejected { command_id: String, reason: String },

    /// Declarative block-set pushed to the OS
    ShieldPushed {
        /// None when the shield was cleared
        allowed_count: Option<usize>,
    },

    BlockPresented { app_id: String },

    ClientConnected {
        client_id: String,
        role: String,
        uid: Option<u32>,
    },

    ClientDisconnected { client_id: String },
}

/// Full audit event with metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    /// Set by the store on append
    pub id: i64,
    pub timestamp: DateTime<Local>,
    pub event: AuditEventType,
}

impl AuditEvent {
    pub fn new(event: AuditEventType) -> Self {
        Self {
            id: 0,
            timestamp: focus_util::now(),
            event,
        }
    }
}
