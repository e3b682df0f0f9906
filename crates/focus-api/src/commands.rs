//! Command types for the focusd protocol

use chrono::{DateTime, Local};
use focus_util::ClientId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::{
    AppIdentifier, BlockScreen, ClientRole, DeepLinkRoute, Decision, FrictionChallenge,
    FrictionConfig, PermissionStatus, RemoteCommandEnvelope, Session, UnlockProgress,
    API_VERSION,
};

/// Request wrapper with metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    /// Request ID for correlation
    pub request_id: u64,
    pub api_version: u32,
    pub command: Command,
}

impl Request {
    pub fn new(request_id: u64, command: Command) -> Self {
        Self {
            request_id,
            api_version: API_VERSION,
            command,
        }
    }
}

/// Response wrapper
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    /// Corresponding request ID
    pub request_id: u64,
    pub api_version: u32,
    pub result: ResponseResult,
}

impl Response {
    pub fn success(request_id: u64, payload: ResponsePayload) -> Self {
        Self {
            request_id,
            api_version: API_VERSION,
            result: ResponseResult::Ok(payload),
        }
    }

    pub fn error(request_id: u64, error: ErrorInfo) -> Self {
        Self {
            request_id,
            api_version: API_VERSION,
            result: ResponseResult::Err(error),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseResult {
    Ok(ResponsePayload),
    Err(ErrorInfo),
}

/// Error information
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorInfo {
    pub code: ErrorCode,
    pub message: String,
}

impl ErrorInfo {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

/// Error codes for the protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    InvalidRequest,
    NoActiveSession,
    /// Emergency exception refused: card-required mode is on
    CardRequired,
    /// Hold released before the required duration
    StillHolding,
    /// Unlock delay countdown still running
    TooEarly,
    PermissionDenied,
    RateLimited,
    ConfigError,
    StoreError,
    HostError,
    InternalError,
}

/// All possible commands from clients
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Command {
    /// Get current service state
    GetState,

    /// Start a focus session. Missing friction falls back to configured defaults.
    StartSession {
        ends_at: Option<DateTime<Local>>,
        allowed_apps: BTreeSet<AppIdentifier>,
        #[serde(default)]
        friction: Option<FrictionConfig>,
    },

    EndSession,

    /// Replace the allowlist of the running session
    ConfigureApps {
        allowed_apps: BTreeSet<AppIdentifier>,
    },

    SetCardRequired { required: bool },

    /// Open an exception window; `None` uses the session's configured length
    StartEmergencyException {
        #[serde(default)]
        duration_minutes: Option<u32>,
    },

    BeginHoldToUnlock,

    CompleteHoldToUnlock { challenge: FrictionChallenge },

    BeginEmergencyUnlock,

    CompleteEmergencyUnlock { challenge: FrictionChallenge },

    GetPermissions,

    RequestPermissions,

    // Platform shim reports

    /// The OS moved an app to the foreground
    ReportForeground {
        app_id: String,
        #[serde(default)]
        display_name: Option<String>,
    },

    /// The OS authorization state changed
    ReportAuthorization { status: PermissionStatus },

    // Remote channel

    /// Hand over a command received by push or polling
    IngestRemoteCommand { command: RemoteCommandEnvelope },

    /// A push carried only a command id; remember it as a wake-up hint
    NotePendingCommand { command_id: String },

    /// Apply every unconsumed remote command
    DrainRemoteCommands,

    RegisterPushToken { token: String },

    // UI bookkeeping

    OpenDeepLink { url: String },

    /// Consume the route recorded by the last deep link
    TakePendingRoute,

    /// Title shown on the block screen; `None` clears it
    SetFeaturedTask { title: Option<String> },

    /// The shield's primary button was pressed
    ShieldOpenAppRequested,

    /// Subscribe to events (returns immediately, events stream separately)
    SubscribeEvents,

    UnsubscribeEvents,

    GetHealth,

    /// Ping for keepalive
    Ping,
}

impl Command {
    /// Commands that change the session record
    pub fn mutates_session(&self) -> bool {
        matches!(
            self,
            Command::StartSession { .. }
                | Command::EndSession
                | Command::ConfigureApps { .. }
                | Command::SetCardRequired { .. }
                | Command::StartEmergencyException { .. }
                | Command::CompleteHoldToUnlock { .. }
                | Command::CompleteEmergencyUnlock { .. }
        )
    }
}

/// Response payloads
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResponsePayload {
    State(crate::ServiceStateSnapshot),
    /// Session record after a write
    Session(Session),
    Challenge(FrictionChallenge),
    Unlock(UnlockProgress),
    EmergencyStarted {
        until: DateTime<Local>,
    },
    Permissions(PermissionStatus),
    /// Result of a foreground report
    ForegroundDecision {
        decision: Decision,
        block_screen: Option<BlockScreen>,
    },
    RemoteIngested {
        /// False when the id was already known
        accepted: bool,
    },
    RemoteDrained {
        applied: usize,
        rejected: usize,
    },
    Route {
        route: Option<DeepLinkRoute>,
    },
    Ack,
    Subscribed {
        client_id: ClientId,
    },
    Unsubscribed,
    Health(crate::HealthStatus),
    Pong,
}

/// Client connection info (set by IPC layer)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientInfo {
    pub client_id: ClientId,
    pub role: ClientRole,
    /// Unix UID if available
    pub uid: Option<u32>,
    pub process_name: Option<String>,
}

impl ClientInfo {
    pub fn new(role: ClientRole) -> Self {
        Self {
            client_id: ClientId::new(),
            role,
            uid: None,
            process_name: None,
        }
    }

    pub fn with_uid(mut self, uid: u32) -> Self {
        self.uid = Some(uid);
        self
    }
}
