//! Shared types for the focusd API

use chrono::{DateTime, Local, SubsecRound};
use serde::{Deserialize, Deserializer, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::time::Duration;

/// Host platform an app identifier belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Platform {
    Android,
    Ios,
}

impl Platform {
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Android => "android",
            Platform::Ios => "ios",
        }
    }

    /// The enforcement style each platform's OS supports natively
    pub fn native_enforcement(&self) -> EnforcementMode {
        match self {
            Platform::Android => EnforcementMode::EventDriven,
            Platform::Ios => EnforcementMode::Declarative,
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An app on a specific platform.
///
/// Identity is `(platform, id)`; `display_name` is presentation only and does
/// not take part in equality, hashing, or ordering.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppIdentifier {
    pub platform: Platform,
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
}

impl AppIdentifier {
    pub fn new(platform: Platform, id: impl Into<String>) -> Self {
        Self {
            platform,
            id: id.into(),
            display_name: None,
        }
    }

    pub fn android(id: impl Into<String>) -> Self {
        Self::new(Platform::Android, id)
    }

    pub fn ios(id: impl Into<String>) -> Self {
        Self::new(Platform::Ios, id)
    }

    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }

    /// Name to show on a block screen
    pub fn label(&self) -> &str {
        self.display_name.as_deref().unwrap_or(&self.id)
    }
}

impl PartialEq for AppIdentifier {
    fn eq(&self, other: &Self) -> bool {
        self.platform == other.platform && self.id == other.id
    }
}

impl Eq for AppIdentifier {}

impl Hash for AppIdentifier {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.platform.hash(state);
        self.id.hash(state);
    }
}

impl PartialOrd for AppIdentifier {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for AppIdentifier {
    fn cmp(&self, other: &Self) -> Ordering {
        self.platform
            .cmp(&other.platform)
            .then_with(|| self.id.cmp(&other.id))
    }
}

impl fmt::Display for AppIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.platform, self.id)
    }
}

/// Friction imposed before an early exit is honored.
///
/// Missing fields take their documented default individually, so a partially
/// written config still yields sane values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FrictionConfig {
    /// How long the unlock button must be held continuously
    pub hold_to_unlock_seconds: u32,
    /// Cooling-off countdown after a successful hold
    pub unlock_delay_seconds: u32,
    /// Length of an emergency exception window
    pub emergency_unlock_minutes: u32,
}

impl FrictionConfig {
    pub const DEFAULT_HOLD_TO_UNLOCK_SECONDS: u32 = 3;
    pub const DEFAULT_UNLOCK_DELAY_SECONDS: u32 = 10;
    pub const DEFAULT_EMERGENCY_UNLOCK_MINUTES: u32 = 3;
}

impl Default for FrictionConfig {
    fn default() -> Self {
        Self {
            hold_to_unlock_seconds: Self::DEFAULT_HOLD_TO_UNLOCK_SECONDS,
            unlock_delay_seconds: Self::DEFAULT_UNLOCK_DELAY_SECONDS,
            emergency_unlock_minutes: Self::DEFAULT_EMERGENCY_UNLOCK_MINUTES,
        }
    }
}

/// The restriction record shared by every process on the device
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Session {
    pub active: bool,
    /// Absolute deadline; `None` means the session has no scheduled end
    pub ends_at: Option<DateTime<Local>>,
    pub allowed_apps: BTreeSet<AppIdentifier>,
    pub friction: FrictionConfig,
    /// While in the future, nothing is blocked
    pub emergency_until: Option<DateTime<Local>>,
    /// Hardened mode: no emergency exceptions
    pub card_required: bool,
}

impl Session {
    /// Re-establish the record's invariants after a mutation:
    /// - an inactive session carries no session-scoped state
    /// - card-required mode never coexists with an exception window
    ///
    /// `card_required` is a user setting and survives session boundaries.
    /// Instants are truncated to the millisecond precision they persist at.
    pub fn normalized(mut self) -> Self {
        self.ends_at = self.ends_at.map(|t| t.trunc_subsecs(3));
        self.emergency_until = self.emergency_until.map(|t| t.trunc_subsecs(3));
        if !self.active {
            self.ends_at = None;
            self.allowed_apps.clear();
            self.friction = FrictionConfig::default();
            self.emergency_until = None;
        }
        if self.card_required {
            self.emergency_until = None;
        }
        self
    }

    /// Session ended, keeping only the user's card-required preference
    pub fn ended(self) -> Self {
        Session {
            active: false,
            card_required: self.card_required,
            ..Session::default()
        }
    }

    pub fn is_expired_at(&self, now: &DateTime<Local>) -> bool {
        self.active && self.ends_at.is_some_and(|ends_at| *now >= ends_at)
    }

    pub fn emergency_open_at(&self, now: &DateTime<Local>) -> bool {
        self.emergency_until.is_some_and(|until| *now < until)
    }

    /// Allowed app ids on one platform; foreign-platform entries are ignored
    pub fn allowed_ids(&self, platform: Platform) -> BTreeSet<String> {
        self.allowed_apps
            .iter()
            .filter(|app| app.platform == platform)
            .map(|app| app.id.clone())
            .collect()
    }

    /// Whether two snapshots differ in a field that changes what gets blocked
    pub fn enforcement_differs(&self, other: &Session) -> bool {
        self.active != other.active
            || self.allowed_apps != other.allowed_apps
            || self.emergency_until != other.emergency_until
            || self.card_required != other.card_required
    }
}

/// Why an app was allowed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AllowReason {
    /// The engine's own host application
    HostApp,
    /// Identifier from another platform; ignored rather than blocked
    ForeignPlatform,
    /// Missing or garbled foreground report
    UnidentifiedApp,
    NoActiveSession,
    /// The session's end time passed; the caller must persist the end
    SessionExpired,
    EmergencyException,
    Allowlisted,
}

/// Policy decision for one candidate app
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "verdict", content = "reason", rename_all = "snake_case")]
pub enum Decision {
    Allow(AllowReason),
    Block,
}

impl Decision {
    pub fn is_block(&self) -> bool {
        matches!(self, Decision::Block)
    }

    /// Lazy expiry: the caller should end the session in the store
    pub fn requires_expiry(&self) -> bool {
        matches!(self, Decision::Allow(AllowReason::SessionExpired))
    }
}

/// Which escape hatch a challenge guards
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChallengeKind {
    HoldToUnlock,
    EmergencyUnlock,
}

/// Ephemeral unlock challenge held by the block surface.
///
/// Never persisted: cancelling is simply dropping it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrictionChallenge {
    pub kind: ChallengeKind,
    pub started_at: DateTime<Local>,
    pub required_seconds: u32,
    /// Set once the hold succeeded; the session ends when this passes
    #[serde(default)]
    pub unlock_at: Option<DateTime<Local>>,
}

/// Progress of a hold-to-unlock challenge that passed its hold phase
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum UnlockProgress {
    /// Cooling-off countdown running; complete again once it passes
    CountingDown {
        challenge: FrictionChallenge,
        unlock_at: DateTime<Local>,
    },
    /// The session was ended
    Unlocked,
}

/// Declarative block-set pushed to the OS restriction subsystem
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum ShieldPolicy {
    /// Nothing shielded
    Clear,
    /// Shield every app except these ids
    BlockAllExcept { allowed: BTreeSet<String> },
}

impl ShieldPolicy {
    pub fn is_clear(&self) -> bool {
        matches!(self, ShieldPolicy::Clear)
    }
}

/// Content for the blocking surface shown over a blocked app
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockScreen {
    pub app: AppIdentifier,
    pub friction: FrictionConfig,
    pub ends_at: Option<DateTime<Local>>,
    pub headline: String,
    pub featured_task: Option<String>,
    /// Whether the emergency button should be offered at all
    pub emergency_available: bool,
}

/// How decisions reach the device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnforcementMode {
    /// Intercept foreground-app transitions
    EventDriven,
    /// Push a block-set once; the OS intercepts
    Declarative,
}

/// Outcome of the OS authorization flow, read as booleans only
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionStatus {
    pub is_supported: bool,
    pub is_authorized: bool,
    pub needs_onboarding: bool,
    #[serde(default)]
    pub platform_details: Option<String>,
}

impl PermissionStatus {
    pub fn authorized(details: impl Into<String>) -> Self {
        Self {
            is_supported: true,
            is_authorized: true,
            needs_onboarding: false,
            platform_details: Some(details.into()),
        }
    }

    pub fn not_authorized(details: impl Into<String>) -> Self {
        Self {
            is_supported: true,
            is_authorized: false,
            needs_onboarding: true,
            platform_details: Some(details.into()),
        }
    }

    pub fn unsupported(details: impl Into<String>) -> Self {
        Self {
            is_supported: false,
            is_authorized: false,
            needs_onboarding: true,
            platform_details: Some(details.into()),
        }
    }

    /// Enforcement is only possible when supported and authorized
    pub fn can_enforce(&self) -> bool {
        self.is_supported && self.is_authorized
    }
}

/// Why a session ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEndReason {
    /// End time reached
    Expired,
    /// Early exit via hold-to-unlock
    HoldToUnlock,
    /// Ended from the UI
    UserEnded,
    /// Ended by a remote command
    Remote { command_id: String },
}

/// Out-of-band command as delivered by push or polling
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteCommandEnvelope {
    #[serde(alias = "command_id")]
    pub command_id: String,
    pub kind: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub params: serde_json::Map<String, serde_json::Value>,
}

/// Senders write `"params": null` for commands without parameters
fn null_as_empty<'de, D>(deserializer: D) -> Result<serde_json::Map<String, serde_json::Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<serde_json::Map<String, serde_json::Value>>::deserialize(deserializer)?
        .unwrap_or_default())
}

/// Screen the UI should open after a deep link
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeepLinkRoute {
    Today,
    Focus,
}

impl DeepLinkRoute {
    pub fn path(&self) -> &'static str {
        match self {
            DeepLinkRoute::Today => "/today",
            DeepLinkRoute::Focus => "/focus",
        }
    }

    pub fn from_path(path: &str) -> Option<Self> {
        match path {
            "/today" => Some(DeepLinkRoute::Today),
            "/focus" => Some(DeepLinkRoute::Focus),
            _ => None,
        }
    }
}

/// Current session as reported to clients
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionInfo {
    pub session: Session,
    pub time_remaining: Option<Duration>,
    pub emergency_remaining: Option<Duration>,
}

/// Full service state snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceStateSnapshot {
    pub api_version: u32,
    pub platform: Platform,
    pub enforcement: EnforcementMode,
    pub session: SessionInfo,
    pub permissions: PermissionStatus,
    pub pending_remote_commands: usize,
}

/// Role for authorization
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClientRole {
    /// UI, block surface, platform shim
    Shell,
    /// Local admin, push relay
    Admin,
    /// Read-only observer
    Observer,
}

impl ClientRole {
    pub fn can_control_session(&self) -> bool {
        matches!(self, ClientRole::Shell | ClientRole::Admin)
    }

    pub fn can_report_host_state(&self) -> bool {
        matches!(self, ClientRole::Shell | ClientRole::Admin)
    }

    pub fn can_ingest_remote(&self) -> bool {
        matches!(self, ClientRole::Admin)
    }
}

/// Health status
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthStatus {
    pub live: bool,
    pub ready: bool,
    pub host_adapter_ok: bool,
    pub store_ok: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(h: u32, m: u32) -> DateTime<Local> {
        Local.with_ymd_and_hms(2025, 6, 1, h, m, 0).unwrap()
    }

    #[test]
    fn app_identity_ignores_display_name() {
        let a = AppIdentifier::android("com.phone.dialer").with_display_name("Phone");
        let b = AppIdentifier::android("com.phone.dialer");
        assert_eq!(a, b);

        let mut set = BTreeSet::new();
        set.insert(a);
        assert!(!set.insert(b));
    }

    #[test]
    fn app_identifier_uses_camel_case_keys() {
        let app = AppIdentifier::ios("com.apple.mobilephone").with_display_name("Phone");
        let json = serde_json::to_value(&app).unwrap();
        assert_eq!(json["platform"], "ios");
        assert_eq!(json["displayName"], "Phone");
    }

    #[test]
    fn friction_missing_fields_take_defaults() {
        let friction: FrictionConfig =
            serde_json::from_str(r#"{"holdToUnlockSeconds": 5}"#).unwrap();
        assert_eq!(friction.hold_to_unlock_seconds, 5);
        assert_eq!(friction.unlock_delay_seconds, 10);
        assert_eq!(friction.emergency_unlock_minutes, 3);
    }

    #[test]
    fn normalized_clears_inactive_session_state() {
        let session = Session {
            active: false,
            ends_at: Some(at(10, 0)),
            allowed_apps: [AppIdentifier::android("a")].into_iter().collect(),
            friction: FrictionConfig {
                hold_to_unlock_seconds: 9,
                ..Default::default()
            },
            emergency_until: Some(at(9, 5)),
            card_required: false,
        }
        .normalized();

        assert_eq!(session, Session::default());
    }

    #[test]
    fn normalized_keeps_card_required_and_drops_exception() {
        let session = Session {
            active: true,
            ends_at: Some(at(10, 0)),
            emergency_until: Some(at(9, 5)),
            card_required: true,
            ..Default::default()
        }
        .normalized();

        assert!(session.card_required);
        assert!(session.emergency_until.is_none());
        assert_eq!(session.ends_at, Some(at(10, 0)));
    }

    #[test]
    fn ended_preserves_card_required_only() {
        let session = Session {
            active: true,
            ends_at: Some(at(10, 0)),
            card_required: true,
            ..Default::default()
        }
        .ended();

        assert!(!session.active);
        assert!(session.card_required);
        assert!(session.ends_at.is_none());
    }

    #[test]
    fn allowed_ids_filter_by_platform() {
        let session = Session {
            active: true,
            allowed_apps: [
                AppIdentifier::android("com.phone.dialer"),
                AppIdentifier::ios("com.apple.mobilephone"),
            ]
            .into_iter()
            .collect(),
            ..Default::default()
        };

        let ids = session.allowed_ids(Platform::Android);
        assert_eq!(ids.len(), 1);
        assert!(ids.contains("com.phone.dialer"));
    }

    #[test]
    fn decision_serialization() {
        let json = serde_json::to_string(&Decision::Allow(AllowReason::Allowlisted)).unwrap();
        assert!(json.contains("allowlisted"));
        assert!(Decision::Allow(AllowReason::SessionExpired).requires_expiry());
        assert!(!Decision::Block.requires_expiry());
    }

    #[test]
    fn remote_envelope_accepts_snake_case_id() {
        let env: RemoteCommandEnvelope =
            serde_json::from_str(r#"{"command_id": "c1", "kind": "end_session"}"#).unwrap();
        assert_eq!(env.command_id, "c1");
        assert!(env.params.is_empty());
    }

    #[test]
    fn remote_envelope_null_params_are_empty() {
        let env: RemoteCommandEnvelope = serde_json::from_str(
            r#"{"commandId": "c2", "kind": "end_session", "params": null}"#,
        )
        .unwrap();
        assert!(env.params.is_empty());
    }

    #[test]
    fn deep_link_paths() {
        assert_eq!(DeepLinkRoute::from_path("/focus"), Some(DeepLinkRoute::Focus));
        assert_eq!(DeepLinkRoute::Today.path(), "/today");
        assert_eq!(DeepLinkRoute::from_path("/nope"), None);
    }
}
