//! Core focus engine

use chrono::{DateTime, Local};
use focus_api::{
    AppIdentifier, BlockScreen, Decision, DeepLinkRoute, EnforcementMode, FrictionChallenge,
    FrictionConfig, PermissionStatus, RemoteCommandEnvelope, ServiceStateSnapshot, Session,
    SessionEndReason, SessionInfo, UnlockProgress, API_VERSION,
};
use focus_config::{clamp_friction, EngineConfig};
use focus_host_api::HostCapabilities;
use focus_store::{write_session_with, AuditEvent, AuditEventType, DeviceKey, Store};
use focus_util::{remaining_until, to_epoch_millis, CommandId, FocusError, Result};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::{
    build_block_screen, next_deadline, CoreEvent, EnforcementAction, EnforcementMonitor,
    FrictionController, PolicyEvaluator, RemoteAction, RemoteCommandChannel,
};

/// Result of a foreground report
#[derive(Debug)]
pub struct ForegroundOutcome {
    pub decision: Decision,
    /// Present when the host should cover the app
    pub block_screen: Option<BlockScreen>,
    pub events: Vec<CoreEvent>,
}

/// Result of applying the remote queue
#[derive(Debug, Default)]
pub struct DrainReport {
    pub applied: usize,
    pub rejected: usize,
    /// Commands left queued because the store failed mid-drain
    pub deferred: usize,
    pub events: Vec<CoreEvent>,
}

/// The core focus engine.
///
/// Owns no session state of its own: every operation reads a fresh snapshot
/// from the store and writes through its transactional API, so the platform
/// shim process can share the same record.
pub struct FocusEngine {
    config: EngineConfig,
    store: Arc<dyn Store>,
    capabilities: HostCapabilities,
    evaluator: PolicyEvaluator,
    friction: FrictionController,
    monitor: EnforcementMonitor,
    remote: RemoteCommandChannel,
    armed_deadline: Option<DateTime<Local>>,
}

impl FocusEngine {
    pub fn new(config: EngineConfig, store: Arc<dyn Store>, capabilities: HostCapabilities) -> Self {
        let mut mode = config.host.enforcement;
        if !capabilities.supports(mode) {
            warn!(
                requested = ?mode,
                host = ?capabilities.enforcement,
                "Host cannot enforce in the configured mode, using its native mode"
            );
            mode = capabilities.enforcement;
        }

        info!(
            platform = %config.host.platform,
            app_id = %config.host.app_id,
            enforcement = ?mode,
            "Focus engine initialized"
        );

        Self {
            evaluator: PolicyEvaluator::new(config.host.platform, config.host.app_id.clone()),
            friction: FrictionController::new(store.clone()),
            remote: RemoteCommandChannel::new(store.clone()),
            monitor: EnforcementMonitor::new(mode),
            config,
            store,
            capabilities,
            armed_deadline: None,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn capabilities(&self) -> &HostCapabilities {
        &self.capabilities
    }

    pub fn evaluator(&self) -> &PolicyEvaluator {
        &self.evaluator
    }

    pub fn enforcement_mode(&self) -> EnforcementMode {
        self.monitor.mode()
    }

    /// Fresh snapshot of the shared session record
    pub fn session(&self) -> Session {
        self.store.read_session()
    }

    /// Deadline the timer should currently be armed for
    pub fn armed_deadline(&self) -> Option<DateTime<Local>> {
        self.armed_deadline
    }

    // Session lifecycle

    /// Start (or replace) the focus session.
    ///
    /// Missing friction falls back to the configured default; supplied
    /// friction is clamped to the configured caps. `card_required` is a user
    /// preference and carries over.
    pub fn start_session(
        &mut self,
        ends_at: Option<DateTime<Local>>,
        allowed_apps: BTreeSet<AppIdentifier>,
        friction: Option<FrictionConfig>,
        now: DateTime<Local>,
    ) -> Result<(Session, Vec<CoreEvent>)> {
        if let Some(ends_at) = ends_at {
            if ends_at <= now {
                return Err(FocusError::invalid("session end time is in the past"));
            }
        }

        let friction = clamp_friction(friction.unwrap_or(self.config.default_friction));
        let mut before = Session::default();
        let after = write_session_with(self.store.as_ref(), |s| {
            before = s.clone();
            Session {
                active: true,
                ends_at,
                allowed_apps,
                friction,
                emergency_until: None,
                card_required: s.card_required,
            }
        })
        .map_err(store_err)?;

        let allowed_count = after.allowed_apps.len();
        self.audit(AuditEventType::SessionStarted {
            ends_at: after.ends_at,
            allowed_count,
        });

        match after.ends_at {
            Some(ends_at) => info!(ends_at = %ends_at, allowed_count, "Focus session started"),
            None => info!(allowed_count, "Focus session started (no end time)"),
        }

        let mut events = vec![CoreEvent::SessionStarted {
            ends_at: after.ends_at,
            allowed_count,
        }];
        self.after_write(&before, &after, now, &mut events);
        Ok((after, events))
    }

    /// End the session. Ending an inactive session is a no-op.
    pub fn end_session(
        &mut self,
        reason: SessionEndReason,
        now: DateTime<Local>,
    ) -> Result<Vec<CoreEvent>> {
        let mut before = Session::default();
        let after = write_session_with(self.store.as_ref(), |s| {
            before = s.clone();
            s.ended()
        })
        .map_err(store_err)?;

        let mut events = Vec::new();
        if before.active {
            self.record_session_end(reason, &mut events);
        } else {
            debug!("End requested without an active session");
        }
        self.after_write(&before, &after, now, &mut events);
        Ok(events)
    }

    /// Replace the allowlist of the running session
    pub fn configure_apps(
        &mut self,
        allowed_apps: BTreeSet<AppIdentifier>,
        now: DateTime<Local>,
    ) -> Result<Vec<CoreEvent>> {
        let mut before = Session::default();
        let after = write_session_with(self.store.as_ref(), |s| {
            before = s.clone();
            if !s.active {
                return s;
            }
            Session { allowed_apps, ..s }
        })
        .map_err(store_err)?;

        if !before.active {
            return Err(FocusError::NoActiveSession);
        }

        let allowed_count = after.allowed_apps.len();
        self.audit(AuditEventType::AppsConfigured { allowed_count });
        info!(allowed_count, "Allowlist replaced");

        let mut events = vec![CoreEvent::AppsConfigured { allowed_count }];
        self.after_write(&before, &after, now, &mut events);
        Ok(events)
    }

    pub fn set_card_required(
        &mut self,
        required: bool,
        now: DateTime<Local>,
    ) -> Result<Vec<CoreEvent>> {
        let outcome = self.friction.set_card_required(required).map_err(store_err)?;

        let mut events = Vec::new();
        if outcome.before.card_required != required {
            self.audit(AuditEventType::CardRequiredChanged { required });
            events.push(CoreEvent::CardRequiredChanged { required });
        }
        self.after_write(&outcome.before, &outcome.after, now, &mut events);
        Ok(events)
    }

    /// Open an exception window. `None` uses the session's configured length.
    pub fn start_emergency_exception(
        &mut self,
        duration_minutes: Option<u32>,
        now: DateTime<Local>,
    ) -> Result<(DateTime<Local>, Vec<CoreEvent>)> {
        let outcome = match self.friction.start_emergency_exception(duration_minutes, now) {
            Ok(outcome) => outcome,
            Err(e) => {
                if matches!(e, crate::EmergencyError::CardRequiredBlocksEmergency) {
                    self.audit(AuditEventType::EmergencyRefused);
                }
                return Err(e.into());
            }
        };

        let until = outcome.value;
        let minutes = until.signed_duration_since(now).num_minutes().max(0);
        self.audit(AuditEventType::EmergencyStarted {
            until,
            duration_minutes: u32::try_from(minutes).unwrap_or(u32::MAX),
        });

        let mut events = vec![CoreEvent::EmergencyStarted { until }];
        self.after_write(&outcome.before, &outcome.after, now, &mut events);
        Ok((until, events))
    }

    // Friction

    pub fn begin_hold_to_unlock(&self, now: DateTime<Local>) -> Result<FrictionChallenge> {
        Ok(self.friction.begin_hold_to_unlock(now)?)
    }

    pub fn complete_hold_to_unlock(
        &mut self,
        challenge: &FrictionChallenge,
        now: DateTime<Local>,
    ) -> Result<(UnlockProgress, Vec<CoreEvent>)> {
        let outcome = self.friction.complete_hold_to_unlock(challenge, now)?;

        let mut events = Vec::new();
        if outcome.value == UnlockProgress::Unlocked && outcome.before.active {
            self.record_session_end(SessionEndReason::HoldToUnlock, &mut events);
        }
        self.after_write(&outcome.before, &outcome.after, now, &mut events);
        Ok((outcome.value, events))
    }

    pub fn begin_emergency_unlock(&self, now: DateTime<Local>) -> Result<FrictionChallenge> {
        let challenge = self.friction.begin_emergency_unlock(now);
        if matches!(challenge, Err(crate::EmergencyError::CardRequiredBlocksEmergency)) {
            self.audit(AuditEventType::EmergencyRefused);
        }
        Ok(challenge?)
    }

    pub fn complete_emergency_unlock(
        &mut self,
        challenge: &FrictionChallenge,
        now: DateTime<Local>,
    ) -> Result<(DateTime<Local>, Vec<CoreEvent>)> {
        if challenge.kind != focus_api::ChallengeKind::EmergencyUnlock {
            return Err(FocusError::invalid("challenge is for a different unlock flow"));
        }
        self.start_emergency_exception(None, now)
    }

    // Enforcement

    /// A foreground transition reported by the platform shim.
    ///
    /// A session found past its end is ended in the store here (lazy expiry),
    /// so enforcement is correct even if no timer fired.
    pub fn report_foreground(
        &mut self,
        app: AppIdentifier,
        now: DateTime<Local>,
    ) -> Result<ForegroundOutcome> {
        let session = self.store.read_session();
        let decision = self
            .monitor
            .on_foreground(&self.evaluator, &session, app.clone(), &now);

        let mut events = Vec::new();
        if decision.requires_expiry() {
            events.extend(self.expire_if_due(now)?);
        }

        let block_screen = if decision.is_block()
            && self.monitor.mode() == EnforcementMode::EventDriven
        {
            let screen = build_block_screen(app, &session, self.featured_task(), &now);
            self.audit(AuditEventType::BlockPresented {
                app_id: screen.app.id.clone(),
            });
            info!(app_id = %screen.app.id, "Blocked app brought to foreground");
            events.push(CoreEvent::BlockRequested(screen.clone()));
            Some(screen)
        } else {
            None
        };

        Ok(ForegroundOutcome {
            decision,
            block_screen,
            events,
        })
    }

    /// Persist the end of a session whose end time has passed.
    ///
    /// The check repeats inside the write, so a session restarted by another
    /// process in the meantime is left alone.
    pub fn expire_if_due(&mut self, now: DateTime<Local>) -> Result<Vec<CoreEvent>> {
        let mut before = Session::default();
        let after = write_session_with(self.store.as_ref(), |s| {
            before = s.clone();
            if s.is_expired_at(&now) {
                s.ended()
            } else {
                s
            }
        })
        .map_err(store_err)?;

        let mut events = Vec::new();
        if before.is_expired_at(&now) {
            self.record_session_end(SessionEndReason::Expired, &mut events);
            self.after_write(&before, &after, now, &mut events);
        }
        Ok(events)
    }

    /// The armed deadline passed: end an expired session or re-check after an
    /// exception window closed.
    pub fn on_deadline(&mut self, now: DateTime<Local>) -> Result<Vec<CoreEvent>> {
        debug!(at = %now, "Deadline reached");
        let mut events = self.expire_if_due(now)?;
        if events.is_empty() {
            let session = self.store.read_session();
            self.reconcile_with(&session, now, &mut events);
            self.refresh_deadline(&session, now, &mut events);
        }
        Ok(events)
    }

    /// Bring enforcement in line with the stored record after a (re)start.
    ///
    /// Declarative hosts always get the block-set pushed once, since what the
    /// OS currently holds is unknown.
    pub fn reconcile(&mut self, now: DateTime<Local>) -> Result<Vec<CoreEvent>> {
        self.monitor.invalidate();
        self.armed_deadline = None;

        let mut events = self.expire_if_due(now)?;
        let session = self.store.read_session();
        self.reconcile_with(&session, now, &mut events);
        self.refresh_deadline(&session, now, &mut events);
        Ok(events)
    }

    // Remote commands

    pub fn ingest_remote(
        &self,
        envelope: &RemoteCommandEnvelope,
        now: DateTime<Local>,
    ) -> Result<bool> {
        Ok(self.remote.ingest(envelope, now)?)
    }

    pub fn note_pending_command(&self, command_id: &CommandId) -> Result<()> {
        Ok(self.remote.note_pending_command(command_id)?)
    }

    pub fn pending_remote_count(&self) -> usize {
        self.remote.pending_count().unwrap_or_else(|e| {
            warn!(error = %e, "Failed to count pending remote commands");
            0
        })
    }

    /// Apply every queued remote command in arrival order.
    ///
    /// Unknown or malformed commands, and commands refused by policy, are
    /// consumed without effect so they cannot wedge the queue. A store
    /// failure stops the drain and leaves the rest queued for the next one.
    pub fn drain_remote(&mut self, now: DateTime<Local>) -> Result<DrainReport> {
        let commands = self.remote.drain_pending()?;
        let mut report = DrainReport::default();

        for (index, command) in commands.iter().enumerate() {
            let result = match &command.action {
                Ok(action) => self.apply_remote(&command.id, action.clone(), now),
                Err(e) => Err(FocusError::invalid(e.to_string())),
            };

            match result {
                Ok(events) => {
                    self.remote.mark_consumed(&command.id, now)?;
                    self.store
                        .set_device_value(DeviceKey::LastAppliedCommandId, Some(command.id.as_str()))
                        .map_err(store_err)?;
                    self.audit(AuditEventType::RemoteCommandApplied {
                        command_id: command.id.to_string(),
                        kind: command.kind.clone(),
                    });
                    info!(command_id = %command.id, kind = %command.kind, "Remote command applied");

                    report.applied += 1;
                    report.events.extend(events);
                    report.events.push(CoreEvent::RemoteCommandApplied {
                        command_id: command.id.clone(),
                        kind: command.kind.clone(),
                        applied: true,
                    });
                }
                Err(FocusError::StoreError(msg)) => {
                    warn!(
                        command_id = %command.id,
                        error = %msg,
                        "Store failure while applying remote command, deferring"
                    );
                    report.deferred = commands.len() - index;
                    return Ok(report);
                }
                Err(e) => {
                    self.remote.mark_consumed(&command.id, now)?;
                    self.audit(AuditEventType::RemoteCommandRejected {
                        command_id: command.id.to_string(),
                        reason: e.to_string(),
                    });
                    warn!(
                        command_id = %command.id,
                        kind = %command.kind,
                        reason = %e,
                        "Remote command rejected"
                    );

                    report.rejected += 1;
                    report.events.push(CoreEvent::RemoteCommandApplied {
                        command_id: command.id.clone(),
                        kind: command.kind.clone(),
                        applied: false,
                    });
                }
            }
        }

        self.remote.settle_hint()?;
        Ok(report)
    }

    /// Queue freshly fetched commands, then drain. Ingest failures only cost
    /// the offending entry.
    pub fn sync_remote(
        &mut self,
        fetched: &[RemoteCommandEnvelope],
        now: DateTime<Local>,
    ) -> Result<DrainReport> {
        for envelope in fetched {
            if let Err(e) = self.ingest_remote(envelope, now) {
                warn!(command_id = %envelope.command_id, error = %e, "Failed to ingest fetched command");
            }
        }
        self.drain_remote(now)
    }

    /// The id a push announced that has not been applied yet
    pub fn pending_hint(&self) -> Option<CommandId> {
        self.remote.pending_hint().unwrap_or_else(|e| {
            warn!(error = %e, "Failed to read pending command hint");
            None
        })
    }

    /// Route a remote payload through the local write paths
    fn apply_remote(
        &mut self,
        command_id: &CommandId,
        action: RemoteAction,
        now: DateTime<Local>,
    ) -> Result<Vec<CoreEvent>> {
        match action {
            RemoteAction::StartSession {
                ends_at,
                allowed_apps,
                friction,
            } => self
                .start_session(ends_at, allowed_apps, friction, now)
                .map(|(_, events)| events),
            RemoteAction::EndSession => self.end_session(
                SessionEndReason::Remote {
                    command_id: command_id.to_string(),
                },
                now,
            ),
            RemoteAction::SetCardRequired { required } => self.set_card_required(required, now),
            RemoteAction::StartEmergencyException { duration_minutes } => self
                .start_emergency_exception(duration_minutes, now)
                .map(|(_, events)| events),
            RemoteAction::ConfigureApps { allowed_apps } => self.configure_apps(allowed_apps, now),
        }
    }

    /// Forget consumed command ids older than the retention window
    pub fn prune_tombstones(&self, now: DateTime<Local>) -> Result<usize> {
        Ok(self
            .remote
            .prune_tombstones(self.config.remote.tombstone_retention, now)?)
    }

    // Device bookkeeping

    pub fn register_push_token(&self, token: &str) -> Result<()> {
        let token = token.trim();
        if token.is_empty() {
            return Err(FocusError::invalid("push token is blank"));
        }
        self.store
            .set_device_value(DeviceKey::PushToken, Some(token))
            .map_err(store_err)?;
        info!("Push token registered");
        Ok(())
    }

    pub fn push_token(&self) -> Result<Option<String>> {
        self.store
            .get_device_value(DeviceKey::PushToken)
            .map_err(store_err)
    }

    pub fn last_applied_command(&self) -> Result<Option<CommandId>> {
        Ok(self
            .store
            .get_device_value(DeviceKey::LastAppliedCommandId)
            .map_err(store_err)?
            .map(CommandId::new))
    }

    /// Record the screen a `focus://` link points at for the UI to pick up
    pub fn open_deep_link(&self, url: &str) -> Result<DeepLinkRoute> {
        let route = parse_deep_link(url)
            .ok_or_else(|| FocusError::invalid(format!("not a focus link: {url}")))?;
        self.store
            .set_device_value(DeviceKey::PendingRoute, Some(route.path()))
            .map_err(store_err)?;
        debug!(route = route.path(), "Deep link recorded");
        Ok(route)
    }

    /// Consume the recorded route; a second call returns `None`
    pub fn take_pending_route(&self) -> Result<Option<DeepLinkRoute>> {
        Ok(self
            .store
            .take_device_value(DeviceKey::PendingRoute)
            .map_err(store_err)?
            .and_then(|path| DeepLinkRoute::from_path(&path)))
    }

    pub fn set_featured_task(&self, title: Option<&str>) -> Result<()> {
        let title = title.map(str::trim).filter(|t| !t.is_empty());
        self.store
            .set_device_value(DeviceKey::FeaturedTask, title)
            .map_err(store_err)
    }

    pub fn featured_task(&self) -> Option<String> {
        self.store
            .get_device_value(DeviceKey::FeaturedTask)
            .unwrap_or_else(|e| {
                warn!(error = %e, "Failed to read featured task");
                None
            })
    }

    /// The shield's primary button was pressed; the UI checks this on launch
    pub fn shield_open_app_requested(&self, now: DateTime<Local>) -> Result<()> {
        let millis = to_epoch_millis(&now).to_string();
        self.store
            .set_device_value(DeviceKey::ShieldOpenAppRequestedAt, Some(&millis))
            .map_err(store_err)
    }

    // State

    pub fn get_state(&self, permissions: PermissionStatus, now: DateTime<Local>) -> ServiceStateSnapshot {
        let session = self.store.read_session();
        let time_remaining = session
            .active
            .then_some(session.ends_at)
            .flatten()
            .map(|ends_at| remaining_until(&ends_at, &now));
        let emergency_remaining = session
            .emergency_until
            .filter(|_| session.emergency_open_at(&now))
            .map(|until| remaining_until(&until, &now));

        ServiceStateSnapshot {
            api_version: API_VERSION,
            platform: self.evaluator.platform(),
            enforcement: self.monitor.mode(),
            session: SessionInfo {
                session,
                time_remaining,
                emergency_remaining,
            },
            permissions,
            pending_remote_commands: self.pending_remote_count(),
        }
    }

    pub fn is_healthy(&self) -> bool {
        self.store.is_healthy()
    }

    // Internals

    fn record_session_end(&self, reason: SessionEndReason, events: &mut Vec<CoreEvent>) {
        self.audit(AuditEventType::SessionEnded {
            reason: reason.clone(),
        });
        info!(reason = ?reason, "Focus session ended");
        events.push(CoreEvent::SessionEnded { reason });
    }

    /// Push enforcement and rearm the deadline after a committed write
    fn after_write(
        &mut self,
        before: &Session,
        after: &Session,
        now: DateTime<Local>,
        events: &mut Vec<CoreEvent>,
    ) {
        if before.enforcement_differs(after) {
            self.reconcile_with(after, now, events);
        }
        self.refresh_deadline(after, now, events);
    }

    fn reconcile_with(&mut self, session: &Session, now: DateTime<Local>, events: &mut Vec<CoreEvent>) {
        match self.monitor.reconcile(&self.evaluator, session, &now) {
            Some(EnforcementAction::PresentBlock(app)) => {
                let screen = build_block_screen(app, session, self.featured_task(), &now);
                self.audit(AuditEventType::BlockPresented {
                    app_id: screen.app.id.clone(),
                });
                info!(app_id = %screen.app.id, "Foreground app now blocked");
                events.push(CoreEvent::BlockRequested(screen));
            }
            Some(EnforcementAction::ApplyShield(policy)) => {
                let allowed_count = match &policy {
                    focus_api::ShieldPolicy::Clear => None,
                    focus_api::ShieldPolicy::BlockAllExcept { allowed } => Some(allowed.len()),
                };
                self.audit(AuditEventType::ShieldPushed { allowed_count });
                info!(allowed_count = ?allowed_count, "Shield updated");
                events.push(CoreEvent::ShieldChanged(policy));
            }
            None => {}
        }
    }

    fn refresh_deadline(&mut self, session: &Session, now: DateTime<Local>, events: &mut Vec<CoreEvent>) {
        let deadline = if self.config.host.deadline_timer {
            next_deadline(session, &now)
        } else {
            None
        };

        if deadline != self.armed_deadline {
            debug!(deadline = ?deadline, "Deadline changed");
            self.armed_deadline = deadline;
            events.push(CoreEvent::DeadlineChanged { deadline });
        }
    }

    fn audit(&self, event: AuditEventType) {
        if let Err(e) = self.store.append_audit(AuditEvent::new(event)) {
            warn!(error = %e, "Failed to append audit event");
        }
    }
}

fn store_err(e: focus_store::StoreError) -> FocusError {
    FocusError::store(e.to_string())
}

/// `focus://today`, `focus://focus`; any other path opens today
pub fn parse_deep_link(url: &str) -> Option<DeepLinkRoute> {
    let url = url.trim();
    let (scheme, rest) = url.split_once("://")?;
    if !scheme.eq_ignore_ascii_case("focus") {
        return None;
    }

    let target = rest
        .split(['?', '#'])
        .next()
        .unwrap_or_default()
        .trim_matches('/')
        .split('/')
        .next()
        .unwrap_or_default()
        .to_ascii_lowercase();

    Some(DeepLinkRoute::from_path(&format!("/{target}")).unwrap_or(DeepLinkRoute::Today))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use focus_api::{AllowReason, Platform, ShieldPolicy};
    use focus_store::SqliteStore;
    use serde_json::json;

    const HOST: &str = "com.example.focus";

    fn engine_with(mode: EnforcementMode) -> (FocusEngine, Arc<dyn Store>) {
        let store: Arc<dyn Store> = Arc::new(SqliteStore::in_memory().unwrap());
        let mut config = EngineConfig::for_host(Platform::Android, HOST);
        config.host.enforcement = mode;
        let caps = HostCapabilities::with_enforcement(Platform::Android, mode);
        (FocusEngine::new(config, store.clone(), caps), store)
    }

    fn dialer() -> BTreeSet<AppIdentifier> {
        [AppIdentifier::android("com.phone.dialer")]
            .into_iter()
            .collect()
    }

    fn envelope(id: &str, kind: &str, params: serde_json::Value) -> RemoteCommandEnvelope {
        RemoteCommandEnvelope {
            command_id: id.to_string(),
            kind: kind.to_string(),
            params: params.as_object().cloned().unwrap_or_default(),
        }
    }

    #[test]
    fn start_session_uses_configured_friction() {
        let (mut engine, store) = engine_with(EnforcementMode::EventDriven);
        let now = focus_util::now();

        let (session, events) = engine
            .start_session(Some(now + Duration::hours(1)), dialer(), None, now)
            .unwrap();

        assert!(session.active);
        assert_eq!(session.friction, FrictionConfig::default());
        assert_eq!(store.read_session(), session);
        assert!(matches!(
            events[0],
            CoreEvent::SessionStarted { allowed_count: 1, .. }
        ));
        assert!(events.contains(&CoreEvent::DeadlineChanged {
            deadline: Some(now + Duration::hours(1))
        }));
    }

    #[test]
    fn start_session_rejects_past_end() {
        let (mut engine, store) = engine_with(EnforcementMode::EventDriven);
        let now = focus_util::now();
        let result = engine.start_session(Some(now - Duration::minutes(1)), dialer(), None, now);
        assert!(matches!(result, Err(FocusError::InvalidArgument(_))));
        assert!(!store.read_session().active);
    }

    #[test]
    fn start_session_keeps_card_required() {
        let (mut engine, _) = engine_with(EnforcementMode::EventDriven);
        let now = focus_util::now();
        engine.set_card_required(true, now).unwrap();
        let (session, _) = engine.start_session(None, dialer(), None, now).unwrap();
        assert!(session.card_required);
    }

    #[test]
    fn blocked_foreground_gets_block_screen() {
        let (mut engine, _) = engine_with(EnforcementMode::EventDriven);
        let now = focus_util::now();
        engine
            .start_session(Some(now + Duration::hours(1)), dialer(), None, now)
            .unwrap();
        engine.set_featured_task(Some("Write report")).unwrap();

        let outcome = engine
            .report_foreground(AppIdentifier::android("com.social.app"), now)
            .unwrap();

        assert!(outcome.decision.is_block());
        let screen = outcome.block_screen.unwrap();
        assert_eq!(screen.app.id, "com.social.app");
        assert_eq!(screen.featured_task.as_deref(), Some("Write report"));
        assert!(screen.emergency_available);
    }

    #[test]
    fn foreground_past_end_expires_session() {
        let (mut engine, store) = engine_with(EnforcementMode::EventDriven);
        let now = focus_util::now();
        engine
            .start_session(Some(now + Duration::minutes(30)), dialer(), None, now)
            .unwrap();

        let later = now + Duration::minutes(31);
        let outcome = engine
            .report_foreground(AppIdentifier::android("com.social.app"), later)
            .unwrap();

        assert_eq!(
            outcome.decision,
            Decision::Allow(AllowReason::SessionExpired)
        );
        assert!(outcome.block_screen.is_none());
        assert!(outcome.events.contains(&CoreEvent::SessionEnded {
            reason: SessionEndReason::Expired
        }));
        assert!(!store.read_session().active);
    }

    #[test]
    fn emergency_then_window_close_reblocks_foreground() {
        let (mut engine, _) = engine_with(EnforcementMode::EventDriven);
        let now = focus_util::now();
        engine
            .start_session(Some(now + Duration::hours(1)), dialer(), None, now)
            .unwrap();

        let (until, _) = engine.start_emergency_exception(Some(5), now).unwrap();
        assert_eq!(until, now + Duration::minutes(5));
        assert_eq!(engine.armed_deadline(), Some(until));

        let outcome = engine
            .report_foreground(AppIdentifier::android("com.social.app"), now)
            .unwrap();
        assert_eq!(
            outcome.decision,
            Decision::Allow(AllowReason::EmergencyException)
        );

        let events = engine.on_deadline(until).unwrap();
        assert!(events
            .iter()
            .any(|e| matches!(e, CoreEvent::BlockRequested(screen) if screen.app.id == "com.social.app")));
        assert_eq!(engine.armed_deadline(), Some(now + Duration::hours(1)));
    }

    #[test]
    fn card_required_refuses_emergency() {
        let (mut engine, store) = engine_with(EnforcementMode::EventDriven);
        let now = focus_util::now();
        engine
            .start_session(Some(now + Duration::hours(1)), dialer(), None, now)
            .unwrap();
        engine.set_card_required(true, now).unwrap();
        let before = store.read_session();

        assert!(matches!(
            engine.start_emergency_exception(Some(3), now),
            Err(FocusError::CardRequiredBlocksEmergency)
        ));
        assert!(matches!(
            engine.begin_emergency_unlock(now),
            Err(FocusError::CardRequiredBlocksEmergency)
        ));
        assert_eq!(store.read_session(), before);
    }

    #[test]
    fn declarative_pushes_shield_on_start_and_clear_on_end() {
        let (mut engine, _) = engine_with(EnforcementMode::Declarative);
        let now = focus_util::now();

        let (_, events) = engine
            .start_session(Some(now + Duration::hours(1)), dialer(), None, now)
            .unwrap();
        let pushed = events.iter().find_map(|e| match e {
            CoreEvent::ShieldChanged(policy) => Some(policy.clone()),
            _ => None,
        });
        match pushed {
            Some(ShieldPolicy::BlockAllExcept { allowed }) => {
                assert!(allowed.contains("com.phone.dialer"));
                assert!(allowed.contains(HOST));
            }
            other => panic!("expected block-set, got {other:?}"),
        }

        let events = engine.end_session(SessionEndReason::UserEnded, now).unwrap();
        assert!(events.contains(&CoreEvent::ShieldChanged(ShieldPolicy::Clear)));
        assert!(events.contains(&CoreEvent::DeadlineChanged { deadline: None }));
    }

    #[test]
    fn declarative_does_not_repush_unchanged_policy() {
        let (mut engine, _) = engine_with(EnforcementMode::Declarative);
        let now = focus_util::now();
        engine.start_session(None, dialer(), None, now).unwrap();

        // Card flag alone does not change the block-set
        let events = engine.set_card_required(true, now).unwrap();
        assert!(!events
            .iter()
            .any(|e| matches!(e, CoreEvent::ShieldChanged(_))));
    }

    #[test]
    fn reconcile_after_restart_clears_expired_shield() {
        let (mut engine, store) = engine_with(EnforcementMode::Declarative);
        let now = focus_util::now();
        engine
            .start_session(Some(now + Duration::minutes(10)), dialer(), None, now)
            .unwrap();

        // New process, same store, well past the end
        let mut config = EngineConfig::for_host(Platform::Android, HOST);
        config.host.enforcement = EnforcementMode::Declarative;
        let mut restarted = FocusEngine::new(
            config,
            store.clone(),
            HostCapabilities::declarative(Platform::Android),
        );
        let events = restarted.reconcile(now + Duration::hours(2)).unwrap();

        assert!(events.contains(&CoreEvent::ShieldChanged(ShieldPolicy::Clear)));
        assert!(!store.read_session().active);
    }

    #[test]
    fn hold_to_unlock_ends_session() {
        let (mut engine, store) = engine_with(EnforcementMode::EventDriven);
        let now = focus_util::now();
        engine
            .start_session(Some(now + Duration::hours(1)), dialer(), None, now)
            .unwrap();

        let challenge = engine.begin_hold_to_unlock(now).unwrap();
        assert!(matches!(
            engine.complete_hold_to_unlock(&challenge, now + Duration::seconds(2)),
            Err(FocusError::StillHolding { .. })
        ));

        let (progress, _) = engine
            .complete_hold_to_unlock(&challenge, now + Duration::seconds(3))
            .unwrap();
        let countdown = match progress {
            UnlockProgress::CountingDown { challenge, .. } => challenge,
            UnlockProgress::Unlocked => panic!("expected countdown"),
        };

        let (progress, events) = engine
            .complete_hold_to_unlock(&countdown, now + Duration::seconds(13))
            .unwrap();
        assert_eq!(progress, UnlockProgress::Unlocked);
        assert!(events.contains(&CoreEvent::SessionEnded {
            reason: SessionEndReason::HoldToUnlock
        }));
        assert!(!store.read_session().active);
    }

    #[test]
    fn configure_apps_needs_session() {
        let (mut engine, _) = engine_with(EnforcementMode::EventDriven);
        let now = focus_util::now();
        assert!(matches!(
            engine.configure_apps(dialer(), now),
            Err(FocusError::NoActiveSession)
        ));
    }

    #[test]
    fn remote_commands_apply_once() {
        let (mut engine, store) = engine_with(EnforcementMode::EventDriven);
        let now = focus_util::now();
        let start = envelope(
            "cmd-1",
            "start_session",
            json!({"allowed_apps": [{"platform": "android", "id": "com.phone.dialer"}]}),
        );

        assert!(engine.ingest_remote(&start, now).unwrap());
        let report = engine.drain_remote(now).unwrap();
        assert_eq!(report.applied, 1);
        assert!(store.read_session().active);
        assert_eq!(
            engine.last_applied_command().unwrap(),
            Some(CommandId::new("cmd-1"))
        );

        engine.end_session(SessionEndReason::UserEnded, now).unwrap();

        // Redelivery after consumption is ignored
        assert!(!engine.ingest_remote(&start, now).unwrap());
        let report = engine.drain_remote(now).unwrap();
        assert_eq!(report.applied, 0);
        assert!(!store.read_session().active);
    }

    #[test]
    fn rejected_remote_commands_are_consumed() {
        let (mut engine, store) = engine_with(EnforcementMode::EventDriven);
        let now = focus_util::now();
        engine.set_card_required(true, now).unwrap();
        engine.start_session(None, dialer(), None, now).unwrap();

        engine
            .ingest_remote(&envelope("a", "reboot", json!({})), now)
            .unwrap();
        engine
            .ingest_remote(&envelope("b", "start_emergency_exception", json!({})), now)
            .unwrap();
        engine
            .ingest_remote(&envelope("c", "end_session", json!({})), now)
            .unwrap();

        let report = engine.drain_remote(now).unwrap();
        assert_eq!(report.rejected, 2);
        assert_eq!(report.applied, 1);
        assert_eq!(engine.pending_remote_count(), 0);
        assert!(report.events.contains(&CoreEvent::SessionEnded {
            reason: SessionEndReason::Remote {
                command_id: "c".into()
            }
        }));
        assert!(store.read_session().emergency_until.is_none());
    }

    #[test]
    fn hint_survives_until_hinted_command_applied() {
        let (mut engine, store) = engine_with(EnforcementMode::EventDriven);
        let now = focus_util::now();
        engine.note_pending_command(&CommandId::new("cmd-42")).unwrap();

        // Nothing fetched yet: the hint must not be dropped
        let report = engine.drain_remote(now).unwrap();
        assert_eq!(report.applied, 0);
        assert_eq!(engine.pending_hint(), Some(CommandId::new("cmd-42")));

        let report = engine
            .sync_remote(&[envelope("cmd-42", "set_card_required", json!({"required": true}))], now)
            .unwrap();
        assert_eq!(report.applied, 1);
        assert!(store.read_session().card_required);
        assert_eq!(engine.pending_hint(), None);
        assert_eq!(
            store.get_device_value(DeviceKey::PendingCommandHint).unwrap(),
            None
        );
    }

    #[test]
    fn sync_skips_entries_it_cannot_queue() {
        let (mut engine, _) = engine_with(EnforcementMode::EventDriven);
        let now = focus_util::now();
        let report = engine
            .sync_remote(
                &[
                    envelope(" ", "end_session", json!({})),
                    envelope("c1", "set_card_required", json!({"required": false})),
                ],
                now,
            )
            .unwrap();
        assert_eq!(report.applied, 1);
        assert_eq!(report.rejected, 0);
    }

    #[test]
    fn deep_links() {
        assert_eq!(parse_deep_link("focus://today"), Some(DeepLinkRoute::Today));
        assert_eq!(parse_deep_link("focus://focus"), Some(DeepLinkRoute::Focus));
        assert_eq!(parse_deep_link("FOCUS://Focus/"), Some(DeepLinkRoute::Focus));
        assert_eq!(parse_deep_link("focus://settings"), Some(DeepLinkRoute::Today));
        assert_eq!(parse_deep_link("focus://"), Some(DeepLinkRoute::Today));
        assert_eq!(parse_deep_link("https://example.com/focus"), None);
    }

    #[test]
    fn pending_route_is_consumed_once() {
        let (engine, _) = engine_with(EnforcementMode::EventDriven);
        engine.open_deep_link("focus://focus").unwrap();
        assert_eq!(
            engine.take_pending_route().unwrap(),
            Some(DeepLinkRoute::Focus)
        );
        assert_eq!(engine.take_pending_route().unwrap(), None);
    }

    #[test]
    fn state_reports_remaining_time() {
        let (mut engine, _) = engine_with(EnforcementMode::EventDriven);
        let now = focus_util::now();
        engine
            .start_session(Some(now + Duration::minutes(30)), dialer(), None, now)
            .unwrap();

        let state = engine.get_state(PermissionStatus::authorized("test"), now);
        assert_eq!(
            state.session.time_remaining,
            Some(std::time::Duration::from_secs(30 * 60))
        );
        assert!(state.session.emergency_remaining.is_none());
        assert_eq!(state.enforcement, EnforcementMode::EventDriven);
    }
}
