//! focusd - The focus restriction service
//!
//! This is the main entry point for the focusd service.
//! It wires together all the components:
//! - Configuration loading
//! - Store initialization
//! - Core engine
//! - Bridge host (platform shim over IPC)
//! - IPC server
//! - Remote command polling

mod bridge;
mod poll;

use anyhow::{Context, Result};
use bridge::BridgeHost;
use clap::Parser;
use focus_api::{
    AppIdentifier, ClientRole, Command, ErrorCode, ErrorInfo, Event, EventPayload, HealthStatus,
    RemoteCommandEnvelope, Response, ResponsePayload, SessionEndReason,
};
use focus_config::load_config;
use focus_core::{CoreEvent, FocusEngine};
use focus_host_api::{BlockSurface, HostAdapter, HostCapabilities, HostError, ShieldController};
use focus_ipc::{IpcServer, ServerMessage};
use focus_store::{AuditEvent, AuditEventType, SqliteStore, Store};
use focus_util::{default_config_path, remaining_until, ClientId, CommandId, FocusError, RateLimiter};
use poll::{RemotePoller, RemoteSync};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::{mpsc, Mutex};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

/// focusd - Focus session enforcement service
#[derive(Parser, Debug)]
#[command(name = "focusd")]
#[command(about = "Focus session enforcement service", long_about = None)]
struct Args {
    /// Configuration file path (default: ~/.config/focus/config.toml)
    #[arg(short, long, default_value_os_t = default_config_path())]
    config: PathBuf,

    /// Socket path override (or set FOCUS_SOCKET env var)
    #[arg(short, long, env = "FOCUS_SOCKET")]
    socket: Option<PathBuf>,

    /// Data directory override (or set FOCUS_DATA_DIR env var)
    #[arg(short, long, env = "FOCUS_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Log level
    #[arg(short, long, default_value = "info")]
    log_level: String,
}

/// Main service state
struct Service {
    engine: FocusEngine,
    host: Arc<BridgeHost>,
    ipc: Arc<IpcServer>,
    store: Arc<dyn Store>,
    poller: Option<RemotePoller>,
    rate_limiter: RateLimiter<ClientId>,
}

impl Service {
    async fn new(args: &Args) -> Result<Self> {
        let config = load_config(&args.config)
            .with_context(|| format!("Failed to load config from {:?}", args.config))?;

        info!(
            config_path = %args.config.display(),
            platform = %config.host.platform,
            enforcement = ?config.host.enforcement,
            "Configuration loaded"
        );

        let socket_path = args
            .socket
            .clone()
            .unwrap_or_else(|| config.service.socket_path.clone());

        let data_dir = args
            .data_dir
            .clone()
            .unwrap_or_else(|| config.service.data_dir.clone());

        std::fs::create_dir_all(&data_dir)
            .with_context(|| format!("Failed to create data directory {:?}", data_dir))?;

        let db_path = data_dir.join("focusd.db");
        let store: Arc<dyn Store> = Arc::new(
            SqliteStore::open(&db_path)
                .with_context(|| format!("Failed to open database {:?}", db_path))?,
        );

        info!(db_path = %db_path.display(), "Store initialized");

        store.append_audit(AuditEvent::new(AuditEventType::ServiceStarted))?;

        let mut ipc = IpcServer::new(&socket_path);
        ipc.start().await?;

        info!(socket_path = %socket_path.display(), "IPC server started");

        // Enforcement requests travel to the shim as IPC events
        let capabilities =
            HostCapabilities::with_enforcement(config.host.platform, config.host.enforcement);
        let host = Arc::new(BridgeHost::new(capabilities.clone(), ipc.event_sender()));

        let poller = match &config.remote.poll_url {
            Some(url) => Some(
                RemotePoller::new(url.clone(), config.remote.poll_timeout)
                    .context("Failed to create remote poll client")?,
            ),
            None => None,
        };

        let engine = FocusEngine::new(config, store.clone(), capabilities);

        // Rate limiter: 30 requests per second per client
        let rate_limiter = RateLimiter::new(30, Duration::from_secs(1));

        Ok(Self {
            engine,
            host,
            ipc: Arc::new(ipc),
            store,
            poller,
            rate_limiter,
        })
    }

    async fn run(self) -> Result<()> {
        let ipc_ref = self.ipc.clone();
        let mut ipc_messages = ipc_ref
            .take_message_receiver()
            .await
            .context("IPC message receiver already taken")?;

        let engine = Arc::new(Mutex::new(self.engine));
        let rate_limiter = Arc::new(Mutex::new(self.rate_limiter));
        let host = self.host.clone();
        let store = self.store.clone();

        // Spawn IPC accept task
        let ipc_accept = ipc_ref.clone();
        tokio::spawn(async move {
            if let Err(e) = ipc_accept.run().await {
                error!(error = %e, "IPC server error");
            }
        });

        let (fetched_tx, mut fetched_rx) = mpsc::unbounded_channel::<Vec<RemoteCommandEnvelope>>();
        let remote = RemoteSync::new(self.poller, fetched_tx);

        let launch_events = Self::launch(&engine, &remote).await;
        Self::publish(&engine, &host, &ipc_ref, launch_events, true).await;

        let mut sigterm = signal(SignalKind::terminate())
            .context("Failed to create SIGTERM handler")?;
        let mut sigint = signal(SignalKind::interrupt())
            .context("Failed to create SIGINT handler")?;
        let mut sighup = signal(SignalKind::hangup())
            .context("Failed to create SIGHUP handler")?;

        let mut housekeeping = tokio::time::interval(Duration::from_secs(60));

        info!("Service running");

        loop {
            let deadline = Self::timer_instant(&engine).await;

            tokio::select! {
                _ = sigterm.recv() => {
                    info!("Received SIGTERM, shutting down gracefully");
                    break;
                }
                _ = sigint.recv() => {
                    info!("Received SIGINT, shutting down gracefully");
                    break;
                }
                _ = sighup.recv() => {
                    info!("Received SIGHUP, shutting down gracefully");
                    break;
                }

                // Session end or exception window close
                _ = tokio::time::sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    let now = focus_util::now();
                    let events = {
                        let mut engine = engine.lock().await;
                        engine.on_deadline(now).unwrap_or_else(|e| {
                            warn!(error = %e, "Deadline handling failed");
                            Vec::new()
                        })
                    };
                    Self::publish(&engine, &host, &ipc_ref, events, false).await;
                }

                _ = housekeeping.tick() => {
                    rate_limiter.lock().await.cleanup(Duration::from_secs(60));

                    // A push announced a command we have not seen yet
                    let hint = engine.lock().await.pending_hint();
                    if let Some(command_id) = hint
                        && remote.request_poll()
                    {
                        debug!(command_id = %command_id, "Polling for hinted command");
                    }
                }

                Some(fetched) = fetched_rx.recv() => {
                    let now = focus_util::now();
                    let events = {
                        let mut engine = engine.lock().await;
                        match engine.sync_remote(&fetched, now) {
                            Ok(report) => report.events,
                            Err(e) => {
                                warn!(error = %e, "Failed to drain fetched remote commands");
                                Vec::new()
                            }
                        }
                    };
                    Self::publish(&engine, &host, &ipc_ref, events, false).await;
                }

                Some(msg) = ipc_messages.recv() => {
                    Self::handle_ipc_message(&engine, &host, &ipc_ref, &store, &rate_limiter, &remote, msg).await;
                }
            }
        }

        info!("Shutting down focusd");

        ipc_ref.broadcast_event(Event::new(EventPayload::Shutdown));

        if let Err(e) = store.append_audit(AuditEvent::new(AuditEventType::ServiceStopped)) {
            warn!(error = %e, "Failed to log service shutdown");
        }

        ipc_ref.shutdown();

        info!("Shutdown complete");
        Ok(())
    }

    /// Poll, drain the remote queue, prune old tombstones, then reconcile
    /// enforcement with whatever the store holds
    async fn launch(engine: &Arc<Mutex<FocusEngine>>, remote: &RemoteSync) -> Vec<CoreEvent> {
        let fetched = remote.fetch_now().await;

        let now = focus_util::now();
        let mut engine = engine.lock().await;
        let mut events = Vec::new();

        match engine.sync_remote(&fetched, now) {
            Ok(report) => {
                if report.applied + report.rejected + report.deferred > 0 {
                    info!(
                        applied = report.applied,
                        rejected = report.rejected,
                        deferred = report.deferred,
                        "Remote queue drained at launch"
                    );
                }
                events.extend(report.events);
            }
            Err(e) => warn!(error = %e, "Failed to drain remote commands at launch"),
        }

        match engine.prune_tombstones(now) {
            Ok(0) => {}
            Ok(pruned) => debug!(pruned, "Old remote command ids pruned"),
            Err(e) => warn!(error = %e, "Failed to prune remote command ids"),
        }

        match engine.reconcile(now) {
            Ok(reconciled) => events.extend(reconciled),
            Err(e) => error!(error = %e, "Failed to reconcile enforcement at launch"),
        }

        events
    }

    /// The armed deadline as a tokio instant
    async fn timer_instant(engine: &Arc<Mutex<FocusEngine>>) -> Option<Instant> {
        let deadline = engine.lock().await.armed_deadline()?;
        let now = focus_util::now();
        Some(Instant::now() + remaining_until(&deadline, &now))
    }

    /// Carry out engine events: enforcement goes to the host, the rest is
    /// broadcast. Callers must not hold the engine lock.
    async fn publish(
        engine: &Arc<Mutex<FocusEngine>>,
        host: &Arc<BridgeHost>,
        ipc: &Arc<IpcServer>,
        events: Vec<CoreEvent>,
        announce_state: bool,
    ) {
        let mut state_changed = announce_state;

        for event in events {
            match event {
                CoreEvent::SessionStarted {
                    ends_at,
                    allowed_count,
                } => {
                    state_changed = true;
                    ipc.broadcast_event(Event::new(EventPayload::SessionStarted {
                        ends_at,
                        allowed_count,
                    }));
                }

                CoreEvent::SessionEnded { reason } => {
                    state_changed = true;
                    ipc.broadcast_event(Event::new(EventPayload::SessionEnded { reason }));
                }

                CoreEvent::AppsConfigured { allowed_count } => {
                    debug!(allowed_count, "Allowlist changed");
                    state_changed = true;
                }

                CoreEvent::EmergencyStarted { until } => {
                    state_changed = true;
                    ipc.broadcast_event(Event::new(EventPayload::EmergencyStarted { until }));
                }

                CoreEvent::CardRequiredChanged { required } => {
                    state_changed = true;
                    ipc.broadcast_event(Event::new(EventPayload::CardRequiredChanged { required }));
                }

                CoreEvent::BlockRequested(screen) => {
                    if let Err(e) = host.present_block(&screen) {
                        log_host_error("present block screen", &e);
                    }
                }

                CoreEvent::ShieldChanged(policy) => {
                    if let Err(e) = host.apply_shield(&policy) {
                        log_host_error("apply shield", &e);
                    }
                }

                CoreEvent::DeadlineChanged { deadline } => {
                    // The main loop rearms from the engine on its next turn
                    debug!(deadline = ?deadline, "Deadline timer rearmed");
                }

                CoreEvent::RemoteCommandApplied {
                    command_id,
                    kind,
                    applied,
                } => {
                    state_changed = true;
                    ipc.broadcast_event(Event::new(EventPayload::RemoteCommandApplied {
                        command_id: command_id.to_string(),
                        kind,
                        applied,
                    }));
                }
            }
        }

        if state_changed {
            let permissions = host.permission_status().await;
            let state = engine.lock().await.get_state(permissions, focus_util::now());
            ipc.broadcast_event(Event::new(EventPayload::StateChanged(state)));
        }
    }

    async fn handle_ipc_message(
        engine: &Arc<Mutex<FocusEngine>>,
        host: &Arc<BridgeHost>,
        ipc: &Arc<IpcServer>,
        store: &Arc<dyn Store>,
        rate_limiter: &Arc<Mutex<RateLimiter<ClientId>>>,
        remote: &RemoteSync,
        msg: ServerMessage,
    ) {
        match msg {
            ServerMessage::Request { client_id, request } => {
                {
                    let mut limiter = rate_limiter.lock().await;
                    if !limiter.check(&client_id) {
                        let response = Response::error(
                            request.request_id,
                            ErrorInfo::new(ErrorCode::RateLimited, "Too many requests"),
                        );
                        let _ = ipc.send_response(&client_id, response).await;
                        return;
                    }
                }

                let announce_state = matches!(
                    request.command,
                    Command::ReportAuthorization { .. } | Command::SubscribeEvents
                );

                let (response, events) = Self::handle_command(
                    engine,
                    host,
                    ipc,
                    remote,
                    &client_id,
                    request.request_id,
                    request.command,
                )
                .await;

                let _ = ipc.send_response(&client_id, response).await;

                Self::publish(engine, host, ipc, events, announce_state).await;
            }

            ServerMessage::ClientConnected { client_id, info } => {
                info!(
                    client_id = %client_id,
                    role = ?info.role,
                    uid = ?info.uid,
                    "Client connected"
                );

                let _ = store.append_audit(AuditEvent::new(AuditEventType::ClientConnected {
                    client_id: client_id.to_string(),
                    role: format!("{:?}", info.role),
                    uid: info.uid,
                }));
            }

            ServerMessage::ClientDisconnected { client_id } => {
                debug!(client_id = %client_id, "Client disconnected");

                let _ = store.append_audit(AuditEvent::new(AuditEventType::ClientDisconnected {
                    client_id: client_id.to_string(),
                }));

                let mut limiter = rate_limiter.lock().await;
                limiter.remove(&client_id);
            }
        }
    }

    async fn handle_command(
        engine: &Arc<Mutex<FocusEngine>>,
        host: &Arc<BridgeHost>,
        ipc: &Arc<IpcServer>,
        remote: &RemoteSync,
        client_id: &ClientId,
        request_id: u64,
        command: Command,
    ) -> (Response, Vec<CoreEvent>) {
        let now = focus_util::now();
        let role = ipc
            .get_client_info(client_id)
            .await
            .map(|info| info.role)
            .unwrap_or(ClientRole::Observer);

        if !is_permitted(&role, &command) {
            warn!(client_id = %client_id, role = ?role, "Command refused for role");
            return (
                Response::error(
                    request_id,
                    ErrorInfo::new(ErrorCode::PermissionDenied, "Not allowed for this client"),
                ),
                Vec::new(),
            );
        }

        let ok = |payload: ResponsePayload| -> (Response, Vec<CoreEvent>) {
            (Response::success(request_id, payload), Vec::new())
        };
        let fail = |e: FocusError| -> (Response, Vec<CoreEvent>) {
            (error_response(request_id, &e), Vec::new())
        };

        match command {
            Command::GetState => {
                let permissions = host.permission_status().await;
                let state = engine.lock().await.get_state(permissions, now);
                ok(ResponsePayload::State(state))
            }

            Command::StartSession {
                ends_at,
                allowed_apps,
                friction,
            } => {
                let mut engine = engine.lock().await;
                match engine.start_session(ends_at, allowed_apps, friction, now) {
                    Ok((session, events)) => (
                        Response::success(request_id, ResponsePayload::Session(session)),
                        events,
                    ),
                    Err(e) => fail(e),
                }
            }

            Command::EndSession => {
                let mut engine = engine.lock().await;
                match engine.end_session(SessionEndReason::UserEnded, now) {
                    Ok(events) => (
                        Response::success(request_id, ResponsePayload::Session(engine.session())),
                        events,
                    ),
                    Err(e) => fail(e),
                }
            }

            Command::ConfigureApps { allowed_apps } => {
                let mut engine = engine.lock().await;
                match engine.configure_apps(allowed_apps, now) {
                    Ok(events) => (
                        Response::success(request_id, ResponsePayload::Session(engine.session())),
                        events,
                    ),
                    Err(e) => fail(e),
                }
            }

            Command::SetCardRequired { required } => {
                let mut engine = engine.lock().await;
                match engine.set_card_required(required, now) {
                    Ok(events) => (
                        Response::success(request_id, ResponsePayload::Session(engine.session())),
                        events,
                    ),
                    Err(e) => fail(e),
                }
            }

            Command::StartEmergencyException { duration_minutes } => {
                let mut engine = engine.lock().await;
                match engine.start_emergency_exception(duration_minutes, now) {
                    Ok((until, events)) => (
                        Response::success(request_id, ResponsePayload::EmergencyStarted { until }),
                        events,
                    ),
                    Err(e) => fail(e),
                }
            }

            Command::BeginHoldToUnlock => match engine.lock().await.begin_hold_to_unlock(now) {
                Ok(challenge) => ok(ResponsePayload::Challenge(challenge)),
                Err(e) => fail(e),
            },

            Command::CompleteHoldToUnlock { challenge } => {
                let mut engine = engine.lock().await;
                match engine.complete_hold_to_unlock(&challenge, now) {
                    Ok((progress, events)) => (
                        Response::success(request_id, ResponsePayload::Unlock(progress)),
                        events,
                    ),
                    Err(e) => fail(e),
                }
            }

            Command::BeginEmergencyUnlock => match engine.lock().await.begin_emergency_unlock(now) {
                Ok(challenge) => ok(ResponsePayload::Challenge(challenge)),
                Err(e) => fail(e),
            },

            Command::CompleteEmergencyUnlock { challenge } => {
                let mut engine = engine.lock().await;
                match engine.complete_emergency_unlock(&challenge, now) {
                    Ok((until, events)) => (
                        Response::success(request_id, ResponsePayload::EmergencyStarted { until }),
                        events,
                    ),
                    Err(e) => fail(e),
                }
            }

            Command::GetPermissions => ok(ResponsePayload::Permissions(
                host.permission_status().await,
            )),

            Command::RequestPermissions => match host.request_authorization().await {
                Ok(status) => ok(ResponsePayload::Permissions(status)),
                Err(e) => fail(FocusError::host(e.to_string())),
            },

            Command::ReportForeground {
                app_id,
                display_name,
            } => {
                let mut engine = engine.lock().await;
                let mut app = AppIdentifier::new(engine.config().host.platform, app_id);
                app.display_name = display_name;
                match engine.report_foreground(app, now) {
                    Ok(outcome) => (
                        Response::success(
                            request_id,
                            ResponsePayload::ForegroundDecision {
                                decision: outcome.decision,
                                block_screen: outcome.block_screen,
                            },
                        ),
                        outcome.events,
                    ),
                    Err(e) => fail(e),
                }
            }

            Command::ReportAuthorization { status } => {
                let gained = status.can_enforce() && !host.permission_status().await.can_enforce();
                host.update_permission_status(status);

                // Newly authorized: whatever was pushed before may not have stuck
                if gained {
                    match engine.lock().await.reconcile(now) {
                        Ok(events) => (Response::success(request_id, ResponsePayload::Ack), events),
                        Err(e) => fail(e),
                    }
                } else {
                    ok(ResponsePayload::Ack)
                }
            }

            Command::IngestRemoteCommand { command } => {
                match engine.lock().await.ingest_remote(&command, now) {
                    Ok(accepted) => ok(ResponsePayload::RemoteIngested { accepted }),
                    Err(e) => fail(e),
                }
            }

            Command::NotePendingCommand { command_id } => {
                let command_id = CommandId::new(command_id);
                match engine.lock().await.note_pending_command(&command_id) {
                    Ok(()) => {
                        // The fetched batch comes back through the service loop
                        if remote.request_poll() {
                            debug!(command_id = %command_id, "Polling for hinted command");
                        }
                        ok(ResponsePayload::Ack)
                    }
                    Err(e) => fail(e),
                }
            }

            Command::DrainRemoteCommands => {
                // Fetch without holding the engine
                let fetched = remote.fetch_now().await;
                match engine.lock().await.sync_remote(&fetched, now) {
                    Ok(report) => (
                        Response::success(
                            request_id,
                            ResponsePayload::RemoteDrained {
                                applied: report.applied,
                                rejected: report.rejected,
                            },
                        ),
                        report.events,
                    ),
                    Err(e) => fail(e),
                }
            }

            Command::RegisterPushToken { token } => {
                match engine.lock().await.register_push_token(&token) {
                    Ok(()) => ok(ResponsePayload::Ack),
                    Err(e) => fail(e),
                }
            }

            Command::OpenDeepLink { url } => match engine.lock().await.open_deep_link(&url) {
                Ok(route) => ok(ResponsePayload::Route { route: Some(route) }),
                Err(e) => fail(e),
            },

            Command::TakePendingRoute => match engine.lock().await.take_pending_route() {
                Ok(route) => ok(ResponsePayload::Route { route }),
                Err(e) => fail(e),
            },

            Command::SetFeaturedTask { title } => {
                match engine.lock().await.set_featured_task(title.as_deref()) {
                    Ok(()) => ok(ResponsePayload::Ack),
                    Err(e) => fail(e),
                }
            }

            Command::ShieldOpenAppRequested => {
                match engine.lock().await.shield_open_app_requested(now) {
                    Ok(()) => ok(ResponsePayload::Ack),
                    Err(e) => fail(e),
                }
            }

            Command::SubscribeEvents => {
                let response = Response::success(
                    request_id,
                    ResponsePayload::Subscribed {
                        client_id: client_id.clone(),
                    },
                );

                // A shim that (re)connects needs the current block-set
                if role.can_report_host_state() {
                    match engine.lock().await.reconcile(now) {
                        Ok(events) => return (response, events),
                        Err(e) => warn!(error = %e, "Failed to reconcile for new subscriber"),
                    }
                }
                (response, Vec::new())
            }

            Command::UnsubscribeEvents => ok(ResponsePayload::Unsubscribed),

            Command::GetHealth => {
                let store_ok = engine.lock().await.is_healthy();
                let health = HealthStatus {
                    live: true,
                    ready: true,
                    host_adapter_ok: host.is_healthy(),
                    store_ok,
                };
                ok(ResponsePayload::Health(health))
            }

            Command::Ping => ok(ResponsePayload::Pong),
        }
    }
}

/// Whether a client with this role may issue the command
fn is_permitted(role: &ClientRole, command: &Command) -> bool {
    match command {
        Command::StartSession { .. }
        | Command::EndSession
        | Command::ConfigureApps { .. }
        | Command::SetCardRequired { .. }
        | Command::StartEmergencyException { .. }
        | Command::BeginHoldToUnlock
        | Command::CompleteHoldToUnlock { .. }
        | Command::BeginEmergencyUnlock
        | Command::CompleteEmergencyUnlock { .. }
        | Command::RequestPermissions
        | Command::DrainRemoteCommands
        | Command::RegisterPushToken { .. }
        | Command::OpenDeepLink { .. }
        | Command::TakePendingRoute
        | Command::SetFeaturedTask { .. } => role.can_control_session(),

        Command::ReportForeground { .. }
        | Command::ReportAuthorization { .. }
        | Command::ShieldOpenAppRequested => role.can_report_host_state(),

        Command::IngestRemoteCommand { .. } | Command::NotePendingCommand { .. } => {
            role.can_ingest_remote()
        }

        Command::GetState
        | Command::GetPermissions
        | Command::SubscribeEvents
        | Command::UnsubscribeEvents
        | Command::GetHealth
        | Command::Ping => true,
    }
}

fn error_code(e: &FocusError) -> ErrorCode {
    match e {
        FocusError::CardRequiredBlocksEmergency => ErrorCode::CardRequired,
        FocusError::StillHolding { .. } => ErrorCode::StillHolding,
        FocusError::TooEarly { .. } => ErrorCode::TooEarly,
        FocusError::NoActiveSession => ErrorCode::NoActiveSession,
        FocusError::InvalidArgument(_) => ErrorCode::InvalidRequest,
        FocusError::ConfigError(_) => ErrorCode::ConfigError,
        FocusError::StoreError(_) => ErrorCode::StoreError,
        FocusError::HostError(_) => ErrorCode::HostError,
        FocusError::PermissionDenied(_) => ErrorCode::PermissionDenied,
        FocusError::RateLimited => ErrorCode::RateLimited,
        FocusError::IpcError(_) | FocusError::Internal(_) => ErrorCode::InternalError,
    }
}

fn error_response(request_id: u64, e: &FocusError) -> Response {
    if e.is_policy_violation() {
        debug!(error = %e, "Request refused by policy");
    } else {
        warn!(error = %e, "Request failed");
    }
    Response::error(request_id, ErrorInfo::new(error_code(e), e.to_string()))
}

fn log_host_error(action: &str, e: &HostError) {
    match e {
        HostError::Disconnected => {
            debug!(action, "No platform shim subscribed, request not delivered");
        }
        other => warn!(action, error = %other, "Host request failed"),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();

    info!(version = env!("CARGO_PKG_VERSION"), "focusd starting");

    let service = Service::new(&args).await?;
    service.run().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use focus_api::{FrictionChallenge, PermissionStatus};

    #[test]
    fn policy_errors_map_to_their_codes() {
        assert_eq!(
            error_code(&FocusError::CardRequiredBlocksEmergency),
            ErrorCode::CardRequired
        );
        assert_eq!(
            error_code(&FocusError::StillHolding { remaining_secs: 2 }),
            ErrorCode::StillHolding
        );
        assert_eq!(
            error_code(&FocusError::TooEarly { remaining_secs: 5 }),
            ErrorCode::TooEarly
        );
        assert_eq!(error_code(&FocusError::NoActiveSession), ErrorCode::NoActiveSession);
        assert_eq!(error_code(&FocusError::invalid("x")), ErrorCode::InvalidRequest);
        assert_eq!(error_code(&FocusError::store("disk")), ErrorCode::StoreError);
        assert_eq!(error_code(&FocusError::internal("?")), ErrorCode::InternalError);
    }

    #[test]
    fn observers_cannot_mutate() {
        let observer = ClientRole::Observer;
        assert!(!is_permitted(&observer, &Command::EndSession));
        assert!(is_permitted(&ClientRole::Shell, &Command::EndSession));
        assert!(!is_permitted(
            &observer,
            &Command::ReportAuthorization {
                status: PermissionStatus::authorized("ok"),
            }
        ));
        assert!(is_permitted(&observer, &Command::GetState));
    }

    #[test]
    fn only_admin_ingests_remote() {
        let command = Command::NotePendingCommand {
            command_id: "c1".into(),
        };
        assert!(is_permitted(&ClientRole::Admin, &command));
        assert!(!is_permitted(&ClientRole::Shell, &command));
    }

    #[test]
    fn hold_completion_needs_control() {
        let command = Command::CompleteHoldToUnlock {
            challenge: FrictionChallenge {
                kind: focus_api::ChallengeKind::HoldToUnlock,
                started_at: focus_util::now(),
                required_seconds: 3,
                unlock_at: None,
            },
        };
        assert!(is_permitted(&ClientRole::Shell, &command));
        assert!(!is_permitted(&ClientRole::Observer, &command));
    }

    #[test]
    fn parses_cli_overrides() {
        let args = Args::try_parse_from([
            "focusd",
            "--config",
            "/tmp/focus.toml",
            "--socket",
            "/tmp/focusd.sock",
            "--log-level",
            "debug",
        ])
        .unwrap();
        assert_eq!(args.config, PathBuf::from("/tmp/focus.toml"));
        assert_eq!(args.socket, Some(PathBuf::from("/tmp/focusd.sock")));
        assert_eq!(args.log_level, "debug");
    }
}
