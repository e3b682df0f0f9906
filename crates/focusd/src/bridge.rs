//! Host adapter backed by the platform shim
//!
//! The accessibility service (Android) or Screen Time extension (iOS) connects
//! to focusd as an ordinary IPC client. Enforcement requests go out to it as
//! broadcast events; authorization state comes back as `report_authorization`
//! commands and is cached here.

use async_trait::async_trait;
use focus_api::{BlockScreen, Event, EventPayload, PermissionStatus, ShieldPolicy};
use focus_host_api::{
    BlockSurface, HostAdapter, HostCapabilities, HostError, HostResult, ShieldController,
};
use std::sync::RwLock;
use tokio::sync::broadcast;
use tracing::{debug, info};

pub struct BridgeHost {
    capabilities: HostCapabilities,
    events: broadcast::Sender<Event>,
    status: RwLock<PermissionStatus>,
}

impl BridgeHost {
    pub fn new(capabilities: HostCapabilities, events: broadcast::Sender<Event>) -> Self {
        Self {
            capabilities,
            events,
            status: RwLock::new(PermissionStatus::not_authorized(
                "waiting for the platform shim to report",
            )),
        }
    }

    /// Record the authorization state reported by the shim
    pub fn update_permission_status(&self, status: PermissionStatus) {
        info!(
            supported = status.is_supported,
            authorized = status.is_authorized,
            "Authorization state reported"
        );
        let mut guard = self.status.write().unwrap_or_else(|e| e.into_inner());
        *guard = status;
    }

    fn cached_status(&self) -> PermissionStatus {
        self.status
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    fn publish(&self, payload: EventPayload) -> HostResult<()> {
        // No receivers means no shim is subscribed
        self.events
            .send(Event::new(payload))
            .map(|receivers| debug!(receivers, "Enforcement request published"))
            .map_err(|_| HostError::Disconnected)
    }
}

impl BlockSurface for BridgeHost {
    fn present_block(&self, screen: &BlockScreen) -> HostResult<()> {
        if !self.capabilities.can_present_block_surface {
            return Err(HostError::Unsupported("block surface".into()));
        }
        self.publish(EventPayload::BlockRequested(screen.clone()))
    }
}

impl ShieldController for BridgeHost {
    fn apply_shield(&self, policy: &ShieldPolicy) -> HostResult<()> {
        if !self.capabilities.can_apply_shield {
            return Err(HostError::Unsupported("shield".into()));
        }
        self.publish(EventPayload::ShieldUpdated(policy.clone()))
    }
}

#[async_trait]
impl HostAdapter for BridgeHost {
    fn capabilities(&self) -> &HostCapabilities {
        &self.capabilities
    }

    async fn permission_status(&self) -> PermissionStatus {
        self.cached_status()
    }

    /// Ask the shim to run the OS prompt. The answer arrives later through
    /// `report_authorization`; until then the cached state is returned.
    async fn request_authorization(&self) -> HostResult<PermissionStatus> {
        if !self.capabilities.can_request_authorization {
            return Ok(PermissionStatus::unsupported("authorization prompt unavailable"));
        }
        self.publish(EventPayload::PermissionsRequested)?;
        Ok(self.cached_status())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use focus_api::{AppIdentifier, FrictionConfig, Platform};

    fn screen() -> BlockScreen {
        BlockScreen {
            app: AppIdentifier::android("com.social.app"),
            friction: FrictionConfig::default(),
            ends_at: None,
            headline: "Not right now.".into(),
            featured_task: None,
            emergency_available: true,
        }
    }

    #[test]
    fn block_request_reaches_subscriber() {
        let (tx, mut rx) = broadcast::channel(8);
        let host = BridgeHost::new(HostCapabilities::event_driven(Platform::Android), tx);

        host.present_block(&screen()).unwrap();
        let event = rx.try_recv().unwrap();
        assert!(matches!(event.payload, EventPayload::BlockRequested(s) if s.app.id == "com.social.app"));
    }

    #[test]
    fn no_subscriber_is_disconnected() {
        let (tx, rx) = broadcast::channel(8);
        drop(rx);
        let host = BridgeHost::new(HostCapabilities::declarative(Platform::Ios), tx);
        assert!(matches!(
            host.apply_shield(&ShieldPolicy::Clear),
            Err(HostError::Disconnected)
        ));
    }

    #[test]
    fn declarative_host_has_no_block_surface() {
        let (tx, _rx) = broadcast::channel(8);
        let host = BridgeHost::new(HostCapabilities::declarative(Platform::Ios), tx);
        assert!(matches!(
            host.present_block(&screen()),
            Err(HostError::Unsupported(_))
        ));
    }

    #[tokio::test]
    async fn authorization_is_cached_from_reports() {
        let (tx, mut rx) = broadcast::channel(8);
        let host = BridgeHost::new(HostCapabilities::event_driven(Platform::Android), tx);
        assert!(!host.permission_status().await.is_authorized);

        let pending = host.request_authorization().await.unwrap();
        assert!(!pending.is_authorized);
        assert!(matches!(
            rx.try_recv().unwrap().payload,
            EventPayload::PermissionsRequested
        ));

        host.update_permission_status(PermissionStatus::authorized("accessibility service on"));
        assert!(host.permission_status().await.can_enforce());
    }
}
