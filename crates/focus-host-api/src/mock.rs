//! Mock host adapter for testing

use async_trait::async_trait;
use focus_api::{BlockScreen, Platform, PermissionStatus, ShieldPolicy};
use std::sync::{Arc, Mutex};

use crate::{BlockSurface, HostAdapter, HostCapabilities, HostError, HostResult, ShieldController};

/// Mock host adapter for unit/integration testing.
///
/// Records every presented block screen and pushed shield policy.
pub struct MockHost {
    capabilities: HostCapabilities,
    status: Mutex<PermissionStatus>,
    screens: Mutex<Vec<BlockScreen>>,
    shields: Mutex<Vec<ShieldPolicy>>,

    /// Configure presenting/applying to fail
    pub fail_enforcement: Arc<Mutex<bool>>,

    /// Status the next authorization request resolves to
    pub grant_on_request: Arc<Mutex<Option<PermissionStatus>>>,
}

impl MockHost {
    pub fn new() -> Self {
        Self::with_capabilities(HostCapabilities::for_platform(Platform::Android))
    }

    pub fn with_capabilities(capabilities: HostCapabilities) -> Self {
        Self {
            capabilities,
            status: Mutex::new(PermissionStatus::authorized("mock")),
            screens: Mutex::new(Vec::new()),
            shields: Mutex::new(Vec::new()),
            fail_enforcement: Arc::new(Mutex::new(false)),
            grant_on_request: Arc::new(Mutex::new(None)),
        }
    }

    pub fn set_permission_status(&self, status: PermissionStatus) {
        *self.status.lock().unwrap() = status;
    }

    /// Block screens presented so far, oldest first
    pub fn presented_screens(&self) -> Vec<BlockScreen> {
        self.screens.lock().unwrap().clone()
    }

    /// Shield policies pushed so far, oldest first
    pub fn pushed_shields(&self) -> Vec<ShieldPolicy> {
        self.shields.lock().unwrap().clone()
    }

    pub fn last_shield(&self) -> Option<ShieldPolicy> {
        self.shields.lock().unwrap().last().cloned()
    }

    fn check_failure(&self) -> HostResult<()> {
        if *self.fail_enforcement.lock().unwrap() {
            return Err(HostError::Internal("Mock enforcement failure".into()));
        }
        Ok(())
    }
}

impl Default for MockHost {
    fn default() -> Self {
        Self::new()
    }
}

impl BlockSurface for MockHost {
    fn present_block(&self, screen: &BlockScreen) -> HostResult<()> {
        self.check_failure()?;
        self.screens.lock().unwrap().push(screen.clone());
        Ok(())
    }
}

impl ShieldController for MockHost {
    fn apply_shield(&self, policy: &ShieldPolicy) -> HostResult<()> {
        self.check_failure()?;
        self.shields.lock().unwrap().push(policy.clone());
        Ok(())
    }
}

#[async_trait]
impl HostAdapter for MockHost {
    fn capabilities(&self) -> &HostCapabilities {
        &self.capabilities
    }

    async fn permission_status(&self) -> PermissionStatus {
        self.status.lock().unwrap().clone()
    }

    async fn request_authorization(&self) -> HostResult<PermissionStatus> {
        let granted = self.grant_on_request.lock().unwrap().take();
        if let Some(status) = granted {
            self.set_permission_status(status);
        }
        Ok(self.status.lock().unwrap().clone())
    }
}
