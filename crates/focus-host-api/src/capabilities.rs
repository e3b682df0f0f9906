//! Host capabilities model

use focus_api::{EnforcementMode, Platform};
use serde::{Deserialize, Serialize};

/// Describes what a host adapter can do
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostCapabilities {
    pub platform: Platform,

    /// How decisions reach the device
    pub enforcement: EnforcementMode,

    /// Receives foreground-app transitions
    pub can_observe_foreground: bool,

    /// Can draw a block screen over another app
    pub can_present_block_surface: bool,

    /// Can hand a block-set to the OS restriction subsystem
    pub can_apply_shield: bool,

    /// Can show the OS authorization prompt
    pub can_request_authorization: bool,

    /// Can schedule an OS-level wake-up for the session deadline.
    /// Without it the deadline timer only runs while the host process lives.
    pub can_schedule_deadline: bool,
}

impl HostCapabilities {
    /// Accessibility-service style host: sees every foreground change
    pub fn event_driven(platform: Platform) -> Self {
        Self {
            platform,
            enforcement: EnforcementMode::EventDriven,
            can_observe_foreground: true,
            can_present_block_surface: true,
            can_apply_shield: false,
            can_request_authorization: true,
            can_schedule_deadline: false,
        }
    }

    /// Screen Time style host: one block-set, the OS intercepts
    pub fn declarative(platform: Platform) -> Self {
        Self {
            platform,
            enforcement: EnforcementMode::Declarative,
            can_observe_foreground: false,
            can_present_block_surface: false,
            can_apply_shield: true,
            can_request_authorization: true,
            can_schedule_deadline: false,
        }
    }

    /// Native capabilities for a platform
    pub fn for_platform(platform: Platform) -> Self {
        Self::with_enforcement(platform, platform.native_enforcement())
    }

    pub fn with_enforcement(platform: Platform, enforcement: EnforcementMode) -> Self {
        match enforcement {
            EnforcementMode::EventDriven => Self::event_driven(platform),
            EnforcementMode::Declarative => Self::declarative(platform),
        }
    }

    /// Whether this host can carry out the given enforcement mode at all
    pub fn supports(&self, mode: EnforcementMode) -> bool {
        match mode {
            EnforcementMode::EventDriven => {
                self.can_observe_foreground && self.can_present_block_surface
            }
            EnforcementMode::Declarative => self.can_apply_shield,
        }
    }
}

impl Default for HostCapabilities {
    fn default() -> Self {
        Self::for_platform(Platform::Android)
    }
}
