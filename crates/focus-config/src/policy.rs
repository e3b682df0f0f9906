//! Validated configuration structures

use crate::schema::{RawConfig, RawFrictionConfig, RawHostConfig, RawRemoteConfig, RawServiceConfig};
use crate::validation::{
    MAX_EMERGENCY_UNLOCK_MINUTES, MAX_HOLD_TO_UNLOCK_SECONDS, MAX_UNLOCK_DELAY_SECONDS,
};
use focus_api::{EnforcementMode, FrictionConfig, Platform};
use std::path::PathBuf;
use std::time::Duration;

/// Validated configuration ready for use by the core engine
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub service: ServiceConfig,
    pub host: HostConfig,
    /// Friction for sessions started without one
    pub default_friction: FrictionConfig,
    pub remote: RemoteConfig,
}

impl EngineConfig {
    /// Convert from raw config (after validation)
    pub fn from_raw(raw: RawConfig) -> Self {
        Self {
            service: ServiceConfig::from_raw(raw.service),
            host: HostConfig::from_raw(raw.host),
            default_friction: friction_from_raw(&raw.friction),
            remote: RemoteConfig::from_raw(raw.remote),
        }
    }

    /// Configuration for a host app with every other setting defaulted
    pub fn for_host(platform: Platform, app_id: impl Into<String>) -> Self {
        Self {
            service: ServiceConfig::default(),
            host: HostConfig {
                platform,
                app_id: app_id.into(),
                enforcement: platform.native_enforcement(),
                deadline_timer: true,
            },
            default_friction: FrictionConfig::default(),
            remote: RemoteConfig::default(),
        }
    }
}

/// Service configuration
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub socket_path: PathBuf,
    pub data_dir: PathBuf,
}

impl ServiceConfig {
    fn from_raw(raw: RawServiceConfig) -> Self {
        let defaults = Self::default();
        Self {
            socket_path: raw.socket_path.unwrap_or(defaults.socket_path),
            data_dir: raw.data_dir.unwrap_or(defaults.data_dir),
        }
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            socket_path: focus_util::socket_path_without_env(),
            data_dir: focus_util::data_dir_without_env(),
        }
    }
}

/// Host configuration
#[derive(Debug, Clone)]
pub struct HostConfig {
    pub platform: Platform,
    /// The engine's own app; always allowed
    pub app_id: String,
    pub enforcement: EnforcementMode,
    pub deadline_timer: bool,
}

impl HostConfig {
    fn from_raw(raw: RawHostConfig) -> Self {
        let platform = raw.platform.unwrap_or(Platform::Android);
        Self {
            platform,
            app_id: raw.app_id.map(|id| id.trim().to_string()).unwrap_or_default(),
            enforcement: raw
                .enforcement
                .unwrap_or_else(|| platform.native_enforcement()),
            deadline_timer: raw.deadline_timer.unwrap_or(true),
        }
    }
}

/// Remote command settings
#[derive(Debug, Clone)]
pub struct RemoteConfig {
    pub poll_url: Option<String>,
    pub poll_timeout: Duration,
    pub tombstone_retention: Duration,
}

impl RemoteConfig {
    pub const DEFAULT_POLL_TIMEOUT_SECS: u64 = 10;
    pub const DEFAULT_TOMBSTONE_RETENTION_DAYS: u32 = 30;

    fn from_raw(raw: RawRemoteConfig) -> Self {
        let retention_days = raw
            .tombstone_retention_days
            .unwrap_or(Self::DEFAULT_TOMBSTONE_RETENTION_DAYS);
        Self {
            poll_url: raw.poll_url,
            poll_timeout: Duration::from_secs(
                raw.poll_timeout_seconds
                    .unwrap_or(Self::DEFAULT_POLL_TIMEOUT_SECS),
            ),
            tombstone_retention: days(retention_days),
        }
    }
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            poll_url: None,
            poll_timeout: Duration::from_secs(Self::DEFAULT_POLL_TIMEOUT_SECS),
            tombstone_retention: days(Self::DEFAULT_TOMBSTONE_RETENTION_DAYS),
        }
    }
}

fn days(n: u32) -> Duration {
    Duration::from_secs(u64::from(n) * 24 * 3600)
}

fn friction_from_raw(raw: &RawFrictionConfig) -> FrictionConfig {
    let defaults = FrictionConfig::default();
    FrictionConfig {
        hold_to_unlock_seconds: raw
            .hold_to_unlock_seconds
            .unwrap_or(defaults.hold_to_unlock_seconds),
        unlock_delay_seconds: raw
            .unlock_delay_seconds
            .unwrap_or(defaults.unlock_delay_seconds),
        emergency_unlock_minutes: raw
            .emergency_unlock_minutes
            .unwrap_or(defaults.emergency_unlock_minutes),
    }
}

/// Clamp caller-supplied friction (UI or remote) into the configured bounds
pub fn clamp_friction(friction: FrictionConfig) -> FrictionConfig {
    FrictionConfig {
        hold_to_unlock_seconds: friction
            .hold_to_unlock_seconds
            .min(MAX_HOLD_TO_UNLOCK_SECONDS),
        unlock_delay_seconds: friction.unlock_delay_seconds.min(MAX_UNLOCK_DELAY_SECONDS),
        emergency_unlock_minutes: friction
            .emergency_unlock_minutes
            .min(MAX_EMERGENCY_UNLOCK_MINUTES),
    }
}
