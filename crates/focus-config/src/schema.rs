//! Raw configuration schema (as parsed from TOML)

use focus_api::{EnforcementMode, Platform};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Raw configuration as parsed from TOML
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RawConfig {
    /// Config schema version
    pub config_version: u32,

    #[serde(default)]
    pub service: RawServiceConfig,

    #[serde(default)]
    pub host: RawHostConfig,

    /// Friction applied to sessions started without an explicit config
    #[serde(default)]
    pub friction: RawFrictionConfig,

    #[serde(default)]
    pub remote: RawRemoteConfig,
}

/// Service-level settings
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawServiceConfig {
    /// IPC socket path (default: $XDG_RUNTIME_DIR/focusd/focusd.sock)
    pub socket_path: Option<PathBuf>,

    /// Data directory for the session store
    pub data_dir: Option<PathBuf>,
}

/// The platform the engine enforces on
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawHostConfig {
    /// Defaults to android
    pub platform: Option<Platform>,

    /// Package or bundle id of the engine's own host application
    pub app_id: Option<String>,

    /// Defaults to the platform's native style
    pub enforcement: Option<EnforcementMode>,

    /// Arm an in-process timer for the nearest deadline (default true)
    pub deadline_timer: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawFrictionConfig {
    pub hold_to_unlock_seconds: Option<u32>,
    pub unlock_delay_seconds: Option<u32>,
    pub emergency_unlock_minutes: Option<u32>,
}

/// Out-of-band command delivery
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawRemoteConfig {
    /// HTTP endpoint returning pending commands as a JSON array
    pub poll_url: Option<String>,

    /// Default 10
    pub poll_timeout_seconds: Option<u64>,

    /// How long consumed command ids are remembered (default 30)
    pub tombstone_retention_days: Option<u32>,
}
