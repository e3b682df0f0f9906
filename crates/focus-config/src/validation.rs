//! Configuration validation

use crate::schema::{RawConfig, RawFrictionConfig, RawHostConfig, RawRemoteConfig};
use thiserror::Error;

/// Upper bound on the hold-to-unlock duration
pub const MAX_HOLD_TO_UNLOCK_SECONDS: u32 = 600;

/// Upper bound on the cooling-off countdown
pub const MAX_UNLOCK_DELAY_SECONDS: u32 = 3600;

/// Upper bound on one emergency exception window
pub const MAX_EMERGENCY_UNLOCK_MINUTES: u32 = 240;

/// Validation error
#[derive(Debug, Clone, Error)]
pub enum ValidationError {
    #[error("[host] app_id is required so the engine never blocks itself")]
    MissingHostAppId,

    #[error("[friction] {field} = {value} exceeds the maximum of {max}")]
    FrictionOutOfRange {
        field: &'static str,
        value: u32,
        max: u32,
    },

    #[error("[remote] poll_url '{0}' must be an http(s) URL")]
    InvalidPollUrl(String),

    #[error("[remote] {0} must be greater than zero")]
    ZeroRemoteSetting(&'static str),
}

/// Validate a raw configuration
pub fn validate_config(config: &RawConfig) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    errors.extend(validate_host(&config.host));
    errors.extend(validate_friction(&config.friction));
    errors.extend(validate_remote(&config.remote));

    errors
}

fn validate_host(host: &RawHostConfig) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    let app_id_present = host
        .app_id
        .as_deref()
        .is_some_and(|id| !id.trim().is_empty());
    if !app_id_present {
        errors.push(ValidationError::MissingHostAppId);
    }

    errors
}

fn validate_friction(friction: &RawFrictionConfig) -> Vec<ValidationError> {
    let checks = [
        (
            "hold_to_unlock_seconds",
            friction.hold_to_unlock_seconds,
            MAX_HOLD_TO_UNLOCK_SECONDS,
        ),
        (
            "unlock_delay_seconds",
            friction.unlock_delay_seconds,
            MAX_UNLOCK_DELAY_SECONDS,
        ),
        (
            "emergency_unlock_minutes",
            friction.emergency_unlock_minutes,
            MAX_EMERGENCY_UNLOCK_MINUTES,
        ),
    ];

    checks
        .into_iter()
        .filter_map(|(field, value, max)| match value {
            Some(value) if value > max => {
                Some(ValidationError::FrictionOutOfRange { field, value, max })
            }
            _ => None,
        })
        .collect()
}

fn validate_remote(remote: &RawRemoteConfig) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    if let Some(url) = &remote.poll_url
        && !(url.starts_with("http://") || url.starts_with("https://"))
    {
        errors.push(ValidationError::InvalidPollUrl(url.clone()));
    }

    if remote.poll_timeout_seconds == Some(0) {
        errors.push(ValidationError::ZeroRemoteSetting("poll_timeout_seconds"));
    }

    if remote.tombstone_retention_days == Some(0) {
        errors.push(ValidationError::ZeroRemoteSetting("tombstone_retention_days"));
    }

    errors
}
