//! Persisted session layout
//!
//! The session lives as separate scalar keys so the platform shim can read a
//! single field without understanding the whole record. Structured fields
//! (allowlist, friction) are JSON strings. Decoding is lenient: any field
//! that fails to parse takes its default and the rest of the record survives.

use focus_api::{AppIdentifier, FrictionConfig, Platform, Session};
use focus_util::{from_epoch_millis, to_epoch_millis};
use serde_json::Value;
use std::collections::{BTreeSet, HashMap};
use tracing::warn;

pub const KEY_ACTIVE: &str = "session.active";
pub const KEY_ENDS_AT: &str = "session.ends_at_millis";
pub const KEY_ALLOWED_APPS: &str = "session.allowed_apps_json";
pub const KEY_FRICTION: &str = "session.friction_json";
pub const KEY_EMERGENCY_UNTIL: &str = "session.emergency_until_millis";
pub const KEY_CARD_REQUIRED: &str = "session.card_required";

/// Every key that belongs to the session record
pub const SESSION_KEYS: [&str; 6] = [
    KEY_ACTIVE,
    KEY_ENDS_AT,
    KEY_ALLOWED_APPS,
    KEY_FRICTION,
    KEY_EMERGENCY_UNTIL,
    KEY_CARD_REQUIRED,
];

/// Build a session from raw persisted values, substituting defaults for
/// anything missing or malformed.
pub fn decode_session(values: &HashMap<String, String>) -> Session {
    let get = |key: &str| values.get(key).map(String::as_str);

    let session = Session {
        active: get(KEY_ACTIVE).is_some_and(parse_bool),
        ends_at: get(KEY_ENDS_AT).and_then(|v| parse_instant(KEY_ENDS_AT, v)),
        allowed_apps: get(KEY_ALLOWED_APPS)
            .map(decode_allowed_apps)
            .unwrap_or_default(),
        friction: get(KEY_FRICTION).map(decode_friction).unwrap_or_default(),
        emergency_until: get(KEY_EMERGENCY_UNTIL)
            .and_then(|v| parse_instant(KEY_EMERGENCY_UNTIL, v)),
        card_required: get(KEY_CARD_REQUIRED).is_some_and(parse_bool),
    };

    session.normalized()
}

/// Key/value pairs to persist; `None` means the key is removed
pub fn encode_session(session: &Session) -> Vec<(&'static str, Option<String>)> {
    let allowed: Vec<&AppIdentifier> = session.allowed_apps.iter().collect();
    let allowed_json = serde_json::to_string(&allowed).unwrap_or_else(|_| "[]".to_string());
    let friction_json = serde_json::to_string(&session.friction).ok();

    vec![
        (KEY_ACTIVE, Some(session.active.to_string())),
        (
            KEY_ENDS_AT,
            session.ends_at.map(|t| to_epoch_millis(&t).to_string()),
        ),
        (
            KEY_ALLOWED_APPS,
            session.active.then_some(allowed_json),
        ),
        (KEY_FRICTION, session.active.then_some(friction_json).flatten()),
        (
            KEY_EMERGENCY_UNTIL,
            session
                .emergency_until
                .map(|t| to_epoch_millis(&t).to_string()),
        ),
        (KEY_CARD_REQUIRED, Some(session.card_required.to_string())),
    ]
}

/// Parse an allowlist array. Malformed JSON yields an empty list; entries
/// that are not objects, have a blank id, or name an unknown platform are
/// skipped individually.
pub fn decode_allowed_apps(raw: &str) -> BTreeSet<AppIdentifier> {
    let parsed = serde_json::from_str::<Value>(raw)
        .ok()
        .and_then(|value| decode_app_list(&value));

    parsed.unwrap_or_else(|| {
        warn!(raw_len = raw.len(), "Malformed allowlist, using empty allowlist");
        BTreeSet::new()
    })
}

/// Parse an already-decoded allowlist array with the same per-entry rules.
/// Returns `None` when the value is not an array.
pub fn decode_app_list(value: &Value) -> Option<BTreeSet<AppIdentifier>> {
    let entries = value.as_array()?;
    Some(entries.iter().filter_map(decode_app_entry).collect())
}

fn decode_app_entry(entry: &Value) -> Option<AppIdentifier> {
    let obj = entry.as_object()?;

    let id = obj.get("id")?.as_str()?.trim();
    if id.is_empty() {
        return None;
    }

    let platform = match obj.get("platform")?.as_str()? {
        "android" => Platform::Android,
        "ios" => Platform::Ios,
        _ => return None,
    };

    let display_name = obj
        .get("displayName")
        .and_then(Value::as_str)
        .filter(|name| !name.trim().is_empty())
        .map(str::to_string);

    Some(AppIdentifier {
        platform,
        id: id.to_string(),
        display_name,
    })
}

/// Parse friction, falling back to the documented defaults on any error
pub fn decode_friction(raw: &str) -> FrictionConfig {
    match serde_json::from_str::<FrictionConfig>(raw) {
        Ok(friction) => friction,
        Err(e) => {
            warn!(error = %e, "Malformed friction config, using defaults");
            FrictionConfig::default()
        }
    }
}

fn parse_bool(raw: &str) -> bool {
    matches!(raw.trim(), "true" | "1")
}

fn parse_instant(key: &str, raw: &str) -> Option<chrono::DateTime<chrono::Local>> {
    match raw.trim().parse::<i64>() {
        Ok(millis) => from_epoch_millis(millis),
        Err(_) => {
            warn!(key, "Malformed timestamp, treating as unset");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn values(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn empty_record_is_default_session() {
        assert_eq!(decode_session(&HashMap::new()), Session::default());
    }

    #[test]
    fn allowlist_skips_bad_entries() {
        let apps = decode_allowed_apps(
            r#"[
                {"platform": "android", "id": "com.phone.dialer", "displayName": "Phone"},
                {"platform": "android", "id": "   "},
                "not an object",
                {"platform": "windows", "id": "notepad"},
                {"platform": "ios", "id": "com.apple.mobilephone"}
            ]"#,
        );

        assert_eq!(apps.len(), 2);
        let dialer = apps.iter().find(|a| a.id == "com.phone.dialer").unwrap();
        assert_eq!(dialer.display_name.as_deref(), Some("Phone"));
    }

    #[test]
    fn malformed_allowlist_is_empty() {
        assert!(decode_allowed_apps("{not json").is_empty());
        assert!(decode_allowed_apps(r#"{"id": "x"}"#).is_empty());
    }

    #[test]
    fn malformed_friction_uses_defaults() {
        assert_eq!(decode_friction("garbage"), FrictionConfig::default());
        assert_eq!(
            decode_friction(r#"{"holdToUnlockSeconds": -4}"#),
            FrictionConfig::default()
        );
    }

    #[test]
    fn corrupt_fields_do_not_poison_the_record() {
        let ends_at = chrono::Local.with_ymd_and_hms(2025, 6, 1, 10, 0, 0).unwrap();
        let millis = to_epoch_millis(&ends_at).to_string();
        let session = decode_session(&values(&[
            (KEY_ACTIVE, "true"),
            (KEY_ENDS_AT, &millis),
            (KEY_ALLOWED_APPS, "[[["),
            (KEY_FRICTION, "{oops"),
            (KEY_EMERGENCY_UNTIL, "soon"),
        ]));

        assert!(session.active);
        assert_eq!(session.ends_at, Some(ends_at));
        assert!(session.allowed_apps.is_empty());
        assert_eq!(session.friction, FrictionConfig::default());
        assert!(session.emergency_until.is_none());
    }

    #[test]
    fn card_required_hides_persisted_exception() {
        let until = chrono::Local.with_ymd_and_hms(2025, 6, 1, 10, 0, 0).unwrap();
        let millis = to_epoch_millis(&until).to_string();
        let session = decode_session(&values(&[
            (KEY_ACTIVE, "true"),
            (KEY_EMERGENCY_UNTIL, &millis),
            (KEY_CARD_REQUIRED, "true"),
        ]));

        assert!(session.card_required);
        assert!(session.emergency_until.is_none());
    }

    #[test]
    fn encode_then_decode_active_session() {
        let session = Session {
            active: true,
            ends_at: Some(chrono::Local.with_ymd_and_hms(2025, 6, 1, 10, 0, 0).unwrap()),
            allowed_apps: [AppIdentifier::android("com.phone.dialer").with_display_name("Phone")]
                .into_iter()
                .collect(),
            friction: FrictionConfig {
                hold_to_unlock_seconds: 5,
                unlock_delay_seconds: 20,
                emergency_unlock_minutes: 1,
            },
            emergency_until: None,
            card_required: false,
        };

        let stored: HashMap<String, String> = encode_session(&session)
            .into_iter()
            .filter_map(|(k, v)| v.map(|v| (k.to_string(), v)))
            .collect();

        assert!(!stored.contains_key(KEY_EMERGENCY_UNTIL));
        assert_eq!(decode_session(&stored), session);
    }

    #[test]
    fn inactive_session_removes_scoped_keys() {
        let encoded = encode_session(&Session {
            card_required: true,
            ..Session::default()
        });
        let removed: Vec<&str> = encoded
            .iter()
            .filter(|(_, v)| v.is_none())
            .map(|(k, _)| *k)
            .collect();

        assert!(removed.contains(&KEY_ALLOWED_APPS));
        assert!(removed.contains(&KEY_FRICTION));
        assert!(removed.contains(&KEY_ENDS_AT));
    }
}
