//! Wall-clock utilities for focusd
//!
//! Every deadline in the engine (session end, emergency window, unlock delay)
//! is an absolute wall-clock instant, because it has to survive process
//! restarts and be shared with a second OS process through persisted storage.
//! Deadlines are persisted as milliseconds since the Unix epoch.
//!
//! # Mock Time for Development
//!
//! In debug builds, `FOCUS_MOCK_TIME` overrides the system time for all
//! time-sensitive operations. Format: `YYYY-MM-DD HH:MM:SS`.
//!
//! ```bash
//! FOCUS_MOCK_TIME="2025-12-25 14:30:00" cargo run -p focusd
//! ```

use chrono::{DateTime, Local, NaiveDateTime, SubsecRound, TimeZone, Timelike};
use std::sync::OnceLock;
use std::time::Duration;

/// Environment variable name for mock time (debug builds only)
pub const MOCK_TIME_ENV_VAR: &str = "FOCUS_MOCK_TIME";

/// Offset between mock time and real time, computed once at process start so
/// mock time advances naturally.
static MOCK_TIME_OFFSET: OnceLock<Option<chrono::Duration>> = OnceLock::new();

#[allow(clippy::disallowed_methods)]
fn get_mock_time_offset() -> Option<chrono::Duration> {
    *MOCK_TIME_OFFSET.get_or_init(|| {
        #[cfg(debug_assertions)]
        {
            if let Ok(mock_time_str) = std::env::var(MOCK_TIME_ENV_VAR) {
                match NaiveDateTime::parse_from_str(&mock_time_str, "%Y-%m-%d %H:%M:%S") {
                    Ok(naive_dt) => {
                        if let Some(mock_dt) = Local.from_local_datetime(&naive_dt).single() {
                            let offset = mock_dt.signed_duration_since(chrono::Local::now());
                            tracing::info!(
                                mock_time = %mock_time_str,
                                offset_secs = offset.num_seconds(),
                                "Mock time enabled"
                            );
                            return Some(offset);
                        }
                        tracing::warn!(
                            mock_time = %mock_time_str,
                            "Failed to convert mock time to local timezone"
                        );
                    }
                    Err(_) => {
                        tracing::warn!(
                            mock_time = %mock_time_str,
                            expected_format = "%Y-%m-%d %H:%M:%S",
                            "Invalid mock time format"
                        );
                    }
                }
            }
            None
        }
        #[cfg(not(debug_assertions))]
        {
            None
        }
    })
}

/// Current local time, respecting `FOCUS_MOCK_TIME` in debug builds.
///
/// Truncated to whole milliseconds, the precision deadlines are persisted at.
#[allow(clippy::disallowed_methods)]
pub fn now() -> DateTime<Local> {
    let real_now = chrono::Local::now();

    let now = match get_mock_time_offset() {
        Some(offset) => real_now + offset,
        None => real_now,
    };
    now.trunc_subsecs(3)
}

/// Convert an instant to epoch milliseconds for persistence.
pub fn to_epoch_millis(dt: &DateTime<Local>) -> i64 {
    dt.timestamp_millis()
}

/// Convert persisted epoch milliseconds back to an instant.
///
/// Non-positive values mean "unset" in the persisted layout and map to `None`,
/// as do values outside chrono's representable range.
pub fn from_epoch_millis(millis: i64) -> Option<DateTime<Local>> {
    if millis <= 0 {
        return None;
    }
    Local.timestamp_millis_opt(millis).single()
}

/// Offsets are clamped to this many seconds (100 years) so arithmetic on
/// hostile inputs cannot overflow chrono's range.
const MAX_OFFSET_SECS: u64 = 100 * 365 * 24 * 3600;

/// `start + secs`, clamping absurd offsets to [`MAX_OFFSET_SECS`].
pub fn add_seconds(start: DateTime<Local>, secs: u64) -> DateTime<Local> {
    let secs = secs.min(MAX_OFFSET_SECS) as i64;
    chrono::Duration::try_seconds(secs)
        .and_then(|d| start.checked_add_signed(d))
        .unwrap_or(start)
}

/// `start + minutes`, saturating like [`add_seconds`].
pub fn add_minutes(start: DateTime<Local>, minutes: u64) -> DateTime<Local> {
    add_seconds(start, minutes.saturating_mul(60))
}

/// Time from `now` until `deadline`, zero if it already passed.
pub fn remaining_until(deadline: &DateTime<Local>, now: &DateTime<Local>) -> Duration {
    deadline
        .signed_duration_since(*now)
        .to_std()
        .unwrap_or(Duration::ZERO)
}

/// Whole seconds remaining, rounded up so "0.2s left" reports 1.
pub fn remaining_secs_ceil(deadline: &DateTime<Local>, now: &DateTime<Local>) -> u64 {
    let remaining = remaining_until(deadline, now);
    let secs = remaining.as_secs();
    if remaining.subsec_nanos() > 0 {
        secs + 1
    } else {
        secs
    }
}

/// Hour of day (0-23) for the given instant
pub fn hour_of_day(dt: &DateTime<Local>) -> u32 {
    dt.hour()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn epoch_millis_roundtrip_preserves_millis() {
        let dt = Local.with_ymd_and_hms(2025, 6, 1, 9, 30, 0).unwrap();
        let millis = to_epoch_millis(&dt);
        assert_eq!(from_epoch_millis(millis), Some(dt));
    }

    #[test]
    fn now_survives_millis_roundtrip() {
        let t = now();
        assert_eq!(from_epoch_millis(to_epoch_millis(&t)), Some(t));
    }

    #[test]
    fn non_positive_millis_mean_unset() {
        assert_eq!(from_epoch_millis(0), None);
        assert_eq!(from_epoch_millis(-5), None);
    }

    #[test]
    fn add_seconds_saturates() {
        let start = Local.with_ymd_and_hms(2025, 6, 1, 9, 0, 0).unwrap();
        assert_eq!(
            add_seconds(start, 90),
            Local.with_ymd_and_hms(2025, 6, 1, 9, 1, 30).unwrap()
        );
        assert!(add_seconds(start, u64::MAX) > start);
        assert_eq!(
            add_minutes(start, 3),
            Local.with_ymd_and_hms(2025, 6, 1, 9, 3, 0).unwrap()
        );
    }

    #[test]
    fn remaining_until_is_zero_in_the_past() {
        let now = Local.with_ymd_and_hms(2025, 6, 1, 9, 0, 0).unwrap();
        let past = now - chrono::Duration::seconds(5);
        let future = now + chrono::Duration::seconds(5);

        assert_eq!(remaining_until(&past, &now), Duration::ZERO);
        assert_eq!(remaining_until(&future, &now), Duration::from_secs(5));
    }

    #[test]
    fn remaining_secs_rounds_up() {
        let now = Local.with_ymd_and_hms(2025, 6, 1, 9, 0, 0).unwrap();
        let deadline = now + chrono::Duration::milliseconds(1200);
        assert_eq!(remaining_secs_ceil(&deadline, &now), 2);
        assert_eq!(remaining_secs_ceil(&now, &now), 0);
    }
}
