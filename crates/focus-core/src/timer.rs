//! Deadline bookkeeping for the in-process timer
//!
//! The daemon arms one single-shot timer for the nearest instant at which a
//! decision can change on its own. Firing only triggers a re-evaluation; the
//! lazy expiry in the evaluator stays authoritative when the process was not
//! running at that instant.

use chrono::{DateTime, Local};
use focus_api::Session;

/// Nearest future instant at which the session's enforcement changes by
/// itself: the session end or the close of an exception window.
pub fn next_deadline(session: &Session, now: &DateTime<Local>) -> Option<DateTime<Local>> {
    if !session.active {
        return None;
    }

    [session.ends_at, session.emergency_until]
        .into_iter()
        .flatten()
        .filter(|t| t > now)
        .min()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn inactive_has_no_deadline() {
        let now = focus_util::now();
        assert_eq!(next_deadline(&Session::default(), &now), None);
    }

    #[test]
    fn picks_nearest_future_instant() {
        let now = focus_util::now();
        let session = Session {
            active: true,
            ends_at: Some(now + Duration::hours(1)),
            emergency_until: Some(now + Duration::minutes(3)),
            ..Default::default()
        };
        assert_eq!(
            next_deadline(&session, &now),
            Some(now + Duration::minutes(3))
        );

        let later = now + Duration::minutes(5);
        assert_eq!(
            next_deadline(&session, &later),
            Some(now + Duration::hours(1))
        );
    }

    #[test]
    fn past_instants_are_ignored() {
        let now = focus_util::now();
        let session = Session {
            active: true,
            ends_at: Some(now - Duration::seconds(1)),
            ..Default::default()
        };
        assert_eq!(next_deadline(&session, &now), None);
    }
}
