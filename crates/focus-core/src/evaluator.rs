//! Policy evaluation: is this app blocked right now?

use chrono::{DateTime, Local};
use focus_api::{AllowReason, AppIdentifier, Decision, Platform, Session, ShieldPolicy};

/// Pure decision function over a session snapshot.
///
/// Holds only the identity of the host it runs on, so the same snapshot and
/// instant always produce the same decision.
#[derive(Debug, Clone)]
pub struct PolicyEvaluator {
    platform: Platform,
    host_app_id: String,
}

impl PolicyEvaluator {
    pub fn new(platform: Platform, host_app_id: impl Into<String>) -> Self {
        Self {
            platform,
            host_app_id: host_app_id.into(),
        }
    }

    pub fn platform(&self) -> Platform {
        self.platform
    }

    pub fn host_app_id(&self) -> &str {
        &self.host_app_id
    }

    /// Decide for one candidate. First matching rule wins.
    pub fn decide(
        &self,
        session: &Session,
        candidate: &AppIdentifier,
        now: &DateTime<Local>,
    ) -> Decision {
        if self.is_host_app(candidate) {
            return Decision::Allow(AllowReason::HostApp);
        }
        if candidate.platform != self.platform {
            return Decision::Allow(AllowReason::ForeignPlatform);
        }
        if !session.active {
            return Decision::Allow(AllowReason::NoActiveSession);
        }
        if session.is_expired_at(now) {
            return Decision::Allow(AllowReason::SessionExpired);
        }
        if session.emergency_open_at(now) {
            return Decision::Allow(AllowReason::EmergencyException);
        }
        if session.allowed_apps.contains(candidate) {
            return Decision::Allow(AllowReason::Allowlisted);
        }
        Decision::Block
    }

    /// Decide for a raw app id reported by this host's OS
    pub fn decide_id(&self, session: &Session, app_id: &str, now: &DateTime<Local>) -> Decision {
        self.decide(session, &AppIdentifier::new(self.platform, app_id), now)
    }

    /// Block-set for declarative enforcement.
    ///
    /// Nothing is shielded when there is no running session or an exception
    /// window is open; otherwise everything but the allowlist and the host
    /// app itself.
    pub fn block_set(&self, session: &Session, now: &DateTime<Local>) -> ShieldPolicy {
        if !session.active || session.is_expired_at(now) || session.emergency_open_at(now) {
            return ShieldPolicy::Clear;
        }

        let mut allowed = session.allowed_ids(self.platform);
        allowed.insert(self.host_app_id.clone());
        ShieldPolicy::BlockAllExcept { allowed }
    }

    fn is_host_app(&self, candidate: &AppIdentifier) -> bool {
        candidate.platform == self.platform && candidate.id == self.host_app_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use proptest::prelude::*;

    const HOST: &str = "com.example.focus";

    fn evaluator() -> PolicyEvaluator {
        PolicyEvaluator::new(Platform::Android, HOST)
    }

    fn running(now: DateTime<Local>) -> Session {
        Session {
            active: true,
            ends_at: Some(now + Duration::hours(1)),
            allowed_apps: [AppIdentifier::android("com.phone.dialer")]
                .into_iter()
                .collect(),
            ..Default::default()
        }
    }

    #[test]
    fn blocks_app_outside_allowlist() {
        let now = focus_util::now();
        let decision = evaluator().decide(
            &running(now),
            &AppIdentifier::android("com.social.app"),
            &now,
        );
        assert_eq!(decision, Decision::Block);
    }

    #[test]
    fn emergency_window_allows_everything() {
        let now = focus_util::now();
        let session = Session {
            emergency_until: Some(now + Duration::minutes(5)),
            ..running(now)
        };
        let decision = evaluator().decide(&session, &AppIdentifier::android("com.social.app"), &now);
        assert_eq!(decision, Decision::Allow(AllowReason::EmergencyException));
    }

    #[test]
    fn emergency_window_ends_at_its_instant() {
        let now = focus_util::now();
        let session = Session {
            emergency_until: Some(now),
            ..running(now)
        };
        assert!(evaluator().decide_id(&session, "com.social.app", &now).is_block());
    }

    #[test]
    fn allowlisted_app_is_allowed() {
        let now = focus_util::now();
        assert_eq!(
            evaluator().decide_id(&running(now), "com.phone.dialer", &now),
            Decision::Allow(AllowReason::Allowlisted)
        );
    }

    #[test]
    fn host_app_is_never_blocked() {
        let now = focus_util::now();
        assert_eq!(
            evaluator().decide_id(&running(now), HOST, &now),
            Decision::Allow(AllowReason::HostApp)
        );
    }

    #[test]
    fn foreign_platform_is_ignored() {
        let now = focus_util::now();
        let decision = evaluator().decide(
            &running(now),
            &AppIdentifier::ios("com.social.app"),
            &now,
        );
        assert_eq!(decision, Decision::Allow(AllowReason::ForeignPlatform));
    }

    #[test]
    fn expired_session_signals_lazy_expiry() {
        let now = focus_util::now();
        let session = Session {
            ends_at: Some(now),
            ..running(now)
        };
        let decision = evaluator().decide_id(&session, "com.social.app", &now);
        assert!(decision.requires_expiry());
    }

    #[test]
    fn session_without_end_keeps_blocking() {
        let now = focus_util::now();
        let session = Session {
            ends_at: None,
            ..running(now)
        };
        let later = now + Duration::days(30);
        assert!(evaluator().decide_id(&session, "com.social.app", &later).is_block());
    }

    #[test]
    fn block_set_includes_host_and_allowlist() {
        let now = focus_util::now();
        let mut session = running(now);
        session
            .allowed_apps
            .insert(AppIdentifier::ios("com.apple.mobilephone"));

        match evaluator().block_set(&session, &now) {
            ShieldPolicy::BlockAllExcept { allowed } => {
                assert_eq!(allowed.len(), 2);
                assert!(allowed.contains(HOST));
                assert!(allowed.contains("com.phone.dialer"));
            }
            ShieldPolicy::Clear => panic!("expected a block-set"),
        }
    }

    #[test]
    fn block_set_clear_when_inactive_or_exempt() {
        let now = focus_util::now();
        assert!(evaluator().block_set(&Session::default(), &now).is_clear());

        let exempt = Session {
            emergency_until: Some(now + Duration::minutes(3)),
            ..running(now)
        };
        assert!(evaluator().block_set(&exempt, &now).is_clear());
    }

    fn arb_app() -> impl Strategy<Value = AppIdentifier> {
        (
            prop_oneof![Just(Platform::Android), Just(Platform::Ios)],
            "[a-z]{1,8}(\\.[a-z]{1,8}){0,2}",
        )
            .prop_map(|(platform, id)| AppIdentifier::new(platform, id))
    }

    fn arb_session(now: DateTime<Local>) -> impl Strategy<Value = Session> {
        (
            any::<bool>(),
            proptest::option::of(-7200i64..7200),
            proptest::collection::btree_set(arb_app(), 0..5),
            proptest::option::of(-600i64..600),
            any::<bool>(),
        )
            .prop_map(move |(active, ends, apps, emergency, card_required)| {
                Session {
                    active,
                    ends_at: ends.map(|s| now + Duration::seconds(s)),
                    allowed_apps: apps,
                    friction: Default::default(),
                    emergency_until: emergency.map(|s| now + Duration::seconds(s)),
                    card_required,
                }
                .normalized()
            })
    }

    proptest! {
        #[test]
        fn inactive_allows_everything(app in arb_app()) {
            let now = focus_util::now();
            prop_assert!(!evaluator().decide(&Session::default(), &app, &now).is_block());
        }

        #[test]
        fn past_deadline_never_blocks(
            session in arb_session(focus_util::now()),
            app in arb_app(),
            overdue in 0i64..10_000,
        ) {
            if let Some(ends_at) = session.ends_at {
                let now = ends_at + Duration::seconds(overdue);
                prop_assert!(!evaluator().decide(&session, &app, &now).is_block());
            }
        }

        #[test]
        fn open_emergency_never_blocks(session in arb_session(focus_util::now()), app in arb_app()) {
            if let Some(until) = session.emergency_until {
                let now = until - Duration::seconds(1);
                prop_assert!(!evaluator().decide(&session, &app, &now).is_block());
            }
        }

        #[test]
        fn decisions_are_reproducible(session in arb_session(focus_util::now()), app in arb_app()) {
            let now = focus_util::now();
            let first = evaluator().decide(&session, &app, &now);
            let second = evaluator().decide(&session.clone(), &app.clone(), &now);
            prop_assert_eq!(first, second);
        }

        #[test]
        fn block_set_agrees_with_decide(session in arb_session(focus_util::now()), app in arb_app()) {
            let now = focus_util::now();
            let evaluator = evaluator();
            if app.platform == Platform::Android {
                let blocked_by_shield = match evaluator.block_set(&session, &now) {
                    ShieldPolicy::Clear => false,
                    ShieldPolicy::BlockAllExcept { allowed } => !allowed.contains(&app.id),
                };
                prop_assert_eq!(blocked_by_shield, evaluator.decide(&session, &app, &now).is_block());
            }
        }
    }
}
