//! Friction controller: the only legitimate ways out of a running session
//!
//! Hold-to-unlock is two phases. The user holds for
//! `hold_to_unlock_seconds`, then a separate `unlock_delay_seconds` countdown
//! runs; only when it has elapsed does the session end. Emergency unlock opens
//! a time-boxed exception instead of ending the session, and is refused
//! outright while card-required mode is on.
//!
//! Challenges are plain values handed to the block surface. Releasing the
//! button or dismissing the screen just drops them.

use chrono::{DateTime, Local};
use focus_api::{ChallengeKind, FrictionChallenge, Session, UnlockProgress};
use focus_config::MAX_EMERGENCY_UNLOCK_MINUTES;
use focus_store::{write_session_with, Store, StoreError};
use focus_util::{add_minutes, add_seconds, remaining_secs_ceil, FocusError};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Hold-to-unlock failures
#[derive(Debug, Error)]
pub enum FrictionError {
    #[error("Keep holding: {remaining_secs}s remaining")]
    StillHolding { remaining_secs: u64 },

    #[error("Unlock delay still running: {remaining_secs}s remaining")]
    TooEarly { remaining_secs: u64 },

    #[error("Challenge is for a different unlock flow")]
    WrongChallenge,

    #[error("No active focus session")]
    NoActiveSession,

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Emergency exception failures
#[derive(Debug, Error)]
pub enum EmergencyError {
    #[error("Emergency unlock is unavailable while card-required mode is on")]
    CardRequiredBlocksEmergency,

    #[error("Challenge is for a different unlock flow")]
    WrongChallenge,

    #[error("No active focus session")]
    NoActiveSession,

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<FrictionError> for FocusError {
    fn from(e: FrictionError) -> Self {
        match e {
            FrictionError::StillHolding { remaining_secs } => {
                FocusError::StillHolding { remaining_secs }
            }
            FrictionError::TooEarly { remaining_secs } => FocusError::TooEarly { remaining_secs },
            FrictionError::WrongChallenge => {
                FocusError::invalid("challenge is for a different unlock flow")
            }
            FrictionError::NoActiveSession => FocusError::NoActiveSession,
            FrictionError::Store(e) => FocusError::store(e.to_string()),
        }
    }
}

impl From<EmergencyError> for FocusError {
    fn from(e: EmergencyError) -> Self {
        match e {
            EmergencyError::CardRequiredBlocksEmergency => FocusError::CardRequiredBlocksEmergency,
            EmergencyError::WrongChallenge => {
                FocusError::invalid("challenge is for a different unlock flow")
            }
            EmergencyError::NoActiveSession => FocusError::NoActiveSession,
            EmergencyError::Store(e) => FocusError::store(e.to_string()),
        }
    }
}

/// Outcome of a session-ending or exception-opening write
#[derive(Debug, Clone)]
pub struct FrictionOutcome<T> {
    pub value: T,
    /// Session before the write
    pub before: Session,
    /// Session as committed
    pub after: Session,
}

pub struct FrictionController {
    store: Arc<dyn Store>,
}

impl FrictionController {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Start a hold-to-unlock challenge with the session's current friction
    pub fn begin_hold_to_unlock(
        &self,
        now: DateTime<Local>,
    ) -> Result<FrictionChallenge, FrictionError> {
        let session = self.store.read_session();
        if !session.active {
            return Err(FrictionError::NoActiveSession);
        }

        debug!(
            required_secs = session.friction.hold_to_unlock_seconds,
            "Hold-to-unlock started"
        );

        Ok(FrictionChallenge {
            kind: ChallengeKind::HoldToUnlock,
            started_at: now,
            required_seconds: session.friction.hold_to_unlock_seconds,
            unlock_at: None,
        })
    }

    /// Advance a hold-to-unlock challenge.
    ///
    /// In the hold phase this either fails with `StillHolding` or starts the
    /// cooling-off countdown. In the countdown phase it fails with `TooEarly`
    /// until the countdown passes, then ends the session.
    ///
    /// The challenge comes back from the client, so its hold length and
    /// `unlock_at` are only ever allowed to lengthen what the session's own
    /// friction demands.
    pub fn complete_hold_to_unlock(
        &self,
        challenge: &FrictionChallenge,
        now: DateTime<Local>,
    ) -> Result<FrictionOutcome<UnlockProgress>, FrictionError> {
        if challenge.kind != ChallengeKind::HoldToUnlock {
            return Err(FrictionError::WrongChallenge);
        }

        let session = self.store.read_session();
        if !session.active {
            return Ok(FrictionOutcome {
                value: UnlockProgress::Unlocked,
                before: session.clone(),
                after: session,
            });
        }

        let hold_secs = challenge
            .required_seconds
            .max(session.friction.hold_to_unlock_seconds);
        let delay = session.friction.unlock_delay_seconds;

        match challenge.unlock_at {
            None => {
                let hold_done = add_seconds(challenge.started_at, u64::from(hold_secs));
                if now < hold_done {
                    let remaining_secs = remaining_secs_ceil(&hold_done, &now);
                    debug!(remaining_secs, "Hold released early");
                    return Err(FrictionError::StillHolding { remaining_secs });
                }

                if delay == 0 {
                    return self.unlock(now);
                }

                let unlock_at = add_seconds(now, u64::from(delay));
                info!(unlock_at = %unlock_at, "Hold complete, unlock delay started");
                Ok(FrictionOutcome {
                    value: UnlockProgress::CountingDown {
                        challenge: FrictionChallenge {
                            unlock_at: Some(unlock_at),
                            ..challenge.clone()
                        },
                        unlock_at,
                    },
                    before: session.clone(),
                    after: session,
                })
            }
            Some(claimed) => {
                let earliest = add_seconds(
                    challenge.started_at,
                    u64::from(hold_secs) + u64::from(delay),
                );
                let unlock_at = claimed.max(earliest);
                if now < unlock_at {
                    return Err(FrictionError::TooEarly {
                        remaining_secs: remaining_secs_ceil(&unlock_at, &now),
                    });
                }
                self.unlock(now)
            }
        }
    }

    fn unlock(&self, now: DateTime<Local>) -> Result<FrictionOutcome<UnlockProgress>, FrictionError> {
        let mut before = None;
        let after = write_session_with(self.store.as_ref(), |s| {
            before = Some(s.clone());
            s.ended()
        })?;

        info!(at = %now, "Session ended by hold-to-unlock");
        Ok(FrictionOutcome {
            value: UnlockProgress::Unlocked,
            before: before.unwrap_or_default(),
            after,
        })
    }

    /// Start an emergency challenge; it needs no hold
    pub fn begin_emergency_unlock(
        &self,
        now: DateTime<Local>,
    ) -> Result<FrictionChallenge, EmergencyError> {
        let session = self.store.read_session();
        if !session.active {
            return Err(EmergencyError::NoActiveSession);
        }
        if session.card_required {
            return Err(EmergencyError::CardRequiredBlocksEmergency);
        }

        Ok(FrictionChallenge {
            kind: ChallengeKind::EmergencyUnlock,
            started_at: now,
            required_seconds: 0,
            unlock_at: None,
        })
    }

    /// Complete an emergency challenge by opening an exception of the
    /// session's configured length
    pub fn complete_emergency_unlock(
        &self,
        challenge: &FrictionChallenge,
        now: DateTime<Local>,
    ) -> Result<FrictionOutcome<DateTime<Local>>, EmergencyError> {
        if challenge.kind != ChallengeKind::EmergencyUnlock {
            return Err(EmergencyError::WrongChallenge);
        }
        self.start_emergency_exception(None, now)
    }

    /// Suspend all blocking for `duration_minutes` (default: the session's
    /// `emergency_unlock_minutes`).
    ///
    /// The card-required check happens inside the write, so a concurrent
    /// `set_card_required(true)` from another process cannot be raced.
    pub fn start_emergency_exception(
        &self,
        duration_minutes: Option<u32>,
        now: DateTime<Local>,
    ) -> Result<FrictionOutcome<DateTime<Local>>, EmergencyError> {
        let mut refusal = None;
        let mut before = None;
        let mut until = None;

        let after = write_session_with(self.store.as_ref(), |s| {
            before = Some(s.clone());
            if !s.active {
                refusal = Some(EmergencyError::NoActiveSession);
                return s;
            }
            if s.card_required {
                refusal = Some(EmergencyError::CardRequiredBlocksEmergency);
                return s;
            }

            let minutes = duration_minutes
                .unwrap_or(s.friction.emergency_unlock_minutes)
                .min(MAX_EMERGENCY_UNLOCK_MINUTES);
            let window_end = add_minutes(now, u64::from(minutes));
            until = Some(window_end);
            Session {
                emergency_until: Some(window_end),
                ..s
            }
        })?;

        if let Some(refusal) = refusal {
            warn!(reason = %refusal, "Emergency exception refused");
            return Err(refusal);
        }

        let until = until.unwrap_or(now);
        info!(until = %until, "Emergency exception opened");
        Ok(FrictionOutcome {
            value: until,
            before: before.unwrap_or_default(),
            after,
        })
    }

    /// Toggle hardened mode. Turning it on closes any open exception in the
    /// same write.
    pub fn set_card_required(&self, required: bool) -> Result<FrictionOutcome<bool>, StoreError> {
        let mut before = None;
        let after = write_session_with(self.store.as_ref(), |s| {
            before = Some(s.clone());
            Session {
                card_required: required,
                emergency_until: if required { None } else { s.emergency_until },
                ..s
            }
        })?;

        info!(required, "Card-required mode changed");
        Ok(FrictionOutcome {
            value: required,
            before: before.unwrap_or_default(),
            after,
        })
    }
}
