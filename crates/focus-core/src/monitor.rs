//! Enforcement monitor: turns decisions into something the device does
//!
//! Two host styles share one evaluator. Event-driven hosts report every
//! foreground transition and get a block screen back for blocked apps.
//! Declarative hosts receive a whole block-set once per relevant change and
//! let the OS intercept launches on its own.

use chrono::{DateTime, Local};
use focus_api::{
    AllowReason, AppIdentifier, Decision, EnforcementMode, Session, ShieldPolicy,
};
use tracing::debug;

use crate::PolicyEvaluator;

/// What the host should do after a reconcile
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnforcementAction {
    /// Cover this app with the block screen
    PresentBlock(AppIdentifier),
    /// Replace the OS block-set
    ApplyShield(ShieldPolicy),
}

#[derive(Debug, Clone)]
pub enum EnforcementMonitor {
    EventDriven {
        /// Last app the OS reported in the foreground
        last_foreground: Option<AppIdentifier>,
    },
    Declarative {
        /// Last block-set handed to the OS
        last_pushed: Option<ShieldPolicy>,
    },
}

impl EnforcementMonitor {
    pub fn new(mode: EnforcementMode) -> Self {
        match mode {
            EnforcementMode::EventDriven => EnforcementMonitor::EventDriven {
                last_foreground: None,
            },
            EnforcementMode::Declarative => EnforcementMonitor::Declarative { last_pushed: None },
        }
    }

    pub fn mode(&self) -> EnforcementMode {
        match self {
            EnforcementMonitor::EventDriven { .. } => EnforcementMode::EventDriven,
            EnforcementMonitor::Declarative { .. } => EnforcementMode::Declarative,
        }
    }

    /// A foreground transition reported by the OS.
    ///
    /// Blank ids come from garbled events and are allowed. Declarative hosts
    /// get the decision for reporting only; the OS already enforces.
    pub fn on_foreground(
        &mut self,
        evaluator: &PolicyEvaluator,
        session: &Session,
        app: AppIdentifier,
        now: &DateTime<Local>,
    ) -> Decision {
        if app.id.trim().is_empty() {
            debug!("Ignoring foreground event without an app id");
            return Decision::Allow(AllowReason::UnidentifiedApp);
        }

        let decision = evaluator.decide(session, &app, now);
        debug!(app_id = %app.id, decision = ?decision, "Foreground app evaluated");

        if let EnforcementMonitor::EventDriven { last_foreground } = self {
            *last_foreground = Some(app);
        }
        decision
    }

    /// Re-evaluate after the session changed or a deadline fired.
    ///
    /// Event-driven: re-check whatever app is still in front.
    /// Declarative: recompute the block-set and push it only if it changed.
    pub fn reconcile(
        &mut self,
        evaluator: &PolicyEvaluator,
        session: &Session,
        now: &DateTime<Local>,
    ) -> Option<EnforcementAction> {
        match self {
            EnforcementMonitor::EventDriven { last_foreground } => {
                let app = last_foreground.as_ref()?;
                evaluator
                    .decide(session, app, now)
                    .is_block()
                    .then(|| EnforcementAction::PresentBlock(app.clone()))
            }
            EnforcementMonitor::Declarative { last_pushed } => {
                let policy = evaluator.block_set(session, now);
                if last_pushed.as_ref() == Some(&policy) {
                    return None;
                }
                *last_pushed = Some(policy.clone());
                Some(EnforcementAction::ApplyShield(policy))
            }
        }
    }

    /// Forget what was last pushed so the next reconcile pushes again
    pub fn invalidate(&mut self) {
        if let EnforcementMonitor::Declarative { last_pushed } = self {
            *last_pushed = None;
        }
    }
}
