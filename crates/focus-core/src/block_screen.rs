//! Content for the surface shown over a blocked app

use chrono::{DateTime, Local};
use focus_api::{AppIdentifier, BlockScreen, Session};

const HEADLINES: [&str; 10] = [
    "This can wait.",
    "Back to what matters.",
    "You set this time aside on purpose.",
    "Finish one thing first.",
    "Not right now.",
    "Your future self says thanks.",
    "Stay with the task in front of you.",
    "Small steps, done today.",
    "The feed will still be there later.",
    "Protect your focus.",
];

/// Headline for the block screen; rotates with the hour of day
pub fn headline_for_hour(hour: u32) -> &'static str {
    HEADLINES[hour as usize % HEADLINES.len()]
}

pub fn build_block_screen(
    app: AppIdentifier,
    session: &Session,
    featured_task: Option<String>,
    now: &DateTime<Local>,
) -> BlockScreen {
    BlockScreen {
        app,
        friction: session.friction,
        ends_at: session.ends_at,
        headline: headline_for_hour(focus_util::hour_of_day(now)).to_string(),
        featured_task: featured_task.filter(|title| !title.trim().is_empty()),
        emergency_available: !session.card_required,
    }
}
