//! Pass/fail spaced repetition scheduler
//!
//! A simplified SM-2 variant driven by a binary grade:
//! - success grows the interval (1 day, then 3 days, then `interval * ease`)
//!   and raises the ease factor by 0.10
//! - failure resets the card to a 1 day interval and lowers the ease by 0.20
//!
//! The ease factor always stays within `[MIN_EASE, MAX_EASE]` and the
//! interval never exceeds `MAX_INTERVAL_DAYS`.

use chrono::{DateTime, Duration, Utc};

use super::models::{CardState, DEFAULT_EASE, MAX_EASE, MIN_EASE};

const EASE_STEP_UP: f64 = 0.10;
const EASE_STEP_DOWN: f64 = 0.20;

/// Longest interval a card can reach (about a century)
pub const MAX_INTERVAL_DAYS: u32 = 36_500;

/// Fresh schedule for a card that is due right away
pub fn default_card_state(now: DateTime<Utc>) -> CardState {
    CardState {
        reps: 0,
        interval_days: 0,
        ease: DEFAULT_EASE,
        next_review_at: now,
        last_reviewed_at: None,
        success_count: 0,
        failure_count: 0,
    }
}

/// Compute the schedule after grading a card at `now`.
pub fn grade_card(state: &CardState, ok: bool, now: DateTime<Utc>) -> CardState {
    let mut next = state.clone();

    if ok {
        next.success_count += 1;
        next.reps += 1;
        next.ease = clamp_ease(state.ease + EASE_STEP_UP);
        next.interval_days = match next.reps {
            1 => 1,
            2 => 3,
            _ => {
                let grown = (state.interval_days as f64 * next.ease).round();
                (grown.min(MAX_INTERVAL_DAYS as f64) as u32).max(1)
            }
        };
    } else {
        next.failure_count += 1;
        next.reps = 0;
        next.ease = clamp_ease(state.ease - EASE_STEP_DOWN);
        next.interval_days = 1;
    }

    next.last_reviewed_at = Some(now);
    next.next_review_at = now
        .checked_add_signed(Duration::days(next.interval_days as i64))
        .unwrap_or(DateTime::<Utc>::MAX_UTC);
    next
}

/// Whether the card should be shown at `now`
pub fn is_due(state: &CardState, now: DateTime<Utc>) -> bool {
    state.next_review_at <= now
}

fn clamp_ease(ease: f64) -> f64 {
    ease.clamp(MIN_EASE, MAX_EASE)
}

/// Format an interval in days to a human-readable string
pub fn format_interval(days: u32) -> String {
    match days {
        0 => "now".to_string(),
        1..=6 => format!("{}d", days),
        7..=29 => format!("{}w", days / 7),
        30..=364 => format!("{}mo", days / 30),
        _ => format!("{}y", days / 365),
    }
}
