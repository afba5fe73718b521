//! Data models for the spaced repetition state

use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Ease factor given to a card that has never been reviewed
pub const DEFAULT_EASE: f64 = 2.0;
pub const MIN_EASE: f64 = 1.3;
pub const MAX_EASE: f64 = 2.5;

/// A flashcard as cached from the remote deck
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Card {
    pub id: String,
    pub deck_id: String,
    pub front: String,
    pub back: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chapter_id: Option<String>,
}

/// Per-device review schedule of a single card
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CardState {
    /// Consecutive successful reviews since the last failure
    #[serde(default)]
    pub reps: u32,
    /// Current interval in days
    #[serde(default)]
    pub interval_days: u32,
    #[serde(default = "default_ease")]
    pub ease: f64,
    pub next_review_at: DateTime<Utc>,
    #[serde(default)]
    pub last_reviewed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub success_count: u32,
    #[serde(default)]
    pub failure_count: u32,
}

fn default_ease() -> f64 {
    DEFAULT_EASE
}

impl CardState {
    /// Whether the card has ever been graded
    pub fn attempted(&self) -> bool {
        self.success_count + self.failure_count > 0
    }
}

/// Study progress for one deck
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudyState {
    #[serde(default)]
    pub cards: HashMap<String, CardState>,
    #[serde(default)]
    pub done_today: u32,
    pub last_active_day: NaiveDate,
}

impl StudyState {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            cards: HashMap::new(),
            done_today: 0,
            last_active_day: day_key(now),
        }
    }

    /// Reset the daily counter if `now` falls on a different day.
    /// Returns true when a rollover happened.
    pub fn roll_day(&mut self, now: DateTime<Utc>) -> bool {
        let today = day_key(now);
        if today != self.last_active_day {
            self.done_today = 0;
            self.last_active_day = today;
            true
        } else {
            false
        }
    }
}

/// Calendar day used to bucket daily counters (UTC)
pub fn day_key(now: DateTime<Utc>) -> NaiveDate {
    now.date_naive()
}
