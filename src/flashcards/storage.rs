//! Per-deck study state persistence
//!
//! One [`StudyState`] blob per deck, stored under `state:{deck-id}`. Every
//! read-modify-write runs under that key's lock, so concurrent answers for
//! the same deck never lose an update.

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::storage::{DurableStore, StoreError};
use crate::sync::{Review, ReviewQueue};

use super::algorithm::{default_card_state, grade_card, is_due};
use super::models::*;

#[derive(Error, Debug)]
pub enum StudyError {
    #[error("Storage error: {0}")]
    Store(#[from] StoreError),

    #[error("Card not found: {0}")]
    CardNotFound(String),
}

pub type Result<T> = std::result::Result<T, StudyError>;

pub fn state_key(deck_id: &str) -> String {
    format!("state:{}", deck_id)
}

/// Storage manager for study progress
#[derive(Clone)]
pub struct StudyStore {
    store: DurableStore,
    reviews: ReviewQueue,
}

impl StudyStore {
    pub fn new(store: DurableStore, reviews: ReviewQueue) -> Self {
        Self { store, reviews }
    }

    async fn load(&self, key: &str, now: DateTime<Utc>) -> Result<StudyState> {
        Ok(self
            .store
            .get(key)
            .await?
            .unwrap_or_else(|| StudyState::new(now)))
    }

    /// Load the study state of a deck, creating schedules for cards seen for
    /// the first time and resetting the daily counter on a new day.
    pub async fn load_study_state(
        &self,
        deck_id: &str,
        card_ids: &[String],
        now: DateTime<Utc>,
    ) -> Result<StudyState> {
        let key = state_key(deck_id);
        self.store
            .with_lock(&key, || self.load_locked(&key, card_ids, now))
            .await
    }

    async fn load_locked(&self, key: &str, card_ids: &[String], now: DateTime<Utc>) -> Result<StudyState> {
        let mut state = self.load(key, now).await?;

        for card_id in card_ids {
            state
                .cards
                .entry(card_id.clone())
                .or_insert_with(|| default_card_state(now));
        }
        state.roll_day(now);

        self.store.set(key, &state).await?;
        Ok(state)
    }

    /// Grade a card, persist its new schedule and queue the review for push.
    ///
    /// The schedule is the source of truth: once it is saved the answer
    /// counts, and a failure to queue the review is only logged.
    pub async fn answer_card(
        &self,
        deck_id: &str,
        card_id: &str,
        ok: bool,
        user_answer: &str,
        now: DateTime<Utc>,
    ) -> Result<CardState> {
        let key = state_key(deck_id);
        let graded = self
            .store
            .with_lock(&key, || self.answer_locked(&key, card_id, ok, now))
            .await?;

        let mut review = Review::new(card_id, ok, user_answer);
        review.reviewed_at = Some(now);
        if let Err(e) = self.reviews.queue_review(review).await {
            log::error!("Study: review of {} saved locally but not queued: {}", card_id, e);
        }

        log::debug!(
            "Study: {} graded {} in deck {}, next in {}d",
            card_id,
            if ok { "ok" } else { "fail" },
            deck_id,
            graded.interval_days
        );
        Ok(graded)
    }

    async fn answer_locked(&self, key: &str, card_id: &str, ok: bool, now: DateTime<Utc>) -> Result<CardState> {
        let mut state = self.load(key, now).await?;
        state.roll_day(now);

        let current = state
            .cards
            .get(card_id)
            .cloned()
            .unwrap_or_else(|| default_card_state(now));
        let graded = grade_card(&current, ok, now);
        state.cards.insert(card_id.to_string(), graded.clone());
        state.done_today += 1;

        self.store.set(key, &state).await?;
        Ok(graded)
    }

    /// Current schedule of one card, if the deck has been studied.
    pub async fn get_card_state(&self, deck_id: &str, card_id: &str) -> Result<CardState> {
        let state: Option<StudyState> = self.store.get(&state_key(deck_id)).await?;
        state
            .and_then(|mut s| s.cards.remove(card_id))
            .ok_or_else(|| StudyError::CardNotFound(card_id.to_string()))
    }
}

/// Ids of the cards due at `now`, most overdue first
pub fn due_cards(state: &StudyState, now: DateTime<Utc>) -> Vec<String> {
    let mut due: Vec<(&String, &CardState)> = state
        .cards
        .iter()
        .filter(|(_, card)| is_due(card, now))
        .collect();

    // Ties broken by id so the order is stable
    due.sort_by(|a, b| {
        a.1.next_review_at
            .cmp(&b.1.next_review_at)
            .then_with(|| a.0.cmp(b.0))
    });
    due.into_iter().map(|(id, _)| id.clone()).collect()
}
