//! Scripted [`RemoteApi`] used by the unit tests.

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::cache::DeckSummary;
use crate::flashcards::Card;

use super::remote::{PullResponse, PushResponse, RemoteApi, RemoteError};
use super::reviews::Review;

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Subscribe(String, Option<String>),
    Unsubscribe(String),
    Reorder(Vec<String>),
    DeleteDeck(String),
    PushReviews(usize),
    Pull,
    Fetch(String),
}

#[derive(Default)]
struct State {
    calls: Vec<Call>,
    fail_next: usize,
    fail_always: bool,
    delay: Option<Duration>,
    pushed: Vec<Review>,
    my_lists: Vec<DeckSummary>,
    all_lists: Vec<DeckSummary>,
    available: Vec<DeckSummary>,
    cards: Vec<Card>,
}

#[derive(Default)]
pub struct MockRemote {
    state: Mutex<State>,
}

impl MockRemote {
    pub const SERVER_TIME: i64 = 1_750_000_000_000;

    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `n` calls, then succeed again.
    pub fn fail_next(&self, n: usize) {
        self.state.lock().unwrap().fail_next = n;
    }

    pub fn fail_always(&self, fail: bool) {
        self.state.lock().unwrap().fail_always = fail;
    }

    /// Make every call take `delay` before answering.
    pub fn set_delay(&self, delay: Duration) {
        self.state.lock().unwrap().delay = Some(delay);
    }

    pub fn set_lists(&self, my_lists: Vec<DeckSummary>, all_lists: Vec<DeckSummary>, available: Vec<DeckSummary>) {
        let mut state = self.state.lock().unwrap();
        state.my_lists = my_lists;
        state.all_lists = all_lists;
        state.available = available;
    }

    pub fn set_cards(&self, cards: Vec<Card>) {
        self.state.lock().unwrap().cards = cards;
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn call_count(&self) -> usize {
        self.state.lock().unwrap().calls.len()
    }

    pub fn pushed_reviews(&self) -> Vec<Review> {
        self.state.lock().unwrap().pushed.clone()
    }

    async fn record(&self, call: Call) -> Result<(), RemoteError> {
        let (delay, fail) = {
            let mut state = self.state.lock().unwrap();
            state.calls.push(call.clone());
            let fail = if state.fail_always {
                true
            } else if state.fail_next > 0 {
                state.fail_next -= 1;
                true
            } else {
                false
            };
            (state.delay, fail)
        };

        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if fail {
            Err(RemoteError::Other(format!("scripted failure for {:?}", call)))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl RemoteApi for MockRemote {
    async fn subscribe(&self, deck_id: &str, icon: Option<&str>) -> Result<(), RemoteError> {
        self.record(Call::Subscribe(deck_id.to_string(), icon.map(str::to_string)))
            .await
    }

    async fn unsubscribe(&self, deck_id: &str) -> Result<(), RemoteError> {
        self.record(Call::Unsubscribe(deck_id.to_string())).await
    }

    async fn reorder(&self, deck_ids: &[String]) -> Result<(), RemoteError> {
        self.record(Call::Reorder(deck_ids.to_vec())).await
    }

    async fn delete_deck(&self, deck_id: &str) -> Result<(), RemoteError> {
        self.record(Call::DeleteDeck(deck_id.to_string())).await
    }

    async fn push_reviews(&self, reviews: &[Review]) -> Result<PushResponse, RemoteError> {
        self.record(Call::PushReviews(reviews.len())).await?;
        self.state.lock().unwrap().pushed.extend_from_slice(reviews);
        Ok(PushResponse {
            ok: true,
            created: reviews.len(),
            server_time: Self::SERVER_TIME,
        })
    }

    async fn pull(&self) -> Result<PullResponse, RemoteError> {
        self.record(Call::Pull).await?;
        Ok(PullResponse {
            server_time: Self::SERVER_TIME,
        })
    }

    async fn fetch_my_lists(&self) -> Result<Vec<DeckSummary>, RemoteError> {
        self.record(Call::Fetch("my-lists".to_string())).await?;
        Ok(self.state.lock().unwrap().my_lists.clone())
    }

    async fn fetch_all_lists(&self) -> Result<Vec<DeckSummary>, RemoteError> {
        self.record(Call::Fetch("all-lists".to_string())).await?;
        Ok(self.state.lock().unwrap().all_lists.clone())
    }

    async fn fetch_available_personal(&self) -> Result<Vec<DeckSummary>, RemoteError> {
        self.record(Call::Fetch("available-personal".to_string())).await?;
        Ok(self.state.lock().unwrap().available.clone())
    }

    async fn fetch_cards(&self, deck_id: &str) -> Result<Vec<Card>, RemoteError> {
        self.record(Call::Fetch(format!("cards:{}", deck_id))).await?;
        Ok(self
            .state
            .lock()
            .unwrap()
            .cards
            .iter()
            .filter(|c| c.deck_id == deck_id)
            .cloned()
            .collect())
    }
}
