//! Review dedup queue
//!
//! Grading events wait here until they can be pushed in one batch. Only the
//! latest grade per card is kept, so intermediate grades never reach the
//! server.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::storage::{DurableStore, StoreError};

use super::remote::{server_time_to_utc, RemoteApi, RemoteError};

pub const REVIEW_QUEUE_KEY: &str = "sync_queue";
pub const LAST_SYNC_KEY: &str = "sync_last_time";

#[derive(Error, Debug)]
pub enum ReviewQueueError {
    #[error("Storage error: {0}")]
    Store(#[from] StoreError),
    #[error("Push failed: {0}")]
    Remote(#[from] RemoteError),
}

/// A graded answer waiting to be pushed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Review {
    pub card_id: String,
    pub ok: bool,
    #[serde(default)]
    pub user_answer: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reviewed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub review_id: Option<Uuid>,
}

impl Review {
    pub fn new(card_id: impl Into<String>, ok: bool, user_answer: impl Into<String>) -> Self {
        Self {
            card_id: card_id.into(),
            ok,
            user_answer: user_answer.into(),
            reviewed_at: None,
            review_id: None,
        }
    }
}

#[derive(Clone)]
pub struct ReviewQueue {
    store: DurableStore,
    remote: Arc<dyn RemoteApi>,
}

impl ReviewQueue {
    pub fn new(store: DurableStore, remote: Arc<dyn RemoteApi>) -> Self {
        Self { store, remote }
    }

    async fn load(&self) -> Result<Vec<Review>, StoreError> {
        Ok(self.store.get(REVIEW_QUEUE_KEY).await?.unwrap_or_default())
    }

    /// Record a review without flushing it.
    ///
    /// A pending review for the same card is replaced (latest wins).
    pub async fn enqueue(&self, review: Review) -> Result<(), StoreError> {
        self.store
            .with_lock(REVIEW_QUEUE_KEY, || self.enqueue_locked(review))
            .await
    }

    async fn enqueue_locked(&self, mut review: Review) -> Result<(), StoreError> {
        let mut queue = self.load().await?;

        review.reviewed_at.get_or_insert_with(Utc::now);
        review.review_id.get_or_insert_with(Uuid::new_v4);

        match queue.iter_mut().find(|r| r.card_id == review.card_id) {
            Some(existing) => *existing = review,
            None => queue.push(review),
        }

        self.store.set(REVIEW_QUEUE_KEY, &queue).await
    }

    /// Record a review and start a background flush.
    ///
    /// Flush failures are logged and otherwise ignored; the review stays
    /// queued for the next attempt.
    pub async fn queue_review(&self, review: Review) -> Result<(), StoreError> {
        self.enqueue(review).await?;

        let queue = self.clone();
        tokio::spawn(async move {
            if let Err(e) = queue.flush_queue().await {
                log::debug!("Review queue: background flush failed: {}", e);
            }
        });
        Ok(())
    }

    /// Push every pending review in one batch.
    ///
    /// Returns the number of reviews the server created. On failure the
    /// queue is left untouched.
    pub async fn flush_queue(&self) -> Result<usize, ReviewQueueError> {
        self.store
            .with_lock(REVIEW_QUEUE_KEY, || self.flush_locked())
            .await
    }

    async fn flush_locked(&self) -> Result<usize, ReviewQueueError> {
        let queue = self.load().await?;
        if queue.is_empty() {
            return Ok(0);
        }

        let response = self.remote.push_reviews(&queue).await?;

        self.store.set(REVIEW_QUEUE_KEY, &Vec::<Review>::new()).await?;
        let server_time = server_time_to_utc(response.server_time).unwrap_or_else(Utc::now);
        self.store.set(LAST_SYNC_KEY, &server_time).await?;

        log::info!(
            "Review queue: pushed {} review(s), server created {}",
            queue.len(),
            response.created
        );
        Ok(response.created)
    }

    pub async fn get_pending_count(&self) -> Result<usize, StoreError> {
        Ok(self.load().await?.len())
    }

    pub async fn get_pending(&self) -> Result<Vec<Review>, StoreError> {
        self.load().await
    }

    /// Server time of the last successful push
    pub async fn get_last_sync_time(&self) -> Result<Option<DateTime<Utc>>, StoreError> {
        self.store.get(LAST_SYNC_KEY).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::testing::MockRemote;

    fn setup() -> (ReviewQueue, Arc<MockRemote>) {
        let store = DurableStore::in_memory().unwrap();
        let remote = Arc::new(MockRemote::new());
        (ReviewQueue::new(store, remote.clone()), remote)
    }

    #[tokio::test]
    async fn test_latest_grade_wins() {
        let (queue, _remote) = setup();

        queue.enqueue(Review::new("card-1", false, "perro")).await.unwrap();
        queue.enqueue(Review::new("card-2", true, "")).await.unwrap();
        queue.enqueue(Review::new("card-1", true, "gato")).await.unwrap();

        let pending = queue.get_pending().await.unwrap();
        assert_eq!(pending.len(), 2);
        assert_eq!(pending[0].card_id, "card-1");
        assert!(pending[0].ok);
        assert_eq!(pending[0].user_answer, "gato");
        assert!(pending[0].reviewed_at.is_some());
        assert!(pending[0].review_id.is_some());
    }

    #[tokio::test]
    async fn test_flush_clears_queue_and_records_server_time() {
        let (queue, remote) = setup();
        queue.enqueue(Review::new("card-1", true, "")).await.unwrap();
        queue.enqueue(Review::new("card-2", false, "x")).await.unwrap();

        let created = queue.flush_queue().await.unwrap();

        assert_eq!(created, 2);
        assert_eq!(queue.get_pending_count().await.unwrap(), 0);
        assert_eq!(remote.pushed_reviews().len(), 2);
        let last = queue.get_last_sync_time().await.unwrap().unwrap();
        assert_eq!(last.timestamp_millis(), MockRemote::SERVER_TIME);
    }

    #[tokio::test]
    async fn test_flush_failure_keeps_queue() {
        let (queue, remote) = setup();
        queue.enqueue(Review::new("card-1", true, "")).await.unwrap();
        remote.fail_next(1);

        let result = queue.flush_queue().await;

        assert!(matches!(result, Err(ReviewQueueError::Remote(_))));
        assert_eq!(queue.get_pending_count().await.unwrap(), 1);
        assert!(queue.get_last_sync_time().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_flush_empty_queue_skips_remote() {
        let (queue, remote) = setup();
        assert_eq!(queue.flush_queue().await.unwrap(), 0);
        assert_eq!(remote.call_count(), 0);
    }

    #[tokio::test]
    async fn test_explicit_timestamps_are_kept() {
        let (queue, _remote) = setup();
        let when = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        let mut review = Review::new("card-1", true, "");
        review.reviewed_at = Some(when);

        queue.enqueue(review).await.unwrap();

        let pending = queue.get_pending().await.unwrap();
        assert_eq!(pending[0].reviewed_at, Some(when));
    }
}
