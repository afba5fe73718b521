use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use thiserror::Error;
use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;

use crate::cache::CACHE_LOCK;
use crate::storage::{DurableStore, StoreError};

use super::config::{RetryPolicy, SyncState, SyncStatus};
use super::network::NetworkMonitor;
use super::queue::{OperationQueue, OperationStatus, OperationType, OperationUpdate, QueuedOperation};
use super::remote::{RemoteApi, RemoteError};
use super::reviews::ReviewQueue;
use super::scheduler::{start_sync_scheduler, SyncScheduler};

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Remote error: {0}")]
    Remote(#[from] RemoteError),
    #[error("Storage error: {0}")]
    Store(#[from] StoreError),
    #[error("Invalid {0:?} payload: {1}")]
    InvalidPayload(OperationType, &'static str),
}

/// What happened to one operation during a pass
#[derive(Debug)]
enum OperationOutcome {
    Synced,
    /// Failed, still queued for another attempt
    Failed(String),
    /// Out of retries: cache rolled back, operation dropped
    RolledBack(String),
}

/// Releases the single-flight flag when a pass ends, however it ends,
/// and wakes anyone waiting for the pass.
struct FlightGuard<'a> {
    flag: &'a AtomicBool,
    done: &'a Notify,
}

impl<'a> FlightGuard<'a> {
    fn acquire(flag: &'a AtomicBool, done: &'a Notify) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self { flag, done })
    }
}

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
        self.done.notify_waiters();
    }
}

/// Replays the offline operation queue against the remote service.
///
/// One instance per process, shared behind an `Arc`. Only one replay pass
/// runs at a time; overlapping requests return immediately.
pub struct SyncManager {
    store: DurableStore,
    operations: OperationQueue,
    reviews: ReviewQueue,
    remote: Arc<dyn RemoteApi>,
    network: NetworkMonitor,
    policy: RetryPolicy,
    in_progress: AtomicBool,
    pass_done: Notify,
    status: watch::Sender<SyncStatus>,
    retry_timer: Mutex<Option<JoinHandle<()>>>,
}

impl SyncManager {
    pub fn new(
        store: DurableStore,
        operations: OperationQueue,
        reviews: ReviewQueue,
        remote: Arc<dyn RemoteApi>,
        network: NetworkMonitor,
        policy: RetryPolicy,
    ) -> Self {
        let (status, _rx) = watch::channel(SyncStatus::default());
        Self {
            store,
            operations,
            reviews,
            remote,
            network,
            policy,
            in_progress: AtomicBool::new(false),
            pass_done: Notify::new(),
            status,
            retry_timer: Mutex::new(None),
        }
    }

    pub fn operations(&self) -> &OperationQueue {
        &self.operations
    }

    pub fn reviews(&self) -> &ReviewQueue {
        &self.reviews
    }

    pub fn network(&self) -> &NetworkMonitor {
        &self.network
    }

    /// Current status; the receiver sees it immediately and every later change.
    pub fn subscribe(&self) -> watch::Receiver<SyncStatus> {
        self.status.subscribe()
    }

    pub fn status(&self) -> SyncStatus {
        self.status.borrow().clone()
    }

    pub fn is_syncing(&self) -> bool {
        self.in_progress.load(Ordering::Acquire)
    }

    /// Wait until no replay pass is running.
    pub async fn wait_for_pass(&self) {
        loop {
            let notified = self.pass_done.notified();
            tokio::pin!(notified);
            // Register before checking so a pass ending in between still wakes us
            notified.as_mut().enable();
            if !self.is_syncing() {
                return;
            }
            notified.await;
        }
    }

    /// Reset interrupted operations, spawn the scheduler loop and kick off a first pass.
    pub fn start(self: &Arc<Self>) -> SyncScheduler {
        start_sync_scheduler(Arc::clone(self))
    }

    /// Start a replay pass in the background.
    pub fn trigger(self: &Arc<Self>) {
        let manager = Arc::clone(self);
        tokio::spawn(async move {
            manager.process_queue().await;
        });
    }

    /// Replay the queue now, then push pending reviews.
    pub async fn force_sync(self: &Arc<Self>) -> SyncStatus {
        let status = self.process_queue().await;

        if self.network.is_online() {
            if let Err(e) = self.reviews.flush_queue().await {
                log::warn!("Sync manager: review flush failed: {}", e);
            }
        }
        status
    }

    /// Record that connectivity was lost.
    pub async fn mark_offline(&self) {
        if !self.is_syncing() {
            self.publish(SyncState::Offline, None).await;
        }
    }

    /// Run one replay pass over the operation queue.
    ///
    /// Never fails: problems become status transitions visible to
    /// subscribers. Returns the status at the end of the pass.
    pub async fn process_queue(self: &Arc<Self>) -> SyncStatus {
        let Some(_flight) = FlightGuard::acquire(&self.in_progress, &self.pass_done) else {
            log::debug!("Sync manager: pass already in progress, skipping");
            return self.status();
        };
        self.cancel_retry();

        if !self.network.is_online() {
            return self.publish(SyncState::Offline, None).await;
        }

        let operations = match self.operations.get_operations_to_sync().await {
            Ok(operations) => operations,
            Err(e) => {
                log::error!("Sync manager: failed to load operation queue: {}", e);
                return self.publish(SyncState::Error, Some(e.to_string())).await;
            }
        };

        if operations.is_empty() {
            return self.publish(SyncState::Idle, None).await;
        }

        log::info!("Sync manager: replaying {} operation(s)", operations.len());
        self.publish(SyncState::Syncing, None).await;

        let mut any_failed = false;
        let mut last_error = None;

        for operation in &operations {
            if !self.network.is_online() {
                log::info!("Sync manager: went offline mid-pass, stopping");
                return self.publish(SyncState::Offline, last_error).await;
            }

            match self.sync_operation(operation).await {
                Ok(OperationOutcome::Synced) => {}
                Ok(OperationOutcome::Failed(message)) | Ok(OperationOutcome::RolledBack(message)) => {
                    any_failed = true;
                    last_error = Some(message);
                }
                Err(e) => {
                    log::error!("Sync manager: operation {} could not be processed: {}", operation.id, e);
                    any_failed = true;
                    last_error = Some(e.to_string());
                    let update = OperationUpdate {
                        status: Some(OperationStatus::Failed),
                        last_error: Some(e.to_string()),
                        ..Default::default()
                    };
                    if let Err(e) = self.operations.update_operation(operation.id, update).await {
                        log::error!("Sync manager: failed to mark operation {} as failed: {}", operation.id, e);
                    }
                }
            }
        }

        let remaining = match self.operations.get_operations_to_sync().await {
            Ok(remaining) => remaining,
            Err(e) => {
                log::error!("Sync manager: failed to reload operation queue: {}", e);
                return self.publish(SyncState::Error, Some(e.to_string())).await;
            }
        };

        if any_failed && !remaining.is_empty() {
            let max_retry = remaining.iter().map(|op| op.retry_count).max().unwrap_or(0);
            let delay = self.policy.delay_for(max_retry);
            log::info!(
                "Sync manager: {} operation(s) left, retrying in {:.0}s",
                remaining.len(),
                delay.as_secs_f64()
            );
            let status = self.publish(SyncState::Error, last_error).await;
            self.schedule_retry(delay);
            status
        } else {
            self.publish(SyncState::Idle, None).await
        }
    }

    async fn sync_operation(&self, operation: &QueuedOperation) -> Result<OperationOutcome, StoreError> {
        self.operations
            .update_operation(
                operation.id,
                OperationUpdate {
                    status: Some(OperationStatus::Syncing),
                    ..Default::default()
                },
            )
            .await?;

        let error = match self.replay(operation).await {
            Ok(()) => {
                self.operations.dequeue(operation.id).await?;
                log::info!("Sync manager: {:?} {} synced", operation.op_type, operation.id);
                return Ok(OperationOutcome::Synced);
            }
            Err(e) => e.to_string(),
        };

        // Every failure cause shares the same retry budget.
        let attempt = operation.retry_count + 1;
        if self.policy.exhausted(attempt) {
            log::error!(
                "Sync manager: {:?} {} failed {} times, rolling back: {}",
                operation.op_type,
                operation.id,
                attempt,
                error
            );
            if let Some(snapshot) = &operation.payload.snapshot {
                self.store
                    .with_lock(CACHE_LOCK, || snapshot.restore(&self.store))
                    .await?;
            }
            self.operations.dequeue(operation.id).await?;
            return Ok(OperationOutcome::RolledBack(error));
        }

        log::warn!(
            "Sync manager: {:?} {} failed (attempt {}/{}): {}",
            operation.op_type,
            operation.id,
            attempt,
            self.policy.max_retries,
            error
        );
        self.operations
            .update_operation(
                operation.id,
                OperationUpdate {
                    status: Some(OperationStatus::Failed),
                    retry_count: Some(attempt),
                    last_error: Some(error.clone()),
                },
            )
            .await?;
        Ok(OperationOutcome::Failed(error))
    }

    async fn replay(&self, operation: &QueuedOperation) -> Result<(), SyncError> {
        let payload = &operation.payload;
        let deck_id = || {
            payload
                .deck_id
                .as_deref()
                .ok_or(SyncError::InvalidPayload(operation.op_type, "missing deckId"))
        };

        match operation.op_type {
            OperationType::AddList => {
                self.remote.subscribe(deck_id()?, payload.icon.as_deref()).await?;
            }
            OperationType::RemoveList => {
                self.remote.unsubscribe(deck_id()?).await?;
            }
            OperationType::ReorderLists => {
                let deck_ids = payload
                    .deck_ids
                    .as_deref()
                    .ok_or(SyncError::InvalidPayload(operation.op_type, "missing deckIds"))?;
                self.remote.reorder(deck_ids).await?;
            }
            OperationType::DeleteDeck => {
                self.remote.delete_deck(deck_id()?).await?;
            }
        }
        Ok(())
    }

    async fn publish(&self, state: SyncState, last_error: Option<String>) -> SyncStatus {
        let pending_count = match self.operations.pending_count().await {
            Ok(count) => count,
            Err(e) => {
                log::warn!("Sync manager: failed to count pending operations: {}", e);
                let previous = self.status.borrow().pending_count;
                previous
            }
        };
        let status = SyncStatus {
            state,
            pending_count,
            last_error,
        };
        self.status.send_replace(status.clone());
        status
    }

    fn schedule_retry(self: &Arc<Self>, delay: Duration) {
        let manager = Arc::clone(self);
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            // Detach our own handle so the pass below does not abort this task.
            manager
                .retry_timer
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .take();
            manager.process_queue().await;
        });

        let previous = self
            .retry_timer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(handle);
        if let Some(previous) = previous {
            previous.abort();
        }
    }

    /// Drop any scheduled retry pass.
    pub fn cancel_retry(&self) {
        let timer = self
            .retry_timer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(timer) = timer {
            timer.abort();
        }
    }

    pub fn has_scheduled_retry(&self) -> bool {
        self.retry_timer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::queue::{OperationPayload, MAX_RETRIES};
    use crate::sync::reviews::Review;
    use crate::sync::testing::{Call, MockRemote};
    use crate::cache::CacheSnapshot;

    struct Harness {
        store: DurableStore,
        remote: Arc<MockRemote>,
        manager: Arc<SyncManager>,
    }

    fn harness(online: bool) -> Harness {
        harness_with_policy(online, RetryPolicy::default())
    }

    fn harness_with_policy(online: bool, policy: RetryPolicy) -> Harness {
        let store = DurableStore::in_memory().unwrap();
        let remote = Arc::new(MockRemote::new());
        let manager = Arc::new(SyncManager::new(
            store.clone(),
            OperationQueue::new(store.clone()),
            ReviewQueue::new(store.clone(), remote.clone()),
            remote.clone(),
            NetworkMonitor::new(online),
            policy,
        ));
        Harness {
            store,
            remote,
            manager,
        }
    }

    impl Harness {
        async fn enqueue(&self, op_type: OperationType, deck_id: &str) -> QueuedOperation {
            self.manager
                .operations()
                .enqueue(op_type, OperationPayload::deck(deck_id))
                .await
                .unwrap()
        }
    }

    #[tokio::test]
    async fn test_replays_in_fifo_order_and_dequeues() {
        let h = harness(true);
        h.enqueue(OperationType::AddList, "d1").await;
        h.enqueue(OperationType::RemoveList, "d1").await;
        h.manager
            .operations()
            .enqueue(
                OperationType::ReorderLists,
                OperationPayload {
                    deck_ids: Some(vec!["d2".to_string(), "d3".to_string()]),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        h.enqueue(OperationType::DeleteDeck, "d4").await;

        let status = h.manager.process_queue().await;

        assert_eq!(status.state, SyncState::Idle);
        assert_eq!(status.pending_count, 0);
        assert_eq!(
            h.remote.calls(),
            vec![
                Call::Subscribe("d1".to_string(), None),
                Call::Unsubscribe("d1".to_string()),
                Call::Reorder(vec!["d2".to_string(), "d3".to_string()]),
                Call::DeleteDeck("d4".to_string()),
            ]
        );
        assert!(h.manager.operations().get_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_offline_pass_does_nothing() {
        let h = harness(false);
        h.enqueue(OperationType::AddList, "d1").await;

        let status = h.manager.process_queue().await;

        assert_eq!(status.state, SyncState::Offline);
        assert_eq!(status.pending_count, 1);
        assert_eq!(h.remote.call_count(), 0);
    }

    #[tokio::test]
    async fn test_empty_queue_is_idle() {
        let h = harness(true);
        let status = h.manager.process_queue().await;
        assert_eq!(status.state, SyncState::Idle);
        assert!(!h.manager.has_scheduled_retry());
    }

    #[tokio::test]
    async fn test_failure_marks_operation_and_schedules_retry() {
        let h = harness(true);
        let first = h.enqueue(OperationType::AddList, "d1").await;
        h.enqueue(OperationType::AddList, "d2").await;
        h.remote.fail_next(1);

        let status = h.manager.process_queue().await;

        assert_eq!(status.state, SyncState::Error);
        assert_eq!(status.pending_count, 1);
        assert!(status.last_error.is_some());
        assert!(h.manager.has_scheduled_retry());

        let queue = h.manager.operations().get_all().await.unwrap();
        assert_eq!(queue.len(), 1);
        assert_eq!(queue[0].id, first.id);
        assert_eq!(queue[0].status, OperationStatus::Failed);
        assert_eq!(queue[0].retry_count, 1);

        // A failed operation does not block the ones behind it
        assert_eq!(h.remote.calls().len(), 2);

        h.manager.cancel_retry();
        assert!(!h.manager.has_scheduled_retry());
    }

    fn fast_policy(delays_ms: &[u64]) -> RetryPolicy {
        RetryPolicy {
            max_retries: MAX_RETRIES,
            delays: delays_ms.iter().map(|ms| Duration::from_millis(*ms)).collect(),
        }
    }

    #[tokio::test]
    async fn test_retry_timer_replays_queue() {
        let h = harness_with_policy(true, fast_policy(&[10, 10, 10, 10, 10]));
        h.enqueue(OperationType::AddList, "d1").await;
        h.remote.fail_next(1);

        let status = h.manager.process_queue().await;
        assert_eq!(status.state, SyncState::Error);
        assert!(h.manager.has_scheduled_retry());

        let mut rx = h.manager.subscribe();
        let settled = tokio::time::timeout(
            Duration::from_secs(2),
            rx.wait_for(|s| s.state == SyncState::Idle && s.pending_count == 0),
        )
        .await
        .is_ok_and(|changed| changed.is_ok());
        assert!(settled, "retry pass never ran");

        assert_eq!(
            h.remote.calls(),
            vec![
                Call::Subscribe("d1".to_string(), None),
                Call::Subscribe("d1".to_string(), None),
            ]
        );
        assert!(h.manager.operations().get_all().await.unwrap().is_empty());
        assert!(!h.manager.has_scheduled_retry());
    }

    #[tokio::test]
    async fn test_retry_delay_follows_highest_retry_count() {
        let h = harness_with_policy(true, fast_policy(&[10, 10, 10, 10, 60_000]));
        h.enqueue(OperationType::AddList, "d1").await;
        let behind = h.enqueue(OperationType::AddList, "d2").await;
        h.manager
            .operations()
            .update_operation(
                behind.id,
                OperationUpdate {
                    retry_count: Some(3),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        h.remote.fail_always(true);

        h.manager.process_queue().await;
        let queue = h.manager.operations().get_all().await.unwrap();
        assert_eq!(queue.iter().map(|op| op.retry_count).max(), Some(4));

        // d1 alone would retry after 10ms; d2 pushes the wait to a minute
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(h.remote.call_count(), 2);
        assert!(h.manager.has_scheduled_retry());
        h.manager.cancel_retry();
    }

    #[tokio::test]
    async fn test_exhausted_retries_roll_back_and_drop() {
        let h = harness(true);
        h.store.set("cache:my-lists", &vec!["before"]).await.unwrap();
        let snapshot = CacheSnapshot::capture(&h.store, &["cache:my-lists"]).await.unwrap();
        h.store.set("cache:my-lists", &vec!["before", "d1"]).await.unwrap();

        h.manager
            .operations()
            .enqueue(
                OperationType::AddList,
                OperationPayload {
                    deck_id: Some("d1".to_string()),
                    snapshot: Some(snapshot),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        // Current behaviour: permanent and transient errors share one budget.
        h.remote.fail_always(true);
        for attempt in 1..MAX_RETRIES {
            let status = h.manager.process_queue().await;
            assert_eq!(status.state, SyncState::Error);
            let queue = h.manager.operations().get_all().await.unwrap();
            assert_eq!(queue[0].retry_count, attempt);
        }

        let status = h.manager.process_queue().await;

        assert_eq!(status.state, SyncState::Idle);
        assert_eq!(h.remote.call_count(), MAX_RETRIES as usize);
        assert!(h.manager.operations().get_all().await.unwrap().is_empty());
        let lists: Option<Vec<String>> = h.store.get("cache:my-lists").await.unwrap();
        assert_eq!(lists, Some(vec!["before".to_string()]));
    }

    #[tokio::test]
    async fn test_rollback_waits_for_cache_lock() {
        let h = harness(true);
        h.store.set("cache:my-lists", &vec!["before"]).await.unwrap();
        let snapshot = CacheSnapshot::capture(&h.store, &["cache:my-lists"]).await.unwrap();
        h.store.set("cache:my-lists", &vec!["before", "d1"]).await.unwrap();

        let op = h
            .manager
            .operations()
            .enqueue(
                OperationType::AddList,
                OperationPayload {
                    deck_id: Some("d1".to_string()),
                    snapshot: Some(snapshot),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        h.manager
            .operations()
            .update_operation(
                op.id,
                OperationUpdate {
                    retry_count: Some(MAX_RETRIES - 1),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        h.remote.fail_always(true);

        let pass = h
            .store
            .with_lock(CACHE_LOCK, || async {
                let manager = Arc::clone(&h.manager);
                let pass = tokio::spawn(async move { manager.process_queue().await });
                tokio::time::sleep(Duration::from_millis(50)).await;

                // The pass gave up on the operation but cannot restore yet
                assert_eq!(h.remote.call_count(), 1);
                let lists: Option<Vec<String>> = h.store.get("cache:my-lists").await.unwrap();
                assert_eq!(lists, Some(vec!["before".to_string(), "d1".to_string()]));
                pass
            })
            .await;

        let status = pass.await.unwrap();
        assert_eq!(status.state, SyncState::Idle);
        let lists: Option<Vec<String>> = h.store.get("cache:my-lists").await.unwrap();
        assert_eq!(lists, Some(vec!["before".to_string()]));
        assert!(h.manager.operations().get_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_single_flight() {
        let h = harness(true);
        h.enqueue(OperationType::AddList, "d1").await;
        h.remote.set_delay(Duration::from_millis(100));

        let manager = Arc::clone(&h.manager);
        let first = tokio::spawn(async move { manager.process_queue().await });
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(h.manager.is_syncing());

        let second = h.manager.process_queue().await;
        assert_eq!(second.state, SyncState::Syncing);

        let first = first.await.unwrap();
        assert_eq!(first.state, SyncState::Idle);
        assert_eq!(h.remote.call_count(), 1);
        assert!(!h.manager.is_syncing());
    }

    #[tokio::test]
    async fn test_wait_for_pass_returns_when_pass_ends() {
        let h = harness(true);
        h.manager.wait_for_pass().await;

        h.enqueue(OperationType::AddList, "d1").await;
        h.remote.set_delay(Duration::from_millis(100));
        let manager = Arc::clone(&h.manager);
        let pass = tokio::spawn(async move { manager.process_queue().await });
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(h.manager.is_syncing());

        tokio::time::timeout(Duration::from_secs(2), h.manager.wait_for_pass())
            .await
            .unwrap();

        assert!(!h.manager.is_syncing());
        assert_eq!(h.remote.call_count(), 1);
        assert_eq!(h.manager.status().state, SyncState::Idle);
        pass.await.unwrap();
    }

    #[tokio::test]
    async fn test_going_offline_mid_pass_stops() {
        let h = harness(true);
        h.enqueue(OperationType::AddList, "d1").await;
        h.enqueue(OperationType::AddList, "d2").await;
        h.remote.set_delay(Duration::from_millis(50));

        let manager = Arc::clone(&h.manager);
        let pass = tokio::spawn(async move { manager.process_queue().await });
        tokio::time::sleep(Duration::from_millis(10)).await;
        h.manager.network().set_online(false);

        let status = pass.await.unwrap();
        assert_eq!(status.state, SyncState::Offline);
        assert_eq!(status.pending_count, 1);
        assert_eq!(h.remote.call_count(), 1);
    }

    #[tokio::test]
    async fn test_subscribers_see_current_status_first() {
        let h = harness(false);
        h.enqueue(OperationType::AddList, "d1").await;
        h.manager.process_queue().await;

        let rx = h.manager.subscribe();
        let status = rx.borrow().clone();
        assert_eq!(status.state, SyncState::Offline);
        assert_eq!(status.pending_count, 1);
    }

    #[tokio::test]
    async fn test_invalid_payload_uses_retry_budget() {
        let h = harness(true);
        h.manager
            .operations()
            .enqueue(OperationType::RemoveList, OperationPayload::default())
            .await
            .unwrap();

        let status = h.manager.process_queue().await;

        assert_eq!(status.state, SyncState::Error);
        assert_eq!(h.remote.call_count(), 0);
        let queue = h.manager.operations().get_all().await.unwrap();
        assert_eq!(queue[0].retry_count, 1);
        assert!(queue[0].last_error.as_deref().unwrap().contains("deckId"));
        h.manager.cancel_retry();
    }

    #[tokio::test]
    async fn test_force_sync_flushes_reviews() {
        let h = harness(true);
        h.manager
            .reviews()
            .enqueue(Review::new("card-1", true, ""))
            .await
            .unwrap();

        let status = h.manager.force_sync().await;

        assert_eq!(status.state, SyncState::Idle);
        assert_eq!(h.manager.reviews().get_pending_count().await.unwrap(), 0);
        assert_eq!(h.remote.calls(), vec![Call::PushReviews(1)]);
    }
}
