use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::cache::CacheSnapshot;
use crate::storage::{DurableStore, StoreError};

pub const OPERATIONS_QUEUE_KEY: &str = "offline:operations-queue";

/// Attempts an operation gets before it is rolled back and dropped
pub const MAX_RETRIES: u32 = 5;

/// Kind of mutation waiting to be replayed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OperationType {
    /// Subscribe to a list
    AddList,
    /// Unsubscribe from a list
    RemoveList,
    /// Persist the order of the user's lists
    ReorderLists,
    /// Delete a deck the user owns
    DeleteDeck,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationStatus {
    Pending,
    Syncing,
    Failed,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deck_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deck_ids: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    /// Cache contents before the optimistic change, restored on terminal failure
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snapshot: Option<CacheSnapshot>,
}

impl OperationPayload {
    pub fn deck(deck_id: impl Into<String>) -> Self {
        Self {
            deck_id: Some(deck_id.into()),
            ..Default::default()
        }
    }
}

/// A single queued mutation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueuedOperation {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub op_type: OperationType,
    #[serde(default)]
    pub payload: OperationPayload,
    pub created_at: DateTime<Utc>,
    /// Number of failed attempts
    #[serde(default)]
    pub retry_count: u32,
    pub status: OperationStatus,
    /// Last error message if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

impl QueuedOperation {
    /// Whether the sync manager should (re)try this operation
    pub fn is_syncable(&self, max_retries: u32) -> bool {
        match self.status {
            OperationStatus::Pending => true,
            OperationStatus::Failed => self.retry_count < max_retries,
            OperationStatus::Syncing => false,
        }
    }
}

/// Partial update applied by [`OperationQueue::update_operation`]
#[derive(Debug, Clone, Default)]
pub struct OperationUpdate {
    pub status: Option<OperationStatus>,
    pub retry_count: Option<u32>,
    pub last_error: Option<String>,
}

/// Durable FIFO of mutations created while the device may be offline.
///
/// The whole queue lives under one store key; every read-modify-write runs
/// under that key's lock.
#[derive(Clone)]
pub struct OperationQueue {
    store: DurableStore,
    max_retries: u32,
}

impl OperationQueue {
    pub fn new(store: DurableStore) -> Self {
        Self::with_max_retries(store, MAX_RETRIES)
    }

    pub fn with_max_retries(store: DurableStore, max_retries: u32) -> Self {
        Self { store, max_retries }
    }

    /// Load queue from the store
    pub async fn get_all(&self) -> Result<Vec<QueuedOperation>, StoreError> {
        Ok(self.store.get(OPERATIONS_QUEUE_KEY).await?.unwrap_or_default())
    }

    async fn save(&self, queue: &[QueuedOperation]) -> Result<(), StoreError> {
        self.store.set(OPERATIONS_QUEUE_KEY, queue).await
    }

    /// Run a read-modify-write over the queue under its lock.
    async fn modify<T>(
        &self,
        f: impl FnOnce(&mut Vec<QueuedOperation>) -> T,
    ) -> Result<T, StoreError> {
        self.store
            .with_lock(OPERATIONS_QUEUE_KEY, || async {
                let mut queue = self.get_all().await?;
                let result = f(&mut queue);
                self.save(&queue).await?;
                Ok::<T, StoreError>(result)
            })
            .await
    }

    /// Append a new pending operation
    pub async fn enqueue(
        &self,
        op_type: OperationType,
        payload: OperationPayload,
    ) -> Result<QueuedOperation, StoreError> {
        let operation = QueuedOperation {
            id: Uuid::new_v4(),
            op_type,
            payload,
            created_at: Utc::now(),
            retry_count: 0,
            status: OperationStatus::Pending,
            last_error: None,
        };

        let queued = operation.clone();
        self.modify(move |queue| queue.push(queued)).await?;

        log::debug!("Operation queue: enqueued {:?} {}", operation.op_type, operation.id);
        Ok(operation)
    }

    /// Patch status, retry count or last error of an operation. Unknown ids are ignored.
    pub async fn update_operation(&self, id: Uuid, update: OperationUpdate) -> Result<(), StoreError> {
        self.modify(move |queue| {
            if let Some(op) = queue.iter_mut().find(|op| op.id == id) {
                if let Some(status) = update.status {
                    op.status = status;
                }
                if let Some(retry_count) = update.retry_count {
                    op.retry_count = retry_count;
                }
                if let Some(last_error) = update.last_error {
                    op.last_error = Some(last_error);
                }
            }
        })
        .await
    }

    /// Remove an operation. Unknown ids are ignored.
    pub async fn dequeue(&self, id: Uuid) -> Result<(), StoreError> {
        self.modify(move |queue| queue.retain(|op| op.id != id)).await
    }

    /// Operations eligible for replay, in insertion order
    pub async fn get_operations_to_sync(&self) -> Result<Vec<QueuedOperation>, StoreError> {
        Ok(self
            .get_all()
            .await?
            .into_iter()
            .filter(|op| op.is_syncable(self.max_retries))
            .collect())
    }

    /// Number of operations still eligible for replay
    pub async fn pending_count(&self) -> Result<usize, StoreError> {
        Ok(self.get_operations_to_sync().await?.len())
    }

    /// Put operations left in `syncing` by an interrupted process back to `pending`.
    ///
    /// Returns how many were reset.
    pub async fn reset_syncing_operations(&self) -> Result<usize, StoreError> {
        let reset = self
            .modify(|queue| {
                let mut reset = 0;
                for op in queue.iter_mut().filter(|op| op.status == OperationStatus::Syncing) {
                    op.status = OperationStatus::Pending;
                    reset += 1;
                }
                reset
            })
            .await?;

        if reset > 0 {
            log::info!("Operation queue: reset {} interrupted operation(s) to pending", reset);
        }
        Ok(reset)
    }
}
