pub mod config;
pub mod network;
pub mod queue;
pub mod remote;
pub mod reviews;
pub mod scheduler;

mod manager;

#[cfg(test)]
pub(crate) mod testing;

pub use config::{RetryPolicy, SyncState, SyncStatus, RETRY_DELAYS_MS};
pub use manager::{SyncError, SyncManager};
pub use network::NetworkMonitor;
pub use queue::{
    OperationPayload, OperationQueue, OperationStatus, OperationType, OperationUpdate,
    QueuedOperation, MAX_RETRIES, OPERATIONS_QUEUE_KEY,
};
pub use remote::{HttpRemote, PullResponse, PushResponse, RemoteApi, RemoteError};
pub use reviews::{Review, ReviewQueue, ReviewQueueError};
pub use scheduler::{SyncScheduler, SyncSchedulerMessage};
