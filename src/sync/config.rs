use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::queue::MAX_RETRIES;

/// Backoff before retry attempt N (index clamped to the last entry)
pub const RETRY_DELAYS_MS: [u64; 5] = [1_000, 2_000, 4_000, 8_000, 16_000];

/// Current state of queue replay
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum SyncState {
    /// Nothing to replay, or the last pass finished cleanly
    #[default]
    Idle,
    /// A replay pass is running
    Syncing,
    /// The device has no connectivity; replay waits for it
    Offline,
    /// Some operations failed and a retry is scheduled
    Error,
}

/// Snapshot published to status subscribers
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct SyncStatus {
    pub state: SyncState,
    /// Operations still waiting to be replayed
    pub pending_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

/// Retry behaviour of the sync manager
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub delays: Vec<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: MAX_RETRIES,
            delays: RETRY_DELAYS_MS.iter().map(|ms| Duration::from_millis(*ms)).collect(),
        }
    }
}

impl RetryPolicy {
    /// Delay before the next pass, given the highest retry count among
    /// the operations still queued.
    pub fn delay_for(&self, retry_count: u32) -> Duration {
        let Some(last) = self.delays.len().checked_sub(1) else {
            return Duration::from_secs(1);
        };
        let index = (retry_count as usize).min(last);
        self.delays[index]
    }

    /// Whether an operation that just failed for the `attempt`-th time is out of retries
    pub fn exhausted(&self, attempt: u32) -> bool {
        attempt >= self.max_retries
    }
}
