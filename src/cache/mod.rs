//! Optimistic cache
//!
//! Deck collections and card lists cached in the durable store, with
//! read-through refresh and locally applied mutations that are replayed
//! later by the sync manager.

mod layer;
mod models;
mod snapshot;

use thiserror::Error;

use crate::storage::StoreError;

pub use layer::{
    cards_key, OptimisticCache, ALL_LISTS_KEY, AVAILABLE_PERSONAL_KEY, DEFAULT_CACHE_TTL_SECS,
    MY_LISTS_KEY,
};
pub use models::{CachedEntry, DeckSummary};
pub use snapshot::{CacheSnapshot, CACHE_LOCK};

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Storage error: {0}")]
    Store(#[from] StoreError),

    #[error("No data available for {0}")]
    NoDataAvailable(String),

    #[error("Deck not found: {0}")]
    DeckNotFound(String),
}
