//! Durable keyed store
//!
//! An asynchronous key → JSON blob store (SQLite underneath) with named
//! locks that serialize read-modify-write sequences on one logical key.

pub mod kv;
mod locks;
mod store;

use thiserror::Error;

pub use kv::{BatchWrite, KvBackend, SqliteBackend};
pub use locks::KeyedLocks;
pub use store::{batch_value, DurableStore};

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Storage task failed: {0}")]
    Task(String),

    #[error("Storage connection poisoned")]
    Poisoned,
}
