use std::future::Future;
use std::path::Path;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;

use super::kv::{BatchWrite, KvBackend, SqliteBackend};
use super::locks::KeyedLocks;
use super::StoreError;

/// Typed JSON view over a [`KvBackend`] plus named locks for
/// read-modify-write sequences.
#[derive(Clone)]
pub struct DurableStore {
    backend: Arc<dyn KvBackend>,
    locks: KeyedLocks,
}

impl DurableStore {
    pub fn new(backend: Arc<dyn KvBackend>) -> Self {
        Self {
            backend,
            locks: KeyedLocks::new(),
        }
    }

    /// Open the SQLite store at `db_path`.
    pub fn open(db_path: &Path) -> Result<Self, StoreError> {
        Ok(Self::new(Arc::new(SqliteBackend::open(db_path)?)))
    }

    pub fn in_memory() -> Result<Self, StoreError> {
        Ok(Self::new(Arc::new(SqliteBackend::open_in_memory()?)))
    }

    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, StoreError> {
        match self.backend.get(key).await? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    pub async fn set<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<(), StoreError> {
        let raw = serde_json::to_string(value)?;
        self.backend.set(key, raw).await
    }

    pub async fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.backend.remove(key).await
    }

    /// Apply several raw writes atomically.
    pub async fn write_batch(&self, writes: Vec<BatchWrite>) -> Result<(), StoreError> {
        if writes.is_empty() {
            return Ok(());
        }
        self.backend.write_batch(writes).await
    }

    /// Run `f` exclusively with respect to other callers using `lock_name`.
    pub async fn with_lock<F, Fut, T>(&self, lock_name: &str, f: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        self.locks.with_lock(lock_name, f).await
    }
}

/// Serialize a value for use in [`DurableStore::write_batch`].
pub fn batch_value<T: Serialize + ?Sized>(
    key: impl Into<String>,
    value: &T,
) -> Result<BatchWrite, StoreError> {
    Ok((key.into(), Some(serde_json::to_string(value)?)))
}
