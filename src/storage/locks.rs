//! Named async locks.
//!
//! Each lock name maps to a FIFO `tokio::sync::Mutex`, so callers holding the
//! same name run one at a time and in the order they asked.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};

use tokio::sync::Mutex as AsyncMutex;

#[derive(Clone, Default)]
pub struct KeyedLocks {
    locks: Arc<Mutex<HashMap<String, Arc<AsyncMutex<()>>>>>,
}

impl KeyedLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn handle(&self, name: &str) -> Arc<AsyncMutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        Arc::clone(
            locks
                .entry(name.to_string())
                .or_insert_with(|| Arc::new(AsyncMutex::new(()))),
        )
    }

    /// Run `f` while holding the lock called `name`.
    pub async fn with_lock<F, Fut, T>(&self, name: &str, f: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let lock = self.handle(name);
        let result = {
            let _guard = lock.lock().await;
            f().await
        };
        drop(lock);
        self.release(name);
        result
    }

    /// Forget the entry for `name` once nobody else holds or waits on it.
    fn release(&self, name: &str) {
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(lock) = locks.get(name) {
            if Arc::strong_count(lock) == 1 {
                locks.remove(name);
            }
        }
    }

    #[cfg(test)]
    fn tracked(&self) -> usize {
        self.locks.lock().unwrap().len()
    }
}
