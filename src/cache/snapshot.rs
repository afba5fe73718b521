use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::storage::{DurableStore, StoreError};

/// Lock held while cached collections are read, changed and written back,
/// including rollbacks.
pub const CACHE_LOCK: &str = "cache:lists";

/// Prior contents of the cache keys touched by one optimistic mutation.
///
/// `None` means the key did not exist, so restoring removes it. Restoring
/// replaces whole collections: writes made to the same keys after the
/// snapshot was taken are lost.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CacheSnapshot {
    pub entries: BTreeMap<String, Option<serde_json::Value>>,
}

impl CacheSnapshot {
    /// Read the current raw value of every key.
    pub async fn capture<S: AsRef<str>>(store: &DurableStore, keys: &[S]) -> Result<Self, StoreError> {
        let mut entries = BTreeMap::new();
        for key in keys {
            let key = key.as_ref();
            let value: Option<serde_json::Value> = store.get(key).await?;
            entries.insert(key.to_string(), value);
        }
        Ok(Self { entries })
    }

    /// Write every captured key back in one transaction.
    pub async fn restore(&self, store: &DurableStore) -> Result<(), StoreError> {
        let mut writes = Vec::with_capacity(self.entries.len());
        for (key, value) in &self.entries {
            let raw = match value {
                Some(value) => Some(serde_json::to_string(value)?),
                None => None,
            };
            writes.push((key.clone(), raw));
        }
        store.write_batch(writes).await
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_restore_puts_back_and_removes() {
        let store = DurableStore::in_memory().unwrap();
        store.set("cache:a", &vec!["x"]).await.unwrap();

        let snapshot = CacheSnapshot::capture(&store, &["cache:a", "cache:b"]).await.unwrap();
        assert_eq!(snapshot.keys().collect::<Vec<_>>(), vec!["cache:a", "cache:b"]);

        store.set("cache:a", &vec!["y", "z"]).await.unwrap();
        store.set("cache:b", &vec!["new"]).await.unwrap();

        snapshot.restore(&store).await.unwrap();

        let a: Option<Vec<String>> = store.get("cache:a").await.unwrap();
        let b: Option<Vec<String>> = store.get("cache:b").await.unwrap();
        assert_eq!(a, Some(vec!["x".to_string()]));
        assert_eq!(b, None);
    }

    #[test]
    fn test_snapshot_survives_json_roundtrip() {
        let mut snapshot = CacheSnapshot::default();
        snapshot
            .entries
            .insert("cache:my-lists".to_string(), Some(serde_json::json!({"data": [], "timestamp": "2026-01-01T00:00:00Z"})));
        snapshot.entries.insert("cache:all-lists".to_string(), None);

        let json = serde_json::to_string(&snapshot).unwrap();
        let back: CacheSnapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(back, snapshot);
    }
}
