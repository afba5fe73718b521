//! Offline-first sync and spaced repetition core for flashdeck.
//!
//! [`FlashDeck`] wires the pieces together from an [`AppConfig`]: the
//! durable store, the optimistic cache, the offline operation queue and its
//! sync manager, the review queue and per-deck study state.

use std::fs;
use std::sync::Arc;

use thiserror::Error;

pub mod cache;
pub mod config;
pub mod flashcards;
pub mod storage;
pub mod sync;

use cache::{CacheError, OptimisticCache};
use config::{AppConfig, ConfigError};
use flashcards::{StudyError, StudyStore};
use storage::{DurableStore, StoreError};
use sync::{
    HttpRemote, NetworkMonitor, OperationQueue, RemoteApi, RemoteError, ReviewQueue, SyncManager,
    SyncScheduler,
};

#[derive(Error, Debug)]
pub enum AppError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Remote(#[from] RemoteError),

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error(transparent)]
    Study(#[from] StudyError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Everything the app needs, built once per process
pub struct FlashDeck {
    pub store: DurableStore,
    pub remote: Arc<dyn RemoteApi>,
    pub network: NetworkMonitor,
    pub sync: Arc<SyncManager>,
    pub cache: OptimisticCache,
    pub study: StudyStore,
}

impl FlashDeck {
    /// Open the on-disk store and connect to the configured server.
    pub fn open(config: &AppConfig, online: bool) -> Result<Self, AppError> {
        let data_dir = config.data_dir()?;
        fs::create_dir_all(&data_dir)?;
        let store = DurableStore::open(&config.database_path()?)?;

        let remote: Arc<dyn RemoteApi> = Arc::new(HttpRemote::new(
            &config.api_base_url,
            config.api_token.clone(),
            config.request_timeout(),
        )?);

        log::info!("FlashDeck: opened {}", data_dir.display());
        Ok(Self::with_parts(config, store, remote, NetworkMonitor::new(online)))
    }

    /// Assemble from an existing store and remote.
    pub fn with_parts(
        config: &AppConfig,
        store: DurableStore,
        remote: Arc<dyn RemoteApi>,
        network: NetworkMonitor,
    ) -> Self {
        let reviews = ReviewQueue::new(store.clone(), remote.clone());
        let operations = OperationQueue::with_max_retries(store.clone(), config.max_retries);
        let sync = Arc::new(SyncManager::new(
            store.clone(),
            operations,
            reviews.clone(),
            remote.clone(),
            network.clone(),
            config.retry_policy(),
        ));
        let cache = OptimisticCache::with_ttl(store.clone(), sync.clone(), remote.clone(), config.cache_ttl());
        let study = StudyStore::new(store.clone(), reviews);

        Self {
            store,
            remote,
            network,
            sync,
            cache,
            study,
        }
    }

    /// Start background replay: recovers interrupted operations, syncs once
    /// and then follows connectivity changes.
    pub fn start(&self) -> SyncScheduler {
        self.sync.start()
    }

    /// Check connectivity against the server and record the result.
    pub async fn probe_network(&self) -> bool {
        self.network.probe(self.remote.as_ref()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{CachedEntry, DeckSummary, MY_LISTS_KEY};
    use crate::sync::testing::{Call, MockRemote};
    use crate::sync::SyncState;

    #[test]
    fn test_open_creates_data_dir() {
        let temp = tempfile::TempDir::new().unwrap();
        let config = AppConfig {
            data_dir: Some(temp.path().join("data")),
            ..Default::default()
        };

        let app = FlashDeck::open(&config, false).unwrap();

        assert!(temp.path().join("data").join("flashdeck.db").exists());
        assert!(!app.network.is_online());
    }

    #[tokio::test]
    async fn test_offline_subscribe_then_reconnect() {
        let remote = Arc::new(MockRemote::new());
        let app = FlashDeck::with_parts(
            &AppConfig::default(),
            DurableStore::in_memory().unwrap(),
            remote.clone(),
            NetworkMonitor::new(false),
        );
        let deck = DeckSummary {
            id: "d1".to_string(),
            title: "Spanish verbs".to_string(),
            icon: None,
            card_count: 40,
            owned: false,
        };
        app.store
            .set("cache:all-lists", &CachedEntry::new(vec![deck], chrono::Utc::now()))
            .await
            .unwrap();

        app.cache.add_list("d1", None).await.unwrap();
        assert_eq!(app.sync.operations().pending_count().await.unwrap(), 1);

        // Let the pass triggered by the mutation finish first
        let mut rx = app.sync.subscribe();
        rx.wait_for(|s| s.state == SyncState::Offline).await.unwrap();
        drop(rx);

        app.network.set_online(true);
        let status = app.sync.force_sync().await;

        assert_eq!(status.state, SyncState::Idle);
        assert_eq!(status.pending_count, 0);
        assert_eq!(remote.calls(), vec![Call::Subscribe("d1".to_string(), None)]);
        let lists: CachedEntry<Vec<DeckSummary>> = app.store.get(MY_LISTS_KEY).await.unwrap().unwrap();
        assert_eq!(lists.data.len(), 1);
    }
}
