use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::flashcards::Card;
use crate::storage::{batch_value, BatchWrite, DurableStore, StoreError};
use crate::sync::{
    OperationPayload, OperationQueue, OperationType, QueuedOperation, RemoteApi, RemoteError,
    SyncManager,
};

use super::models::{CachedEntry, DeckSummary};
use super::snapshot::{CacheSnapshot, CACHE_LOCK};
use super::CacheError;

pub const MY_LISTS_KEY: &str = "cache:my-lists";
pub const ALL_LISTS_KEY: &str = "cache:all-lists";
pub const AVAILABLE_PERSONAL_KEY: &str = "cache:available-personal";

/// How long a cached collection is served without refetching
pub const DEFAULT_CACHE_TTL_SECS: i64 = 300;

const LIST_KEYS: [&str; 3] = [MY_LISTS_KEY, ALL_LISTS_KEY, AVAILABLE_PERSONAL_KEY];

pub fn cards_key(deck_id: &str) -> String {
    format!("cache:cards:{}", deck_id)
}

/// The three deck collections, as currently cached
#[derive(Debug, Default)]
struct ListSet {
    my_lists: Vec<DeckSummary>,
    all_lists: Vec<DeckSummary>,
    available: Vec<DeckSummary>,
}

fn take_deck(list: &mut Vec<DeckSummary>, deck_id: &str) -> Option<DeckSummary> {
    let index = list.iter().position(|d| d.id == deck_id)?;
    Some(list.remove(index))
}

/// Order `decks` to follow `order`; decks not named keep their relative
/// order after the named ones. Unknown ids are skipped.
fn reorder(decks: Vec<DeckSummary>, order: &[String]) -> Vec<DeckSummary> {
    let mut rest = decks;
    let mut ordered = Vec::with_capacity(rest.len());
    for id in order {
        if let Some(deck) = take_deck(&mut rest, id) {
            ordered.push(deck);
        }
    }
    ordered.extend(rest);
    ordered
}

/// Read-through cache for deck collections with optimistic mutations.
///
/// Every mutation is applied locally first, snapshotted, recorded in the
/// operation queue and handed to the sync manager. Mutations hold
/// [`CACHE_LOCK`] from snapshot to enqueue, so overlapping calls apply one
/// after the other. The user sees the
/// change immediately; the snapshot is restored if the server never
/// accepts it.
#[derive(Clone)]
pub struct OptimisticCache {
    store: DurableStore,
    sync: Arc<SyncManager>,
    remote: Arc<dyn RemoteApi>,
    ttl: Duration,
}

impl OptimisticCache {
    pub fn new(store: DurableStore, sync: Arc<SyncManager>, remote: Arc<dyn RemoteApi>) -> Self {
        Self::with_ttl(store, sync, remote, Duration::seconds(DEFAULT_CACHE_TTL_SECS))
    }

    pub fn with_ttl(
        store: DurableStore,
        sync: Arc<SyncManager>,
        remote: Arc<dyn RemoteApi>,
        ttl: Duration,
    ) -> Self {
        Self {
            store,
            sync,
            remote,
            ttl,
        }
    }

    pub fn sync(&self) -> &Arc<SyncManager> {
        &self.sync
    }

    fn operations(&self) -> &OperationQueue {
        self.sync.operations()
    }

    // ===== Reads =====

    pub async fn fetch_my_lists(&self) -> Result<Vec<DeckSummary>, CacheError> {
        self.read_through(MY_LISTS_KEY, || self.remote.fetch_my_lists())
            .await
    }

    pub async fn fetch_all_lists(&self) -> Result<Vec<DeckSummary>, CacheError> {
        self.read_through(ALL_LISTS_KEY, || self.remote.fetch_all_lists())
            .await
    }

    pub async fn fetch_available_personal(&self) -> Result<Vec<DeckSummary>, CacheError> {
        self.read_through(AVAILABLE_PERSONAL_KEY, || {
            self.remote.fetch_available_personal()
        })
        .await
    }

    pub async fn fetch_cards(&self, deck_id: &str) -> Result<Vec<Card>, CacheError> {
        self.read_through(&cards_key(deck_id), || self.remote.fetch_cards(deck_id))
            .await
    }

    /// Serve a fresh cache entry, otherwise refetch when online and fall
    /// back to whatever is cached.
    async fn read_through<T, F, Fut>(&self, key: &str, fetch: F) -> Result<T, CacheError>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, RemoteError>>,
    {
        let now = Utc::now();
        let cached: Option<CachedEntry<T>> = match self.store.get(key).await {
            Ok(cached) => cached,
            Err(StoreError::Json(e)) => {
                log::warn!("Cache: dropping unreadable entry {}: {}", key, e);
                None
            }
            Err(e) => return Err(e.into()),
        };

        let cached = match cached {
            Some(entry) if entry.is_fresh(self.ttl, now) => {
                log::debug!("Cache: hit for {}", key);
                return Ok(entry.data);
            }
            other => other,
        };

        if self.sync.network().is_online() {
            match fetch().await {
                Ok(data) => {
                    self.store.set(key, &CachedEntry::new(&data, now)).await?;
                    log::debug!("Cache: refreshed {}", key);
                    return Ok(data);
                }
                Err(e) => log::warn!("Cache: refresh of {} failed, using cached copy: {}", key, e),
            }
        }

        match cached {
            Some(entry) => Ok(entry.data),
            None => {
                log::error!("Cache: no data available for {}", key);
                Err(CacheError::NoDataAvailable(key.to_string()))
            }
        }
    }

    /// Mark every cached collection stale so the next read refetches.
    pub async fn invalidate(&self) -> Result<(), CacheError> {
        self.store.with_lock(CACHE_LOCK, || self.invalidate_locked()).await
    }

    async fn invalidate_locked(&self) -> Result<(), CacheError> {
        let lists = self.load_lists().await?;
        let mut keys: Vec<String> = LIST_KEYS.iter().map(|k| k.to_string()).collect();
        for deck in lists.my_lists.iter().chain(&lists.all_lists).chain(&lists.available) {
            let key = cards_key(&deck.id);
            if !keys.contains(&key) {
                keys.push(key);
            }
        }

        let mut writes = Vec::new();
        for key in keys {
            let entry: Option<CachedEntry<serde_json::Value>> = self.store.get(&key).await?;
            if let Some(mut entry) = entry {
                entry.timestamp = DateTime::<Utc>::UNIX_EPOCH;
                writes.push(batch_value(key, &entry)?);
            }
        }
        log::info!("Cache: invalidated {} collection(s)", writes.len());
        self.store.write_batch(writes).await?;
        Ok(())
    }

    // ===== Optimistic writes =====

    /// Subscribe to a deck: it moves to the end of the user's lists.
    pub async fn add_list(&self, deck_id: &str, icon: Option<&str>) -> Result<QueuedOperation, CacheError> {
        self.store
            .with_lock(CACHE_LOCK, || self.add_list_locked(deck_id, icon))
            .await
    }

    async fn add_list_locked(&self, deck_id: &str, icon: Option<&str>) -> Result<QueuedOperation, CacheError> {
        let snapshot = CacheSnapshot::capture(&self.store, &[MY_LISTS_KEY, AVAILABLE_PERSONAL_KEY]).await?;
        let mut lists = self.load_lists().await?;

        let mut deck = take_deck(&mut lists.available, deck_id)
            .or_else(|| take_deck(&mut lists.my_lists, deck_id))
            .or_else(|| lists.all_lists.iter().find(|d| d.id == deck_id).cloned())
            .ok_or_else(|| CacheError::DeckNotFound(deck_id.to_string()))?;
        if let Some(icon) = icon {
            deck.icon = Some(icon.to_string());
        }
        lists.my_lists.push(deck);

        let now = Utc::now();
        let writes = vec![
            batch_value(MY_LISTS_KEY, &CachedEntry::new(&lists.my_lists, now))?,
            batch_value(AVAILABLE_PERSONAL_KEY, &CachedEntry::new(&lists.available, now))?,
        ];
        let payload = OperationPayload {
            deck_id: Some(deck_id.to_string()),
            icon: icon.map(str::to_string),
            ..Default::default()
        };
        self.commit(OperationType::AddList, payload, snapshot, writes).await
    }

    /// Unsubscribe from a deck. Decks the user owns go back to the
    /// "available personal" collection.
    pub async fn remove_list(&self, deck_id: &str) -> Result<QueuedOperation, CacheError> {
        self.store
            .with_lock(CACHE_LOCK, || self.remove_list_locked(deck_id))
            .await
    }

    async fn remove_list_locked(&self, deck_id: &str) -> Result<QueuedOperation, CacheError> {
        let snapshot = CacheSnapshot::capture(&self.store, &[MY_LISTS_KEY, AVAILABLE_PERSONAL_KEY]).await?;
        let mut lists = self.load_lists().await?;

        if let Some(deck) = take_deck(&mut lists.my_lists, deck_id) {
            if deck.owned && !lists.available.iter().any(|d| d.id == deck.id) {
                lists.available.push(deck);
            }
        } else {
            log::debug!("Cache: {} not in my lists, queueing removal anyway", deck_id);
        }

        let now = Utc::now();
        let writes = vec![
            batch_value(MY_LISTS_KEY, &CachedEntry::new(&lists.my_lists, now))?,
            batch_value(AVAILABLE_PERSONAL_KEY, &CachedEntry::new(&lists.available, now))?,
        ];
        self.commit(OperationType::RemoveList, OperationPayload::deck(deck_id), snapshot, writes)
            .await
    }

    /// Persist a new order for the user's lists.
    pub async fn reorder_lists(&self, deck_ids: &[String]) -> Result<QueuedOperation, CacheError> {
        self.store
            .with_lock(CACHE_LOCK, || self.reorder_lists_locked(deck_ids))
            .await
    }

    async fn reorder_lists_locked(&self, deck_ids: &[String]) -> Result<QueuedOperation, CacheError> {
        let snapshot = CacheSnapshot::capture(&self.store, &[MY_LISTS_KEY]).await?;
        let lists = self.load_lists().await?;

        let my_lists = reorder(lists.my_lists, deck_ids);
        let writes = vec![batch_value(MY_LISTS_KEY, &CachedEntry::new(&my_lists, Utc::now()))?];
        let payload = OperationPayload {
            deck_ids: Some(deck_ids.to_vec()),
            ..Default::default()
        };
        self.commit(OperationType::ReorderLists, payload, snapshot, writes)
            .await
    }

    /// Delete a deck the user owns, everywhere it is cached.
    pub async fn delete_deck(&self, deck_id: &str) -> Result<QueuedOperation, CacheError> {
        self.store
            .with_lock(CACHE_LOCK, || self.delete_deck_locked(deck_id))
            .await
    }

    async fn delete_deck_locked(&self, deck_id: &str) -> Result<QueuedOperation, CacheError> {
        let cards = cards_key(deck_id);
        let snapshot = CacheSnapshot::capture(
            &self.store,
            &[MY_LISTS_KEY, ALL_LISTS_KEY, AVAILABLE_PERSONAL_KEY, cards.as_str()],
        )
        .await?;
        let mut lists = self.load_lists().await?;

        lists.my_lists.retain(|d| d.id != deck_id);
        lists.all_lists.retain(|d| d.id != deck_id);
        lists.available.retain(|d| d.id != deck_id);

        let now = Utc::now();
        let writes = vec![
            batch_value(MY_LISTS_KEY, &CachedEntry::new(&lists.my_lists, now))?,
            batch_value(ALL_LISTS_KEY, &CachedEntry::new(&lists.all_lists, now))?,
            batch_value(AVAILABLE_PERSONAL_KEY, &CachedEntry::new(&lists.available, now))?,
            (cards, None),
        ];
        self.commit(OperationType::DeleteDeck, OperationPayload::deck(deck_id), snapshot, writes)
            .await
    }

    async fn load_lists(&self) -> Result<ListSet, StoreError> {
        Ok(ListSet {
            my_lists: self.load_list(MY_LISTS_KEY).await?,
            all_lists: self.load_list(ALL_LISTS_KEY).await?,
            available: self.load_list(AVAILABLE_PERSONAL_KEY).await?,
        })
    }

    async fn load_list(&self, key: &str) -> Result<Vec<DeckSummary>, StoreError> {
        let entry: Option<CachedEntry<Vec<DeckSummary>>> = self.store.get(key).await?;
        Ok(entry.map(|e| e.data).unwrap_or_default())
    }

    /// Apply the local writes, record the operation and kick off a sync
    /// pass. Any local failure restores the snapshot before returning.
    /// Runs with [`CACHE_LOCK`] already held.
    async fn commit(
        &self,
        op_type: OperationType,
        mut payload: OperationPayload,
        snapshot: CacheSnapshot,
        writes: Vec<BatchWrite>,
    ) -> Result<QueuedOperation, CacheError> {
        payload.snapshot = Some(snapshot.clone());

        match self.apply_and_enqueue(op_type, payload, writes).await {
            Ok(operation) => {
                log::info!("Cache: applied {:?} locally, queued {}", op_type, operation.id);
                self.sync.trigger();
                Ok(operation)
            }
            Err(e) => {
                log::warn!("Cache: {:?} failed locally, restoring snapshot: {}", op_type, e);
                if let Err(restore_err) = snapshot.restore(&self.store).await {
                    log::error!("Cache: snapshot restore failed: {}", restore_err);
                }
                Err(e.into())
            }
        }
    }

    async fn apply_and_enqueue(
        &self,
        op_type: OperationType,
        payload: OperationPayload,
        writes: Vec<BatchWrite>,
    ) -> Result<QueuedOperation, StoreError> {
        self.store.write_batch(writes).await?;
        self.operations().enqueue(op_type, payload).await
    }
}
