use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use super::manager::SyncManager;

/// Messages to control the sync scheduler
#[derive(Debug)]
pub enum SyncSchedulerMessage {
    /// Run a replay pass now
    Trigger,
    /// App closing
    Shutdown,
}

/// Handle for the background sync loop
pub struct SyncScheduler {
    sender: mpsc::Sender<SyncSchedulerMessage>,
    task: JoinHandle<()>,
}

impl SyncScheduler {
    /// Ask the loop for an immediate replay pass
    pub fn trigger(&self) {
        let _ = self.sender.try_send(SyncSchedulerMessage::Trigger);
    }

    /// Shut down the scheduler
    pub fn shutdown(&self) {
        let _ = self.sender.try_send(SyncSchedulerMessage::Shutdown);
    }

    /// Shut down and wait for the loop to exit.
    pub async fn stop(self) {
        self.shutdown();
        if let Err(e) = self.task.await {
            log::warn!("Sync scheduler: loop ended abnormally: {}", e);
        }
    }
}

/// Start the sync scheduler.
///
/// Spawns a loop that recovers operations interrupted by a previous run,
/// replays the queue once, then reacts to connectivity changes and trigger
/// requests until shut down.
pub fn start_sync_scheduler(sync_manager: Arc<SyncManager>) -> SyncScheduler {
    let (tx, rx) = mpsc::channel(32);
    let network = sync_manager.network().subscribe();

    let task = tokio::spawn(async move {
        sync_scheduler_loop(sync_manager, network, rx).await;
    });

    SyncScheduler { sender: tx, task }
}

/// Main scheduler loop
async fn sync_scheduler_loop(
    sync_manager: Arc<SyncManager>,
    mut network: watch::Receiver<bool>,
    mut receiver: mpsc::Receiver<SyncSchedulerMessage>,
) {
    log::info!("Sync scheduler started");

    match sync_manager.operations().reset_syncing_operations().await {
        Ok(0) => {}
        Ok(count) => log::info!("Sync scheduler: recovered {} interrupted operation(s)", count),
        Err(e) => log::error!("Sync scheduler: failed to recover interrupted operations: {}", e),
    }

    network.borrow_and_update();
    sync_manager.process_queue().await;

    loop {
        tokio::select! {
            changed = network.changed() => {
                if changed.is_err() {
                    log::info!("Sync scheduler: network monitor dropped, shutting down");
                    break;
                }
                let online = *network.borrow_and_update();
                if online {
                    log::info!("Sync scheduler: back online, syncing");
                    sync_manager.force_sync().await;
                } else {
                    sync_manager.mark_offline().await;
                }
            }

            msg = receiver.recv() => {
                match msg {
                    Some(SyncSchedulerMessage::Trigger) => {
                        log::debug!("Sync scheduler: trigger requested");
                        sync_manager.process_queue().await;
                    }
                    Some(SyncSchedulerMessage::Shutdown) | None => {
                        log::info!("Sync scheduler: shutting down");
                        break;
                    }
                }
            }
        }
    }

    sync_manager.cancel_retry();
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::storage::DurableStore;
    use crate::sync::config::{RetryPolicy, SyncState};
    use crate::sync::network::NetworkMonitor;
    use crate::sync::queue::{OperationPayload, OperationQueue, OperationStatus, OperationType, OperationUpdate};
    use crate::sync::reviews::ReviewQueue;
    use crate::sync::testing::MockRemote;

    fn manager(online: bool) -> (Arc<SyncManager>, Arc<MockRemote>) {
        let store = DurableStore::in_memory().unwrap();
        let remote = Arc::new(MockRemote::new());
        let manager = Arc::new(SyncManager::new(
            store.clone(),
            OperationQueue::new(store.clone()),
            ReviewQueue::new(store, remote.clone()),
            remote.clone(),
            NetworkMonitor::new(online),
            RetryPolicy::default(),
        ));
        (manager, remote)
    }

    async fn wait_for_idle(manager: &SyncManager) {
        let mut rx = manager.subscribe();
        tokio::time::timeout(
            Duration::from_secs(2),
            rx.wait_for(|s| s.state == SyncState::Idle && s.pending_count == 0),
        )
        .await
        .expect("timed out waiting for idle")
        .unwrap();
    }

    async fn wait_for_calls(remote: &MockRemote, count: usize) {
        tokio::time::timeout(Duration::from_secs(2), async {
            while remote.call_count() < count {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("timed out waiting for remote calls");
    }

    #[tokio::test]
    async fn test_startup_recovers_interrupted_operations() {
        let (manager, remote) = manager(true);
        let op = manager
            .operations()
            .enqueue(OperationType::AddList, OperationPayload::deck("d1"))
            .await
            .unwrap();
        manager
            .operations()
            .update_operation(
                op.id,
                OperationUpdate {
                    status: Some(OperationStatus::Syncing),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let scheduler = manager.start();
        wait_for_calls(&remote, 1).await;
        wait_for_idle(&manager).await;

        assert!(manager.operations().get_all().await.unwrap().is_empty());
        scheduler.stop().await;
    }

    #[tokio::test]
    async fn test_reconnect_replays_queue() {
        let (manager, remote) = manager(false);
        manager
            .operations()
            .enqueue(OperationType::RemoveList, OperationPayload::deck("d1"))
            .await
            .unwrap();

        let scheduler = manager.start();
        let mut rx = manager.subscribe();
        tokio::time::timeout(Duration::from_secs(2), rx.wait_for(|s| s.state == SyncState::Offline))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(remote.call_count(), 0);

        manager.network().set_online(true);
        wait_for_idle(&manager).await;

        assert_eq!(remote.call_count(), 1);
        scheduler.stop().await;
    }

    #[tokio::test]
    async fn test_trigger_runs_a_pass() {
        let (manager, remote) = manager(true);
        let scheduler = manager.start();
        wait_for_idle(&manager).await;

        manager
            .operations()
            .enqueue(OperationType::DeleteDeck, OperationPayload::deck("d9"))
            .await
            .unwrap();
        scheduler.trigger();

        wait_for_calls(&remote, 1).await;
        wait_for_idle(&manager).await;

        scheduler.stop().await;
    }
}
