use tokio::sync::watch;

use super::remote::RemoteApi;

/// Observable online/offline flag.
///
/// Platform glue (or the connectivity probe) reports transitions; the sync
/// scheduler and the cache layer read the current value.
#[derive(Clone)]
pub struct NetworkMonitor {
    tx: watch::Sender<bool>,
}

impl NetworkMonitor {
    pub fn new(online: bool) -> Self {
        let (tx, _rx) = watch::channel(online);
        Self { tx }
    }

    pub fn is_online(&self) -> bool {
        *self.tx.borrow()
    }

    /// Report a connectivity change. Subscribers are only woken on transitions.
    pub fn set_online(&self, online: bool) {
        let changed = self.tx.send_if_modified(|current| {
            if *current == online {
                false
            } else {
                *current = online;
                true
            }
        });
        if changed {
            log::info!("Network: now {}", if online { "online" } else { "offline" });
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }

    /// Ask the server for its clock and record whether that worked.
    pub async fn probe(&self, remote: &dyn RemoteApi) -> bool {
        let online = match remote.pull().await {
            Ok(_) => true,
            Err(e) => {
                log::debug!("Network: probe failed: {}", e);
                false
            }
        };
        self.set_online(online);
        online
    }
}
