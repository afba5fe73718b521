use std::path::Path;

use anyhow::{Context, Result};

use flashdeck_lib::config::AppConfig;
use flashdeck_lib::FlashDeck;

/// Shared application state for CLI commands
pub struct App {
    pub config: AppConfig,
    pub core: FlashDeck,
}

impl App {
    /// Load config, open the local store and check connectivity.
    pub async fn new(config_path: Option<&Path>, offline: bool) -> Result<Self> {
        let config = AppConfig::load(config_path).context("Failed to load config")?;
        let core = FlashDeck::open(&config, !offline).context("Failed to open local store")?;

        if !offline {
            let online = core.probe_network().await;
            if !online {
                log::info!("Server unreachable at {}, working offline", config.api_base_url);
            }
        }

        let recovered = core
            .sync
            .operations()
            .reset_syncing_operations()
            .await
            .context("Failed to read the operation queue")?;
        if recovered > 0 {
            log::info!("Recovered {} interrupted operation(s)", recovered);
        }

        Ok(Self { config, core })
    }

    pub fn is_online(&self) -> bool {
        self.core.network.is_online()
    }

    /// Replay whatever the command queued before the process exits.
    pub async fn finish(&self) {
        if !self.is_online() {
            return;
        }
        // A pass triggered by the command may still be running
        self.core.sync.wait_for_pass().await;
        let status = self.core.sync.force_sync().await;
        if let Some(error) = status.last_error {
            log::warn!("Sync left {} operation(s) queued: {}", status.pending_count, error);
        }
        self.core.sync.cancel_retry();
    }
}
