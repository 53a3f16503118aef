use std::sync::Arc;
use std::time::Duration;

use canary_protocol::{CanaryError, CanaryResult, StoreBackend};
use tokio::sync::watch;
use tokio::time::{MissedTickBehavior, interval, timeout};
use tracing::{debug, info, warn};

use crate::CategorizedStore;

#[derive(Debug, Clone)]
pub struct FlushConfig {
    pub interval: Duration,
    pub save_timeout: Duration,
}

impl Default for FlushConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60),
            save_timeout: Duration::from_secs(30),
        }
    }
}

/// Periodically writes the store to its backend when it has changed.
pub struct Flusher {
    store: Arc<CategorizedStore>,
    backend: Arc<dyn StoreBackend>,
    config: FlushConfig,
    flushed_revision: u64,
}

impl Flusher {
    /// The store's current revision is taken as already persisted.
    pub fn new(
        store: Arc<CategorizedStore>,
        backend: Arc<dyn StoreBackend>,
        config: FlushConfig,
    ) -> Self {
        let flushed_revision = store.revision();
        Self {
            store,
            backend,
            config,
            flushed_revision,
        }
    }

    /// Save if anything changed since the last successful flush. Returns
    /// whether a save happened.
    pub async fn flush_if_dirty(&mut self) -> CanaryResult<bool> {
        if self.store.revision() == self.flushed_revision {
            return Ok(false);
        }

        let (revision, document) = self.store.snapshot();
        timeout(self.config.save_timeout, self.backend.save(&document))
            .await
            .map_err(|_| {
                CanaryError::Store(format!(
                    "save timed out after {}ms",
                    self.config.save_timeout.as_millis()
                ))
            })??;
        self.flushed_revision = revision;
        debug!(revision, total_messages = document.total_messages, "store flushed");
        Ok(true)
    }

    /// Flush on every tick until `shutdown` turns true or its sender goes
    /// away, then flush once more.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = interval(self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;

        info!(interval_secs = self.config.interval.as_secs(), "flush task started");
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(error) = self.flush_if_dirty().await {
                        warn!(%error, "store flush failed; retrying next tick");
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        match self.flush_if_dirty().await {
            Ok(flushed) => info!(flushed, "final store flush complete"),
            Err(error) => warn!(%error, "final store flush failed"),
        }
    }
}
