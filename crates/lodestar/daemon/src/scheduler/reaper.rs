//! Stale-session reaper.

use chrono::Duration as ChronoDuration;
use lodestar_registry::BeaconRegistry;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// Periodic sweep over the session registry.
///
/// Receives exactly the handles it needs at construction time; it never
/// reaches into wider application state. A failed sweep is logged and the
/// loop keeps its schedule; one bad tick must not stop the next.
pub struct Reaper {
    registry: Arc<BeaconRegistry>,
    interval: Duration,
    threshold: ChronoDuration,
}

impl Reaper {
    pub fn new(registry: Arc<BeaconRegistry>, interval_secs: u64, threshold_secs: u64) -> Self {
        Self {
            registry,
            interval: Duration::from_secs(interval_secs),
            threshold: ChronoDuration::seconds(threshold_secs as i64),
        }
    }

    /// One sweep. Idempotent; overlapping or repeated sweeps mark nothing
    /// twice.
    pub async fn sweep(&self) -> u64 {
        match self.registry.mark_stale(self.threshold).await {
            Ok(count) => {
                if count > 0 {
                    tracing::info!(count, "reaper demoted idle beacons");
                }
                count
            }
            Err(err) => {
                tracing::error!(%err, "reaper sweep failed, will retry next interval");
                0
            }
        }
    }

    /// Run until the shutdown signal flips.
    pub async fn run(self, mut shutdown_rx: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.interval);
        // The first tick fires immediately; skip it so a freshly started
        // coordinator does not demote beacons it has not yet heard from.
        ticker.tick().await;

        tracing::info!(
            interval_secs = self.interval.as_secs(),
            threshold_secs = self.threshold.num_seconds(),
            "reaper started"
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.sweep().await;
                }
                changed = shutdown_rx.changed() => {
                    // A dropped sender counts as shutdown.
                    if changed.is_err() || *shutdown_rx.borrow() {
                        tracing::info!("reaper stopped");
                        break;
                    }
                }
            }
        }
    }
}
