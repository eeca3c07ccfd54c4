//! TTL sweeper for expired memberships.
//!
//! Memberships written with an expiration stay in the store until the sweeper
//! removes them; reads do not filter by expiration, so the sweep interval is
//! the staleness bound callers observe.
//!
//! Sweeper behavior:
//! - One bulk delete per tick, shared connection pool with request traffic
//! - A failed tick is logged and counted, never retried explicitly; the next
//!   tick is the retry
//! - Stops when the shutdown broadcast fires

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use metrics::counter;
use tokio::sync::broadcast;
use tokio::time::interval;
use tracing::{debug, info, warn};

use segmentd_storage::ExpiredPurge;
use segmentd_types::config::SweeperConfig;

/// Periodic background task deleting expired memberships.
pub struct TtlSweeper {
    /// The store to purge; shares the pool with request workers.
    store: Arc<dyn ExpiredPurge>,
    /// Interval between sweep ticks.
    interval: Duration,
}

impl TtlSweeper {
    /// Create a new sweeper over the given store.
    pub fn new(store: Arc<dyn ExpiredPurge>, interval: Duration) -> Self {
        Self { store, interval }
    }

    /// Create a sweeper from the config section.
    pub fn from_config(store: Arc<dyn ExpiredPurge>, config: &SweeperConfig) -> Self {
        Self::new(store, Duration::from_secs(config.interval_secs))
    }

    /// Run a single sweep cycle.
    ///
    /// Public so tests can drive ticks deterministically without waiting on
    /// the timer.
    pub async fn run_cycle(&self) {
        match self.store.purge_expired(Utc::now()).await {
            Ok(0) => {
                debug!("Sweep cycle found no expired memberships");
            }
            Ok(purged) => {
                counter!("segmentd_sweeper_purged_total").increment(purged);
                info!(purged, "Sweeper removed expired memberships");
            }
            Err(err) => {
                counter!("segmentd_sweeper_failed_cycles_total").increment(1);
                warn!(error = %err, "Sweep cycle failed; next tick will retry");
            }
        }
    }

    /// Start the sweeper background task.
    ///
    /// The loop ticks on the configured interval and exits when the shutdown
    /// broadcast fires. Returns the task handle so callers can await orderly
    /// termination.
    pub fn start(self, mut shutdown: broadcast::Receiver<()>) -> tokio::task::JoinHandle<()> {
        info!(interval_secs = self.interval.as_secs(), "Starting TTL sweeper");
        tokio::spawn(async move {
            let mut ticker = interval(self.interval);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        self.run_cycle().await;
                    }
                    _ = shutdown.recv() => {
                        info!("TTL sweeper stopping");
                        break;
                    }
                }
            }
        })
    }
}
