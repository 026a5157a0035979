//! Proactive eviction of expired shared state.
//!
//! # Responsibilities
//! - Periodically drop idle rate-limit buckets
//! - Periodically drop expired replay records
//! - Publish state sizes as gauges

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::time;

use crate::observability::metrics;
use crate::security::rate_limit::RateLimiter;
use crate::security::replay::ReplayStore;

pub struct StateSweeper {
    limiter: Arc<RateLimiter>,
    replay: Arc<dyn ReplayStore>,
    interval: Duration,
}

impl StateSweeper {
    pub fn new(limiter: Arc<RateLimiter>, replay: Arc<dyn ReplayStore>, interval: Duration) -> Self {
        Self {
            limiter,
            replay,
            interval,
        }
    }

    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        tracing::info!(interval_secs = self.interval.as_secs(), "State sweeper starting");

        let mut ticker = time::interval(self.interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.sweep();
                }
                _ = shutdown.recv() => {
                    tracing::info!("State sweeper received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }

    /// Run one eviction pass.
    pub fn sweep(&self) -> (usize, usize) {
        let buckets = self.limiter.purge_expired();
        let records = self.replay.purge_expired();
        if buckets > 0 || records > 0 {
            tracing::debug!(buckets, records, "Evicted expired security state");
        }

        metrics::record_state_sizes(self.limiter.tracked_buckets(), self.replay.len());
        (buckets, records)
    }
}
