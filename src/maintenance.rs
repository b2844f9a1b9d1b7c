//! Periodic housekeeping: expired rate-limit counters.

use std::sync::Arc;
use std::time::Duration;

use metrics::counter;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument};

use crate::rate_limit::RateLimiter;

pub struct MaintenanceLoop {
    rate_limiter: Arc<RateLimiter>,
    tick: Duration,
}

impl MaintenanceLoop {
    pub fn new(rate_limiter: Arc<RateLimiter>, tick_seconds: u64) -> Self {
        Self {
            rate_limiter,
            tick: Duration::from_secs(tick_seconds.max(1)),
        }
    }

    #[instrument(skip_all)]
    pub async fn run(self, shutdown: CancellationToken) {
        info!(tick_seconds = self.tick.as_secs(), "Starting maintenance loop");

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = sleep(self.tick) => self.tick().await,
            }
        }

        info!("Maintenance loop stopped");
    }

    pub async fn tick(&self) {
        match self.rate_limiter.purge_expired().await {
            Ok(0) => {}
            Ok(purged) => {
                counter!("notifier_rate_limit_counters_purged_total").increment(purged);
                debug!(purged, "Purged expired rate-limit counters");
            }
            Err(err) => error!(error = %err, "Failed to purge rate-limit counters"),
        }
    }
}
