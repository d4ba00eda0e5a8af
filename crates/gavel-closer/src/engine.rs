use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::closer::AuctionCloser;

/// Background loop driving [`AuctionCloser::close_expired`] at half the
/// auction interval (at least once per second).
pub struct CloserEngine {
    closer: Arc<AuctionCloser>,
}

impl CloserEngine {
    pub fn new(closer: Arc<AuctionCloser>) -> Self {
        Self { closer }
    }

    /// Spawn [`run`](Self::run) onto the current Tokio runtime.
    pub fn spawn(self, shutdown: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(self.run(shutdown))
    }

    /// Main loop. Sweeps on every tick until `shutdown` is cancelled.
    ///
    /// Cancellation is checked between sweeps only; a sweep that has started
    /// always runs to completion. A failed sweep does not end the loop, the
    /// next tick simply tries again.
    pub async fn run(self, shutdown: CancellationToken) {
        let settings = *self.closer.settings();
        info!(
            collection = %self.closer.collection(),
            interval_ms = settings.interval.as_millis() as u64,
            tick_ms = settings.tick().as_millis() as u64,
            "auction closer started"
        );

        let mut ticker = tokio::time::interval(settings.tick());
        // A sweep that overruns its tick should not trigger a burst of
        // catch-up sweeps.
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let mut failures: u64 = 0;
        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => {
                    info!(collection = %self.closer.collection(), "auction closer shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    if self.closer.close_expired().await.is_success() {
                        failures = 0;
                    } else {
                        failures += 1;
                        if failures % 10 == 0 {
                            warn!(consecutive_failures = failures, "auction closer keeps failing");
                        }
                    }
                }
            }
        }
    }
}
