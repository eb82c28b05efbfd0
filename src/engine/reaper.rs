//! Background task returning stale claims to the pool.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use super::service::QueueService;

/// Handle to a running reaper. Dropping it leaves the task running until the
/// runtime shuts down; call [`ReaperHandle::stop`] for a clean exit.
pub struct ReaperHandle {
    shutdown: Arc<Notify>,
    join: JoinHandle<()>,
}

impl ReaperHandle {
    pub(super) fn spawn(service: QueueService, every: Duration) -> Self {
        let shutdown = Arc::new(Notify::new());
        let signal = Arc::clone(&shutdown);

        let join = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately; skip it so the first sweep
            // happens one full interval after start.
            ticker.tick().await;

            info!(interval_secs = every.as_secs_f64(), "stale-claim reaper started");
            loop {
                tokio::select! {
                    _ = signal.notified() => {
                        info!("stale-claim reaper stopping");
                        return;
                    }
                    _ = ticker.tick() => {
                        let released = service.release_stale_claims().await;
                        debug!(released, "reaper sweep");
                    }
                }
            }
        });

        Self { shutdown, join }
    }

    /// Signal the reaper and wait for it to exit.
    pub async fn stop(self) {
        // notify_one stores a permit, so a stop issued before the task first
        // polls `notified()` is not lost.
        self.shutdown.notify_one();
        if let Err(e) = self.join.await {
            warn!("reaper task ended abnormally: {e}");
        }
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }
}
