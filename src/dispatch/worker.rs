//! Worker pool: claims items and pushes them through the cluster.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use tokio::sync::Notify;
use tokio::task::JoinSet;
use tracing::{Instrument, error, info, warn};

use super::{Cluster, DispatchOutcome, ensure_model_loaded};
use crate::engine::QueueService;
use crate::error::{Error, Result};
use crate::model::WorkItem;
use crate::telemetry::work::{record_state_transition, start_item_span};

/// Configuration for the worker pool.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Number of concurrent workers.
    pub workers: usize,
    /// Prefix for worker ids; worker `n` is `"{prefix}-{n}"`.
    pub worker_prefix: String,
    /// Poll interval fallback when no wakeup arrives.
    pub poll_interval: Duration,
    /// Pause after a failed item before the worker claims again, so a worker
    /// does not spin on an item that keeps failing.
    pub failure_backoff: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            worker_prefix: "worker".to_string(),
            poll_interval: Duration::from_secs(5),
            failure_backoff: Duration::from_millis(500),
        }
    }
}

/// N workers draining the queue into a [`Cluster`].
pub struct WorkerPool {
    service: QueueService,
    cluster: Arc<dyn Cluster>,
    config: WorkerConfig,
    shutdown: Arc<Notify>,
    stopping: Arc<AtomicBool>,
    in_flight: Arc<AtomicUsize>,
}

impl Clone for WorkerPool {
    fn clone(&self) -> Self {
        Self {
            service: self.service.clone(),
            cluster: Arc::clone(&self.cluster),
            config: self.config.clone(),
            shutdown: Arc::clone(&self.shutdown),
            stopping: Arc::clone(&self.stopping),
            in_flight: Arc::clone(&self.in_flight),
        }
    }
}

impl WorkerPool {
    pub fn new(service: QueueService, cluster: Arc<dyn Cluster>, config: WorkerConfig) -> Self {
        Self {
            service,
            cluster,
            config,
            shutdown: Arc::new(Notify::new()),
            stopping: Arc::new(AtomicBool::new(false)),
            in_flight: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Ask every worker to stop after its current item.
    pub fn shutdown(&self) {
        self.stopping.store(true, Ordering::SeqCst);
        self.shutdown.notify_waiters();
    }

    /// Items currently being dispatched.
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Relaxed)
    }

    /// Run all workers until shutdown.
    pub async fn run(&self) -> Result<()> {
        let mut workers = JoinSet::new();
        for n in 0..self.config.workers.max(1) {
            let pool = self.clone();
            let worker_id = format!("{}-{n}", self.config.worker_prefix);
            workers.spawn(async move { pool.worker_loop(worker_id).await });
        }
        info!(workers = workers.len(), "worker pool started");

        while let Some(joined) = workers.join_next().await {
            if let Err(e) = joined {
                error!("worker task ended abnormally: {e}");
            }
        }
        info!("worker pool stopped");
        Ok(())
    }

    async fn worker_loop(&self, worker_id: String) {
        loop {
            // Register for the shutdown signal before checking the flag so a
            // concurrent shutdown() cannot slip between the two.
            let stop = self.shutdown.notified();
            tokio::pin!(stop);
            stop.as_mut().enable();
            if self.stopping.load(Ordering::SeqCst) {
                return;
            }

            if let Some(item) = self.service.claim(&worker_id).await {
                if self.process_item(&worker_id, item).await {
                    tokio::task::yield_now().await;
                } else {
                    tokio::select! {
                        _ = &mut stop => return,
                        _ = tokio::time::sleep(self.config.failure_backoff) => {}
                    }
                }
                continue;
            }

            tokio::select! {
                _ = &mut stop => return,
                _ = self.service.wait_for_work() => {}
                _ = tokio::time::sleep(self.config.poll_interval) => {}
            }
        }
    }

    /// Dispatch one claimed item and report the outcome to the queue.
    /// Returns whether it succeeded.
    async fn process_item(&self, worker_id: &str, item: WorkItem) -> bool {
        let span = start_item_span(&item.id, worker_id, item.priority, item.attempts);

        async {
            record_state_transition(&span, "queued", "claimed");

            self.in_flight.fetch_add(1, Ordering::Relaxed);
            let result = self.execute(&item).await;
            self.in_flight.fetch_sub(1, Ordering::Relaxed);

            let success = match result {
                Ok(DispatchOutcome { success: true, .. }) => {
                    record_state_transition(&span, "claimed", "completed");
                    true
                }
                Ok(DispatchOutcome { error, .. }) => {
                    record_state_transition(&span, "claimed", "requeued");
                    warn!(id = %item.id, error = error.as_deref().unwrap_or("-"), "node reported failure");
                    false
                }
                Err(e) => {
                    record_state_transition(&span, "claimed", "requeued");
                    warn!(id = %item.id, error = %e, "dispatch failed");
                    false
                }
            };
            self.service.complete(&item.id, success).await;
            success
        }
        .instrument(span.clone())
        .await
    }

    async fn execute(&self, item: &WorkItem) -> Result<DispatchOutcome> {
        let model = item.payload.model.as_deref();
        let node = self
            .cluster
            .select_node(model)
            .await
            .ok_or_else(|| Error::NoNodeAvailable(model.map(str::to_string)))?;

        if let Some(model) = model {
            ensure_model_loaded(self.cluster.as_ref(), &node, model).await?;
        }
        info!(id = %item.id, %node, "dispatching");
        self.cluster.dispatch(&node, item).await
    }
}
