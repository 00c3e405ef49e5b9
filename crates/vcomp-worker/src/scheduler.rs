//! Interval-driven, single-flight job scheduling.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, watch, OwnedSemaphorePermit, Semaphore};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::metrics;

/// Work performed on each dispatched tick.
#[async_trait]
pub trait TickHandler: Send + Sync + 'static {
    async fn on_tick(&self);
}

/// Tick counts of one scheduler run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    pub dispatched: u64,
    /// Ticks dropped because the previous one was still running
    pub skipped: u64,
}

/// Fires a tick immediately and then every `interval`.
///
/// One consumer task runs the handler; a tick is dispatched only when it can
/// take the single busy permit, so a tick arriving while a job runs is
/// dropped rather than queued.
pub struct Scheduler {
    interval: Duration,
    worker_id: String,
}

impl Scheduler {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            worker_id: format!("worker-{}", Uuid::new_v4()),
        }
    }

    pub fn worker_id(&self) -> &str {
        &self.worker_id
    }

    /// Run until `shutdown` becomes `true`, then wait for the in-flight tick.
    pub async fn run<H: TickHandler>(self, handler: Arc<H>, mut shutdown: watch::Receiver<bool>) -> SchedulerStats {
        info!(
            worker_id = %self.worker_id,
            interval_ms = self.interval.as_millis() as u64,
            "Starting scheduler"
        );

        let busy = Arc::new(Semaphore::new(1));
        let (tx, mut rx) = mpsc::channel::<OwnedSemaphorePermit>(1);

        let consumer = tokio::spawn(async move {
            while let Some(permit) = rx.recv().await {
                handler.on_tick().await;
                drop(permit);
            }
        });

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut stats = SchedulerStats::default();

        loop {
            if *shutdown.borrow() {
                break;
            }

            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                _ = ticker.tick() => {
                    match busy.clone().try_acquire_owned() {
                        Ok(permit) => {
                            if tx.send(permit).await.is_err() {
                                warn!("Tick consumer stopped, scheduler exiting");
                                break;
                            }
                            stats.dispatched += 1;
                        }
                        Err(_) => {
                            debug!("Previous job still running, skipping tick");
                            metrics::record_tick_skipped();
                            stats.skipped += 1;
                        }
                    }
                }
            }
        }

        info!(worker_id = %self.worker_id, "Scheduler stopping, waiting for in-flight job");
        drop(tx);
        if let Err(e) = consumer.await {
            error!("Tick consumer failed: {}", e);
        }

        info!(
            dispatched = stats.dispatched,
            skipped = stats.skipped,
            "Scheduler stopped"
        );
        stats
    }
}
