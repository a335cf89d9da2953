//! Scheduler background worker.
//!
//! Runs a scheduling cycle on a periodic interval.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, info, instrument};

use crate::conf::WorkerConfig;
use crate::scheduler::Scheduler;

pub struct SchedulerWorker {
    scheduler: Arc<Scheduler>,
    interval: Duration,
}

impl SchedulerWorker {
    pub fn new(scheduler: Arc<Scheduler>, interval: Duration) -> Self {
        Self {
            scheduler,
            interval,
        }
    }

    pub fn from_config(scheduler: Arc<Scheduler>, config: &WorkerConfig) -> Self {
        Self::new(scheduler, config.schedule_period)
    }

    /// Run cycles until shutdown is signaled or the sender is dropped.
    #[instrument(skip(self, shutdown))]
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(
            interval_secs = self.interval.as_secs(),
            "Starting scheduler worker"
        );

        let mut interval = tokio::time::interval(self.interval);
        // The first tick completes immediately; wait a full period instead.
        interval.tick().await;

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let stats = self.scheduler.run_once();
                    debug!(
                        jobs = stats.jobs,
                        jobs_updated = stats.jobs_updated,
                        warnings = stats.warnings,
                        "Scheduling cycle complete"
                    );
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("Scheduler worker shutting down");
                        break;
                    }
                }
            }
        }
    }
}
