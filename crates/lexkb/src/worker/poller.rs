use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use log::{error, info};

use crate::pipeline::{Pipeline, ProgressReporter};
use crate::worker::job::JobOutcome;
use crate::worker::state::JobStateError;

/// Granularity of the idle sleep, so shutdown is noticed quickly.
const SHUTDOWN_CHECK: Duration = Duration::from_millis(100);

/// Totals for one `run` of the poller.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PollerStats {
    pub completed: u64,
    pub failed: u64,
}

impl PollerStats {
    fn record(&mut self, outcome: &JobOutcome) {
        if outcome.is_success() {
            self.completed += 1;
        } else {
            self.failed += 1;
        }
    }
}

/// Claims queued jobs one at a time and runs each to a terminal state
/// before claiming the next.
pub struct Poller {
    pipeline: Arc<Pipeline>,
    interval: Duration,
    shutdown: Arc<AtomicBool>,
}

impl Poller {
    pub fn new(pipeline: Arc<Pipeline>, interval: Duration, shutdown: Arc<AtomicBool>) -> Self {
        Self {
            pipeline,
            interval,
            shutdown,
        }
    }

    /// Claims and processes a single job. `Ok(None)` when the queue is empty.
    pub async fn run_once(
        &self,
        progress: &dyn ProgressReporter,
    ) -> Result<Option<JobOutcome>, JobStateError> {
        let pipeline_name = &self.pipeline.config().pipeline_name;
        let Some(job) = self.pipeline.state().claim_next(pipeline_name).await? else {
            return Ok(None);
        };
        Ok(Some(self.pipeline.process(job, progress).await))
    }

    /// Drains the queue back to back, sleeping `interval` whenever it is
    /// empty, until the shutdown flag is set. A job in flight always runs
    /// to completion.
    pub async fn run(&self, progress: &dyn ProgressReporter) -> PollerStats {
        let mut stats = PollerStats::default();
        info!(
            "Polling pipeline '{}' every {}s",
            self.pipeline.config().pipeline_name,
            self.interval.as_secs()
        );

        while !self.is_shutdown() {
            match self.run_once(progress).await {
                Ok(Some(outcome)) => {
                    stats.record(&outcome);
                    continue;
                }
                Ok(None) => {}
                Err(e) => error!("Failed to claim next job: {}", e),
            }
            self.idle().await;
        }

        info!(
            "Poller stopped ({} completed, {} failed)",
            stats.completed, stats.failed
        );
        stats
    }

    fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Relaxed)
    }

    async fn idle(&self) {
        let mut remaining = self.interval;
        while !remaining.is_zero() && !self.is_shutdown() {
            let step = remaining.min(SHUTDOWN_CHECK);
            tokio::time::sleep(step).await;
            remaining = remaining.saturating_sub(step);
        }
    }
}
