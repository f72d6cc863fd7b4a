use log::{debug, info, warn};

use super::retry::Stage;

/// Events emitted by the pipeline while a job runs.
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressEvent {
    StageStarted {
        stage: Stage,
    },
    StageCompleted {
        stage: Stage,
    },
    StageSkipped {
        stage: Stage,
        reason: String,
    },
    Failed {
        error: String,
    },
    Completed {
        entry_id: String,
        node_count: usize,
        citation_count: usize,
    },
}

pub trait ProgressReporter: Send + Sync {
    fn report(&self, event: ProgressEvent);
}

/// No-op reporter for unit tests.
pub struct NoopProgress;

impl ProgressReporter for NoopProgress {
    fn report(&self, _event: ProgressEvent) {}
}

/// Writes progress to the log. Used by the worker binary.
pub struct LogProgress;

impl ProgressReporter for LogProgress {
    fn report(&self, event: ProgressEvent) {
        match event {
            ProgressEvent::StageStarted { stage } => debug!("{} started", stage),
            ProgressEvent::StageCompleted { stage } => debug!("{} done", stage),
            ProgressEvent::StageSkipped { stage, reason } => {
                info!("{} skipped: {}", stage, reason)
            }
            ProgressEvent::Failed { error } => warn!("Pipeline failed: {}", error),
            ProgressEvent::Completed {
                entry_id,
                node_count,
                citation_count,
            } => info!(
                "Entry {} enriched ({} outline nodes, {} citations)",
                entry_id, node_count, citation_count
            ),
        }
    }
}
