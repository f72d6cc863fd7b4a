//! Job lifecycle: claim, conversion checkpoint, completion and failure.
//!
//! Every write that finishes a job is guarded on the row still being
//! `processing`, so a terminal job can never be moved again.

use std::sync::Arc;

use chrono::Utc;
use log::{info, warn};
use serde_json::Value;
use thiserror::Error;

use crate::db::{DatabaseError, JobStore, JobUpdate};
use crate::entry::{EntryUpdate, ProcessingStatus};
use crate::sanitize::truncate_chars;
use crate::worker::job::{Job, JobStatus};

/// Longest `last_error` stored on a job, in characters.
pub const MAX_ERROR_CHARS: usize = 5000;

#[derive(Error, Debug)]
pub enum JobStateError {
    #[error("Illegal transition {from} -> {to} for job {job_id}")]
    InvalidTransition {
        job_id: String,
        from: JobStatus,
        to: JobStatus,
    },

    #[error("Job {0} is no longer processing in the store")]
    NotProcessing(String),

    #[error("Job store error: {0}")]
    Store(#[from] DatabaseError),
}

#[derive(Clone)]
pub struct JobStateMachine {
    store: Arc<dyn JobStore>,
}

impl JobStateMachine {
    pub fn new(store: Arc<dyn JobStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn JobStore> {
        &self.store
    }

    /// Claims the oldest queued job of `pipeline` and marks its entry as
    /// `processing`. `Ok(None)` means the queue is empty.
    pub async fn claim_next(&self, pipeline: &str) -> Result<Option<Job>, JobStateError> {
        let Some(job) = self.store.claim_next(pipeline).await? else {
            return Ok(None);
        };

        // The job is ours from here on; losing the entry status write must
        // not strand it in `processing`.
        let entry_update = EntryUpdate::new().status(ProcessingStatus::Processing);
        match self.store.update_entry(&job.entry_id, &entry_update).await {
            Ok(true) => {}
            Ok(false) => warn!(
                "Job {} references missing entry {}",
                job.id, job.entry_id
            ),
            Err(e) => warn!(
                "Could not mark entry {} processing for job {}: {}",
                job.entry_id, job.id, e
            ),
        }

        info!(
            "Claimed job {} (entry {}, attempt {})",
            job.id, job.entry_id, job.attempts
        );
        Ok(Some(job))
    }

    /// Persists conversion output right away so a later stage failure does
    /// not discard it.
    pub async fn checkpoint_conversion(
        &self,
        job: &Job,
        markdown: &str,
        structured: &Value,
    ) -> Result<(), JobStateError> {
        if job.status != JobStatus::Processing {
            return Err(JobStateError::NotProcessing(job.id.clone()));
        }

        let update = EntryUpdate::new()
            .set("docling_markdown", markdown)
            .set("docling_json", structured.clone())
            .status(ProcessingStatus::DoclingComplete)
            .touched_at(Utc::now());
        self.store.update_entry(&job.entry_id, &update).await?;
        Ok(())
    }

    /// Moves the job to `completed` and writes the final entry update in
    /// the same unit. Nothing is written when the job is no longer
    /// `processing` in the store.
    pub async fn complete(
        &self,
        job: &mut Job,
        entry_update: &EntryUpdate,
    ) -> Result<(), JobStateError> {
        ensure_transition(job, JobStatus::Completed)?;

        let now = Utc::now();
        let update = JobUpdate::finish(JobStatus::Completed, None, now);
        if !self
            .store
            .finish_job(&job.id, &update, &job.entry_id, entry_update)
            .await?
        {
            return Err(JobStateError::NotProcessing(job.id.clone()));
        }

        job.status = JobStatus::Completed;
        job.processed_at = Some(now);
        job.updated_at = now;
        info!("Completed job {} entry {}", job.id, job.entry_id);
        Ok(())
    }

    /// Moves the job to `failed` with a truncated error and marks the entry
    /// `failed`. Failure is terminal; nothing requeues the job.
    ///
    /// If the combined write fails, the job row is still moved to `failed`
    /// on its own and the entry keeps its last status.
    pub async fn fail(&self, job: &mut Job, error: &str) -> Result<(), JobStateError> {
        ensure_transition(job, JobStatus::Failed)?;

        let now = Utc::now();
        let last_error = truncate_chars(error, MAX_ERROR_CHARS).to_string();
        let update = JobUpdate::finish(JobStatus::Failed, Some(last_error.clone()), now);
        let entry_update = EntryUpdate::new()
            .status(ProcessingStatus::Failed)
            .touched_at(now);

        let moved = match self
            .store
            .finish_job(&job.id, &update, &job.entry_id, &entry_update)
            .await
        {
            Ok(moved) => moved,
            Err(e) => {
                warn!(
                    "Could not mark entry {} failed for job {}: {}",
                    job.entry_id, job.id, e
                );
                self.store.update_job(&job.id, &update).await?
            }
        };
        if !moved {
            return Err(JobStateError::NotProcessing(job.id.clone()));
        }

        job.status = JobStatus::Failed;
        job.last_error = Some(last_error);
        job.processed_at = Some(now);
        job.updated_at = now;
        warn!("Job {} failed: {}", job.id, truncate_chars(error, 200));
        Ok(())
    }
}

fn ensure_transition(job: &Job, to: JobStatus) -> Result<(), JobStateError> {
    if job.status.can_transition_to(to) {
        Ok(())
    } else {
        Err(JobStateError::InvalidTransition {
            job_id: job.id.clone(),
            from: job.status,
            to,
        })
    }
}
