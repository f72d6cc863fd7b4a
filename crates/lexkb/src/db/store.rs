//! The storage seam used by the job state machine.

use async_trait::async_trait;
use chrono::Utc;

use super::{entry_repo, job_repo, Database, DatabaseError};
use crate::entry::{EntryFields, EntryUpdate};
use crate::worker::job::Job;

pub use super::job_repo::JobUpdate;

/// Persistence operations the worker needs.
///
/// `claim_next` must be atomic: no two callers, on any connection, may
/// receive the same job.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Claims the oldest queued job of `pipeline`, or `None` when idle.
    async fn claim_next(&self, pipeline: &str) -> Result<Option<Job>, DatabaseError>;

    /// Applies `update`; `false` when the row is missing or its status guard
    /// did not hold.
    async fn update_job(&self, id: &str, update: &JobUpdate) -> Result<bool, DatabaseError>;

    /// Writes entry columns; `false` when the entry does not exist.
    async fn update_entry(&self, id: &str, update: &EntryUpdate) -> Result<bool, DatabaseError>;

    async fn get_entry(&self, id: &str) -> Result<Option<EntryFields>, DatabaseError>;

    /// Applies the guarded job `update` and, only when its guard held,
    /// `entry_update`, as one unit. Returns `false` and writes nothing
    /// when the job guard did not hold.
    async fn finish_job(
        &self,
        job_id: &str,
        update: &JobUpdate,
        entry_id: &str,
        entry_update: &EntryUpdate,
    ) -> Result<bool, DatabaseError>;
}

/// `JobStore` backed by the SQLite [`Database`].
///
/// Statements are short and run inline on the calling task.
#[derive(Clone)]
pub struct SqliteJobStore {
    db: Database,
}

impl SqliteJobStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }
}

#[async_trait]
impl JobStore for SqliteJobStore {
    async fn claim_next(&self, pipeline: &str) -> Result<Option<Job>, DatabaseError> {
        job_repo::claim_next(&self.db, pipeline, Utc::now())
    }

    async fn update_job(&self, id: &str, update: &JobUpdate) -> Result<bool, DatabaseError> {
        job_repo::update(&self.db, id, update)
    }

    async fn update_entry(&self, id: &str, update: &EntryUpdate) -> Result<bool, DatabaseError> {
        entry_repo::update(&self.db, id, update)
    }

    async fn get_entry(&self, id: &str) -> Result<Option<EntryFields>, DatabaseError> {
        entry_repo::get(&self.db, id)
    }

    async fn finish_job(
        &self,
        job_id: &str,
        update: &JobUpdate,
        entry_id: &str,
        entry_update: &EntryUpdate,
    ) -> Result<bool, DatabaseError> {
        self.db.with_transaction(|tx| {
            if !job_repo::update_in(tx, job_id, update)? {
                return Ok(false);
            }
            entry_repo::update_in(tx, entry_id, entry_update)?;
            Ok(true)
        })
    }
}
