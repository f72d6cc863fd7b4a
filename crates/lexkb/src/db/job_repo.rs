//! Job repository: queue operations on `legal_kb_processing_jobs`.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde_json::{Map, Value};

use super::{Database, DatabaseError};
use crate::entry::{format_timestamp, parse_timestamp};
use crate::worker::job::{Job, JobStatus};

/// A raw job row from the database.
#[derive(Debug, Clone)]
struct JobRow {
    id: String,
    entry_id: String,
    organization_id: Option<String>,
    pipeline: String,
    storage_bucket: Option<String>,
    storage_path: String,
    payload: Option<String>,
    attempts: u32,
    status: String,
    last_error: Option<String>,
    created_at: String,
    updated_at: String,
    processed_at: Option<String>,
}

impl JobRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            entry_id: row.get("entry_id")?,
            organization_id: row.get("organization_id")?,
            pipeline: row.get("pipeline")?,
            storage_bucket: row.get("storage_bucket")?,
            storage_path: row.get("storage_path")?,
            payload: row.get("payload")?,
            attempts: row.get("attempts")?,
            status: row.get("status")?,
            last_error: row.get("last_error")?,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
            processed_at: row.get("processed_at")?,
        })
    }

    fn into_job(self) -> Result<Job, DatabaseError> {
        let status = JobStatus::parse(&self.status).ok_or_else(|| DatabaseError::InvalidValue {
            column: "status".to_string(),
            value: self.status.clone(),
        })?;

        let payload = match self.payload.as_deref() {
            None | Some("") => Map::new(),
            Some(raw) => match serde_json::from_str::<Value>(raw) {
                Ok(Value::Object(map)) => map,
                Ok(Value::Null) => Map::new(),
                Ok(other) => {
                    return Err(DatabaseError::InvalidValue {
                        column: "payload".to_string(),
                        value: other.to_string(),
                    })
                }
                Err(e) => {
                    return Err(DatabaseError::Json {
                        column: "payload".to_string(),
                        source: e,
                    })
                }
            },
        };

        Ok(Job {
            id: self.id,
            entry_id: self.entry_id,
            organization_id: self.organization_id,
            pipeline: self.pipeline,
            storage_bucket: self.storage_bucket,
            storage_path: self.storage_path,
            payload,
            attempts: self.attempts,
            status,
            last_error: self.last_error,
            created_at: timestamp("created_at", &self.created_at)?,
            updated_at: timestamp("updated_at", &self.updated_at)?,
            processed_at: self
                .processed_at
                .as_deref()
                .map(|s| timestamp("processed_at", s))
                .transpose()?,
        })
    }
}

fn timestamp(column: &str, value: &str) -> Result<DateTime<Utc>, DatabaseError> {
    parse_timestamp(value).ok_or_else(|| DatabaseError::InvalidValue {
        column: column.to_string(),
        value: value.to_string(),
    })
}

/// Column changes for one job row. `None` leaves a column as is.
#[derive(Debug, Clone)]
pub struct JobUpdate {
    pub status: Option<JobStatus>,
    pub last_error: Option<String>,
    pub processed_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
    /// Apply only while the row still has this status.
    pub expected_status: Option<JobStatus>,
}

impl JobUpdate {
    /// Moves a `processing` job to a terminal status.
    pub fn finish(status: JobStatus, last_error: Option<String>, at: DateTime<Utc>) -> Self {
        Self {
            status: Some(status),
            last_error,
            processed_at: Some(at),
            updated_at: at,
            expected_status: Some(JobStatus::Processing),
        }
    }
}

/// Inserts a new job row.
pub fn insert(db: &Database, job: &Job) -> Result<(), DatabaseError> {
    let payload = serde_json::to_string(&job.payload).map_err(|e| DatabaseError::Json {
        column: "payload".to_string(),
        source: e,
    })?;

    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO legal_kb_processing_jobs (id, entry_id, organization_id, pipeline,
             storage_bucket, storage_path, payload, attempts, status, last_error,
             created_at, updated_at, processed_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
            params![
                job.id,
                job.entry_id,
                job.organization_id,
                job.pipeline,
                job.storage_bucket,
                job.storage_path,
                payload,
                job.attempts,
                job.status.as_str(),
                job.last_error,
                format_timestamp(job.created_at),
                format_timestamp(job.updated_at),
                job.processed_at.map(format_timestamp),
            ],
        )?;
        Ok(())
    })
}

/// Finds a job by its ID.
pub fn find_by_id(db: &Database, id: &str) -> Result<Option<Job>, DatabaseError> {
    let row = db.with_conn(|conn| {
        let row = conn
            .query_row(
                "SELECT * FROM legal_kb_processing_jobs WHERE id = ?1",
                params![id],
                JobRow::from_row,
            )
            .optional()?;
        Ok(row)
    })?;
    row.map(JobRow::into_job).transpose()
}

/// Atomically claims the oldest queued job of `pipeline`.
///
/// Selection and the status flip happen in one statement, and the
/// `status = 'queued'` guard makes a second claimer match zero rows, so a
/// job is handed out at most once even across connections.
pub fn claim_next(
    db: &Database,
    pipeline: &str,
    now: DateTime<Utc>,
) -> Result<Option<Job>, DatabaseError> {
    let row = db.with_conn(|conn| {
        let row = conn
            .query_row(
                "UPDATE legal_kb_processing_jobs
                 SET status = 'processing', attempts = attempts + 1, updated_at = ?2
                 WHERE id = (
                     SELECT id FROM legal_kb_processing_jobs
                     WHERE status = 'queued' AND pipeline = ?1
                     ORDER BY created_at ASC, rowid ASC
                     LIMIT 1
                 )
                 AND status = 'queued'
                 RETURNING *",
                params![pipeline, format_timestamp(now)],
                JobRow::from_row,
            )
            .optional()?;
        Ok(row)
    })?;
    row.map(JobRow::into_job).transpose()
}

/// Applies `update` to a job. Returns whether a row changed, which is
/// `false` when the `expected_status` guard did not hold.
pub fn update(db: &Database, id: &str, update: &JobUpdate) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| update_in(conn, id, update))
}

/// [`update`] on an open connection or transaction.
pub(crate) fn update_in(
    conn: &Connection,
    id: &str,
    update: &JobUpdate,
) -> Result<bool, DatabaseError> {
    let changed = conn.execute(
        "UPDATE legal_kb_processing_jobs
         SET status = COALESCE(?2, status),
             last_error = COALESCE(?3, last_error),
             processed_at = COALESCE(?4, processed_at),
             updated_at = ?5
         WHERE id = ?1 AND (?6 IS NULL OR status = ?6)",
        params![
            id,
            update.status.map(|s| s.as_str()),
            update.last_error,
            update.processed_at.map(format_timestamp),
            format_timestamp(update.updated_at),
            update.expected_status.map(|s| s.as_str()),
        ],
    )?;
    Ok(changed > 0)
}

/// Counts jobs with the given status.
pub fn count_by_status(db: &Database, status: JobStatus) -> Result<u64, DatabaseError> {
    db.with_conn(|conn| {
        let count: u64 = conn.query_row(
            "SELECT COUNT(*) FROM legal_kb_processing_jobs WHERE status = ?1",
            params![status.as_str()],
            |r| r.get(0),
        )?;
        Ok(count)
    })
}
