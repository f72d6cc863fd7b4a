use std::fmt;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::pipeline::PipelineWarning;

/// Table holding processing jobs.
pub const JOB_TABLE: &str = "legal_kb_processing_jobs";

/// Lifecycle of a job row: `queued → processing → completed | failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "queued" => Some(JobStatus::Queued),
            "processing" => Some(JobStatus::Processing),
            "completed" => Some(JobStatus::Completed),
            "failed" => Some(JobStatus::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    /// Whether `self → next` is a legal transition. Jobs never go back to
    /// `queued` and terminal states are final.
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        matches!(
            (self, next),
            (JobStatus::Queued, JobStatus::Processing)
                | (JobStatus::Processing, JobStatus::Completed)
                | (JobStatus::Processing, JobStatus::Failed)
        )
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One queued unit of work binding a stored document to a knowledge-base entry.
#[derive(Debug, Clone, PartialEq)]
pub struct Job {
    pub id: String,
    pub entry_id: String,
    pub organization_id: Option<String>,
    pub pipeline: String,
    pub storage_bucket: Option<String>,
    pub storage_path: String,
    /// Caller-supplied field overrides.
    pub payload: Map<String, Value>,
    pub attempts: u32,
    pub status: JobStatus,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
}

impl Job {
    /// Creates a queued job. Rows are normally created by the upload
    /// workflow; this constructor serves seeding and tests.
    pub fn queued(entry_id: &str, pipeline: &str, storage_path: &str) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            entry_id: entry_id.to_string(),
            organization_id: None,
            pipeline: pipeline.to_string(),
            storage_bucket: None,
            storage_path: storage_path.to_string(),
            payload: Map::new(),
            attempts: 0,
            status: JobStatus::Queued,
            last_error: None,
            created_at: now,
            updated_at: now,
            processed_at: None,
        }
    }

    /// Bucket to download from, falling back to the configured default.
    pub fn bucket<'a>(&'a self, default_bucket: &'a str) -> &'a str {
        self.storage_bucket
            .as_deref()
            .filter(|b| !b.trim().is_empty())
            .unwrap_or(default_bucket)
    }

    /// Suffix for the scoped temp file, so format-sniffing converters see
    /// the original extension.
    pub fn file_suffix(&self) -> String {
        Path::new(&self.storage_path)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| format!(".{}", e))
            .unwrap_or_else(|| ".pdf".to_string())
    }

    /// MIME type guessed from the storage path.
    pub fn mime_type(&self) -> Option<String> {
        mime_guess::from_path(&self.storage_path)
            .first()
            .map(|m| m.to_string())
    }
}

/// Result of processing one job.
#[derive(Debug)]
pub struct JobOutcome {
    pub job_id: String,
    pub entry_id: String,
    pub status: JobStatus,
    pub error: Option<String>,
    pub warnings: Vec<PipelineWarning>,
    /// Whether a graph episode was recorded for the entry.
    pub episode_recorded: bool,
}

impl JobOutcome {
    pub fn completed(job: &Job, warnings: Vec<PipelineWarning>, episode_recorded: bool) -> Self {
        Self {
            job_id: job.id.clone(),
            entry_id: job.entry_id.clone(),
            status: JobStatus::Completed,
            error: None,
            warnings,
            episode_recorded,
        }
    }

    pub fn failed(job: &Job, error: String, warnings: Vec<PipelineWarning>) -> Self {
        Self {
            job_id: job.id.clone(),
            entry_id: job.entry_id.clone(),
            status: JobStatus::Failed,
            error: Some(error),
            warnings,
            episode_recorded: false,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == JobStatus::Completed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trip() {
        for status in [
            JobStatus::Queued,
            JobStatus::Processing,
            JobStatus::Completed,
            JobStatus::Failed,
        ] {
            assert_eq!(JobStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(JobStatus::parse("superseded"), None);
    }

    #[test]
    fn test_transitions() {
        assert!(JobStatus::Queued.can_transition_to(JobStatus::Processing));
        assert!(JobStatus::Processing.can_transition_to(JobStatus::Completed));
        assert!(JobStatus::Processing.can_transition_to(JobStatus::Failed));

        assert!(!JobStatus::Queued.can_transition_to(JobStatus::Completed));
        assert!(!JobStatus::Processing.can_transition_to(JobStatus::Queued));
        assert!(!JobStatus::Failed.can_transition_to(JobStatus::Queued));
        assert!(!JobStatus::Completed.can_transition_to(JobStatus::Failed));
        assert!(JobStatus::Failed.is_terminal());
        assert!(!JobStatus::Processing.is_terminal());
    }

    #[test]
    fn test_new_job_is_queued() {
        let job = Job::queued("entry-1", "docling_pageindex", "org/judgment.pdf");
        assert!(!job.id.is_empty());
        assert_eq!(job.status, JobStatus::Queued);
        assert_eq!(job.attempts, 0);
        assert!(job.payload.is_empty());
    }

    #[test]
    fn test_bucket_fallback() {
        let mut job = Job::queued("e", "p", "a.pdf");
        assert_eq!(job.bucket("legal-kb"), "legal-kb");
        job.storage_bucket = Some("  ".to_string());
        assert_eq!(job.bucket("legal-kb"), "legal-kb");
        job.storage_bucket = Some("tenant-docs".to_string());
        assert_eq!(job.bucket("legal-kb"), "tenant-docs");
    }

    #[test]
    fn test_file_suffix_and_mime() {
        let job = Job::queued("e", "p", "uploads/act.docx");
        assert_eq!(job.file_suffix(), ".docx");

        let job = Job::queued("e", "p", "uploads/no-extension");
        assert_eq!(job.file_suffix(), ".pdf");

        let job = Job::queued("e", "p", "uploads/judgment.pdf");
        assert_eq!(job.mime_type().as_deref(), Some("application/pdf"));
    }
}
