use thiserror::Error;

use crate::db::DatabaseError;
use crate::error::ServiceError;
use crate::worker::state::JobStateError;

use super::retry::StageError;

/// Anything that routes a job to `failed`.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Download of '{path}' failed: {source}")]
    Download {
        path: String,
        #[source]
        source: ServiceError,
    },

    #[error(transparent)]
    Stage(#[from] StageError),

    #[error("Tree builder returned an invalid structure: {0}")]
    InvalidTree(#[source] serde_json::Error),

    #[error("Temporary file error: {0}")]
    TempFile(#[from] std::io::Error),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Job state error: {0}")]
    JobState(#[from] JobStateError),
}

/// Non-fatal problems recorded on a completed job.
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineWarning {
    EmbeddingFailed { error: String },
    EpisodeFailed { error: String },
    CitationsDegraded { error: String },
}
