use std::path::PathBuf;
use thiserror::Error;

use crate::pipeline::PipelineError;
use crate::secrets::SecretError;
use crate::worker::state::JobStateError;

#[derive(Error, Debug)]
pub enum LexkbError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] crate::db::DatabaseError),

    #[error("Service error: {0}")]
    Service(#[from] ServiceError),

    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    #[error("Job state error: {0}")]
    JobState(#[from] JobStateError),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config JSON: {0}")]
    ParseJson(#[from] serde_json::Error),

    #[error("Config validation failed: {message}")]
    Validation { message: String },

    #[error("Invalid value '{value}' for environment variable {name}")]
    InvalidEnv { name: String, value: String },

    #[error("Secret resolution failed: {0}")]
    Secret(#[from] SecretError),

    #[error("{0} requires an OpenAI API key")]
    MissingApiKey(&'static str),
}

/// Errors raised by external collaborators (storage, converter, LLM, graph service).
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error: HTTP {status} - {message}")]
    Api { status: u16, message: String },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Failed to read '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid object path: {0}")]
    InvalidPath(String),

    #[error("Unsupported document format: {0}")]
    UnsupportedFormat(String),

    #[error("Citation parsing failed: {0}")]
    Citation(String),
}

impl ServiceError {
    /// Builds an `Api` error from a non-success response, keeping a bounded
    /// slice of the body for diagnostics.
    pub async fn from_response(response: reqwest::Response) -> Self {
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        ServiceError::Api {
            status,
            message: crate::sanitize::truncate_chars(body.trim(), 500).to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, LexkbError>;
