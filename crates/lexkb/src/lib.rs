pub mod citations;
pub mod config;
pub mod db;
pub mod entry;
pub mod error;
pub mod metadata;
pub mod pipeline;
pub mod sanitize;
pub mod secrets;
pub mod services;
pub mod worker;

pub use citations::{collect_citations, Citation, CitationKind, CitationLists, CitationRecognizer};
pub use config::{load_config, load_worker_config, WorkerConfig};
pub use db::{Database, JobStore, SqliteJobStore};
pub use entry::{EntryFields, EntryUpdate, ProcessingStatus};
pub use error::{ConfigError, LexkbError, Result, ServiceError};
pub use metadata::merge::merge;
pub use metadata::{MetadataField, MetadataMap};
pub use pipeline::{tree_depth_and_count, Pipeline, PipelineConfig, Services};
pub use secrets::{resolve_secret, resolve_secret_optional, SecretError};
pub use worker::{Job, JobOutcome, JobStateMachine, JobStatus, Poller};
