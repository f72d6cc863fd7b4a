//! Isolated store plus a pipeline wired to scripted collaborators.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};

use lexkb::citations::Citation;
use lexkb::db::{entry_repo, job_repo, Database, JobStore, SqliteJobStore};
use lexkb::entry::EntryFields;
use lexkb::pipeline::{Pipeline, PipelineConfig, RetryPolicy, Services};
use lexkb::services::MarkdownTreeBuilder;
use lexkb::{Job, JobStateMachine};

use super::fakes::{ListRecognizer, MemoryBlobStore, ScriptedConverter, ScriptedExtractor};

pub const PIPELINE: &str = "docling_pageindex";
pub const BUCKET: &str = "legal-kb";
pub const ENTRY_ID: &str = "entry-1";

pub const JUDGMENT: &str = "# Doe v. Roe\n\
                            Judgment of the Court.\n\
                            ## Facts\n\
                            The appellant relied on 410 U.S. 113.\n\
                            ## Holding\n\
                            Appeal allowed under Cap. 63.\n";

pub struct TestHarness {
    pub db: Database,
    pub store: Arc<dyn JobStore>,
    pub blobs: Arc<MemoryBlobStore>,
}

impl TestHarness {
    pub fn new() -> Self {
        let db = Database::open_in_memory().expect("in-memory database");
        let store: Arc<dyn JobStore> = Arc::new(SqliteJobStore::new(db.clone()));
        Self::with_store(db, store)
    }

    /// Uses `store` for the state machine; `db` must be the database behind it.
    pub fn with_store(db: Database, store: Arc<dyn JobStore>) -> Self {
        Self {
            db,
            store,
            blobs: Arc::new(MemoryBlobStore::default()),
        }
    }

    pub fn state(&self) -> JobStateMachine {
        JobStateMachine::new(Arc::clone(&self.store))
    }

    pub fn insert_entry(&self, id: &str, fields: Value) {
        let fields: EntryFields = fields.as_object().cloned().unwrap_or_default();
        entry_repo::insert(&self.db, id, Some("org-1"), &fields).expect("insert entry");
    }

    /// Stores `document` under `path` and queues a job for `entry_id`.
    pub fn enqueue(&self, entry_id: &str, path: &str, document: &str) -> Job {
        self.blobs.put(BUCKET, path, document.as_bytes());
        let job = Job::queued(entry_id, PIPELINE, path);
        job_repo::insert(&self.db, &job).expect("insert job");
        job
    }

    pub fn entry(&self, id: &str) -> EntryFields {
        entry_repo::get(&self.db, id)
            .expect("read entry")
            .expect("entry exists")
    }

    pub fn job(&self, id: &str) -> Job {
        job_repo::find_by_id(&self.db, id)
            .expect("read job")
            .expect("job exists")
    }

    /// Retries without delay so tests stay fast.
    pub fn config(&self) -> PipelineConfig {
        PipelineConfig {
            conversion_retry: RetryPolicy::with_retries(2, Duration::ZERO),
            ..PipelineConfig::default()
        }
    }

    pub fn services(&self, extractor: ScriptedExtractor) -> Services {
        Services {
            blob_store: self.blobs.clone(),
            converter: Arc::new(ScriptedConverter::new(0)),
            tree_builder: Arc::new(MarkdownTreeBuilder::new()),
            extractor: Arc::new(extractor),
            citations: Arc::new(ListRecognizer::new(vec![
                Citation::case("410 U.S. 113"),
                Citation::statute("Cap. 63"),
                Citation::case("410 U.S. 113"),
            ])),
            embedder: None,
            episodes: None,
        }
    }

    pub fn pipeline(&self, services: Services) -> Pipeline {
        Pipeline::new(Arc::new(self.config()), services, self.state())
    }

    /// Claims the next queued job, panicking when there is none.
    pub async fn claim(&self) -> Job {
        self.state()
            .claim_next(PIPELINE)
            .await
            .expect("claim")
            .expect("a queued job")
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

pub fn doe_v_roe_extraction() -> ScriptedExtractor {
    ScriptedExtractor::returning(json!({
        "title": "Doe v. Roe",
        "document_type": "statute",
        "summary": "The appeal was allowed.",
        "key_points": ["Appeal allowed"],
        "court_name": "Supreme Court"
    }))
}
