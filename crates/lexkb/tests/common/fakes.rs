//! Scripted collaborators for driving the pipeline without any service.

#![allow(dead_code)]

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{json, Map, Value};

use lexkb::citations::{Citation, CitationRecognizer};
use lexkb::db::{DatabaseError, JobStore, JobUpdate, SqliteJobStore};
use lexkb::entry::{EntryFields, EntryUpdate};
use lexkb::pipeline::{ProgressEvent, ProgressReporter};
use lexkb::services::{
    BlobStore, ConvertedDocument, Embedder, Episode, EpisodeWriter, MetadataExtractor,
    StructuralConverter, TreeBuilder, TreeOptions,
};
use lexkb::{Job, MetadataMap, ServiceError};

pub fn unavailable(what: &str) -> ServiceError {
    ServiceError::Api {
        status: 503,
        message: format!("{} unavailable", what),
    }
}

/// In-memory object store keyed by `(bucket, path)`.
#[derive(Default)]
pub struct MemoryBlobStore {
    objects: Mutex<HashMap<(String, String), Vec<u8>>>,
}

impl MemoryBlobStore {
    pub fn put(&self, bucket: &str, path: &str, bytes: &[u8]) {
        self.objects
            .lock()
            .unwrap()
            .insert((bucket.to_string(), path.to_string()), bytes.to_vec());
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn download(&self, bucket: &str, path: &str) -> Result<Vec<u8>, ServiceError> {
        self.objects
            .lock()
            .unwrap()
            .get(&(bucket.to_string(), path.to_string()))
            .cloned()
            .ok_or_else(|| ServiceError::Api {
                status: 404,
                message: format!("{}/{} not found", bucket, path),
            })
    }
}

/// Fails a fixed number of times, then returns the source bytes as
/// markdown with a one-item structured document.
pub struct ScriptedConverter {
    failures: u32,
    calls: AtomicU32,
}

impl ScriptedConverter {
    pub fn new(failures: u32) -> Self {
        Self {
            failures,
            calls: AtomicU32::new(0),
        }
    }

    pub fn always_failing() -> Self {
        Self::new(u32::MAX)
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StructuralConverter for ScriptedConverter {
    async fn convert(&self, path: &Path) -> Result<ConvertedDocument, ServiceError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if call <= self.failures {
            return Err(unavailable("converter"));
        }
        let markdown = std::fs::read_to_string(path).map_err(|e| ServiceError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        Ok(ConvertedDocument {
            markdown,
            structured: json!({"export_format": {"items": [{"title": "Judgment"}]}}),
        })
    }
}

pub struct BrokenTreeBuilder;

#[async_trait]
impl TreeBuilder for BrokenTreeBuilder {
    async fn build_tree(&self, _text: &str, _options: TreeOptions) -> Result<Value, ServiceError> {
        Err(ServiceError::InvalidResponse("outline model crashed".to_string()))
    }
}

/// Returns a fixed answer after a number of failures and records the
/// `existing` view it was given on each call.
pub struct ScriptedExtractor {
    answer: Map<String, Value>,
    failures: u32,
    calls: AtomicU32,
    seen_existing: Mutex<Vec<MetadataMap>>,
}

impl ScriptedExtractor {
    pub fn returning(answer: Value) -> Self {
        Self {
            answer: answer.as_object().cloned().unwrap_or_default(),
            failures: 0,
            calls: AtomicU32::new(0),
            seen_existing: Mutex::new(Vec::new()),
        }
    }

    pub fn failing_first(mut self, failures: u32) -> Self {
        self.failures = failures;
        self
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_existing(&self) -> Option<MetadataMap> {
        self.seen_existing.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl MetadataExtractor for ScriptedExtractor {
    async fn extract(
        &self,
        _text: &str,
        existing: &MetadataMap,
        _section_hints: &[String],
    ) -> Result<Map<String, Value>, ServiceError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.seen_existing.lock().unwrap().push(existing.clone());
        if call <= self.failures {
            return Err(ServiceError::InvalidResponse(
                "model returned no JSON object".to_string(),
            ));
        }
        Ok(self.answer.clone())
    }
}

/// Returns a fixed citation list, or fails outright.
pub struct ListRecognizer {
    citations: Option<Vec<Citation>>,
}

impl ListRecognizer {
    pub fn new(citations: Vec<Citation>) -> Self {
        Self {
            citations: Some(citations),
        }
    }

    pub fn broken() -> Self {
        Self { citations: None }
    }
}

impl CitationRecognizer for ListRecognizer {
    fn recognize(&self, _text: &str) -> Result<Vec<Result<Citation, ServiceError>>, ServiceError> {
        match &self.citations {
            Some(list) => Ok(list.iter().cloned().map(Ok).collect()),
            None => Err(ServiceError::Citation("grammar failed to load".to_string())),
        }
    }
}

pub struct FakeEmbedder {
    vector: Option<Vec<f32>>,
    inputs: Mutex<Vec<String>>,
}

impl FakeEmbedder {
    pub fn returning(vector: Vec<f32>) -> Self {
        Self {
            vector: Some(vector),
            inputs: Mutex::new(Vec::new()),
        }
    }

    pub fn failing() -> Self {
        Self {
            vector: None,
            inputs: Mutex::new(Vec::new()),
        }
    }

    pub fn inputs(&self) -> Vec<String> {
        self.inputs.lock().unwrap().clone()
    }
}

#[async_trait]
impl Embedder for FakeEmbedder {
    async fn embed(&self, text: &str, _max_chars: usize) -> Result<Option<Vec<f32>>, ServiceError> {
        self.inputs.lock().unwrap().push(text.to_string());
        match &self.vector {
            Some(vector) => Ok(Some(vector.clone())),
            None => Err(unavailable("embeddings")),
        }
    }
}

pub struct RecordingEpisodes {
    fail: bool,
    episodes: Mutex<Vec<Episode>>,
}

impl RecordingEpisodes {
    pub fn accepting() -> Self {
        Self {
            fail: false,
            episodes: Mutex::new(Vec::new()),
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            episodes: Mutex::new(Vec::new()),
        }
    }

    pub fn episodes(&self) -> Vec<Episode> {
        self.episodes.lock().unwrap().clone()
    }
}

#[async_trait]
impl EpisodeWriter for RecordingEpisodes {
    async fn write_episode(&self, episode: &Episode) -> Result<bool, ServiceError> {
        self.episodes.lock().unwrap().push(episode.clone());
        if self.fail {
            return Err(unavailable("graph service"));
        }
        Ok(true)
    }
}

/// SQLite store that also remembers every `processing_status` written to
/// an entry, in order.
pub struct RecordingStore {
    inner: SqliteJobStore,
    statuses: Mutex<Vec<String>>,
}

impl RecordingStore {
    pub fn new(inner: SqliteJobStore) -> Self {
        Self {
            inner,
            statuses: Mutex::new(Vec::new()),
        }
    }

    pub fn statuses(&self) -> Vec<String> {
        self.statuses.lock().unwrap().clone()
    }
}

#[async_trait]
impl JobStore for RecordingStore {
    async fn claim_next(&self, pipeline: &str) -> Result<Option<Job>, DatabaseError> {
        self.inner.claim_next(pipeline).await
    }

    async fn update_job(&self, id: &str, update: &JobUpdate) -> Result<bool, DatabaseError> {
        self.inner.update_job(id, update).await
    }

    async fn update_entry(&self, id: &str, update: &EntryUpdate) -> Result<bool, DatabaseError> {
        if let Some(status) = update.get("processing_status").and_then(Value::as_str) {
            self.statuses.lock().unwrap().push(status.to_string());
        }
        self.inner.update_entry(id, update).await
    }

    async fn get_entry(&self, id: &str) -> Result<Option<EntryFields>, DatabaseError> {
        self.inner.get_entry(id).await
    }

    async fn finish_job(
        &self,
        job_id: &str,
        update: &JobUpdate,
        entry_id: &str,
        entry_update: &EntryUpdate,
    ) -> Result<bool, DatabaseError> {
        let moved = self
            .inner
            .finish_job(job_id, update, entry_id, entry_update)
            .await?;
        if moved {
            if let Some(status) = entry_update.get("processing_status").and_then(Value::as_str) {
                self.statuses.lock().unwrap().push(status.to_string());
            }
        }
        Ok(moved)
    }
}

/// SQLite store whose entry writes always fail, as under a poisoned lock.
/// Job writes go through.
pub struct BrokenEntryStore {
    inner: SqliteJobStore,
}

impl BrokenEntryStore {
    pub fn new(inner: SqliteJobStore) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl JobStore for BrokenEntryStore {
    async fn claim_next(&self, pipeline: &str) -> Result<Option<Job>, DatabaseError> {
        self.inner.claim_next(pipeline).await
    }

    async fn update_job(&self, id: &str, update: &JobUpdate) -> Result<bool, DatabaseError> {
        self.inner.update_job(id, update).await
    }

    async fn update_entry(&self, _id: &str, _update: &EntryUpdate) -> Result<bool, DatabaseError> {
        Err(DatabaseError::LockPoisoned)
    }

    async fn get_entry(&self, id: &str) -> Result<Option<EntryFields>, DatabaseError> {
        self.inner.get_entry(id).await
    }

    async fn finish_job(
        &self,
        _job_id: &str,
        _update: &JobUpdate,
        _entry_id: &str,
        _entry_update: &EntryUpdate,
    ) -> Result<bool, DatabaseError> {
        Err(DatabaseError::LockPoisoned)
    }
}

/// Keeps every progress event. Optionally raises a shutdown flag once a
/// number of jobs have finished.
#[derive(Default)]
pub struct RecordingProgress {
    events: Mutex<Vec<ProgressEvent>>,
    stop_after: Option<(usize, Arc<AtomicBool>)>,
}

impl RecordingProgress {
    pub fn stopping_after(jobs: usize, shutdown: Arc<AtomicBool>) -> Self {
        Self {
            events: Mutex::new(Vec::new()),
            stop_after: Some((jobs, shutdown)),
        }
    }

    pub fn events(&self) -> Vec<ProgressEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn finished_jobs(&self) -> usize {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| {
                matches!(
                    e,
                    ProgressEvent::Completed { .. } | ProgressEvent::Failed { .. }
                )
            })
            .count()
    }
}

impl ProgressReporter for RecordingProgress {
    fn report(&self, event: ProgressEvent) {
        self.events.lock().unwrap().push(event);
        if let Some((jobs, shutdown)) = &self.stop_after {
            if self.finished_jobs() >= *jobs {
                shutdown.store(true, Ordering::Relaxed);
            }
        }
    }
}
