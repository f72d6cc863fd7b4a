use std::future::Future;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use chrono::Utc;
use serde_json::Value;
use tracing::{debug, error, info_span, warn, Instrument};

use crate::citations::{collect_citations, CitationRecognizer};
use crate::metadata::merge::merge;
use crate::metadata::{metadata_view, sanitize_extracted, MetadataField};
use crate::sanitize;
use crate::services::{
    section_hints, BlobStore, Embedder, Episode, EpisodeWriter, MetadataExtractor,
    StructuralConverter, TreeBuilder,
};
use crate::worker::job::{Job, JobOutcome};
use crate::worker::state::JobStateMachine;

use super::config::PipelineConfig;
use super::error::{PipelineError, PipelineWarning};
use super::progress::{ProgressEvent, ProgressReporter};
use super::result::PipelineResult;
use super::retry::{run_optional, run_required, RetryPolicy, Stage, StageOutcome};
use super::tree::{parse_structure, TreeSummary};

/// The collaborators one pipeline run calls. Optional stages are enabled by
/// supplying their collaborator.
#[derive(Clone)]
pub struct Services {
    pub blob_store: Arc<dyn BlobStore>,
    pub converter: Arc<dyn StructuralConverter>,
    pub tree_builder: Arc<dyn TreeBuilder>,
    pub extractor: Arc<dyn MetadataExtractor>,
    pub citations: Arc<dyn CitationRecognizer>,
    pub embedder: Option<Arc<dyn Embedder>>,
    pub episodes: Option<Arc<dyn EpisodeWriter>>,
}

pub struct Pipeline {
    config: Arc<PipelineConfig>,
    services: Services,
    state: JobStateMachine,
}

impl Pipeline {
    pub fn new(config: Arc<PipelineConfig>, services: Services, state: JobStateMachine) -> Self {
        Self {
            config,
            services,
            state,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn state(&self) -> &JobStateMachine {
        &self.state
    }

    /// Runs every stage for a claimed job and records the outcome on the
    /// job and its entry. Never returns an error: anything that goes wrong
    /// ends as a failed job.
    pub async fn process(&self, job: Job, progress: &dyn ProgressReporter) -> JobOutcome {
        let filename = sanitize::redact_path(Path::new(&job.storage_path));
        let span = info_span!("pipeline",
            job_id = %job.id,
            entry_id = %job.entry_id,
            filename = %filename,
            attempt = job.attempts,
        );
        self.process_job(job, progress).instrument(span).await
    }

    async fn process_job(&self, mut job: Job, progress: &dyn ProgressReporter) -> JobOutcome {
        let mut warnings = Vec::new();

        let result = match self.run_stages(&job, progress, &mut warnings).await {
            Ok(result) => result,
            Err(e) => return self.finish_failed(job, e, warnings, progress).await,
        };

        let update = result.entry_update(
            &self.config.pipeline_name,
            self.config.full_text_max_chars,
            Utc::now(),
        );
        if let Err(e) = self.state.complete(&mut job, &update).await {
            return self.finish_failed(job, e.into(), warnings, progress).await;
        }

        progress.report(ProgressEvent::Completed {
            entry_id: job.entry_id.clone(),
            node_count: result.tree_summary.node_count,
            citation_count: result.citations.cases.len() + result.citations.statutes.len(),
        });
        JobOutcome::completed(&job, warnings, result.episode_recorded)
    }

    async fn finish_failed(
        &self,
        mut job: Job,
        err: PipelineError,
        warnings: Vec<PipelineWarning>,
        progress: &dyn ProgressReporter,
    ) -> JobOutcome {
        let message = err.to_string();
        progress.report(ProgressEvent::Failed {
            error: message.clone(),
        });
        if let Err(e) = self.state.fail(&mut job, &message).await {
            error!("Could not record failure of job {}: {}", job.id, e);
        }
        let stored = job.last_error.clone().unwrap_or(message);
        JobOutcome::failed(&job, stored, warnings)
    }

    async fn run_stages(
        &self,
        job: &Job,
        progress: &dyn ProgressReporter,
        warnings: &mut Vec<PipelineWarning>,
    ) -> Result<PipelineResult, PipelineError> {
        let services = &self.services;

        // Step 1: Download into a scoped temp file, removed when it drops.
        let bucket = job.bucket(&self.config.default_bucket);
        let bytes = services
            .blob_store
            .download(bucket, &job.storage_path)
            .instrument(info_span!("download", bucket = %bucket))
            .await
            .map_err(|source| PipelineError::Download {
                path: job.storage_path.clone(),
                source,
            })?;
        let mut source_file = tempfile::Builder::new()
            .prefix("lexkb-")
            .suffix(&job.file_suffix())
            .tempfile()?;
        source_file.write_all(&bytes)?;
        source_file.flush()?;
        let mime = job.mime_type().unwrap_or_else(|| "unknown".to_string());
        debug!(bytes = bytes.len(), mime = %mime, "downloaded source document");
        drop(bytes);

        // Step 2: Structural conversion, retried
        let converted = tracked(Stage::Conversion, progress, async {
            run_required(Stage::Conversion, &self.config.conversion_retry, |_| {
                services.converter.convert(source_file.path())
            })
            .await
        })
        .await?;

        // Step 3: Checkpoint conversion output
        self.state
            .checkpoint_conversion(job, &converted.markdown, &converted.structured)
            .await?;

        // Step 4: Hierarchical tree
        let options = self.config.tree_options;
        let tree = tracked(Stage::TreeBuild, progress, async {
            run_required(Stage::TreeBuild, &RetryPolicy::once(), |_| {
                services.tree_builder.build_tree(&converted.markdown, options)
            })
            .await
        })
        .await?;
        let tree_summary =
            TreeSummary::of(&parse_structure(&tree).map_err(PipelineError::InvalidTree)?);
        debug!(
            depth = tree_summary.depth,
            nodes = tree_summary.node_count,
            "outline built"
        );

        // Step 5: Stored fields with payload overrides on top
        let mut existing_fields = self
            .state
            .store()
            .get_entry(&job.entry_id)
            .await?
            .unwrap_or_default();
        for (key, value) in &job.payload {
            existing_fields.insert(key.clone(), value.clone());
        }
        let existing = metadata_view(&existing_fields);

        // Step 6: Metadata extraction, own attempt budget
        let hints = section_hints(&converted.structured);
        let raw = tracked(Stage::Extraction, progress, async {
            run_required(Stage::Extraction, &self.config.extraction_retry, |_| {
                services
                    .extractor
                    .extract(&converted.markdown, &existing, &hints)
            })
            .await
        })
        .await?;
        let extracted = sanitize_extracted(&raw);
        let metadata_updates = merge(&extracted, &existing);

        // Step 7: Citations, degrade instead of failing
        progress.report(ProgressEvent::StageStarted {
            stage: Stage::Citations,
        });
        let report = {
            let _span = info_span!("stage", stage = Stage::Citations.key()).entered();
            collect_citations(services.citations.as_ref(), &converted.markdown)
        };
        if let Some(error) = report.failure {
            warnings.push(PipelineWarning::CitationsDegraded { error });
        }
        progress.report(ProgressEvent::StageCompleted {
            stage: Stage::Citations,
        });
        let citations = report.citations;

        // Step 8: Optional embedding of the summary, or the text
        let embedding = match &services.embedder {
            Some(embedder) => {
                let text = extracted
                    .get(&MetadataField::Summary)
                    .and_then(Value::as_str)
                    .filter(|s| !s.trim().is_empty())
                    .unwrap_or(&converted.markdown);
                let outcome = run_optional(
                    Stage::Embedding,
                    embedder.embed(text, self.config.embedding_max_chars),
                )
                .instrument(info_span!("stage", stage = Stage::Embedding.key()))
                .await;
                match outcome {
                    StageOutcome::Produced(vector) => Some(vector),
                    StageOutcome::Absent => None,
                    StageOutcome::Failed(error) => {
                        warnings.push(PipelineWarning::EmbeddingFailed { error });
                        None
                    }
                }
            }
            None => {
                progress.report(ProgressEvent::StageSkipped {
                    stage: Stage::Embedding,
                    reason: "not configured".to_string(),
                });
                None
            }
        };

        // Step 9: Optional graph episode
        let episode_recorded = match &services.episodes {
            Some(writer) => {
                let episode = Episode::describe(&job.entry_id, &extracted, &existing, &citations);
                let outcome = run_optional(Stage::Episode, async {
                    writer
                        .write_episode(&episode)
                        .await
                        .map(|accepted| accepted.then_some(()))
                })
                .instrument(info_span!("stage", stage = Stage::Episode.key()))
                .await;
                match outcome {
                    StageOutcome::Produced(()) => true,
                    StageOutcome::Absent => {
                        warn!("Graph service did not accept episode {}", episode.name());
                        false
                    }
                    StageOutcome::Failed(error) => {
                        warnings.push(PipelineWarning::EpisodeFailed { error });
                        false
                    }
                }
            }
            None => {
                progress.report(ProgressEvent::StageSkipped {
                    stage: Stage::Episode,
                    reason: "not configured".to_string(),
                });
                false
            }
        };

        Ok(PipelineResult {
            markdown: converted.markdown,
            structured: converted.structured,
            tree,
            tree_summary,
            citations,
            embedding,
            episode_recorded,
            metadata_updates,
        })
    }
}

/// Runs a required stage inside its span, reporting start and completion.
async fn tracked<T, E, Fut>(stage: Stage, progress: &dyn ProgressReporter, fut: Fut) -> Result<T, E>
where
    Fut: Future<Output = Result<T, E>>,
{
    progress.report(ProgressEvent::StageStarted { stage });
    let result = fut
        .instrument(info_span!("stage", stage = stage.key()))
        .await;
    if result.is_ok() {
        progress.report(ProgressEvent::StageCompleted { stage });
    }
    result
}
