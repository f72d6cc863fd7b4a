//! Startup wiring: builds each collaborator once from configuration and
//! hands them to the pipeline.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use log::info;

use crate::citations::RegexCitationRecognizer;
use crate::config::{BlobStoreConfig, WorkerConfig};
use crate::db::{default_database_path, Database, SqliteJobStore};
use crate::error::{ConfigError, Result};
use crate::pipeline::{Pipeline, PipelineConfig, Services};
use crate::sanitize;
use crate::services::{
    BlobStore, ConverterChain, DoclingServeConverter, Embedder, EpisodeWriter, FsBlobStore,
    GraphitiEpisodeWriter, HttpBlobStore, MarkdownTreeBuilder, OpenAiEmbedder, OpenAiExtractor,
    StructuralConverter,
};
use crate::worker::state::JobStateMachine;

/// Database file from config, or the per-user default.
pub fn database_path(config: &WorkerConfig) -> Result<PathBuf> {
    match &config.database_path {
        Some(path) => Ok(PathBuf::from(path)),
        None => default_database_path().ok_or_else(|| {
            ConfigError::Validation {
                message: "No home directory; set database_path".to_string(),
            }
            .into()
        }),
    }
}

/// Graph episode writer, when the graph is enabled and has a service URL.
pub fn build_episode_writer(config: &WorkerConfig) -> Result<Option<Arc<dyn EpisodeWriter>>> {
    let graph = &config.graph;
    match (&graph.service_url, graph.enabled) {
        (Some(url), true) => {
            info!("Graph episodes go to {}", sanitize::redact_url(url));
            Ok(Some(Arc::new(GraphitiEpisodeWriter::new(
                url,
                &graph.group_id,
                &graph.source_description,
                Duration::from_secs(graph.timeout_secs),
            )?)))
        }
        _ => Ok(None),
    }
}

pub fn build_services(config: &WorkerConfig) -> Result<Services> {
    let api_key = config.openai_api_key.resolve().map_err(ConfigError::from)?;

    let blob_store: Arc<dyn BlobStore> = match &config.blob_store {
        BlobStoreConfig::Filesystem { root } => {
            info!("Reading uploads from {}", root);
            Arc::new(FsBlobStore::new(root))
        }
        BlobStoreConfig::Http {
            base_url,
            api_key,
            timeout_secs,
        } => {
            info!("Reading uploads from {}", sanitize::redact_url(base_url));
            let key = api_key.resolve().map_err(ConfigError::from)?;
            Arc::new(HttpBlobStore::new(
                base_url,
                key,
                Duration::from_secs(*timeout_secs),
            )?)
        }
    };

    let remote: Option<Arc<dyn StructuralConverter>> = match &config.converter.url {
        Some(url) => Some(Arc::new(DoclingServeConverter::new(
            url,
            Duration::from_secs(config.converter.timeout_secs),
        )?)),
        None => {
            info!("No converter URL configured; only text uploads can be converted");
            None
        }
    };

    let extraction = &config.extraction;
    let extractor = match &api_key {
        Some(key) => OpenAiExtractor::new(
            &extraction.api_base,
            key.clone(),
            &extraction.model,
            extraction.max_markdown_chars,
            Duration::from_secs(extraction.timeout_secs),
        )?,
        None => return Err(ConfigError::MissingApiKey("Metadata extraction").into()),
    };

    let embedder: Option<Arc<dyn Embedder>> = match (&api_key, config.embedding.enabled) {
        (Some(key), true) => Some(Arc::new(OpenAiEmbedder::new(
            &extraction.api_base,
            key.clone(),
            &config.embedding.model,
            config.embedding.dimensions,
            Duration::from_secs(extraction.timeout_secs),
        )?)),
        _ => None,
    };

    let services = Services {
        blob_store,
        converter: Arc::new(ConverterChain::new(remote)),
        tree_builder: Arc::new(MarkdownTreeBuilder::new()),
        extractor: Arc::new(extractor),
        citations: Arc::new(RegexCitationRecognizer::new()),
        embedder,
        episodes: build_episode_writer(config)?,
    };
    Ok(services)
}

/// Opens the store and assembles a ready-to-run pipeline.
pub fn build_pipeline(config: &WorkerConfig) -> Result<Pipeline> {
    let db = Database::open(&database_path(config)?)?;
    let services = build_services(config)?;
    let state = JobStateMachine::new(Arc::new(SqliteJobStore::new(db)));
    let pipeline_config = PipelineConfig::from_config(config);
    Ok(Pipeline::new(Arc::new(pipeline_config), services, state))
}
