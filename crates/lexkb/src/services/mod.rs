//! External collaborators called by the pipeline.
//!
//! Each collaborator is a trait object so the pipeline can run against
//! HTTP-backed implementations in production and scripted fakes in tests.

pub mod blob;
pub mod converter;
pub mod graph;
pub mod openai;
pub mod tree_builder;

use std::path::Path;

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::error::ServiceError;
use crate::metadata::MetadataMap;

pub use blob::{FsBlobStore, HttpBlobStore};
pub use converter::{section_hints, ConverterChain, DoclingServeConverter, PlainTextConverter};
pub use graph::{Episode, GraphitiEpisodeWriter};
pub use openai::{OpenAiEmbedder, OpenAiExtractor};
pub use tree_builder::MarkdownTreeBuilder;

/// Object storage holding uploaded source documents.
#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn download(&self, bucket: &str, path: &str) -> Result<Vec<u8>, ServiceError>;
}

/// Output of structural conversion.
#[derive(Debug, Clone, PartialEq)]
pub struct ConvertedDocument {
    /// Markdown (or plain text) rendering of the document.
    pub markdown: String,
    /// Structured document as produced by the converter.
    pub structured: Value,
}

#[async_trait]
pub trait StructuralConverter: Send + Sync {
    async fn convert(&self, path: &Path) -> Result<ConvertedDocument, ServiceError>;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TreeOptions {
    pub add_summary: bool,
}

/// Builds the hierarchical outline. The returned mapping carries the node
/// forest under `structure`; child nodes sit under each node's `nodes`.
#[async_trait]
pub trait TreeBuilder: Send + Sync {
    async fn build_tree(&self, text: &str, options: TreeOptions) -> Result<Value, ServiceError>;
}

/// One extraction call. Retrying is the caller's business.
#[async_trait]
pub trait MetadataExtractor: Send + Sync {
    /// `existing` is the merge view of stored fields; implementations
    /// should not spend effort on fields already meaningful there.
    async fn extract(
        &self,
        text: &str,
        existing: &MetadataMap,
        section_hints: &[String],
    ) -> Result<Map<String, Value>, ServiceError>;
}

#[async_trait]
pub trait Embedder: Send + Sync {
    /// `Ok(None)` when there is nothing to embed.
    async fn embed(&self, text: &str, max_chars: usize) -> Result<Option<Vec<f32>>, ServiceError>;
}

#[async_trait]
pub trait EpisodeWriter: Send + Sync {
    /// Returns whether the graph store accepted the episode.
    async fn write_episode(&self, episode: &Episode) -> Result<bool, ServiceError>;
}
