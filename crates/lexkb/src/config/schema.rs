use serde::{Deserialize, Serialize};

use crate::secrets::SecretSource;
use crate::services::openai::DEFAULT_API_BASE;

/// Worker configuration. Every section has defaults, so `{}` is a valid
/// config file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkerConfig {
    /// SQLite file holding jobs and entries. Defaults to
    /// `~/.lexkb/data/lexkb.db`.
    #[serde(default)]
    pub database_path: Option<String>,
    #[serde(default = "default_pipeline_name")]
    pub pipeline_name: String,
    #[serde(default = "default_bucket")]
    pub default_bucket: String,
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_full_text_max_chars")]
    pub full_text_max_chars: usize,
    #[serde(default)]
    pub blob_store: BlobStoreConfig,
    #[serde(default)]
    pub converter: ConverterConfig,
    #[serde(default)]
    pub tree: TreeConfig,
    #[serde(default)]
    pub extraction: ExtractionConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub graph: GraphConfig,
    #[serde(default = "default_openai_key")]
    pub openai_api_key: SecretSource,
    /// Default log level (`debug`, `info`, `warn`, `error`). `RUST_LOG` and
    /// `-v` take precedence.
    #[serde(default)]
    pub log_level: Option<String>,
}

fn default_pipeline_name() -> String {
    "docling_pageindex".to_string()
}

fn default_bucket() -> String {
    "legal-kb".to_string()
}

fn default_poll_interval() -> u64 {
    60
}

fn default_full_text_max_chars() -> usize {
    50_000
}

fn default_openai_key() -> SecretSource {
    SecretSource::from_env_var("OPENAI_API_KEY")
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            database_path: None,
            pipeline_name: default_pipeline_name(),
            default_bucket: default_bucket(),
            poll_interval_secs: default_poll_interval(),
            full_text_max_chars: default_full_text_max_chars(),
            blob_store: BlobStoreConfig::default(),
            converter: ConverterConfig::default(),
            tree: TreeConfig::default(),
            extraction: ExtractionConfig::default(),
            embedding: EmbeddingConfig::default(),
            graph: GraphConfig::default(),
            openai_api_key: default_openai_key(),
            log_level: None,
        }
    }
}

/// Where uploaded documents are read from.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BlobStoreConfig {
    /// Objects live at `<root>/<bucket>/<path>`.
    Filesystem { root: String },
    /// Supabase-storage compatible HTTP endpoint.
    Http {
        base_url: String,
        #[serde(default)]
        api_key: SecretSource,
        #[serde(default = "default_blob_timeout")]
        timeout_secs: u64,
    },
}

pub(crate) fn default_blob_timeout() -> u64 {
    120
}

impl Default for BlobStoreConfig {
    fn default() -> Self {
        BlobStoreConfig::Filesystem {
            root: "./storage".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConverterConfig {
    /// Base URL of a docling-serve instance. Without it only plain text and
    /// markdown uploads can be converted.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_converter_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_converter_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_delay")]
    pub retry_delay_secs: u64,
}

fn default_converter_timeout() -> u64 {
    300
}

fn default_converter_retries() -> u32 {
    2
}

fn default_retry_delay() -> u64 {
    2
}

impl Default for ConverterConfig {
    fn default() -> Self {
        Self {
            url: None,
            timeout_secs: default_converter_timeout(),
            max_retries: default_converter_retries(),
            retry_delay_secs: default_retry_delay(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TreeConfig {
    /// Attach section summaries to outline nodes.
    #[serde(default)]
    pub add_node_summary: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExtractionConfig {
    #[serde(default = "default_llm_model")]
    pub model: String,
    /// Total extraction attempts per job.
    #[serde(default = "default_extraction_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_max_markdown_chars")]
    pub max_markdown_chars: usize,
    #[serde(default = "default_api_base")]
    pub api_base: String,
    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,
}

fn default_llm_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_extraction_attempts() -> u32 {
    3
}

fn default_max_markdown_chars() -> usize {
    120_000
}

fn default_api_base() -> String {
    DEFAULT_API_BASE.to_string()
}

fn default_llm_timeout() -> u64 {
    120
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            model: default_llm_model(),
            max_attempts: default_extraction_attempts(),
            max_markdown_chars: default_max_markdown_chars(),
            api_base: default_api_base(),
            timeout_secs: default_llm_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EmbeddingConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_embedding_model")]
    pub model: String,
    #[serde(default = "default_dimensions")]
    pub dimensions: usize,
    #[serde(default = "default_max_text_chars")]
    pub max_text_chars: usize,
}

fn default_embedding_model() -> String {
    "text-embedding-3-small".to_string()
}

fn default_dimensions() -> usize {
    1536
}

fn default_max_text_chars() -> usize {
    8000
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            model: default_embedding_model(),
            dimensions: default_dimensions(),
            max_text_chars: default_max_text_chars(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GraphConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub service_url: Option<String>,
    #[serde(default = "default_group_id")]
    pub group_id: String,
    #[serde(default = "default_source_description")]
    pub source_description: String,
    #[serde(default = "default_graph_timeout")]
    pub timeout_secs: u64,
}

fn default_group_id() -> String {
    "lex_nexus_graph".to_string()
}

fn default_source_description() -> String {
    "Legal KB".to_string()
}

fn default_graph_timeout() -> u64 {
    60
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            service_url: None,
            group_id: default_group_id(),
            source_description: default_source_description(),
            timeout_secs: default_graph_timeout(),
        }
    }
}
