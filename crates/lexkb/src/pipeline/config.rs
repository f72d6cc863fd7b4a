use std::time::Duration;

use crate::config::WorkerConfig;
use crate::services::TreeOptions;

use super::retry::RetryPolicy;

/// The slice of worker configuration the pipeline reads per job.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    pub pipeline_name: String,
    pub default_bucket: String,
    pub conversion_retry: RetryPolicy,
    pub extraction_retry: RetryPolicy,
    pub tree_options: TreeOptions,
    pub full_text_max_chars: usize,
    pub embedding_max_chars: usize,
}

impl PipelineConfig {
    pub fn from_config(config: &WorkerConfig) -> Self {
        Self {
            pipeline_name: config.pipeline_name.clone(),
            default_bucket: config.default_bucket.clone(),
            conversion_retry: RetryPolicy::with_retries(
                config.converter.max_retries,
                Duration::from_secs(config.converter.retry_delay_secs),
            ),
            extraction_retry: RetryPolicy::attempts(config.extraction.max_attempts, Duration::ZERO),
            tree_options: TreeOptions {
                add_summary: config.tree.add_node_summary,
            },
            full_text_max_chars: config.full_text_max_chars,
            embedding_max_chars: config.embedding.max_text_chars,
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self::from_config(&WorkerConfig::default())
    }
}
