use chrono::{DateTime, Utc};
use serde_json::{json, Value};

use crate::citations::CitationLists;
use crate::entry::{format_timestamp, EntryUpdate, ProcessingStatus};
use crate::metadata::MetadataMap;
use crate::sanitize::truncate_chars;

use super::tree::TreeSummary;

/// Everything one successful run produced for an entry.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineResult {
    pub markdown: String,
    pub structured: Value,
    pub tree: Value,
    pub tree_summary: TreeSummary,
    pub citations: CitationLists,
    pub embedding: Option<Vec<f32>>,
    pub episode_recorded: bool,
    /// Merge-engine decisions for metadata fields.
    pub metadata_updates: MetadataMap,
}

impl PipelineResult {
    /// The final entry write: pipeline-derived columns are always set,
    /// metadata columns only where the merge engine decided to write.
    pub fn entry_update(
        &self,
        pipeline_name: &str,
        full_text_max_chars: usize,
        now: DateTime<Utc>,
    ) -> EntryUpdate {
        let list_or_null = |items: &[String]| {
            if items.is_empty() {
                Value::Null
            } else {
                json!(items)
            }
        };

        let mut update = EntryUpdate::new()
            .with_metadata(&self.metadata_updates)
            .set("pageindex_tree", self.tree.clone())
            .set(
                "pageindex_metadata",
                self.tree_summary.to_metadata(&format_timestamp(now)),
            )
            .status(ProcessingStatus::Completed)
            .set("processing_pipeline", pipeline_name)
            .set("ai_processed", true)
            .set(
                "full_text",
                truncate_chars(&self.markdown, full_text_max_chars),
            )
            .set("cited_cases", list_or_null(&self.citations.cases))
            .set("cited_statutes", list_or_null(&self.citations.statutes))
            .touched_at(now);

        if let Some(embedding) = &self.embedding {
            update.insert("ai_embedding", json!(embedding));
        }
        update
    }
}
