//! Knowledge-base entry model: processing status values, column names and
//! the field-update builder written by the state machine and the pipeline.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::metadata::{MetadataField, MetadataMap};

/// Table holding knowledge-base entries.
pub const ENTRY_TABLE: &str = "legal_knowledge_base";

/// Columns written by the pipeline or by callers. `id` and `created_at`
/// are immutable and not listed.
pub const ENTRY_COLUMNS: &[&str] = &[
    "organization_id",
    "title",
    "document_type",
    "jurisdiction",
    "case_name",
    "case_citation",
    "court_name",
    "decision_date",
    "statute_name",
    "statute_number",
    "enactment_date",
    "effective_date",
    "practice_areas",
    "keywords",
    "key_points",
    "legal_principles",
    "summary",
    "docling_markdown",
    "docling_json",
    "pageindex_tree",
    "pageindex_metadata",
    "full_text",
    "cited_cases",
    "cited_statutes",
    "ai_embedding",
    "processing_status",
    "processing_pipeline",
    "ai_processed",
    "is_active",
    "updated_at",
];

/// Columns persisted as JSON text.
pub const JSON_COLUMNS: &[&str] = &[
    "practice_areas",
    "keywords",
    "key_points",
    "legal_principles",
    "docling_json",
    "pageindex_tree",
    "pageindex_metadata",
    "cited_cases",
    "cited_statutes",
    "ai_embedding",
];

/// Columns persisted as integer booleans.
pub const BOOL_COLUMNS: &[&str] = &["ai_processed", "is_active"];

/// All stored fields of one entry, keyed by column name.
pub type EntryFields = Map<String, Value>;

/// `processing_status` values of an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingStatus {
    Pending,
    Processing,
    DoclingComplete,
    Completed,
    Failed,
}

impl ProcessingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessingStatus::Pending => "pending",
            ProcessingStatus::Processing => "processing",
            ProcessingStatus::DoclingComplete => "docling_complete",
            ProcessingStatus::Completed => "completed",
            ProcessingStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(ProcessingStatus::Pending),
            "processing" => Some(ProcessingStatus::Processing),
            "docling_complete" => Some(ProcessingStatus::DoclingComplete),
            "completed" => Some(ProcessingStatus::Completed),
            "failed" => Some(ProcessingStatus::Failed),
            _ => None,
        }
    }
}

impl fmt::Display for ProcessingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A set of column writes for one entry.
///
/// Keys are ordered so the generated SQL is stable.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EntryUpdate {
    fields: BTreeMap<String, Value>,
}

impl EntryUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, column: &str, value: impl Into<Value>) -> Self {
        self.fields.insert(column.to_string(), value.into());
        self
    }

    pub fn insert(&mut self, column: &str, value: impl Into<Value>) {
        self.fields.insert(column.to_string(), value.into());
    }

    pub fn status(self, status: ProcessingStatus) -> Self {
        self.set("processing_status", status.as_str())
    }

    pub fn touched_at(self, at: DateTime<Utc>) -> Self {
        self.set("updated_at", format_timestamp(at))
    }

    /// Adds the merge-engine decisions.
    pub fn with_metadata(mut self, updates: &MetadataMap) -> Self {
        for (field, value) in updates {
            self.fields.insert(field.as_str().to_string(), value.clone());
        }
        self
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.fields.get(column)
    }

    pub fn metadata(&self, field: MetadataField) -> Option<&Value> {
        self.fields.get(field.as_str())
    }

    pub fn contains(&self, column: &str) -> bool {
        self.fields.contains_key(column)
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.fields.iter()
    }
}

/// Timestamps are stored as RFC 3339 UTC with microseconds, which sorts
/// lexicographically in creation order.
pub fn format_timestamp(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(chrono::SecondsFormat::Micros, true)
}

pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
}
