//! Legal metadata fields shared by the extractor, the merge engine and the
//! knowledge-base entry.

pub mod merge;

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde_json::{Map, Value};

pub use merge::{fields_to_extract, merge};

/// A metadata column of `legal_knowledge_base` that extraction may fill.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum MetadataField {
    Title,
    Summary,
    DocumentType,
    Jurisdiction,
    CaseName,
    CaseCitation,
    CourtName,
    DecisionDate,
    StatuteName,
    StatuteNumber,
    EnactmentDate,
    EffectiveDate,
    KeyPoints,
    LegalPrinciples,
    PracticeAreas,
    Keywords,
}

impl MetadataField {
    pub const ALL: [MetadataField; 16] = [
        MetadataField::Title,
        MetadataField::Summary,
        MetadataField::DocumentType,
        MetadataField::Jurisdiction,
        MetadataField::CaseName,
        MetadataField::CaseCitation,
        MetadataField::CourtName,
        MetadataField::DecisionDate,
        MetadataField::StatuteName,
        MetadataField::StatuteNumber,
        MetadataField::EnactmentDate,
        MetadataField::EffectiveDate,
        MetadataField::KeyPoints,
        MetadataField::LegalPrinciples,
        MetadataField::PracticeAreas,
        MetadataField::Keywords,
    ];

    /// Column name, identical to the persisted field name.
    pub fn as_str(&self) -> &'static str {
        match self {
            MetadataField::Title => "title",
            MetadataField::Summary => "summary",
            MetadataField::DocumentType => "document_type",
            MetadataField::Jurisdiction => "jurisdiction",
            MetadataField::CaseName => "case_name",
            MetadataField::CaseCitation => "case_citation",
            MetadataField::CourtName => "court_name",
            MetadataField::DecisionDate => "decision_date",
            MetadataField::StatuteName => "statute_name",
            MetadataField::StatuteNumber => "statute_number",
            MetadataField::EnactmentDate => "enactment_date",
            MetadataField::EffectiveDate => "effective_date",
            MetadataField::KeyPoints => "key_points",
            MetadataField::LegalPrinciples => "legal_principles",
            MetadataField::PracticeAreas => "practice_areas",
            MetadataField::Keywords => "keywords",
        }
    }

    /// Fields owned by the pipeline: the latest extraction replaces them
    /// even when a value is already stored.
    pub fn is_always_refreshed(&self) -> bool {
        matches!(
            self,
            MetadataField::Summary
                | MetadataField::KeyPoints
                | MetadataField::LegalPrinciples
                | MetadataField::PracticeAreas
                | MetadataField::Keywords
        )
    }

    pub fn is_list(&self) -> bool {
        matches!(
            self,
            MetadataField::KeyPoints
                | MetadataField::LegalPrinciples
                | MetadataField::PracticeAreas
                | MetadataField::Keywords
        )
    }

    /// Hint used in the extraction prompt.
    pub fn description(&self) -> &'static str {
        match self {
            MetadataField::Title => "short document title",
            MetadataField::Summary => "concise summary (2-4 sentences)",
            MetadataField::DocumentType => {
                "one of case_law, statute, regulation, legal_article, template"
            }
            MetadataField::Jurisdiction => "country or region, e.g. Kenya, U.S., UK",
            MetadataField::CaseName => "case name",
            MetadataField::CaseCitation => "case citation",
            MetadataField::CourtName => "court name",
            MetadataField::DecisionDate => "decision date, YYYY-MM-DD",
            MetadataField::StatuteName => "statute name",
            MetadataField::StatuteNumber => "statute number",
            MetadataField::EnactmentDate => "enactment date, YYYY-MM-DD",
            MetadataField::EffectiveDate => "effective date, YYYY-MM-DD",
            MetadataField::KeyPoints => "array of 3-7 key points",
            MetadataField::LegalPrinciples => "array of 1-5 principles or holdings",
            MetadataField::PracticeAreas => "array of relevant legal practice areas",
            MetadataField::Keywords => "array of search keywords",
        }
    }
}

impl fmt::Display for MetadataField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MetadataField {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MetadataField::ALL
            .iter()
            .copied()
            .find(|field| field.as_str() == s)
            .ok_or_else(|| format!("unknown metadata field '{}'", s))
    }
}

/// Metadata values keyed by field, in a stable order.
pub type MetadataMap = BTreeMap<MetadataField, Value>;

/// Whether a stored or extracted value carries information.
///
/// Null, blank (whitespace-only) strings and empty lists are not meaningful.
pub fn is_meaningful(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::String(s) => !s.trim().is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
        Value::Bool(_) | Value::Number(_) => true,
    }
}

/// Picks the recognized metadata fields out of a row or payload mapping.
pub fn metadata_view(fields: &Map<String, Value>) -> MetadataMap {
    MetadataField::ALL
        .iter()
        .filter_map(|field| {
            fields
                .get(field.as_str())
                .map(|value| (*field, value.clone()))
        })
        .collect()
}

/// Normalizes raw extractor output: unknown keys are dropped, list fields
/// keep only non-blank strings, scalar numbers become strings, and anything
/// left without meaning is omitted.
pub fn sanitize_extracted(raw: &Map<String, Value>) -> MetadataMap {
    let mut out = MetadataMap::new();
    for field in MetadataField::ALL {
        let Some(value) = raw.get(field.as_str()) else {
            continue;
        };
        let normalized = if field.is_list() {
            match value {
                Value::Array(items) => Value::Array(
                    items
                        .iter()
                        .filter_map(|item| match item {
                            Value::String(s) if !s.trim().is_empty() => {
                                Some(Value::String(s.trim().to_string()))
                            }
                            _ => None,
                        })
                        .collect(),
                ),
                Value::String(s) if !s.trim().is_empty() => {
                    Value::Array(vec![Value::String(s.trim().to_string())])
                }
                _ => Value::Null,
            }
        } else {
            match value {
                Value::String(s) => Value::String(s.trim().to_string()),
                Value::Number(n) => Value::String(n.to_string()),
                _ => Value::Null,
            }
        };
        if is_meaningful(&normalized) {
            out.insert(field, normalized);
        }
    }
    out
}
