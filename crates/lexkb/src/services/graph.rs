//! Graph episodes: one summary record per knowledge-base entry, posted to
//! the graph service for topic and case linking.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use log::debug;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::EpisodeWriter;
use crate::citations::CitationLists;
use crate::error::ServiceError;
use crate::metadata::{is_meaningful, MetadataField, MetadataMap};
use crate::sanitize::{self, truncate_chars};

const SUMMARY_CHARS: usize = 500;
const MAX_CITATIONS: usize = 20;
const FALLBACK_DOCUMENT_TYPE: &str = "legal_article";

#[derive(Debug, Clone, PartialEq)]
pub struct Episode {
    pub entry_id: String,
    pub document_type: String,
    pub jurisdiction: String,
    pub summary: Option<String>,
    pub case_name: Option<String>,
    pub citations: Vec<String>,
    pub decision_date: Option<String>,
}

fn text_of(map: &MetadataMap, field: MetadataField) -> Option<String> {
    map.get(&field)
        .filter(|v| is_meaningful(v))
        .map(|v| match v {
            Value::String(s) => s.trim().to_string(),
            other => other.to_string(),
        })
}

impl Episode {
    /// Describes an entry from this run's extraction, falling back to
    /// what the entry already held.
    pub fn describe(
        entry_id: &str,
        extracted: &MetadataMap,
        existing: &MetadataMap,
        citations: &CitationLists,
    ) -> Self {
        let pick = |field| text_of(extracted, field).or_else(|| text_of(existing, field));
        Self {
            entry_id: entry_id.to_string(),
            document_type: pick(MetadataField::DocumentType)
                .unwrap_or_else(|| FALLBACK_DOCUMENT_TYPE.to_string()),
            jurisdiction: pick(MetadataField::Jurisdiction).unwrap_or_default(),
            summary: text_of(extracted, MetadataField::Summary),
            case_name: pick(MetadataField::CaseName),
            citations: citations.all().cloned().collect(),
            decision_date: pick(MetadataField::DecisionDate),
        }
    }

    pub fn name(&self) -> String {
        format!("legal_kb_entry_{}", self.entry_id)
    }

    pub fn body(&self) -> String {
        let mut parts = vec![format!(
            "Legal document entry_id={} document_type={} jurisdiction={}.",
            self.entry_id, self.document_type, self.jurisdiction
        )];
        if let Some(case_name) = &self.case_name {
            parts.push(format!("Case: {}.", case_name));
        }
        if let Some(summary) = &self.summary {
            parts.push(format!("Summary: {}", truncate_chars(summary, SUMMARY_CHARS)));
        }
        if !self.citations.is_empty() {
            let shown: Vec<&str> = self
                .citations
                .iter()
                .take(MAX_CITATIONS)
                .map(String::as_str)
                .collect();
            parts.push(format!("Citations: {}", shown.join(", ")));
        }
        parts.join(" ")
    }

    /// The decision date when it parses (full timestamp or `YYYY-MM-DD`),
    /// otherwise `now`.
    pub fn reference_time(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let Some(raw) = self.decision_date.as_deref() else {
            return now;
        };
        if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
            return dt.with_timezone(&Utc);
        }
        NaiveDate::parse_from_str(raw, "%Y-%m-%d")
            .ok()
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .map(|dt| dt.and_utc())
            .unwrap_or(now)
    }
}

#[derive(Debug, Serialize)]
struct AddEpisodeRequest<'a> {
    name: String,
    episode_body: String,
    source_description: &'a str,
    reference_time: String,
    group_id: &'a str,
}

#[derive(Debug, Deserialize)]
struct AddEpisodeResponse {
    success: bool,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    episode_uuid: Option<String>,
}

/// Posts episodes to the graph service's `POST /episodes`.
pub struct GraphitiEpisodeWriter {
    client: Client,
    service_url: String,
    group_id: String,
    source_description: String,
}

impl GraphitiEpisodeWriter {
    pub fn new(
        service_url: &str,
        group_id: &str,
        source_description: &str,
        timeout: Duration,
    ) -> Result<Self, ServiceError> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(timeout)
            .build()?;
        Ok(Self {
            client,
            service_url: service_url.trim_end_matches('/').to_string(),
            group_id: group_id.to_string(),
            source_description: source_description.to_string(),
        })
    }
}

#[async_trait]
impl EpisodeWriter for GraphitiEpisodeWriter {
    async fn write_episode(&self, episode: &Episode) -> Result<bool, ServiceError> {
        let request = AddEpisodeRequest {
            name: episode.name(),
            episode_body: episode.body(),
            source_description: &self.source_description,
            reference_time: episode.reference_time(Utc::now()).to_rfc3339(),
            group_id: &self.group_id,
        };

        let url = format!("{}/episodes", self.service_url);
        let response = self.client.post(&url).json(&request).send().await?;
        if !response.status().is_success() {
            return Err(ServiceError::from_response(response).await);
        }

        let body: AddEpisodeResponse = response.json().await?;
        debug!(
            "Episode {} via {}: success={} uuid={:?} {}",
            request.name,
            sanitize::redact_url(&url),
            body.success,
            body.episode_uuid,
            body.message.as_deref().unwrap_or("")
        );
        Ok(body.success)
    }
}
