//! Structural converters: a docling-serve client for binary formats and a
//! local converter for plain text and markdown uploads.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use log::debug;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};

use super::{ConvertedDocument, StructuralConverter};
use crate::error::ServiceError;
use crate::sanitize;

/// Most section headings handed to the extractor.
pub const MAX_SECTION_HINTS: usize = 30;

/// Client for a docling-serve instance.
pub struct DoclingServeConverter {
    client: Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct ConvertResponse {
    document: DoclingDocument,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    errors: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct DoclingDocument {
    #[serde(default)]
    md_content: Option<String>,
    #[serde(default)]
    text_content: Option<String>,
    #[serde(default)]
    json_content: Option<Value>,
}

impl DoclingServeConverter {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ServiceError> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(timeout)
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl StructuralConverter for DoclingServeConverter {
    async fn convert(&self, path: &Path) -> Result<ConvertedDocument, ServiceError> {
        let bytes = tokio::fs::read(path).await.map_err(|e| ServiceError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("document.pdf")
            .to_string();
        let mime = mime_guess::from_path(path).first_or_octet_stream();

        let part = Part::bytes(bytes)
            .file_name(file_name)
            .mime_str(mime.essence_str())?;
        let form = Form::new()
            .part("files", part)
            .text("to_formats", "md")
            .text("to_formats", "json");

        let url = format!("{}/v1alpha/convert/file", self.base_url);
        debug!(
            "Converting {} via {}",
            sanitize::redact_path(path),
            sanitize::redact_url(&url)
        );

        let response = self.client.post(&url).multipart(form).send().await?;
        if !response.status().is_success() {
            return Err(ServiceError::from_response(response).await);
        }

        let body: ConvertResponse = response.json().await?;
        if let Some(status) = body.status.as_deref() {
            if status != "success" && status != "partial_success" {
                return Err(ServiceError::InvalidResponse(format!(
                    "conversion status '{}' ({} errors)",
                    status,
                    body.errors.len()
                )));
            }
        }

        let markdown = body
            .document
            .md_content
            .or(body.document.text_content)
            .ok_or_else(|| ServiceError::InvalidResponse("no markdown in response".into()))?;

        Ok(ConvertedDocument {
            markdown,
            structured: body.document.json_content.unwrap_or_else(|| json!({})),
        })
    }
}

/// Converts `.txt` and `.md` uploads without a remote service.
#[derive(Debug, Default, Clone, Copy)]
pub struct PlainTextConverter;

impl PlainTextConverter {
    pub fn supports(path: &Path) -> bool {
        matches!(
            path.extension()
                .and_then(|e| e.to_str())
                .map(|e| e.to_ascii_lowercase())
                .as_deref(),
            Some("txt" | "md" | "markdown")
        )
    }
}

#[async_trait]
impl StructuralConverter for PlainTextConverter {
    async fn convert(&self, path: &Path) -> Result<ConvertedDocument, ServiceError> {
        if !Self::supports(path) {
            return Err(ServiceError::UnsupportedFormat(sanitize::redact_path(path)));
        }
        let bytes = tokio::fs::read(path).await.map_err(|e| ServiceError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        let markdown = String::from_utf8_lossy(&bytes).into_owned();

        let items: Vec<Value> = markdown_headings(&markdown)
            .into_iter()
            .map(|(level, title)| json!({"title": title, "level": level}))
            .collect();

        Ok(ConvertedDocument {
            structured: json!({"source": "plain_text", "items": items}),
            markdown,
        })
    }
}

/// Routes text formats to the local converter and everything else to the
/// remote one, when configured.
pub struct ConverterChain {
    plain: PlainTextConverter,
    remote: Option<Arc<dyn StructuralConverter>>,
}

impl ConverterChain {
    pub fn new(remote: Option<Arc<dyn StructuralConverter>>) -> Self {
        Self {
            plain: PlainTextConverter,
            remote,
        }
    }
}

#[async_trait]
impl StructuralConverter for ConverterChain {
    async fn convert(&self, path: &Path) -> Result<ConvertedDocument, ServiceError> {
        if PlainTextConverter::supports(path) {
            return self.plain.convert(path).await;
        }
        match &self.remote {
            Some(remote) => remote.convert(path).await,
            None => Err(ServiceError::UnsupportedFormat(format!(
                "{} (no remote converter configured)",
                sanitize::redact_path(path)
            ))),
        }
    }
}

/// ATX headings outside fenced code blocks, as `(level, title)`.
pub(crate) fn markdown_headings(markdown: &str) -> Vec<(usize, String)> {
    let mut in_fence = false;
    let mut headings = Vec::new();
    for line in markdown.lines() {
        let trimmed = line.trim_start();
        if trimmed.starts_with("```") || trimmed.starts_with("~~~") {
            in_fence = !in_fence;
            continue;
        }
        if in_fence {
            continue;
        }
        if let Some(heading) = parse_atx_heading(trimmed) {
            headings.push(heading);
        }
    }
    headings
}

pub(crate) fn parse_atx_heading(line: &str) -> Option<(usize, String)> {
    let level = line.chars().take_while(|c| *c == '#').count();
    if level == 0 || level > 6 {
        return None;
    }
    let rest = &line[level..];
    if !rest.is_empty() && !rest.starts_with(' ') && !rest.starts_with('\t') {
        return None;
    }
    let title = rest.trim().trim_end_matches('#').trim();
    if title.is_empty() {
        return None;
    }
    Some((level, title.to_string()))
}

/// Heading strings pulled from a structured document, at most
/// [`MAX_SECTION_HINTS`].
///
/// Reads `export_format.items` or `items` entries (`title` or `heading`),
/// falling back to docling `texts` labelled `title` or `section_header`.
pub fn section_hints(structured: &Value) -> Vec<String> {
    let items = structured
        .pointer("/export_format/items")
        .and_then(Value::as_array)
        .or_else(|| structured.get("items").and_then(Value::as_array));

    match items {
        Some(items) => items
            .iter()
            .take(MAX_SECTION_HINTS)
            .filter_map(|item| {
                item.get("title")
                    .or_else(|| item.get("heading"))
                    .and_then(Value::as_str)
            })
            .filter(|s| !s.trim().is_empty())
            .map(|s| s.trim().to_string())
            .collect(),
        None => structured
            .get("texts")
            .and_then(Value::as_array)
            .map(|texts| {
                texts
                    .iter()
                    .filter(|t| {
                        matches!(
                            t.get("label").and_then(Value::as_str),
                            Some("title" | "section_header")
                        )
                    })
                    .filter_map(|t| t.get("text").and_then(Value::as_str))
                    .filter(|s| !s.trim().is_empty())
                    .take(MAX_SECTION_HINTS)
                    .map(|s| s.trim().to_string())
                    .collect()
            })
            .unwrap_or_default(),
    }
}
