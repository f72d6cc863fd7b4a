//! OpenAI-compatible clients for metadata extraction and embeddings.

use std::borrow::Cow;
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, warn};
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::{json, Map, Value};

use super::{Embedder, MetadataExtractor};
use crate::error::ServiceError;
use crate::metadata::{fields_to_extract, sanitize_extracted, MetadataMap};
use crate::sanitize::truncate_chars;

pub const DEFAULT_API_BASE: &str = "https://api.openai.com/v1";

const TRUNCATION_MARKER: &str = "\n\n[... truncated for context ...]";

fn http_client(timeout: Duration) -> Result<Client, ServiceError> {
    Ok(Client::builder()
        .connect_timeout(Duration::from_secs(10))
        .timeout(timeout)
        .build()?)
}

// ── Extraction ──────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Legal metadata extraction through the chat completions endpoint.
///
/// One `extract` call is one request; the pipeline owns the attempt budget.
pub struct OpenAiExtractor {
    client: Client,
    api_base: String,
    api_key: SecretString,
    model: String,
    max_markdown_chars: usize,
}

impl OpenAiExtractor {
    pub fn new(
        api_base: &str,
        api_key: SecretString,
        model: &str,
        max_markdown_chars: usize,
        timeout: Duration,
    ) -> Result<Self, ServiceError> {
        Ok(Self {
            client: http_client(timeout)?,
            api_base: api_base.trim_end_matches('/').to_string(),
            api_key,
            model: model.to_string(),
            max_markdown_chars,
        })
    }
}

#[async_trait]
impl MetadataExtractor for OpenAiExtractor {
    async fn extract(
        &self,
        text: &str,
        existing: &MetadataMap,
        section_hints: &[String],
    ) -> Result<Map<String, Value>, ServiceError> {
        let prompt = build_prompt(text, existing, section_hints, self.max_markdown_chars);
        let body = json!({
            "model": self.model,
            "temperature": 0,
            "messages": [{"role": "user", "content": prompt}],
        });

        let response = self
            .client
            .post(format!("{}/chat/completions", self.api_base))
            .bearer_auth(self.api_key.expose_secret())
            .json(&body)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(ServiceError::from_response(response).await);
        }

        let chat: ChatResponse = response.json().await?;
        let content = chat
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default();

        let parsed: Value = serde_json::from_str(strip_code_fence(&content)).map_err(|e| {
            ServiceError::InvalidResponse(format!("extraction output is not JSON: {}", e))
        })?;
        let Value::Object(raw) = parsed else {
            return Err(ServiceError::InvalidResponse(
                "extraction output is not a JSON object".to_string(),
            ));
        };

        let extracted: Map<String, Value> = sanitize_extracted(&raw)
            .into_iter()
            .map(|(field, value)| (field.as_str().to_string(), value))
            .collect();
        debug!("Extracted {} metadata fields", extracted.len());
        Ok(extracted)
    }
}

fn truncate_markdown(markdown: &str, max_chars: usize) -> Cow<'_, str> {
    let head = truncate_chars(markdown, max_chars);
    if head.len() == markdown.len() {
        Cow::Borrowed(markdown)
    } else {
        Cow::Owned(format!("{}{}", head, TRUNCATION_MARKER))
    }
}

/// Builds the extraction prompt, listing only fields worth asking for.
pub(crate) fn build_prompt(
    markdown: &str,
    existing: &MetadataMap,
    section_hints: &[String],
    max_markdown_chars: usize,
) -> String {
    let fields = fields_to_extract(existing)
        .into_iter()
        .map(|f| format!("- {}: {}", f.as_str(), f.description()))
        .collect::<Vec<_>>()
        .join("\n");

    let hint = if section_hints.is_empty() {
        String::new()
    } else {
        format!(
            "Document section headings (from structure): {}\n\n",
            section_hints.join(", ")
        )
    };

    format!(
        "Extract legal metadata from the following document text. Return valid JSON only.\n\n\
         {hint}Document text:\n---\n{text}\n---\n\n\
         Fields to extract:\n{fields}\n\n\
         Rules:\n\
         - Infer document_type and jurisdiction from content.\n\
         - Dates use YYYY-MM-DD.\n\
         - Use null for missing fields and [] for missing lists.\n\
         - Return only a single JSON object, no markdown fences.",
        text = truncate_markdown(markdown, max_markdown_chars),
    )
}

/// Removes a surrounding ```` ``` ```` / ```` ```json ```` fence, if any.
pub(crate) fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.trim_end()
        .strip_suffix("```")
        .unwrap_or(rest)
        .trim()
}

// ── Embeddings ──────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

pub struct OpenAiEmbedder {
    client: Client,
    api_base: String,
    api_key: SecretString,
    model: String,
    dimensions: usize,
}

impl OpenAiEmbedder {
    pub fn new(
        api_base: &str,
        api_key: SecretString,
        model: &str,
        dimensions: usize,
        timeout: Duration,
    ) -> Result<Self, ServiceError> {
        Ok(Self {
            client: http_client(timeout)?,
            api_base: api_base.trim_end_matches('/').to_string(),
            api_key,
            model: model.to_string(),
            dimensions,
        })
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    async fn embed(&self, text: &str, max_chars: usize) -> Result<Option<Vec<f32>>, ServiceError> {
        let input = truncate_chars(text, max_chars).trim();
        if input.is_empty() {
            return Ok(None);
        }

        let response = self
            .client
            .post(format!("{}/embeddings", self.api_base))
            .bearer_auth(self.api_key.expose_secret())
            .json(&json!({
                "model": self.model,
                "input": input,
                "dimensions": self.dimensions,
            }))
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(ServiceError::from_response(response).await);
        }

        let body: EmbeddingResponse = response.json().await?;
        let vector = body
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or_else(|| ServiceError::InvalidResponse("empty embedding data".to_string()))?;

        if vector.len() != self.dimensions {
            warn!(
                "Embedding dimension {} != configured {}",
                vector.len(),
                self.dimensions
            );
        }
        Ok(Some(vector))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::MetadataField;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn key() -> SecretString {
        SecretString::from("sk-test".to_string())
    }

    fn chat_response(content: &str) -> Value {
        json!({
            "id": "chatcmpl-1",
            "object": "chat.completion",
            "choices": [{
                "index": 0,
                "message": {"role": "assistant", "content": content},
                "finish_reason": "stop"
            }]
        })
    }

    fn extractor(server: &MockServer) -> OpenAiExtractor {
        OpenAiExtractor::new(&server.uri(), key(), "gpt-4o-mini", 120_000, Duration::from_secs(5))
            .unwrap()
    }

    #[test]
    fn test_strip_code_fence() {
        assert_eq!(strip_code_fence("```json\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_code_fence("```\n{}\n```  "), "{}");
        assert_eq!(strip_code_fence("  {\"a\":1} "), "{\"a\":1}");
    }

    #[test]
    fn test_truncate_markdown() {
        assert_eq!(truncate_markdown("short", 10), "short");
        let long = truncate_markdown("abcdefghij", 4);
        assert!(long.starts_with("abcd\n\n[... truncated"));
    }

    #[test]
    fn test_prompt_skips_meaningful_fields() {
        let mut existing = MetadataMap::new();
        existing.insert(MetadataField::Title, json!("Mwangi v Republic"));
        existing.insert(MetadataField::Summary, json!("Old summary"));
        existing.insert(MetadataField::CourtName, json!(""));

        let prompt = build_prompt("# Body", &existing, &["Facts".to_string()], 1000);
        assert!(!prompt.contains("- title:"));
        assert!(prompt.contains("- summary:"));
        assert!(prompt.contains("- court_name:"));
        assert!(prompt.contains("Document section headings (from structure): Facts"));
        assert!(prompt.contains("# Body"));
    }

    #[tokio::test]
    async fn test_extract_parses_fenced_json() {
        let server = MockServer::start().await;
        let content = "```json\n{\"title\": \"Doe v. Roe\", \"summary\": \"\", \
                       \"keywords\": [\"tort\"], \"confidence\": 0.9}\n```";
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(body_partial_json(json!({"model": "gpt-4o-mini", "temperature": 0})))
            .respond_with(ResponseTemplate::new(200).set_body_json(chat_response(content)))
            .expect(1)
            .mount(&server)
            .await;

        let out = extractor(&server)
            .extract("# Doe v. Roe", &MetadataMap::new(), &[])
            .await
            .unwrap();
        assert_eq!(out.get("title"), Some(&json!("Doe v. Roe")));
        assert_eq!(out.get("keywords"), Some(&json!(["tort"])));
        assert!(!out.contains_key("summary"));
        assert!(!out.contains_key("confidence"));
    }

    #[tokio::test]
    async fn test_extract_rejects_non_json() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(chat_response("I cannot help with that")),
            )
            .mount(&server)
            .await;

        let err = extractor(&server)
            .extract("text", &MetadataMap::new(), &[])
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::InvalidResponse(_)));
    }

    #[tokio::test]
    async fn test_extract_api_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(429).set_body_json(json!({
                "error": {"message": "Rate limit reached", "type": "requests"}
            })))
            .mount(&server)
            .await;

        let err = extractor(&server)
            .extract("text", &MetadataMap::new(), &[])
            .await
            .unwrap_err();
        match err {
            ServiceError::Api { status, message } => {
                assert_eq!(status, 429);
                assert!(message.contains("Rate limit"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_embed_returns_vector() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/embeddings"))
            .and(body_partial_json(json!({
                "model": "text-embedding-3-small",
                "input": "abcd",
                "dimensions": 3
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "object": "list",
                "data": [{"object": "embedding", "index": 0, "embedding": [0.1, 0.2, 0.3]}],
                "model": "text-embedding-3-small"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let embedder = OpenAiEmbedder::new(
            &server.uri(),
            key(),
            "text-embedding-3-small",
            3,
            Duration::from_secs(5),
        )
        .unwrap();
        let vector = embedder.embed("abcdefgh", 4).await.unwrap().unwrap();
        assert_eq!(vector.len(), embedder.dimensions());
        assert!((vector[1] - 0.2).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_embed_blank_input_skips_request() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .expect(0)
            .mount(&server)
            .await;

        let embedder = OpenAiEmbedder::new(
            &server.uri(),
            key(),
            "text-embedding-3-small",
            1536,
            Duration::from_secs(5),
        )
        .unwrap();
        assert!(embedder.embed("   \n", 8000).await.unwrap().is_none());
    }
}
