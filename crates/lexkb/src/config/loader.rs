use std::path::Path;
use std::str::FromStr;

use crate::config::schema::{default_blob_timeout, BlobStoreConfig, WorkerConfig};
use crate::error::ConfigError;
use crate::secrets::SecretSource;

/// Reads, parses and validates a config file. Environment overrides are
/// not applied; see [`load_worker_config`].
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<WorkerConfig, ConfigError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;

    load_config_from_str(&content)
}

pub fn load_config_from_str(content: &str) -> Result<WorkerConfig, ConfigError> {
    let config: WorkerConfig = serde_json::from_str(content)?;

    validate_config(&config)?;

    Ok(config)
}

/// Startup path of the worker: optional file (defaults otherwise), then
/// process environment, then validation.
pub fn load_worker_config(path: Option<&Path>) -> Result<WorkerConfig, ConfigError> {
    let mut config = match path {
        Some(path) => {
            let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
                path: path.to_path_buf(),
                source: e,
            })?;
            serde_json::from_str(&content)?
        }
        None => WorkerConfig::default(),
    };

    apply_env_overrides(&mut config, |name| std::env::var(name).ok())?;
    validate_config(&config)?;

    Ok(config)
}

/// Overlays `LEGAL_KB_*` and `SUPABASE_*` variables on `config`. `lookup`
/// returns a variable's value; blank values are ignored.
///
/// `SUPABASE_URL` switches uploads to the HTTP store, authenticated with
/// `SUPABASE_SERVICE_ROLE_KEY` when the secret is resolved.
/// `LEGAL_KB_BLOB_ROOT` wins over it.
pub fn apply_env_overrides<F>(config: &mut WorkerConfig, lookup: F) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let get = |name: &str| {
        lookup(name)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    };

    if let Some(v) = get("LEGAL_KB_DATABASE_PATH") {
        config.database_path = Some(v);
    }
    if let Some(v) = get("LEGAL_KB_PIPELINE") {
        config.pipeline_name = v;
    }
    if let Some(v) = get("LEGAL_KB_BUCKET") {
        config.default_bucket = v;
    }
    if let Some(base_url) = get("SUPABASE_URL") {
        config.blob_store = BlobStoreConfig::Http {
            base_url,
            api_key: SecretSource::from_env_var("SUPABASE_SERVICE_ROLE_KEY"),
            timeout_secs: default_blob_timeout(),
        };
    }
    if let Some(root) = get("LEGAL_KB_BLOB_ROOT") {
        config.blob_store = BlobStoreConfig::Filesystem { root };
    }
    if let Some(v) = get("LEGAL_KB_DOCLING_URL") {
        config.converter.url = Some(v);
    }
    if let Some(v) = get("LEGAL_KB_DOCLING_MAX_RETRIES") {
        config.converter.max_retries = parse_env("LEGAL_KB_DOCLING_MAX_RETRIES", &v)?;
    }
    if let Some(v) = get("LEGAL_KB_LLM_MODEL") {
        config.extraction.model = v;
    }
    if let Some(v) = get("LEGAL_KB_LLM_MAX_RETRIES") {
        config.extraction.max_attempts = parse_env("LEGAL_KB_LLM_MAX_RETRIES", &v)?;
    }
    if let Some(v) = get("LEGAL_KB_MAX_MARKDOWN_EXTRACTION") {
        config.extraction.max_markdown_chars =
            parse_env("LEGAL_KB_MAX_MARKDOWN_EXTRACTION", &v)?;
    }
    if let Some(v) = get("LEGAL_KB_ENABLE_VECTOR_FALLBACK") {
        config.embedding.enabled = is_yes(&v);
    }
    if let Some(v) = get("LEGAL_KB_EMBEDDING_MODEL") {
        config.embedding.model = v;
    }
    if let Some(v) = get("LEGAL_KB_MAX_EMBEDDING_TEXT") {
        config.embedding.max_text_chars = parse_env("LEGAL_KB_MAX_EMBEDDING_TEXT", &v)?;
    }
    if let Some(v) = get("LEGAL_KB_ENABLE_GRAPHITI") {
        config.graph.enabled = is_yes(&v);
    }
    if let Some(v) = get("LEGAL_KB_GRAPHITI_SERVICE_URL") {
        config.graph.service_url = Some(v);
    }
    if let Some(v) = get("LEGAL_KB_GRAPHITI_DATABASE") {
        config.graph.group_id = v;
    }
    if let Some(v) = get("PAGEINDEX_ADD_NODE_SUMMARY") {
        config.tree.add_node_summary = is_yes(&v);
    }
    if let Some(v) = get("LEGAL_KB_LOG_LEVEL") {
        let level = log_level_name(&v).ok_or_else(|| ConfigError::InvalidEnv {
            name: "LEGAL_KB_LOG_LEVEL".to_string(),
            value: v.clone(),
        })?;
        config.log_level = Some(level.to_string());
    }

    Ok(())
}

/// Feature flags are on only for `yes`.
fn is_yes(value: &str) -> bool {
    value.eq_ignore_ascii_case("yes")
}

/// Maps a level name, in any case, to its tracing filter name. `WARNING`
/// and `CRITICAL` are accepted as aliases.
pub fn log_level_name(value: &str) -> Option<&'static str> {
    match value.trim().to_ascii_lowercase().as_str() {
        "trace" => Some("trace"),
        "debug" => Some("debug"),
        "info" => Some("info"),
        "warn" | "warning" => Some("warn"),
        "error" | "critical" => Some("error"),
        _ => None,
    }
}

fn parse_env<T: FromStr>(name: &str, value: &str) -> Result<T, ConfigError> {
    value.parse().map_err(|_| ConfigError::InvalidEnv {
        name: name.to_string(),
        value: value.to_string(),
    })
}

pub fn validate_config(config: &WorkerConfig) -> Result<(), ConfigError> {
    let invalid = |message: &str| {
        Err(ConfigError::Validation {
            message: message.to_string(),
        })
    };

    if config.pipeline_name.trim().is_empty() {
        return invalid("pipeline_name must not be empty");
    }
    if config.default_bucket.trim().is_empty() {
        return invalid("default_bucket must not be empty");
    }
    if config.poll_interval_secs == 0 {
        return invalid("poll_interval_secs must be greater than 0");
    }
    if config.extraction.max_attempts == 0 {
        return invalid("extraction.max_attempts must be at least 1");
    }
    if config.graph.enabled
        && !config
            .graph
            .service_url
            .as_deref()
            .is_some_and(|url| !url.trim().is_empty())
    {
        return invalid("graph.enabled requires graph.service_url");
    }
    if let Some(level) = &config.log_level {
        if log_level_name(level).is_none() {
            return invalid("log_level must be one of trace, debug, info, warn, error");
        }
    }
    match &config.blob_store {
        BlobStoreConfig::Http { base_url, .. } if base_url.trim().is_empty() => {
            return invalid("blob_store.base_url must not be empty");
        }
        BlobStoreConfig::Filesystem { root } if root.trim().is_empty() => {
            return invalid("blob_store.root must not be empty");
        }
        _ => {}
    }

    Ok(())
}
