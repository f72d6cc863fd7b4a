//! Secret resolution for collaborator credentials.
//!
//! API keys are resolved from, in priority order:
//!
//! 1. **Direct value** - for quick local testing (`"value": "sk-..."`)
//! 2. **File reference** - Docker secrets pattern (`"file": "/run/secrets/openai"`)
//! 3. **Env var reference** - the usual production setup (`"env_var": "OPENAI_API_KEY"`)

use std::fs;

use secrecy::SecretString;
use serde::{Deserialize, Serialize};

/// Error type for secret resolution failures.
#[derive(Debug, thiserror::Error)]
pub enum SecretError {
    #[error("No secret source provided (need one of: direct value, file path, or env var name)")]
    NoSourceProvided,

    #[error("Failed to read secret from file '{path}': {source}")]
    FileReadError {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Environment variable '{name}' not set")]
    EnvVarNotSet { name: String },

    #[error("Environment variable '{name}' contains invalid UTF-8")]
    EnvVarNotUnicode { name: String },
}

/// Result type for secret resolution.
pub type Result<T> = std::result::Result<T, SecretError>;

/// Where a secret comes from, as written in the worker config file.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SecretSource {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub env_var: Option<String>,
}

impl SecretSource {
    pub fn from_env_var(name: &str) -> Self {
        Self {
            value: None,
            file: None,
            env_var: Some(name.to_string()),
        }
    }

    /// Resolves the secret, treating an unset env var as "not configured".
    pub fn resolve(&self) -> Result<Option<SecretString>> {
        match resolve_secret_optional(
            self.value.as_deref(),
            self.file.as_deref(),
            self.env_var.as_deref(),
        ) {
            Err(SecretError::EnvVarNotSet { .. }) => Ok(None),
            other => other,
        }
    }
}

/// Resolves a secret from multiple sources in priority order:
/// 1. Direct value (if provided and non-empty)
/// 2. File contents (if path provided)
/// 3. Environment variable (if name provided)
pub fn resolve_secret(
    direct: Option<&str>,
    file_path: Option<&str>,
    env_var: Option<&str>,
) -> Result<SecretString> {
    if let Some(value) = direct {
        if !value.is_empty() {
            return Ok(SecretString::from(value.to_string()));
        }
    }

    if let Some(path) = file_path {
        if !path.is_empty() {
            let expanded = expand_home(path);
            return match fs::read_to_string(&expanded) {
                Ok(content) => Ok(SecretString::from(content.trim().to_string())),
                Err(e) => Err(SecretError::FileReadError {
                    path: expanded,
                    source: e,
                }),
            };
        }
    }

    if let Some(var_name) = env_var {
        if !var_name.is_empty() {
            return match std::env::var(var_name) {
                Ok(value) => {
                    // Env vars may carry trailing newlines from shell exports.
                    let trimmed = value.trim();
                    if trimmed.is_empty() {
                        Err(SecretError::EnvVarNotSet {
                            name: var_name.to_string(),
                        })
                    } else {
                        Ok(SecretString::from(trimmed))
                    }
                }
                Err(std::env::VarError::NotPresent) => Err(SecretError::EnvVarNotSet {
                    name: var_name.to_string(),
                }),
                Err(std::env::VarError::NotUnicode(_)) => Err(SecretError::EnvVarNotUnicode {
                    name: var_name.to_string(),
                }),
            };
        }
    }

    Err(SecretError::NoSourceProvided)
}

/// Resolves a secret, returning None if no source is provided instead of an error.
pub fn resolve_secret_optional(
    direct: Option<&str>,
    file_path: Option<&str>,
    env_var: Option<&str>,
) -> Result<Option<SecretString>> {
    match resolve_secret(direct, file_path, env_var) {
        Ok(secret) => Ok(Some(secret)),
        Err(SecretError::NoSourceProvided) => Ok(None),
        Err(e) => Err(e),
    }
}

/// Expands a leading `~` to the user's home directory.
fn expand_home(path: &str) -> String {
    if path == "~" || path.starts_with("~/") {
        if let Some(home) = dirs::home_dir() {
            if path == "~" {
                return home.to_string_lossy().into_owned();
            }
            return path.replacen('~', &home.to_string_lossy(), 1);
        }
    }
    path.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;
    use serial_test::serial;
    use std::io::Write;

    #[test]
    fn test_direct_value_wins() {
        let secret = resolve_secret(Some("direct"), Some("/nonexistent"), Some("NOPE")).unwrap();
        assert_eq!(secret.expose_secret(), "direct");
    }

    #[test]
    fn test_file_value_is_trimmed() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "sk-from-file").unwrap();
        let path = file.path().to_string_lossy().to_string();

        let secret = resolve_secret(None, Some(&path), None).unwrap();
        assert_eq!(secret.expose_secret(), "sk-from-file");
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let result = resolve_secret(None, Some("/nonexistent/lexkb/secret"), None);
        assert!(matches!(result, Err(SecretError::FileReadError { .. })));
    }

    #[test]
    #[serial]
    fn test_env_var_source() {
        std::env::set_var("LEXKB_TEST_SECRET", "  sk-env \n");
        let secret = resolve_secret(None, None, Some("LEXKB_TEST_SECRET")).unwrap();
        assert_eq!(secret.expose_secret(), "sk-env");
        std::env::remove_var("LEXKB_TEST_SECRET");
    }

    #[test]
    fn test_no_source_is_none_when_optional() {
        assert!(resolve_secret_optional(None, None, None).unwrap().is_none());
        assert!(resolve_secret_optional(Some(""), Some(""), Some(""))
            .unwrap()
            .is_none());
    }

    #[test]
    #[serial]
    fn test_secret_source_unset_env_is_not_configured() {
        std::env::remove_var("LEXKB_TEST_UNSET_KEY");
        let source = SecretSource::from_env_var("LEXKB_TEST_UNSET_KEY");
        assert!(source.resolve().unwrap().is_none());
    }

    #[test]
    #[serial]
    fn test_secret_source_blank_env_is_not_configured() {
        std::env::set_var("LEXKB_TEST_BLANK_KEY", "   ");
        let source = SecretSource::from_env_var("LEXKB_TEST_BLANK_KEY");
        assert!(source.resolve().unwrap().is_none());
        std::env::remove_var("LEXKB_TEST_BLANK_KEY");
    }
}
